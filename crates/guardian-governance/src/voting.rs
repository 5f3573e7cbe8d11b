//! Voting power calculation from stake and reputation.
//!
//! Voting power = floor(stake * (100 + reputation) / 200)
//!
//! Reputation is clamped into 0..=100 first, so power ranges from half the
//! stake (reputation 0) to the full stake (reputation 100).

use guardian_types::{Amount, MemberSnapshot};

/// Reputation weight denominator: (100 + reputation) / 200.
const WEIGHT_DENOMINATOR: u128 = 200;
/// Base added to the clamped reputation.
const WEIGHT_BASE: u128 = 100;

/// Calculate voting power for a stake and raw reputation score.
///
/// Exact floor of `stake * (100 + clamp(reputation, 0, 100)) / 200`,
/// computed without intermediate overflow.
pub fn calculate_voting_power(stake: Amount, reputation_score: i32) -> Amount {
    let weight = WEIGHT_BASE + reputation_score.clamp(0, 100) as u128;

    // stake = q * 200 + r, so stake * w / 200 = q * w + floor(r * w / 200)
    let quotient = stake / WEIGHT_DENOMINATOR;
    let remainder = stake % WEIGHT_DENOMINATOR;
    quotient
        .saturating_mul(weight)
        .saturating_add(remainder * weight / WEIGHT_DENOMINATOR)
}

/// Stateless mapping from member snapshots to voting power.
#[derive(Debug, Default, Clone, Copy)]
pub struct VotingPowerCalculator;

impl VotingPowerCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Voting power of a single member.
    pub fn compute(&self, member: &MemberSnapshot) -> Amount {
        calculate_voting_power(member.staked_tokens, member.reputation_score)
    }

    /// Total power of every member with positive stake.
    pub fn total_eligible_power(&self, members: &[MemberSnapshot]) -> Amount {
        members
            .iter()
            .filter(|m| m.has_stake())
            .map(|m| self.compute(m))
            .fold(0u128, |acc, p| acc.saturating_add(p))
    }
}
