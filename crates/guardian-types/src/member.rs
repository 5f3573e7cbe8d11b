use crate::id::MemberId;
use crate::Amount;

/// Point-in-time view of a member, as reported by the membership service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemberSnapshot {
    /// Member id
    pub member_id: MemberId,
    /// Staked tokens in base units
    pub staked_tokens: Amount,
    /// Reputation score; nominally 0-100, clamped when used
    pub reputation_score: i32,
}

impl MemberSnapshot {
    pub fn new(member_id: MemberId, staked_tokens: Amount, reputation_score: i32) -> Self {
        Self {
            member_id,
            staked_tokens,
            reputation_score,
        }
    }

    /// Reputation clamped into 0..=100.
    pub fn clamped_reputation(&self) -> u32 {
        self.reputation_score.clamp(0, 100) as u32
    }

    /// Whether this member holds any stake.
    pub fn has_stake(&self) -> bool {
        self.staked_tokens > 0
    }
}
