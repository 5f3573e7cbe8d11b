//! Vote ledger.
//!
//! Records at most one vote per (proposal, member) and folds each vote into
//! the proposal's tally in the same write.

use crate::clock::Clock;
use crate::error::GovernanceError;
use crate::proposal::{Vote, MAX_REASON_LEN};
use crate::store::{ProposalStore, SlotUpdate};
use guardian_types::{Amount, MemberId, ProposalId, VoteDirection};
use std::sync::Arc;
use tracing::debug;

/// Vote recording on top of the proposal store.
pub struct VoteLedger {
    store: Arc<ProposalStore>,
    clock: Arc<dyn Clock>,
}

impl VoteLedger {
    pub fn new(store: Arc<ProposalStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a vote with the given power.
    ///
    /// Checks, in order: the proposal exists, voting is open, the member has
    /// not voted yet, the power is positive.
    pub fn cast_vote(
        &self,
        proposal_id: ProposalId,
        member_id: MemberId,
        direction: VoteDirection,
        power: Amount,
        reason: Option<String>,
    ) -> Result<Vote, GovernanceError> {
        let reason = normalize_reason(reason)?;

        let vote = self.store.apply(proposal_id, |slot| {
            let now = self.clock.now();
            let proposal = &slot.proposal;

            if !proposal.is_voting_open(now) {
                return Err(GovernanceError::VotingClosed {
                    proposal_id,
                    status: proposal.status,
                    voting_ends_at: proposal.voting_ends_at,
                });
            }
            if slot.votes.contains_key(&member_id) {
                return Err(GovernanceError::AlreadyVoted {
                    proposal_id,
                    member_id: member_id.clone(),
                });
            }
            if power == 0 {
                return Err(GovernanceError::ZeroPower(member_id.clone()));
            }

            let vote = Vote {
                id: self.store.allocate_vote_id(),
                proposal_id,
                member_id: member_id.clone(),
                direction,
                power,
                cast_at: now,
                reason,
            };

            let mut updated = proposal.clone();
            updated.record_vote(direction, power);

            Ok((
                SlotUpdate {
                    proposal: Some(updated),
                    vote: Some(vote.clone()),
                    ..Default::default()
                },
                vote,
            ))
        })?;

        debug!(
            "Vote {} on proposal {}: {} {} with power {}",
            vote.id, proposal_id, vote.member_id, direction, power
        );
        Ok(vote)
    }

    /// Votes on a proposal, in cast order.
    pub fn votes(&self, proposal_id: ProposalId) -> Result<Vec<Vote>, GovernanceError> {
        self.store.votes(proposal_id)
    }

    /// A member's vote on a proposal, if any.
    pub fn vote(
        &self,
        proposal_id: ProposalId,
        member_id: &MemberId,
    ) -> Result<Option<Vote>, GovernanceError> {
        self.store.vote(proposal_id, member_id)
    }
}

fn normalize_reason(reason: Option<String>) -> Result<Option<String>, GovernanceError> {
    let Some(reason) = reason else {
        return Ok(None);
    };
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_REASON_LEN {
        return Err(GovernanceError::InvalidVote(format!(
            "reason longer than {} characters",
            MAX_REASON_LEN
        )));
    }
    Ok(Some(trimmed.to_string()))
}
