//! Tally and finalization.
//!
//! Once a proposal's deadline has passed, its outcome is decided from the
//! running tally against the total eligible voting power:
//!
//! - no eligible power, or participation below quorum: Expired
//! - for / cast strictly above the approval threshold: Passed
//! - otherwise: Rejected

use crate::clock::Clock;
use crate::error::GovernanceError;
use crate::membership::MembershipService;
use crate::observer::{GovernanceObserver, NoopObserver};
use crate::store::ProposalStore;
use crate::voting::VotingPowerCalculator;
use guardian_types::{Amount, BasisPoints, ProposalId, ProposalStatus};
use std::sync::Arc;
use tracing::{debug, info};

/// Decide the outcome of a closed vote.
///
/// Quorum is met when `(for + against) / eligible >= quorum`; approval
/// requires `for / (for + against) > approval`. Both are evaluated exactly.
pub fn resolve_outcome(
    votes_for: Amount,
    votes_against: Amount,
    eligible_power: Amount,
    quorum: BasisPoints,
    approval: BasisPoints,
) -> ProposalStatus {
    if eligible_power == 0 {
        return ProposalStatus::Expired;
    }
    let cast = votes_for.saturating_add(votes_against);
    if quorum.ratio_below(cast, eligible_power) {
        return ProposalStatus::Expired;
    }
    if approval.ratio_above(votes_for, cast) {
        ProposalStatus::Passed
    } else {
        ProposalStatus::Rejected
    }
}

/// Finalizes proposals whose voting window has closed.
pub struct TallyEngine {
    store: Arc<ProposalStore>,
    membership: Arc<dyn MembershipService>,
    calculator: VotingPowerCalculator,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn GovernanceObserver>,
}

impl TallyEngine {
    pub fn new(
        store: Arc<ProposalStore>,
        membership: Arc<dyn MembershipService>,
        calculator: VotingPowerCalculator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            membership,
            calculator,
            clock,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Report settlements to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn GovernanceObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Total voting power of all eligible members right now.
    pub async fn eligible_power(&self) -> Result<Amount, GovernanceError> {
        let members = self
            .membership
            .eligible_members()
            .await
            .map_err(GovernanceError::from)?;
        Ok(self.calculator.total_eligible_power(&members))
    }

    /// Settle a proposal.
    ///
    /// Returns the status the proposal ended in. Already-settled proposals
    /// report their current status without change; losing a race with
    /// another finalizer does the same.
    pub async fn finalize(&self, id: ProposalId) -> Result<ProposalStatus, GovernanceError> {
        let proposal = self.store.get(id)?;
        if proposal.status != ProposalStatus::Active {
            return Ok(proposal.status);
        }

        let now = self.clock.now();
        if now < proposal.voting_ends_at {
            return Err(GovernanceError::NotYetClosed {
                proposal_id: id,
                voting_ends_at: proposal.voting_ends_at,
            });
        }

        let eligible = match self.eligible_power().await {
            Ok(eligible) => eligible,
            Err(e) => {
                debug!("Cannot finalize proposal {} yet: {}", id, e);
                return Err(e);
            }
        };

        let result = self
            .store
            .transition_with(id, ProposalStatus::Active, now, |p| {
                resolve_outcome(
                    p.votes_for_power,
                    p.votes_against_power,
                    eligible,
                    p.quorum,
                    p.approval,
                )
            });

        match result {
            Ok(settled) => {
                info!(
                    "Proposal {} finalized as {} (for {}, against {}, eligible {})",
                    id,
                    settled.status,
                    settled.votes_for_power,
                    settled.votes_against_power,
                    eligible
                );
                self.observer.proposal_settled(id, settled.status);
                Ok(settled.status)
            }
            Err(GovernanceError::Conflict { .. }) => {
                let current = self.store.get(id)?.status;
                debug!("Proposal {} was finalized concurrently as {}", id, current);
                Ok(current)
            }
            Err(e) => Err(e),
        }
    }
}
