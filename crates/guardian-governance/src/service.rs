//! Governance service facade.
//!
//! Ties the proposal store, vote ledger, tally engine and treasury executor
//! to the membership service and exposes the operations callers use.

use crate::clock::Clock;
use crate::error::GovernanceError;
use crate::ledger::VoteLedger;
use crate::membership::MembershipService;
use crate::observer::GovernanceObserver;
use crate::proposal::{Proposal, ProposalSpec, Vote};
use crate::store::ProposalStore;
use crate::tally::TallyEngine;
use crate::treasury::{
    ExecutionOutcome, RetryPolicy, TreasuryExecutionRecord, TreasuryExecutor, TreasuryLedger,
};
use crate::voting::VotingPowerCalculator;
use guardian_types::{
    Amount, BasisPoints, MemberId, ProposalCategory, ProposalId, ProposalStatus, Timestamp,
    TreasuryAction, VoteDirection,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Governance parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceConfig {
    /// Quorum used when a proposal does not set one
    pub default_quorum: BasisPoints,
    /// Approval threshold used when a proposal does not set one
    pub default_approval: BasisPoints,
    /// Stake a member needs to open a proposal
    pub min_creator_stake: Amount,
    /// Voting window used when a proposal does not set a deadline
    pub default_voting_period_secs: u64,
    /// Longest allowed voting window
    pub max_voting_period_secs: u64,
    /// Treasury retry schedule
    pub retry: RetryPolicy,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            default_quorum: BasisPoints::DEFAULT_QUORUM,
            default_approval: BasisPoints::HALF,
            min_creator_stake: 100,
            default_voting_period_secs: 7 * 24 * 3600,
            max_voting_period_secs: 30 * 24 * 3600,
            retry: RetryPolicy::default(),
        }
    }
}

/// Request to open a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposal {
    pub creator_id: MemberId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub category: ProposalCategory,
    /// Deadline; defaults to now plus the default voting period
    #[serde(default)]
    pub voting_ends_at: Option<Timestamp>,
    #[serde(default)]
    pub quorum: Option<BasisPoints>,
    #[serde(default)]
    pub approval: Option<BasisPoints>,
    #[serde(default)]
    pub treasury_action: Option<TreasuryAction>,
}

/// What happened to the treasury action during finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum ExecutionReport {
    /// No transfer to perform.
    NotRequired,
    Executed { record: TreasuryExecutionRecord },
    AlreadyExecuted { record: TreasuryExecutionRecord },
    /// The proposal stays Passed; execution can be retried.
    Failed { reason: String, retryable: bool },
}

/// Result of finalizing a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeReport {
    pub proposal_id: ProposalId,
    pub status: ProposalStatus,
    pub execution: ExecutionReport,
}

/// Aggregate counters over all proposals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceStats {
    pub total_proposals: usize,
    pub active: usize,
    pub passed: usize,
    pub rejected: usize,
    pub expired: usize,
    pub executed: usize,
    pub total_votes: u64,
    /// Mean of per-proposal participation over settled proposals,
    /// against current eligible power
    pub average_participation: f64,
    /// Current total eligible power, if the membership service answered
    pub eligible_power: Option<Amount>,
}

/// The governance engine.
pub struct GovernanceService {
    config: GovernanceConfig,
    store: Arc<ProposalStore>,
    ledger: VoteLedger,
    tally: TallyEngine,
    executor: TreasuryExecutor,
    membership: Arc<dyn MembershipService>,
    calculator: VotingPowerCalculator,
    clock: Arc<dyn Clock>,
}

impl GovernanceService {
    pub fn new(
        config: GovernanceConfig,
        store: Arc<ProposalStore>,
        membership: Arc<dyn MembershipService>,
        treasury: Arc<dyn TreasuryLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let calculator = VotingPowerCalculator::new();
        Self {
            ledger: VoteLedger::new(store.clone(), clock.clone()),
            tally: TallyEngine::new(store.clone(), membership.clone(), calculator, clock.clone()),
            executor: TreasuryExecutor::new(store.clone(), treasury, clock.clone(), config.retry),
            config,
            store,
            membership,
            calculator,
            clock,
        }
    }

    /// Report settlements and treasury outcomes to `observer`, whichever
    /// caller triggers them.
    pub fn with_observer(mut self, observer: Arc<dyn GovernanceObserver>) -> Self {
        self.tally = self.tally.with_observer(observer.clone());
        self.executor = self.executor.with_observer(observer);
        self
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ProposalStore> {
        &self.store
    }

    /// Open a proposal on behalf of a member.
    pub async fn create_proposal(&self, request: CreateProposal) -> Result<Proposal, GovernanceError> {
        let now = self.clock.now();
        let voting_ends_at = request
            .voting_ends_at
            .unwrap_or_else(|| now.plus_secs(self.config.default_voting_period_secs));

        if now.elapsed_since(voting_ends_at) > self.config.max_voting_period_secs {
            return Err(GovernanceError::InvalidProposal(format!(
                "voting period longer than {} seconds",
                self.config.max_voting_period_secs
            )));
        }

        let creator = self
            .membership
            .member_snapshot(&request.creator_id)
            .await
            .map_err(GovernanceError::from)?;

        let spec = ProposalSpec {
            creator_id: request.creator_id,
            title: request.title,
            body: request.body,
            category: request.category,
            voting_ends_at,
            quorum: request.quorum.unwrap_or(self.config.default_quorum),
            approval: request.approval.unwrap_or(self.config.default_approval),
            treasury_action: request.treasury_action,
        };

        let proposal =
            self.store
                .create(spec, creator.staked_tokens, self.config.min_creator_stake, now)?;
        info!(
            "Proposal {} created by {}: {:?} (voting until {})",
            proposal.id, proposal.creator_id, proposal.title, proposal.voting_ends_at
        );
        Ok(proposal)
    }

    /// Cast a member's vote with their current voting power.
    pub async fn vote(
        &self,
        member_id: MemberId,
        proposal_id: ProposalId,
        direction: VoteDirection,
        reason: Option<String>,
    ) -> Result<Vote, GovernanceError> {
        // fail fast before asking the membership service
        self.store.get(proposal_id)?;

        let snapshot = self
            .membership
            .member_snapshot(&member_id)
            .await
            .map_err(GovernanceError::from)?;
        let power = self.calculator.compute(&snapshot);

        self.ledger
            .cast_vote(proposal_id, member_id, direction, power, reason)
    }

    /// Settle a proposal and, if it passed with a treasury action, execute it.
    ///
    /// A failed execution does not fail the call: the proposal is Passed and
    /// the report says why the transfer did not happen.
    pub async fn finalize(&self, id: ProposalId) -> Result<FinalizeReport, GovernanceError> {
        let status = self.tally.finalize(id).await?;

        let execution = match status {
            ProposalStatus::Passed => {
                let proposal = self.store.get(id)?;
                if proposal.treasury_action.is_some() {
                    match self.executor.execute(id).await {
                        Ok(outcome) => outcome.into(),
                        Err(e) => {
                            error!("Treasury execution of proposal {} failed: {}", id, e);
                            ExecutionReport::Failed {
                                retryable: is_retryable_execution(&e),
                                reason: e.to_string(),
                            }
                        }
                    }
                } else {
                    ExecutionReport::NotRequired
                }
            }
            ProposalStatus::Executed => match self.store.execution(id)? {
                Some(record) => ExecutionReport::AlreadyExecuted { record },
                None => ExecutionReport::NotRequired,
            },
            _ => ExecutionReport::NotRequired,
        };

        Ok(FinalizeReport {
            proposal_id: id,
            status: self.store.get(id)?.status,
            execution,
        })
    }

    /// Execute the treasury action of a passed proposal.
    pub async fn execute(&self, id: ProposalId) -> Result<ExecutionOutcome, GovernanceError> {
        self.executor.execute(id).await
    }

    pub fn get_proposal(&self, id: ProposalId) -> Result<Proposal, GovernanceError> {
        self.store.get(id)
    }

    pub fn list_active(&self) -> Vec<Proposal> {
        self.store.list_active()
    }

    /// All proposals, or only those with `status`.
    pub fn list_proposals(&self, status: Option<ProposalStatus>) -> Vec<Proposal> {
        match status {
            Some(status) => self.store.list_by_status(status),
            None => self.store.list_all(),
        }
    }

    pub fn votes(&self, id: ProposalId) -> Result<Vec<Vote>, GovernanceError> {
        self.ledger.votes(id)
    }

    pub fn member_vote(
        &self,
        id: ProposalId,
        member_id: &MemberId,
    ) -> Result<Option<Vote>, GovernanceError> {
        self.ledger.vote(id, member_id)
    }

    /// Active proposals whose voting window has closed.
    pub fn due_for_finalization(&self) -> Vec<ProposalId> {
        let now = self.clock.now();
        self.store
            .list_active()
            .into_iter()
            .filter(|p| p.is_due_for_finalization(now))
            .map(|p| p.id)
            .collect()
    }

    /// Passed proposals whose treasury action has not run yet.
    pub fn pending_executions(&self) -> Vec<ProposalId> {
        self.store
            .list_by_status(ProposalStatus::Passed)
            .into_iter()
            .filter(|p| p.treasury_action.is_some())
            .map(|p| p.id)
            .collect()
    }

    /// Counts by status, vote totals and average participation.
    pub async fn stats(&self) -> GovernanceStats {
        let proposals = self.store.list_all();
        let mut stats = GovernanceStats {
            total_proposals: proposals.len(),
            ..Default::default()
        };

        for p in &proposals {
            match p.status {
                ProposalStatus::Active => stats.active += 1,
                ProposalStatus::Passed => stats.passed += 1,
                ProposalStatus::Rejected => stats.rejected += 1,
                ProposalStatus::Expired => stats.expired += 1,
                ProposalStatus::Executed => stats.executed += 1,
            }
            stats.total_votes += p.unique_voter_count;
        }

        match self.tally.eligible_power().await {
            Ok(eligible) => {
                let settled: Vec<&Proposal> =
                    proposals.iter().filter(|p| p.status.is_settled()).collect();
                if !settled.is_empty() {
                    stats.average_participation = settled
                        .iter()
                        .map(|p| p.participation(eligible))
                        .sum::<f64>()
                        / settled.len() as f64;
                }
                stats.eligible_power = Some(eligible);
            }
            Err(e) => warn!("Eligible power unavailable for stats: {}", e),
        }

        stats
    }
}

impl From<ExecutionOutcome> for ExecutionReport {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Executed(record) => ExecutionReport::Executed { record },
            ExecutionOutcome::AlreadyExecuted(record) => ExecutionReport::AlreadyExecuted { record },
        }
    }
}

// RetriesExhausted is terminal for this attempt but a later execute call may
// still succeed once the ledger recovers.
fn is_retryable_execution(e: &GovernanceError) -> bool {
    e.is_retryable() || matches!(e, GovernanceError::RetriesExhausted { .. })
}
