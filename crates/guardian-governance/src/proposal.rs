//! Proposal and vote records.
//!
//! Proposals go through states: Active -> Passed/Rejected/Expired, and a
//! Passed proposal with a treasury action moves on to Executed.

use crate::error::GovernanceError;
use guardian_types::{
    Amount, BasisPoints, MemberId, ProposalCategory, ProposalId, ProposalStatus, Timestamp,
    TreasuryAction, VoteDirection,
};
use serde::{Deserialize, Serialize};

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum body length in characters.
pub const MAX_BODY_LEN: usize = 20_000;
/// Maximum vote reason length in characters.
pub const MAX_REASON_LEN: usize = 1_000;

/// Stored proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// Sequential proposal ID
    pub id: ProposalId,
    /// Member who created the proposal
    pub creator_id: MemberId,
    /// Title
    pub title: String,
    /// Body
    pub body: String,
    /// Category
    #[serde(default)]
    pub category: ProposalCategory,
    /// Creation time
    pub created_at: Timestamp,
    /// Last second at which votes are accepted
    pub voting_ends_at: Timestamp,
    /// Stake the creator needed to open the proposal
    pub minimum_creator_stake: Amount,
    /// Fraction of eligible power that must participate
    pub quorum: BasisPoints,
    /// Fraction of cast power that must be in favor (strictly exceeded)
    pub approval: BasisPoints,
    /// Transfer performed when the proposal passes
    pub treasury_action: Option<TreasuryAction>,
    /// Current status
    pub status: ProposalStatus,
    /// Sum of For vote power
    pub votes_for_power: Amount,
    /// Sum of Against vote power
    pub votes_against_power: Amount,
    /// Number of distinct voters
    pub unique_voter_count: u64,
    /// When the proposal left Active
    pub settled_at: Option<Timestamp>,
    /// When the treasury action was executed
    pub executed_at: Option<Timestamp>,
}

impl Proposal {
    pub(crate) fn from_spec(
        id: ProposalId,
        spec: ProposalSpec,
        minimum_creator_stake: Amount,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            creator_id: spec.creator_id,
            title: spec.title.trim().to_string(),
            body: spec.body,
            category: spec.category,
            created_at: now,
            voting_ends_at: spec.voting_ends_at,
            minimum_creator_stake,
            quorum: spec.quorum,
            approval: spec.approval,
            treasury_action: spec.treasury_action,
            status: ProposalStatus::Active,
            votes_for_power: 0,
            votes_against_power: 0,
            unique_voter_count: 0,
            settled_at: None,
            executed_at: None,
        }
    }

    /// Total power cast in either direction.
    pub fn total_cast_power(&self) -> Amount {
        self.votes_for_power.saturating_add(self.votes_against_power)
    }

    /// Whether a vote cast at `now` is accepted.
    pub fn is_voting_open(&self, now: Timestamp) -> bool {
        self.status.can_vote() && !self.voting_ends_at.is_before(now)
    }

    /// Whether the proposal is still Active with its deadline behind `now`.
    pub fn is_due_for_finalization(&self, now: Timestamp) -> bool {
        self.status == ProposalStatus::Active && self.voting_ends_at <= now
    }

    /// Participation as a fraction of `eligible_power`, for reporting.
    pub fn participation(&self, eligible_power: Amount) -> f64 {
        if eligible_power == 0 {
            return 0.0;
        }
        self.total_cast_power() as f64 / eligible_power as f64
    }

    /// Fold a new vote into the running tally.
    pub(crate) fn record_vote(&mut self, direction: VoteDirection, power: Amount) {
        match direction {
            VoteDirection::For => {
                self.votes_for_power = self.votes_for_power.saturating_add(power);
            }
            VoteDirection::Against => {
                self.votes_against_power = self.votes_against_power.saturating_add(power);
            }
        }
        self.unique_voter_count += 1;
    }
}

/// Parameters for a new proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalSpec {
    pub creator_id: MemberId,
    pub title: String,
    pub body: String,
    pub category: ProposalCategory,
    pub voting_ends_at: Timestamp,
    pub quorum: BasisPoints,
    pub approval: BasisPoints,
    pub treasury_action: Option<TreasuryAction>,
}

impl ProposalSpec {
    /// Validate shape and timing.
    ///
    /// Stake is checked separately, against the creator's snapshot.
    pub fn validate(&self, now: Timestamp) -> Result<(), GovernanceError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(GovernanceError::InvalidProposal("title must not be empty".into()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(GovernanceError::InvalidProposal(format!(
                "title longer than {} characters",
                MAX_TITLE_LEN
            )));
        }
        if self.body.chars().count() > MAX_BODY_LEN {
            return Err(GovernanceError::InvalidProposal(format!(
                "body longer than {} characters",
                MAX_BODY_LEN
            )));
        }
        if self.voting_ends_at <= now {
            return Err(GovernanceError::InvalidProposal(format!(
                "voting deadline {} is not after {}",
                self.voting_ends_at, now
            )));
        }

        match &self.treasury_action {
            Some(action) => {
                if action.amount == 0 {
                    return Err(GovernanceError::InvalidProposal(
                        "treasury amount must be positive".into(),
                    ));
                }
                if action.recipient.trim().is_empty() {
                    return Err(GovernanceError::InvalidProposal(
                        "treasury recipient must not be empty".into(),
                    ));
                }
            }
            None if self.category.requires_treasury_action() => {
                return Err(GovernanceError::InvalidProposal(
                    "treasury proposals require a treasury action".into(),
                ));
            }
            None => {}
        }

        Ok(())
    }
}

/// A recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Ledger-wide sequence number
    pub id: u64,
    pub proposal_id: ProposalId,
    pub member_id: MemberId,
    pub direction: VoteDirection,
    /// Voting power at cast time
    pub power: Amount,
    pub cast_at: Timestamp,
    /// Optional free-text reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
