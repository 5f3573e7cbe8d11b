use guardian_storage::StorageError;
use guardian_types::{MemberId, ProposalId, ProposalStatus, Timestamp, TypesError};
use thiserror::Error;

/// Errors that can occur in governance operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GovernanceError {
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    #[error("Proposal {id} is {actual}, expected {expected}")]
    Conflict {
        id: ProposalId,
        expected: ProposalStatus,
        actual: ProposalStatus,
    },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ProposalStatus,
        to: ProposalStatus,
    },

    #[error("Member {member_id} already voted on proposal {proposal_id}")]
    AlreadyVoted {
        proposal_id: ProposalId,
        member_id: MemberId,
    },

    #[error("Voting closed for proposal {proposal_id} (status {status}, deadline {voting_ends_at})")]
    VotingClosed {
        proposal_id: ProposalId,
        status: ProposalStatus,
        voting_ends_at: Timestamp,
    },

    #[error("Member {0} has zero voting power")]
    ZeroPower(MemberId),

    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    #[error("Voting on proposal {proposal_id} is open until {voting_ends_at}")]
    NotYetClosed {
        proposal_id: ProposalId,
        voting_ends_at: Timestamp,
    },

    #[error("Proposal {proposal_id} is not executable: {reason}")]
    NotExecutable {
        proposal_id: ProposalId,
        reason: String,
    },

    #[error("Unknown member: {0}")]
    UnknownMember(MemberId),

    #[error("Membership service unavailable: {0}")]
    MembershipUnavailable(String),

    #[error("Treasury transfer for proposal {proposal_id} failed: {reason}")]
    TransferFailed {
        proposal_id: ProposalId,
        reason: String,
    },

    #[error("Treasury transfer for proposal {proposal_id} gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        proposal_id: ProposalId,
        attempts: u32,
        last_error: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] TypesError),
}

impl GovernanceError {
    /// Transient infrastructure failures the caller may retry with backoff.
    ///
    /// Validation failures and terminal treasury failures are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GovernanceError::MembershipUnavailable(_) | GovernanceError::Storage(StorageError::Io(_))
        )
    }
}
