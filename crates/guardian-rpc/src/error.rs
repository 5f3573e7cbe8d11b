//! RPC error types.

use guardian_governance::GovernanceError;
use guardian_types::TypesError;
use jsonrpsee::types::error::ErrorObjectOwned;
use serde::Serialize;
use thiserror::Error;

/// JSON-RPC error codes.
pub mod error_codes {
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server error (custom)
    pub const SERVER_ERROR: i32 = -32000;
    /// Resource not found
    pub const RESOURCE_NOT_FOUND: i32 = -32001;
    /// Resource unavailable
    pub const RESOURCE_UNAVAILABLE: i32 = -32002;
    /// Request rejected by governance rules
    pub const REQUEST_REJECTED: i32 = -32003;
}

/// RPC errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

/// Extra data attached to error responses.
#[derive(Debug, Clone, Serialize)]
struct ErrorData {
    retryable: bool,
}

impl RpcError {
    /// Get the error code.
    pub fn code(&self) -> i32 {
        match self {
            RpcError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            RpcError::InternalError(_) => error_codes::INTERNAL_ERROR,
            RpcError::ResourceNotFound(_) => error_codes::RESOURCE_NOT_FOUND,
            RpcError::ResourceUnavailable(_) => error_codes::RESOURCE_UNAVAILABLE,
            RpcError::Rejected(_) => error_codes::REQUEST_REJECTED,
            RpcError::ExecutionError(_) => error_codes::SERVER_ERROR,
        }
    }

    /// Whether the client may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::ResourceUnavailable(_))
    }

    /// Convert to JSON-RPC error object.
    pub fn to_error_object(&self) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(
            self.code(),
            self.to_string(),
            Some(ErrorData {
                retryable: self.is_retryable(),
            }),
        )
    }
}

impl From<RpcError> for ErrorObjectOwned {
    fn from(err: RpcError) -> Self {
        err.to_error_object()
    }
}

impl From<GovernanceError> for RpcError {
    fn from(err: GovernanceError) -> Self {
        let message = err.to_string();
        match err {
            GovernanceError::InvalidProposal(_)
            | GovernanceError::InvalidVote(_)
            | GovernanceError::InvalidParameter(_) => RpcError::InvalidParams(message),

            GovernanceError::ProposalNotFound(_) | GovernanceError::UnknownMember(_) => {
                RpcError::ResourceNotFound(message)
            }

            GovernanceError::Conflict { .. }
            | GovernanceError::InvalidTransition { .. }
            | GovernanceError::AlreadyVoted { .. }
            | GovernanceError::VotingClosed { .. }
            | GovernanceError::ZeroPower(_)
            | GovernanceError::NotYetClosed { .. }
            | GovernanceError::NotExecutable { .. } => RpcError::Rejected(message),

            GovernanceError::MembershipUnavailable(_) | GovernanceError::RetriesExhausted { .. } => {
                RpcError::ResourceUnavailable(message)
            }

            GovernanceError::TransferFailed { .. } => RpcError::ExecutionError(message),

            GovernanceError::Storage(_) => RpcError::InternalError(message),
        }
    }
}

impl From<TypesError> for RpcError {
    fn from(err: TypesError) -> Self {
        RpcError::InvalidParams(err.to_string())
    }
}

/// Standard RPC result type.
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_types::{MemberId, ProposalId};

    #[test]
    fn test_rpc_error_code() {
        let err = RpcError::InvalidParams("test".to_string());
        assert_eq!(err.code(), -32602);

        let err = RpcError::ResourceNotFound("proposal 1".to_string());
        assert_eq!(err.code(), -32001);

        let err = RpcError::InternalError("db error".to_string());
        assert_eq!(err.code(), -32603);
    }

    #[test]
    fn test_governance_error_mapping() {
        let err: RpcError = GovernanceError::ProposalNotFound(ProposalId::new(3)).into();
        assert_eq!(err.code(), error_codes::RESOURCE_NOT_FOUND);

        let err: RpcError = GovernanceError::AlreadyVoted {
            proposal_id: ProposalId::new(3),
            member_id: MemberId::new("alice").unwrap(),
        }
        .into();
        assert_eq!(err.code(), error_codes::REQUEST_REJECTED);
        assert!(!err.is_retryable());

        let err: RpcError = GovernanceError::MembershipUnavailable("down".into()).into();
        assert_eq!(err.code(), error_codes::RESOURCE_UNAVAILABLE);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_object() {
        let obj = RpcError::Rejected("voting closed".to_string()).to_error_object();
        assert_eq!(obj.code(), error_codes::REQUEST_REJECTED);
        assert!(obj.message().contains("voting closed"));
        assert!(obj.data().is_some());
    }
}
