use thiserror::Error;

/// Errors that can occur in type operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    #[error("Basis points out of range: expected 1..=10000, got {0}")]
    BasisPointsOutOfRange(u32),

    #[error("Fraction out of range: expected (0, 1], got {0}")]
    FractionOutOfRange(f64),

    #[error("Fraction {0} is not a whole number of basis points")]
    FractionNotExact(f64),

    #[error("Invalid proposal id: {0}")]
    InvalidProposalId(String),

    #[error("Member id must not be empty")]
    EmptyMemberId,

    #[error("Unknown proposal status: {0}")]
    UnknownStatus(String),

    #[error("Unknown vote direction: {0}")]
    UnknownDirection(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),
}

impl From<std::num::ParseIntError> for TypesError {
    fn from(e: std::num::ParseIntError) -> Self {
        TypesError::InvalidProposalId(e.to_string())
    }
}
