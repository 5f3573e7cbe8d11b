//! Guardian Types - Core type definitions for the Guardian DAO engine.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - Identifiers (proposal ids, member ids)
//! - Unix-second timestamps
//! - Basis-point fractions for quorum and approval thresholds
//! - Proposal statuses, categories, vote directions and currencies
//! - Member snapshots consumed from the membership service

pub mod id;
pub mod time;
pub mod fraction;
pub mod proposal;
pub mod member;
pub mod error;

pub use id::{MemberId, ProposalId};
pub use time::Timestamp;
pub use fraction::BasisPoints;
pub use proposal::{Currency, ProposalCategory, ProposalStatus, TreasuryAction, VoteDirection};
pub use member::MemberSnapshot;
pub use error::TypesError;

/// Token amounts and voting power, in base units.
pub type Amount = u128;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Amount, BasisPoints, Currency, MemberId, MemberSnapshot, ProposalCategory, ProposalId,
        ProposalStatus, Timestamp, TreasuryAction, TypesError, VoteDirection,
    };
}
