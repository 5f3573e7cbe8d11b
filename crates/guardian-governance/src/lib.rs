//! Guardian Governance - DAO proposal lifecycle for the Guardian platform.
//!
//! Features:
//! - Proposals with quorum and approval thresholds
//! - Stake and reputation weighted voting, one vote per member
//! - Deadline-driven finalization with exact threshold arithmetic
//! - At-most-once treasury execution with retry and idempotency
//! - Periodic finalization sweep

pub mod clock;
pub mod error;
pub mod ledger;
pub mod membership;
pub mod observer;
pub mod proposal;
pub mod service;
pub mod store;
pub mod sweep;
pub mod tally;
pub mod treasury;
pub mod voting;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::GovernanceError;
pub use ledger::VoteLedger;
pub use membership::{MembershipError, MembershipService, StaticMembership};
pub use observer::{GovernanceObserver, NoopObserver};
pub use proposal::{Proposal, ProposalSpec, Vote};
pub use service::{
    CreateProposal, ExecutionReport, FinalizeReport, GovernanceConfig, GovernanceService,
    GovernanceStats,
};
pub use store::ProposalStore;
pub use sweep::{FinalizationSweep, SweepSummary};
pub use tally::{resolve_outcome, TallyEngine};
pub use treasury::{
    ExecutionOutcome, InMemoryLedger, RetryPolicy, TransferError, TransferReceipt,
    TransferRequest, TreasuryExecutionRecord, TreasuryExecutor, TreasuryLedger,
};
pub use voting::{calculate_voting_power, VotingPowerCalculator};
