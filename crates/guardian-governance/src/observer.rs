//! Hooks for outcomes of governance operations.
//!
//! Called by the engine itself, so every caller (RPC, sweep, tests) is seen
//! the same way. Callbacks run inline and must not block.

use crate::error::GovernanceError;
use crate::treasury::TreasuryExecutionRecord;
use guardian_types::{ProposalId, ProposalStatus};

pub trait GovernanceObserver: Send + Sync {
    /// A proposal left Active; reported once, by the caller that settled it.
    fn proposal_settled(&self, _id: ProposalId, _status: ProposalStatus) {}

    /// A treasury transfer was performed and recorded.
    fn treasury_executed(&self, _record: &TreasuryExecutionRecord) {}

    /// A transfer attempt sequence ended without moving funds.
    fn treasury_failed(&self, _id: ProposalId, _error: &GovernanceError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl GovernanceObserver for NoopObserver {}
