//! Membership service boundary.
//!
//! The engine never stores member stake or reputation; it asks the
//! membership service for a snapshot when it needs one.

use crate::error::GovernanceError;
use async_trait::async_trait;
use guardian_types::{MemberId, MemberSnapshot};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Failures reported by a membership service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MembershipError {
    /// Transient; the caller may retry.
    #[error("membership service unavailable: {0}")]
    Unavailable(String),

    #[error("unknown member: {0}")]
    UnknownMember(MemberId),
}

impl From<MembershipError> for GovernanceError {
    fn from(e: MembershipError) -> Self {
        match e {
            MembershipError::Unavailable(reason) => GovernanceError::MembershipUnavailable(reason),
            MembershipError::UnknownMember(id) => GovernanceError::UnknownMember(id),
        }
    }
}

/// Source of member stake and reputation.
#[async_trait]
pub trait MembershipService: Send + Sync {
    /// Current snapshot of one member.
    async fn member_snapshot(&self, member_id: &MemberId) -> Result<MemberSnapshot, MembershipError>;

    /// Every member currently eligible to vote (positive stake).
    async fn eligible_members(&self) -> Result<Vec<MemberSnapshot>, MembershipError>;
}

/// Membership held in memory.
///
/// Used by the node in development mode and by tests; can be switched
/// offline to exercise outage handling.
#[derive(Debug)]
pub struct StaticMembership {
    members: RwLock<BTreeMap<MemberId, MemberSnapshot>>,
    available: AtomicBool,
}

impl Default for StaticMembership {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl StaticMembership {
    pub fn new(members: impl IntoIterator<Item = MemberSnapshot>) -> Self {
        Self {
            members: RwLock::new(
                members
                    .into_iter()
                    .map(|m| (m.member_id.clone(), m))
                    .collect(),
            ),
            available: AtomicBool::new(true),
        }
    }

    /// Insert or replace a member.
    pub fn upsert(&self, member: MemberSnapshot) {
        self.members.write().insert(member.member_id.clone(), member);
    }

    pub fn remove(&self, member_id: &MemberId) -> Option<MemberSnapshot> {
        self.members.write().remove(member_id)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), MembershipError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MembershipError::Unavailable("membership service offline".into()))
        }
    }
}

#[async_trait]
impl MembershipService for StaticMembership {
    async fn member_snapshot(&self, member_id: &MemberId) -> Result<MemberSnapshot, MembershipError> {
        self.check_available()?;
        self.members
            .read()
            .get(member_id)
            .cloned()
            .ok_or_else(|| MembershipError::UnknownMember(member_id.clone()))
    }

    async fn eligible_members(&self) -> Result<Vec<MemberSnapshot>, MembershipError> {
        self.check_available()?;
        Ok(self
            .members
            .read()
            .values()
            .filter(|m| m.has_stake())
            .cloned()
            .collect())
    }
}
