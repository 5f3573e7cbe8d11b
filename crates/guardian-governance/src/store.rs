//! Proposal store.
//!
//! Holds every proposal together with its votes and treasury execution
//! record. Each proposal lives in its own slot behind a mutex; every mutation
//! of a slot is written through to the database as one batch before the
//! in-memory copy changes, so the two never diverge and a status change is
//! never lost or applied twice.

use crate::error::GovernanceError;
use crate::proposal::{Proposal, ProposalSpec, Vote};
use crate::treasury::TreasuryExecutionRecord;
use dashmap::DashMap;
use guardian_storage::{Column, Database, StorageError, WriteBatch};
use guardian_types::{Amount, MemberId, ProposalId, ProposalStatus, Timestamp, VoteDirection};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything stored for one proposal.
#[derive(Debug, Clone)]
pub(crate) struct ProposalSlot {
    pub proposal: Proposal,
    pub votes: BTreeMap<MemberId, Vote>,
    pub execution: Option<TreasuryExecutionRecord>,
}

/// Changes to apply to a slot, all or nothing.
#[derive(Debug, Default)]
pub(crate) struct SlotUpdate {
    pub proposal: Option<Proposal>,
    pub vote: Option<Vote>,
    pub execution: Option<TreasuryExecutionRecord>,
}

impl SlotUpdate {
    fn is_empty(&self) -> bool {
        self.proposal.is_none() && self.vote.is_none() && self.execution.is_none()
    }
}

pub(crate) fn proposal_key(id: ProposalId) -> String {
    format!("{:020}", id.as_u64())
}

pub(crate) fn vote_key(proposal_id: ProposalId, member_id: &MemberId) -> String {
    format!("{}/{}", proposal_key(proposal_id), member_id)
}

/// Durable proposal store.
pub struct ProposalStore {
    db: Arc<Database>,
    slots: DashMap<ProposalId, Arc<Mutex<ProposalSlot>>>,
    next_proposal_id: AtomicU64,
    next_vote_id: AtomicU64,
}

impl ProposalStore {
    /// Load every proposal, vote and execution record from `db`.
    ///
    /// Fails if a stored tally disagrees with the stored votes.
    pub fn open(db: Arc<Database>) -> Result<Self, GovernanceError> {
        let mut slots: BTreeMap<ProposalId, ProposalSlot> = BTreeMap::new();

        for (_, proposal) in db.scan::<Proposal>(Column::Proposals)? {
            slots.insert(
                proposal.id,
                ProposalSlot {
                    proposal,
                    votes: BTreeMap::new(),
                    execution: None,
                },
            );
        }

        let mut max_vote_id = 0;
        for (key, vote) in db.scan::<Vote>(Column::Votes)? {
            max_vote_id = max_vote_id.max(vote.id);
            let slot = slots.get_mut(&vote.proposal_id).ok_or_else(|| {
                StorageError::Corrupt(format!("vote {} references a missing proposal", key))
            })?;
            slot.votes.insert(vote.member_id.clone(), vote);
        }

        for (key, record) in db.scan::<TreasuryExecutionRecord>(Column::TreasuryExecutions)? {
            let slot = slots.get_mut(&record.proposal_id).ok_or_else(|| {
                StorageError::Corrupt(format!(
                    "execution record {} references a missing proposal",
                    key
                ))
            })?;
            slot.execution = Some(record);
        }

        for slot in slots.values() {
            verify_tally(slot)?;
        }

        let next_proposal_id = slots.keys().next_back().map(|id| id.as_u64()).unwrap_or(0) + 1;

        info!(
            "Loaded {} proposals from storage (next id {})",
            slots.len(),
            next_proposal_id
        );

        Ok(Self {
            db,
            slots: slots
                .into_iter()
                .map(|(id, slot)| (id, Arc::new(Mutex::new(slot))))
                .collect(),
            next_proposal_id: AtomicU64::new(next_proposal_id),
            next_vote_id: AtomicU64::new(max_vote_id + 1),
        })
    }

    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            db: Arc::new(Database::in_memory()),
            slots: DashMap::new(),
            next_proposal_id: AtomicU64::new(1),
            next_vote_id: AtomicU64::new(1),
        }
    }

    /// Validate and persist a new Active proposal.
    pub fn create(
        &self,
        spec: ProposalSpec,
        creator_stake: Amount,
        minimum_creator_stake: Amount,
        now: Timestamp,
    ) -> Result<Proposal, GovernanceError> {
        spec.validate(now)?;
        if creator_stake < minimum_creator_stake {
            return Err(GovernanceError::InvalidProposal(format!(
                "creator stake {} is below the minimum {}",
                creator_stake, minimum_creator_stake
            )));
        }

        let id = ProposalId::new(self.next_proposal_id.fetch_add(1, Ordering::SeqCst));
        let proposal = Proposal::from_spec(id, spec, minimum_creator_stake, now);

        self.db.put(Column::Proposals, &proposal_key(id), &proposal)?;
        self.slots.insert(
            id,
            Arc::new(Mutex::new(ProposalSlot {
                proposal: proposal.clone(),
                votes: BTreeMap::new(),
                execution: None,
            })),
        );

        debug!("Created proposal {} by {}", id, proposal.creator_id);
        Ok(proposal)
    }

    /// Fetch a proposal.
    pub fn get(&self, id: ProposalId) -> Result<Proposal, GovernanceError> {
        Ok(self.slot(id)?.lock().proposal.clone())
    }

    /// Compare-and-set status change.
    ///
    /// Succeeds only if the current status equals `from`; otherwise returns
    /// `Conflict` carrying the status actually found.
    pub fn transition(
        &self,
        id: ProposalId,
        from: ProposalStatus,
        to: ProposalStatus,
        at: Timestamp,
    ) -> Result<Proposal, GovernanceError> {
        self.transition_with(id, from, at, |_| to)
    }

    /// Compare-and-set where the target status is decided from the proposal
    /// as seen under the slot lock.
    pub fn transition_with<F>(
        &self,
        id: ProposalId,
        from: ProposalStatus,
        at: Timestamp,
        decide: F,
    ) -> Result<Proposal, GovernanceError>
    where
        F: FnOnce(&Proposal) -> ProposalStatus,
    {
        self.apply(id, |slot| {
            let current = slot.proposal.status;
            if current != from {
                return Err(GovernanceError::Conflict {
                    id,
                    expected: from,
                    actual: current,
                });
            }

            let to = decide(&slot.proposal);
            if !from.can_transition_to(to) {
                return Err(GovernanceError::InvalidTransition { from, to });
            }
            if to == ProposalStatus::Executed && slot.execution.is_none() {
                return Err(GovernanceError::NotExecutable {
                    proposal_id: id,
                    reason: "no treasury execution recorded".into(),
                });
            }

            let mut proposal = slot.proposal.clone();
            proposal.status = to;
            if to == ProposalStatus::Executed {
                proposal.executed_at = slot.execution.as_ref().map(|r| r.executed_at);
            } else {
                proposal.settled_at = Some(at);
            }

            Ok((
                SlotUpdate {
                    proposal: Some(proposal.clone()),
                    ..Default::default()
                },
                proposal,
            ))
        })
    }

    /// Proposals with the given status, by id.
    pub fn list_by_status(&self, status: ProposalStatus) -> Vec<Proposal> {
        self.collect(|p| p.status == status)
    }

    /// Active proposals, by id.
    pub fn list_active(&self) -> Vec<Proposal> {
        self.list_by_status(ProposalStatus::Active)
    }

    /// Every proposal, by id.
    pub fn list_all(&self) -> Vec<Proposal> {
        self.collect(|_| true)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Votes on a proposal, in cast order.
    pub fn votes(&self, id: ProposalId) -> Result<Vec<Vote>, GovernanceError> {
        let mut votes: Vec<Vote> = self.slot(id)?.lock().votes.values().cloned().collect();
        votes.sort_by_key(|v| (v.cast_at, v.id));
        Ok(votes)
    }

    /// A single member's vote on a proposal.
    pub fn vote(&self, id: ProposalId, member_id: &MemberId) -> Result<Option<Vote>, GovernanceError> {
        Ok(self.slot(id)?.lock().votes.get(member_id).cloned())
    }

    /// The treasury execution record of a proposal, if any.
    pub fn execution(&self, id: ProposalId) -> Result<Option<TreasuryExecutionRecord>, GovernanceError> {
        Ok(self.slot(id)?.lock().execution.clone())
    }

    /// Insert the execution record and move Passed -> Executed in one write.
    ///
    /// If a record already exists it is returned unchanged.
    pub fn record_execution(
        &self,
        record: TreasuryExecutionRecord,
    ) -> Result<TreasuryExecutionRecord, GovernanceError> {
        let id = record.proposal_id;
        self.apply(id, move |slot| {
            if let Some(existing) = &slot.execution {
                return Ok((SlotUpdate::default(), existing.clone()));
            }
            let current = slot.proposal.status;
            if current != ProposalStatus::Passed {
                return Err(GovernanceError::Conflict {
                    id,
                    expected: ProposalStatus::Passed,
                    actual: current,
                });
            }
            if slot.proposal.treasury_action.is_none() {
                return Err(GovernanceError::NotExecutable {
                    proposal_id: id,
                    reason: "no treasury action".into(),
                });
            }

            let mut proposal = slot.proposal.clone();
            proposal.status = ProposalStatus::Executed;
            proposal.executed_at = Some(record.executed_at);

            Ok((
                SlotUpdate {
                    proposal: Some(proposal),
                    execution: Some(record.clone()),
                    ..Default::default()
                },
                record,
            ))
        })
    }

    pub(crate) fn allocate_vote_id(&self) -> u64 {
        self.next_vote_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Run `f` under the slot lock and persist whatever it returns.
    pub(crate) fn apply<T, F>(&self, id: ProposalId, f: F) -> Result<T, GovernanceError>
    where
        F: FnOnce(&ProposalSlot) -> Result<(SlotUpdate, T), GovernanceError>,
    {
        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        let (update, out) = f(&*guard)?;
        if update.is_empty() {
            return Ok(out);
        }

        let mut batch = WriteBatch::new();
        if let Some(proposal) = &update.proposal {
            batch.put(Column::Proposals, proposal_key(proposal.id), proposal)?;
        }
        if let Some(vote) = &update.vote {
            batch.put(Column::Votes, vote_key(vote.proposal_id, &vote.member_id), vote)?;
        }
        if let Some(record) = &update.execution {
            batch.put(Column::TreasuryExecutions, proposal_key(record.proposal_id), record)?;
        }
        self.db.write(batch)?;

        if let Some(proposal) = update.proposal {
            guard.proposal = proposal;
        }
        if let Some(vote) = update.vote {
            guard.votes.insert(vote.member_id.clone(), vote);
        }
        if let Some(record) = update.execution {
            guard.execution = Some(record);
        }
        Ok(out)
    }

    fn slot(&self, id: ProposalId) -> Result<Arc<Mutex<ProposalSlot>>, GovernanceError> {
        self.slots
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(GovernanceError::ProposalNotFound(id))
    }

    fn collect(&self, filter: impl Fn(&Proposal) -> bool) -> Vec<Proposal> {
        let slots: Vec<Arc<Mutex<ProposalSlot>>> =
            self.slots.iter().map(|entry| Arc::clone(entry.value())).collect();
        let mut proposals: Vec<Proposal> = slots
            .iter()
            .map(|slot| slot.lock().proposal.clone())
            .filter(|p| filter(p))
            .collect();
        proposals.sort_by_key(|p| p.id);
        proposals
    }
}

fn verify_tally(slot: &ProposalSlot) -> Result<(), StorageError> {
    let mut for_power: Amount = 0;
    let mut against_power: Amount = 0;
    for vote in slot.votes.values() {
        match vote.direction {
            VoteDirection::For => for_power = for_power.saturating_add(vote.power),
            VoteDirection::Against => {
                against_power = against_power.saturating_add(vote.power)
            }
        }
    }

    let p = &slot.proposal;
    if p.votes_for_power != for_power
        || p.votes_against_power != against_power
        || p.unique_voter_count != slot.votes.len() as u64
    {
        return Err(StorageError::Corrupt(format!(
            "proposal {} tally ({}/{}/{}) does not match its votes ({}/{}/{})",
            p.id,
            p.votes_for_power,
            p.votes_against_power,
            p.unique_voter_count,
            for_power,
            against_power,
            slot.votes.len()
        )));
    }
    if p.status == ProposalStatus::Executed && slot.execution.is_none() {
        return Err(StorageError::Corrupt(format!(
            "proposal {} is executed without an execution record",
            p.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_types::{BasisPoints, ProposalCategory};
    use tempfile::TempDir;

    fn spec(title: &str) -> ProposalSpec {
        ProposalSpec {
            creator_id: MemberId::new("alice").unwrap(),
            title: title.to_string(),
            body: String::new(),
            category: ProposalCategory::Protocol,
            voting_ends_at: Timestamp::new(2_000),
            quorum: BasisPoints::new(2_000).unwrap(),
            approval: BasisPoints::HALF,
            treasury_action: None,
        }
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let store = ProposalStore::in_memory();
        let now = Timestamp::new(1_000);

        let a = store.create(spec("a"), 100, 10, now).unwrap();
        let b = store.create(spec("b"), 100, 10, now).unwrap();

        assert_eq!(a.id, ProposalId::new(1));
        assert_eq!(b.id, ProposalId::new(2));
        assert_eq!(a.status, ProposalStatus::Active);
        assert_eq!(a.minimum_creator_stake, 10);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_create_rejects_low_stake() {
        let store = ProposalStore::in_memory();
        let result = store.create(spec("a"), 5, 10, Timestamp::new(1_000));
        assert!(matches!(result, Err(GovernanceError::InvalidProposal(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_missing() {
        let store = ProposalStore::in_memory();
        assert_eq!(
            store.get(ProposalId::new(9)),
            Err(GovernanceError::ProposalNotFound(ProposalId::new(9)))
        );
    }

    #[test]
    fn test_transition_compare_and_set() {
        let store = ProposalStore::in_memory();
        let p = store.create(spec("a"), 100, 0, Timestamp::new(1_000)).unwrap();

        let passed = store
            .transition(p.id, ProposalStatus::Active, ProposalStatus::Passed, Timestamp::new(2_001))
            .unwrap();
        assert_eq!(passed.status, ProposalStatus::Passed);
        assert_eq!(passed.settled_at, Some(Timestamp::new(2_001)));

        let second = store.transition(
            p.id,
            ProposalStatus::Active,
            ProposalStatus::Rejected,
            Timestamp::new(2_002),
        );
        assert_eq!(
            second,
            Err(GovernanceError::Conflict {
                id: p.id,
                expected: ProposalStatus::Active,
                actual: ProposalStatus::Passed,
            })
        );
        assert_eq!(store.get(p.id).unwrap().status, ProposalStatus::Passed);
    }

    #[test]
    fn test_transition_rejects_invalid_edges() {
        let store = ProposalStore::in_memory();
        let p = store.create(spec("a"), 100, 0, Timestamp::new(1_000)).unwrap();

        let result = store.transition(
            p.id,
            ProposalStatus::Active,
            ProposalStatus::Executed,
            Timestamp::new(2_001),
        );
        assert!(matches!(result, Err(GovernanceError::InvalidTransition { .. })));

        store
            .transition(p.id, ProposalStatus::Active, ProposalStatus::Rejected, Timestamp::new(2_001))
            .unwrap();
        let result = store.transition(
            p.id,
            ProposalStatus::Rejected,
            ProposalStatus::Active,
            Timestamp::new(2_002),
        );
        assert!(matches!(result, Err(GovernanceError::InvalidTransition { .. })));
    }

    #[test]
    fn test_executed_requires_record() {
        let store = ProposalStore::in_memory();
        let p = store.create(spec("a"), 100, 0, Timestamp::new(1_000)).unwrap();
        store
            .transition(p.id, ProposalStatus::Active, ProposalStatus::Passed, Timestamp::new(2_001))
            .unwrap();

        let result = store.transition(
            p.id,
            ProposalStatus::Passed,
            ProposalStatus::Executed,
            Timestamp::new(2_002),
        );
        assert!(matches!(result, Err(GovernanceError::NotExecutable { .. })));
    }

    #[test]
    fn test_listing() {
        let store = ProposalStore::in_memory();
        let now = Timestamp::new(1_000);
        let a = store.create(spec("a"), 100, 0, now).unwrap();
        let b = store.create(spec("b"), 100, 0, now).unwrap();
        store
            .transition(a.id, ProposalStatus::Active, ProposalStatus::Expired, Timestamp::new(2_001))
            .unwrap();

        let active: Vec<_> = store.list_active().into_iter().map(|p| p.id).collect();
        assert_eq!(active, vec![b.id]);
        assert_eq!(store.list_by_status(ProposalStatus::Expired).len(), 1);
        assert_eq!(store.list_all().len(), 2);
    }

    #[test]
    fn test_reopen_restores_state() {
        let temp_dir = TempDir::new().unwrap();
        let id;
        {
            let db = Arc::new(Database::open(temp_dir.path()).unwrap());
            let store = ProposalStore::open(db).unwrap();
            let p = store.create(spec("a"), 100, 0, Timestamp::new(1_000)).unwrap();
            store
                .transition(p.id, ProposalStatus::Active, ProposalStatus::Passed, Timestamp::new(2_001))
                .unwrap();
            id = p.id;
        }

        let db = Arc::new(Database::open(temp_dir.path()).unwrap());
        let store = ProposalStore::open(db).unwrap();
        assert_eq!(store.get(id).unwrap().status, ProposalStatus::Passed);

        let next = store.create(spec("b"), 100, 0, Timestamp::new(1_000)).unwrap();
        assert_eq!(next.id, id.next());
    }

    #[test]
    fn test_open_detects_tally_mismatch() {
        let db = Arc::new(Database::in_memory());
        let mut proposal = Proposal::from_spec(ProposalId::new(1), spec("a"), 0, Timestamp::new(1_000));
        proposal.votes_for_power = 10;
        db.put(Column::Proposals, &proposal_key(proposal.id), &proposal).unwrap();

        let result = ProposalStore::open(db);
        assert!(matches!(
            result,
            Err(GovernanceError::Storage(StorageError::Corrupt(_)))
        ));
    }
}
