//! Treasury execution for passed proposals.
//!
//! A passed proposal carrying a treasury action triggers exactly one transfer
//! through the treasury ledger. Transient ledger failures are retried with
//! exponential backoff; the proposal id doubles as the idempotency key so a
//! retried call never moves funds twice.

use crate::clock::Clock;
use crate::error::GovernanceError;
use crate::observer::{GovernanceObserver, NoopObserver};
use crate::store::ProposalStore;
use async_trait::async_trait;
use dashmap::DashMap;
use guardian_types::{Amount, Currency, ProposalId, ProposalStatus, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Completed treasury transfer for a proposal. At most one per proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryExecutionRecord {
    pub proposal_id: ProposalId,
    /// Reference returned by the ledger (transaction hash or id)
    pub transfer_reference: String,
    pub recipient: String,
    pub amount: Amount,
    pub currency: Currency,
    pub idempotency_key: String,
    /// Ledger calls it took
    pub attempts: u32,
    pub executed_at: Timestamp,
}

/// A transfer to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub recipient: String,
    pub amount: Amount,
    pub currency: Currency,
    pub idempotency_key: String,
}

/// Ledger acknowledgement of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub reference: String,
    pub idempotency_key: String,
}

/// Treasury ledger failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("ledger timeout: {0}")]
    Timeout(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("insufficient {currency} funds: requested {requested}, available {available}")]
    InsufficientFunds {
        currency: Currency,
        requested: Amount,
        available: Amount,
    },

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(Currency),

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

impl TransferError {
    /// Timeouts and outages are retried; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Timeout(_) | TransferError::Unavailable(_))
    }
}

/// External treasury that moves funds.
///
/// Implementations must honor the idempotency key: a repeated request with
/// the same key returns the original receipt and moves nothing.
#[async_trait]
pub trait TreasuryLedger: Send + Sync {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError>;
}

/// Backoff schedule for transient ledger failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Factor applied to the delay after each retry
    pub multiplier: u32,
    /// Upper bound on a single delay
    pub max_delay: Duration,
    /// Give up once another wait would pass this much total time
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            multiplier: 2,
            max_delay: Duration::from_secs(10),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay to use after `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current
            .checked_mul(self.multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Result of an execute call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "record", rename_all = "camelCase")]
pub enum ExecutionOutcome {
    /// This call performed the transfer.
    Executed(TreasuryExecutionRecord),
    /// An earlier call already did.
    AlreadyExecuted(TreasuryExecutionRecord),
}

impl ExecutionOutcome {
    pub fn record(&self) -> &TreasuryExecutionRecord {
        match self {
            ExecutionOutcome::Executed(r) | ExecutionOutcome::AlreadyExecuted(r) => r,
        }
    }
}

/// Performs the treasury action of passed proposals, at most once each.
pub struct TreasuryExecutor {
    store: Arc<ProposalStore>,
    ledger: Arc<dyn TreasuryLedger>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    locks: DashMap<ProposalId, Arc<tokio::sync::Mutex<()>>>,
    observer: Arc<dyn GovernanceObserver>,
}

impl TreasuryExecutor {
    pub fn new(
        store: Arc<ProposalStore>,
        ledger: Arc<dyn TreasuryLedger>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            retry,
            locks: DashMap::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Report transfers and transfer failures to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn GovernanceObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Execute the treasury action of a passed proposal.
    ///
    /// Concurrent calls for the same proposal are serialized; only the first
    /// reaches the ledger and the rest observe its record.
    pub async fn execute(&self, id: ProposalId) -> Result<ExecutionOutcome, GovernanceError> {
        let lock = Arc::clone(self.locks.entry(id).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            self.execute_locked(id).await
        };
        drop(lock);
        // Only callers holding or waiting on the lock keep its entry alive.
        self.locks.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Proposals with an execution in flight or queued.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }

    async fn execute_locked(&self, id: ProposalId) -> Result<ExecutionOutcome, GovernanceError> {
        let proposal = self.store.get(id)?;

        if let Some(record) = self.store.execution(id)? {
            if proposal.status == ProposalStatus::Passed {
                match self.store.transition(
                    id,
                    ProposalStatus::Passed,
                    ProposalStatus::Executed,
                    self.clock.now(),
                ) {
                    Ok(_) | Err(GovernanceError::Conflict { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            debug!("Proposal {} already executed ({})", id, record.transfer_reference);
            return Ok(ExecutionOutcome::AlreadyExecuted(record));
        }

        if proposal.status != ProposalStatus::Passed {
            return Err(GovernanceError::NotExecutable {
                proposal_id: id,
                reason: format!("status is {}", proposal.status),
            });
        }
        let Some(action) = proposal.treasury_action else {
            return Err(GovernanceError::NotExecutable {
                proposal_id: id,
                reason: "no treasury action".into(),
            });
        };

        let request = TransferRequest {
            recipient: action.recipient,
            amount: action.amount,
            currency: action.currency,
            idempotency_key: id.idempotency_key(),
        };
        let (receipt, attempts) = match self.transfer_with_retry(id, &request).await {
            Ok(done) => done,
            Err(e) => {
                self.observer.treasury_failed(id, &e);
                return Err(e);
            }
        };

        let record = self.store.record_execution(TreasuryExecutionRecord {
            proposal_id: id,
            transfer_reference: receipt.reference,
            recipient: request.recipient,
            amount: request.amount,
            currency: request.currency,
            idempotency_key: request.idempotency_key,
            attempts,
            executed_at: self.clock.now(),
        })?;

        info!(
            "Executed treasury action of proposal {}: {} {} to {} ({}, {} attempts)",
            id, record.amount, record.currency, record.recipient, record.transfer_reference, attempts
        );
        self.observer.treasury_executed(&record);
        Ok(ExecutionOutcome::Executed(record))
    }

    async fn transfer_with_retry(
        &self,
        id: ProposalId,
        request: &TransferRequest,
    ) -> Result<(TransferReceipt, u32), GovernanceError> {
        let started = tokio::time::Instant::now();
        let mut delay = self.retry.initial_delay;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.ledger.transfer(request).await {
                Ok(receipt) => return Ok((receipt, attempts)),
                Err(e) if e.is_retryable() => {
                    if started.elapsed() + delay > self.retry.max_elapsed {
                        return Err(GovernanceError::RetriesExhausted {
                            proposal_id: id,
                            attempts,
                            last_error: e.to_string(),
                        });
                    }
                    warn!(
                        "Transfer for proposal {} failed (attempt {}): {}; retrying in {:?}",
                        id, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.retry.next_delay(delay);
                }
                Err(e) => {
                    return Err(GovernanceError::TransferFailed {
                        proposal_id: id,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: BTreeMap<Currency, Amount>,
    receipts: HashMap<String, TransferReceipt>,
    transfers: Vec<TransferRequest>,
    injected: VecDeque<TransferError>,
    persistent_failure: Option<TransferError>,
    calls: u64,
}

/// Treasury ledger held in memory.
///
/// Honors idempotency keys and supports injected failures and latency for
/// exercising retry and race handling.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    latency: Duration,
}

impl InMemoryLedger {
    pub fn new(balances: impl IntoIterator<Item = (Currency, Amount)>) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                balances: balances.into_iter().collect(),
                ..Default::default()
            }),
            latency: Duration::ZERO,
        }
    }

    /// Delay every transfer call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next calls with these errors, in order.
    pub fn inject_failures(&self, errors: impl IntoIterator<Item = TransferError>) {
        self.state.lock().injected.extend(errors);
    }

    /// Fail every call with `error` until cleared with `None`.
    pub fn set_persistent_failure(&self, error: Option<TransferError>) {
        self.state.lock().persistent_failure = error;
    }

    /// Add funds.
    pub fn deposit(&self, currency: Currency, amount: Amount) {
        let mut state = self.state.lock();
        let balance = state.balances.entry(currency).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn balance(&self, currency: Currency) -> Amount {
        self.state.lock().balances.get(&currency).copied().unwrap_or(0)
    }

    /// Transfers that actually moved funds.
    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.state.lock().transfers.clone()
    }

    /// Number of transfer calls received, including failed ones.
    pub fn calls(&self) -> u64 {
        self.state.lock().calls
    }
}

#[async_trait]
impl TreasuryLedger for InMemoryLedger {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock();
        state.calls += 1;

        if let Some(error) = state.persistent_failure.clone() {
            return Err(error);
        }
        if let Some(error) = state.injected.pop_front() {
            return Err(error);
        }
        if let Some(receipt) = state.receipts.get(&request.idempotency_key) {
            return Ok(receipt.clone());
        }

        let recipient = request.recipient.trim();
        if recipient.is_empty() || recipient.chars().any(char::is_whitespace) {
            return Err(TransferError::InvalidRecipient(request.recipient.clone()));
        }
        let Some(available) = state.balances.get(&request.currency).copied() else {
            return Err(TransferError::UnsupportedCurrency(request.currency));
        };
        if available < request.amount {
            return Err(TransferError::InsufficientFunds {
                currency: request.currency,
                requested: request.amount,
                available,
            });
        }

        state
            .balances
            .insert(request.currency, available - request.amount);
        let receipt = TransferReceipt {
            reference: format!("tx-{:08}", state.transfers.len() + 1),
            idempotency_key: request.idempotency_key.clone(),
        };
        state
            .receipts
            .insert(request.idempotency_key.clone(), receipt.clone());
        state.transfers.push(request.clone());
        Ok(receipt)
    }
}
