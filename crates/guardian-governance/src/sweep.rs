//! Periodic finalization sweep.
//!
//! Finds Active proposals whose voting window has closed and finalizes them.
//! Failures are logged and left for the next pass.

use crate::service::{FinalizeReport, GovernanceService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    /// Proposals found due
    pub examined: usize,
    /// Reports for proposals that were finalized
    pub finalized: Vec<FinalizeReport>,
    /// Proposals that could not be finalized this pass
    pub deferred: usize,
    pub elapsed: Duration,
}

/// Drives finalization on a fixed interval.
pub struct FinalizationSweep {
    service: Arc<GovernanceService>,
    interval: Duration,
}

impl FinalizationSweep {
    pub fn new(service: Arc<GovernanceService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Finalize every due proposal once.
    pub async fn sweep_once(&self) -> SweepSummary {
        let started = std::time::Instant::now();
        let due = self.service.due_for_finalization();
        let mut summary = SweepSummary {
            examined: due.len(),
            ..Default::default()
        };

        for id in due {
            match self.service.finalize(id).await {
                Ok(report) => summary.finalized.push(report),
                Err(e) if e.is_retryable() => {
                    debug!("Deferring finalization of proposal {}: {}", id, e);
                    summary.deferred += 1;
                }
                Err(e) => {
                    warn!("Finalization of proposal {} failed: {}", id, e);
                    summary.deferred += 1;
                }
            }
        }

        summary.elapsed = started.elapsed();
        if summary.examined > 0 {
            info!(
                "Sweep finalized {} of {} due proposals in {:?}",
                summary.finalized.len(),
                summary.examined,
                summary.elapsed
            );
        }
        summary
    }

    /// Sweep every interval until `shutdown` fires or its sender is dropped.
    ///
    /// `on_pass` sees the summary of every pass.
    pub async fn run<F>(self, mut shutdown: mpsc::Receiver<()>, mut on_pass: F)
    where
        F: FnMut(&SweepSummary) + Send,
    {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.sweep_once().await;
                    on_pass(&summary);
                }
                _ = shutdown.recv() => {
                    info!("Finalization sweep stopped");
                    break;
                }
            }
        }
    }

    /// Run on a background task.
    pub fn spawn<F>(self, shutdown: mpsc::Receiver<()>, on_pass: F) -> JoinHandle<()>
    where
        F: FnMut(&SweepSummary) + Send + 'static,
    {
        tokio::spawn(self.run(shutdown, on_pass))
    }
}
