//! Metrics collection and reporting.
//!
//! Uses Prometheus for metrics collection and exposition.

use guardian_governance::{
    GovernanceError, GovernanceObserver, Proposal, SweepSummary, TreasuryExecutionRecord,
};
use guardian_types::{ProposalId, ProposalStatus};
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Metrics collector.
pub struct Metrics {
    registry: Registry,
    /// Proposals by status
    pub proposals: GaugeVec,
    /// Votes cast across all proposals
    pub votes_cast: Gauge,
    /// Finalizations by outcome
    pub finalizations: CounterVec,
    /// Treasury transfers performed
    pub executions: Counter,
    /// Treasury executions that failed during finalization
    pub execution_failures: Counter,
    /// Ledger attempts per successful transfer
    pub transfer_attempts: Histogram,
    /// Due proposals left for a later sweep
    pub sweep_deferred: Counter,
    /// Sweep pass duration
    pub sweep_duration: Histogram,
}

impl Metrics {
    /// Create new metrics collector.
    pub fn new() -> anyhow::Result<Arc<Self>> {
        let registry = Registry::new();

        let proposals = GaugeVec::new(
            Opts::new("guardian_proposals", "Number of proposals by status"),
            &["status"],
        )?;
        registry.register(Box::new(proposals.clone()))?;

        let votes_cast = Gauge::new("guardian_votes_cast", "Votes cast across all proposals")?;
        registry.register(Box::new(votes_cast.clone()))?;

        let finalizations = CounterVec::new(
            Opts::new(
                "guardian_finalizations_total",
                "Proposals finalized, by resulting status",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(finalizations.clone()))?;

        let executions = Counter::new(
            "guardian_treasury_executions_total",
            "Treasury transfers performed",
        )?;
        registry.register(Box::new(executions.clone()))?;

        let execution_failures = Counter::new(
            "guardian_treasury_execution_failures_total",
            "Treasury executions that failed during finalization",
        )?;
        registry.register(Box::new(execution_failures.clone()))?;

        let transfer_attempts = Histogram::with_opts(
            HistogramOpts::new(
                "guardian_treasury_transfer_attempts",
                "Ledger attempts needed per transfer",
            )
            .buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0]),
        )?;
        registry.register(Box::new(transfer_attempts.clone()))?;

        let sweep_deferred = Counter::new(
            "guardian_sweep_deferred_total",
            "Due proposals left for a later sweep",
        )?;
        registry.register(Box::new(sweep_deferred.clone()))?;

        let sweep_duration = Histogram::with_opts(
            HistogramOpts::new("guardian_sweep_duration_seconds", "Sweep pass duration")
                .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(sweep_duration.clone()))?;

        Ok(Arc::new(Self {
            registry,
            proposals,
            votes_cast,
            finalizations,
            executions,
            execution_failures,
            transfer_attempts,
            sweep_deferred,
            sweep_duration,
        }))
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Set the per-status proposal gauges and the vote count.
    pub fn record_proposals(&self, proposals: &[Proposal]) {
        let votes: u64 = proposals.iter().map(|p| p.unique_voter_count).sum();
        self.votes_cast.set(votes as f64);

        for status in ProposalStatus::ALL {
            let count = proposals.iter().filter(|p| p.status == status).count();
            self.proposals
                .with_label_values(&[status.as_str()])
                .set(count as f64);
        }
    }

    /// Record one sweep pass.
    ///
    /// Finalizations and executions are counted through the observer hooks,
    /// not here.
    pub fn record_sweep(&self, summary: &SweepSummary) {
        self.sweep_duration.observe(summary.elapsed.as_secs_f64());
        self.sweep_deferred.inc_by(summary.deferred as f64);
    }
}

impl GovernanceObserver for Metrics {
    fn proposal_settled(&self, _id: ProposalId, status: ProposalStatus) {
        self.finalizations.with_label_values(&[status.as_str()]).inc();
    }

    fn treasury_executed(&self, record: &TreasuryExecutionRecord) {
        self.executions.inc();
        self.transfer_attempts.observe(f64::from(record.attempts));
    }

    fn treasury_failed(&self, _id: ProposalId, _error: &GovernanceError) {
        self.execution_failures.inc();
    }
}

/// Serves `/metrics` over HTTP.
pub struct MetricsServer {
    addr: SocketAddr,
    metrics: Arc<Metrics>,
}

impl MetricsServer {
    pub fn new(addr: SocketAddr, metrics: Arc<Metrics>) -> Self {
        Self { addr, metrics }
    }

    /// Serve until the task is dropped or aborted.
    pub async fn start(&self) -> anyhow::Result<()> {
        let metrics = self.metrics.clone();

        let app = axum::Router::new().route(
            "/metrics",
            axum::routing::get(move || {
                let metrics = metrics.clone();
                async move {
                    match metrics.export() {
                        Ok(output) => (axum::http::StatusCode::OK, output),
                        Err(e) => (
                            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                            format!("metrics export failed: {}", e),
                        ),
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("Metrics server listening on {}", listener.local_addr()?);
        axum::serve(listener, app).await?;

        Ok(())
    }
}
