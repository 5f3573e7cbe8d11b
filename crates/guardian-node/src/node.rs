//! Governance node.
//!
//! Owns the storage, the governance service and its collaborators, and the
//! long-running tasks around them: the JSON-RPC server, the finalization
//! sweep, and the metrics endpoint.

use guardian_governance::{
    FinalizationSweep, GovernanceService, InMemoryLedger, ProposalStore, StaticMembership,
    SweepSummary, SystemClock,
};
use guardian_rpc::{RpcServer, RpcServerConfig};
use guardian_storage::Database;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::config::NodeConfig;
use crate::metrics::{Metrics, MetricsServer};

/// Node state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Initializing
    Initializing,
    /// Running normally
    Running,
    /// Shutting down
    ShuttingDown,
    /// Stopped
    Stopped,
}

impl NodeState {
    /// Check if node is active.
    pub fn is_active(&self) -> bool {
        matches!(self, NodeState::Running)
    }
}

/// The Guardian governance node.
pub struct GuardianNode {
    /// Node configuration
    pub config: NodeConfig,
    /// Current state
    pub node_state: Arc<RwLock<NodeState>>,
    /// Governance engine
    pub service: Arc<GovernanceService>,
    /// Prometheus metrics, when enabled
    pub metrics: Option<Arc<Metrics>>,
    rpc_server: Option<RpcServer>,
    sweep_stop: Option<mpsc::Sender<()>>,
    sweep_task: Option<JoinHandle<()>>,
    metrics_task: Option<JoinHandle<()>>,
    shutdown: mpsc::Receiver<()>,
}

impl GuardianNode {
    /// Create a new node.
    pub async fn new(config: NodeConfig) -> anyhow::Result<(Self, mpsc::Sender<()>)> {
        info!("Initializing Guardian node: {}", config.name);

        let db_path = config.db_path();
        let db = Arc::new(Database::open(&db_path)?);
        let store = Arc::new(ProposalStore::open(db)?);
        info!(
            "Loaded {} proposals from {}",
            store.len(),
            db_path.display()
        );

        let members = config.membership_snapshots()?;
        if members.is_empty() {
            warn!("No members configured; proposals cannot gather votes");
        }
        let membership = Arc::new(StaticMembership::new(members));
        let treasury = Arc::new(InMemoryLedger::new(config.treasury_balances()));

        let metrics = if config.metrics.enabled {
            Some(Metrics::new()?)
        } else {
            None
        };

        let mut service = GovernanceService::new(
            config.governance_config()?,
            store,
            membership,
            treasury,
            Arc::new(SystemClock),
        );
        if let Some(metrics) = &metrics {
            service = service.with_observer(metrics.clone());
        }
        let service = Arc::new(service);

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let node = Self {
            config,
            node_state: Arc::new(RwLock::new(NodeState::Initializing)),
            service,
            metrics,
            rpc_server: None,
            sweep_stop: None,
            sweep_task: None,
            metrics_task: None,
            shutdown: shutdown_rx,
        };

        Ok((node, shutdown_tx))
    }

    /// Start the node.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        info!("Starting Guardian node");

        if self.config.rpc.enabled {
            self.start_rpc().await?;
        }

        self.start_sweep();

        if let Some(metrics) = &self.metrics {
            metrics.record_proposals(&self.service.list_proposals(None));
            let server = MetricsServer::new(self.config.metrics.addr, metrics.clone());
            self.metrics_task = Some(tokio::spawn(async move {
                if let Err(e) = server.start().await {
                    error!("Metrics server error: {}", e);
                }
            }));
        }

        *self.node_state.write().await = NodeState::Running;
        info!("Guardian node started successfully");

        Ok(())
    }

    /// Start the RPC server.
    async fn start_rpc(&mut self) -> anyhow::Result<()> {
        let rpc_config = RpcServerConfig {
            addr: self.config.rpc.addr,
            max_body_size: self.config.rpc.max_body_size_kb.saturating_mul(1024),
            max_connections: self.config.rpc.max_connections,
        };

        let mut rpc_server = RpcServer::new(rpc_config, self.service.clone());
        rpc_server
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("RPC server failed to start: {}", e))?;

        self.rpc_server = Some(rpc_server);
        Ok(())
    }

    /// Spawn the periodic finalization sweep.
    fn start_sweep(&mut self) {
        let interval = Duration::from_secs(self.config.governance.sweep_interval_secs);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let metrics = self.metrics.clone();
        let service = self.service.clone();
        let on_pass = move |summary: &SweepSummary| {
            if !summary.finalized.is_empty() || summary.deferred > 0 {
                info!(
                    "Sweep finalized {} of {} due proposals ({} deferred) in {:?}",
                    summary.finalized.len(),
                    summary.examined,
                    summary.deferred,
                    summary.elapsed
                );
            }
            if let Some(metrics) = &metrics {
                metrics.record_sweep(summary);
                metrics.record_proposals(&service.list_proposals(None));
            }
        };

        let sweep = FinalizationSweep::new(self.service.clone(), interval);
        self.sweep_task = Some(sweep.spawn(stop_rx, on_pass));
        self.sweep_stop = Some(stop_tx);
        info!("Finalization sweep running every {:?}", interval);
    }

    /// Run the node (main loop).
    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!("Node is running. Press Ctrl+C to shutdown.");

        tokio::select! {
            _ = self.shutdown.recv() => {
                info!("Shutdown signal received");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Graceful shutdown.
    pub async fn shutdown(&mut self) {
        info!("Shutting down Guardian node...");
        *self.node_state.write().await = NodeState::ShuttingDown;

        if let Some(mut rpc) = self.rpc_server.take() {
            info!("Stopping RPC server...");
            rpc.stop();
        }

        if let Some(stop) = self.sweep_stop.take() {
            let _ = stop.send(()).await;
        }
        if let Some(task) = self.sweep_task.take() {
            if let Err(e) = task.await {
                warn!("Sweep task ended abnormally: {}", e);
            }
        }

        if let Some(task) = self.metrics_task.take() {
            task.abort();
        }

        *self.node_state.write().await = NodeState::Stopped;
        info!("Guardian node stopped");
    }

    /// Bound RPC address while running.
    pub fn rpc_addr(&self) -> Option<std::net::SocketAddr> {
        self.rpc_server.as_ref().and_then(|s| s.local_addr())
    }

    /// Get node state.
    pub async fn state(&self) -> NodeState {
        *self.node_state.read().await
    }

    /// Check if node is healthy.
    pub async fn is_healthy(&self) -> bool {
        self.state().await.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemberConfig;
    use guardian_governance::CreateProposal;
    use guardian_types::{MemberId, ProposalCategory, Timestamp};
    use std::net::SocketAddr;

    fn test_config(data_dir: &std::path::Path) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.data_dir = data_dir.to_path_buf();
        config.rpc.addr = SocketAddr::from(([127, 0, 0, 1], 0));
        config.membership.members = vec![MemberConfig {
            id: "alice".to_string(),
            staked_tokens: 1_000,
            reputation: 50,
        }];
        config
    }

    #[tokio::test]
    async fn test_node_creation() {
        let dir = tempfile::tempdir().unwrap();
        let (node, _shutdown) = GuardianNode::new(test_config(dir.path())).await.unwrap();

        assert_eq!(node.state().await, NodeState::Initializing);
        assert!(node.metrics.is_none());
        assert!(node.service.list_active().is_empty());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (mut node, _shutdown) = GuardianNode::new(test_config(dir.path())).await.unwrap();

        node.start().await.unwrap();
        assert!(node.is_healthy().await);
        assert!(node.rpc_addr().is_some());

        node.shutdown().await;
        assert_eq!(node.state().await, NodeState::Stopped);
        assert!(node.rpc_addr().is_none());
        assert!(!node.is_healthy().await);
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.rpc.enabled = false;
        let (mut node, shutdown) = GuardianNode::new(config).await.unwrap();

        node.start().await.unwrap();
        shutdown.send(()).await.unwrap();
        node.run().await.unwrap();

        assert_eq!(node.state().await, NodeState::Stopped);
    }

    #[tokio::test]
    async fn test_proposals_survive_restart() {
        let dir = tempfile::tempdir().unwrap();

        let id = {
            let (node, _shutdown) = GuardianNode::new(test_config(dir.path())).await.unwrap();
            let proposal = node
                .service
                .create_proposal(CreateProposal {
                    creator_id: MemberId::new("alice").unwrap(),
                    title: "Fund archive mirror".to_string(),
                    body: String::new(),
                    category: ProposalCategory::default(),
                    voting_ends_at: None,
                    quorum: None,
                    approval: None,
                    treasury_action: None,
                })
                .await
                .unwrap();
            proposal.id
        };

        let (node, _shutdown) = GuardianNode::new(test_config(dir.path())).await.unwrap();
        let proposal = node.service.get_proposal(id).unwrap();
        assert_eq!(proposal.title, "Fund archive mirror");
    }

    #[tokio::test]
    async fn test_metrics_count_direct_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.metrics.enabled = true;
        let (node, _shutdown) = GuardianNode::new(config).await.unwrap();

        let proposal = node
            .service
            .create_proposal(CreateProposal {
                creator_id: MemberId::new("alice").unwrap(),
                title: "Short vote".to_string(),
                body: String::new(),
                category: ProposalCategory::default(),
                voting_ends_at: Some(Timestamp::now().plus_secs(1)),
                quorum: None,
                approval: None,
                treasury_action: None,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        node.service.finalize(proposal.id).await.unwrap();

        let metrics = node.metrics.as_ref().unwrap();
        assert_eq!(
            metrics.finalizations.with_label_values(&["expired"]).get(),
            1.0
        );
    }

    #[test]
    fn test_node_state_is_active() {
        assert!(NodeState::Running.is_active());
        assert!(!NodeState::ShuttingDown.is_active());
        assert!(!NodeState::Stopped.is_active());
        assert!(!NodeState::Initializing.is_active());
    }
}
