//! RPC server implementation.
//!
//! HTTP and WebSocket JSON-RPC server using jsonrpsee.

use crate::api::{GovernanceApiServer, GovernanceRpc};
use crate::error::RpcError;
use guardian_governance::GovernanceService;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use std::net::SocketAddr;
use std::sync::Arc;

/// RPC server configuration.
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    /// Listen address (HTTP and WebSocket)
    pub addr: SocketAddr,
    /// Max request body size
    pub max_body_size: u32,
    /// Max connections
    pub max_connections: u32,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8645)),
            max_body_size: 1024 * 1024, // 1 MB
            max_connections: 100,
        }
    }
}

/// RPC server.
pub struct RpcServer {
    config: RpcServerConfig,
    service: Arc<GovernanceService>,
    handle: Option<ServerHandle>,
    local_addr: Option<SocketAddr>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, service: Arc<GovernanceService>) -> Self {
        Self {
            config,
            service,
            handle: None,
            local_addr: None,
        }
    }

    /// Bind and start serving.
    pub async fn start(&mut self) -> Result<SocketAddr, RpcError> {
        let server = ServerBuilder::new()
            .max_request_body_size(self.config.max_body_size)
            .max_connections(self.config.max_connections)
            .build(self.config.addr)
            .await
            .map_err(|e| RpcError::InternalError(format!("Failed to build RPC server: {}", e)))?;

        let local_addr = server
            .local_addr()
            .map_err(|e| RpcError::InternalError(format!("Failed to read local address: {}", e)))?;

        let module = GovernanceRpc::new(self.service.clone()).into_rpc();
        let handle = server.start(module);

        self.handle = Some(handle);
        self.local_addr = Some(local_addr);

        tracing::info!("RPC server started on {}", local_addr);
        Ok(local_addr)
    }

    /// Stop the RPC server.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.stop() {
                tracing::warn!("RPC server stop failed: {}", e);
            }
            tracing::info!("RPC server stopped");
        }
        self.local_addr = None;
    }

    /// Check if server is running.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}
