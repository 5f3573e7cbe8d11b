//! Guardian RPC - JSON-RPC interface to the governance engine.

pub mod api;
pub mod error;
pub mod server;

pub use api::{CreateProposalParams, GovernanceApiServer, GovernanceRpc, HealthStatus, TreasuryActionParams};
pub use error::{error_codes, RpcError, RpcResult};
pub use server::{RpcServer, RpcServerConfig};
