//! Guardian Node - DAO governance service.
//!
//! Ties the governance engine, storage and JSON-RPC interface together
//! into a single long-running process.

pub mod config;
pub mod metrics;
pub mod node;
pub mod telemetry;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "guardian-node")]
#[command(about = "Guardian Node - DAO governance for truth capsules")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Config file path
    #[arg(short, long, value_name = "FILE", env = "GUARDIAN_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long, env = "GUARDIAN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// RPC bind address
    #[arg(long)]
    rpc_addr: Option<SocketAddr>,

    /// Disable the JSON-RPC server
    #[arg(long)]
    no_rpc: bool,

    /// Finalization sweep interval in seconds
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Log level
    #[arg(short, long, env = "GUARDIAN_LOG")]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,

    /// Enable metrics
    #[arg(long)]
    metrics: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long, value_name = "FILE")]
    dump_config: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut config::NodeConfig) {
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(addr) = self.rpc_addr {
            config.rpc.addr = addr;
        }
        if self.no_rpc {
            config.rpc.enabled = false;
        }
        if let Some(secs) = self.sweep_interval {
            config.governance.sweep_interval_secs = secs;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.format = "json".to_string();
        }
        if self.metrics {
            config.metrics.enabled = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::NodeConfig::from_file(path)?,
        None => config::NodeConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    if let Some(path) = &args.dump_config {
        config.to_file(path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    telemetry::init_from_config(&config.logging)?;

    if config.logging.format != "json" {
        print_banner();
    }

    match &args.config {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Using default configuration"),
    }
    info!("Configuration:");
    info!("  Name: {}", config.name);
    info!("  Data dir: {:?}", config.data_dir);
    info!("  RPC enabled: {}", config.rpc.enabled);
    info!("  RPC address: {}", config.rpc.addr);
    info!("  Default quorum: {} bps", config.governance.default_quorum_bps);
    info!("  Default approval: {} bps", config.governance.default_approval_bps);
    info!("  Sweep interval: {}s", config.governance.sweep_interval_secs);
    info!("  Metrics enabled: {}", config.metrics.enabled);

    let (mut node, _shutdown) = node::GuardianNode::new(config).await?;

    if let Err(e) = node.start().await {
        error!("Failed to start node: {}", e);
        return Err(e);
    }

    if let Err(e) = node.run().await {
        error!("Node error: {}", e);
        return Err(e);
    }

    info!("Guardian node shutdown complete");
    Ok(())
}

/// Print startup banner.
fn print_banner() {
    println!();
    println!("   ____                     _ _               ____    _    ___  ");
    println!("  / ___|_   _  __ _ _ __ __| (_) __ _ _ __   |  _ \\  / \\  / _ \\ ");
    println!(" | |  _| | | |/ _` | '__/ _` | |/ _` | '_ \\  | | | |/ _ \\| | | |");
    println!(" | |_| | |_| | (_| | | | (_| | | (_| | | | | | |_| / ___ \\ |_| |");
    println!("  \\____|\\__,_|\\__,_|_|  \\__,_|_|\\__,_|_| |_| |____/_/   \\_\\___/ ");
    println!();
    println!("                    Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args() {
        let args = Args::parse_from([
            "guardian-node",
            "--rpc-addr",
            "0.0.0.0:9000",
            "--sweep-interval",
            "15",
            "--metrics",
        ]);

        assert_eq!(args.rpc_addr, Some("0.0.0.0:9000".parse().unwrap()));
        assert_eq!(args.sweep_interval, Some(15));
        assert!(args.metrics);
        assert!(!args.no_rpc);
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "guardian-node",
            "--data-dir",
            "/var/lib/guardian",
            "--no-rpc",
            "--json-logs",
            "--log-level",
            "debug",
        ]);
        let mut config = config::NodeConfig::default();
        args.apply(&mut config);

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/guardian"));
        assert!(!config.rpc.enabled);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }
}
