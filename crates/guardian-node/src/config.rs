//! Node configuration.
//!
//! Handles loading and validation of node configuration from
//! config files and command-line arguments.

use guardian_governance::{GovernanceConfig, RetryPolicy};
use guardian_types::{BasisPoints, Currency, MemberId, MemberSnapshot};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name
    pub name: String,
    /// Data directory
    pub data_dir: PathBuf,
    /// RPC configuration
    pub rpc: RpcConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Governance parameters
    pub governance: GovernanceSection,
    /// Treasury configuration
    pub treasury: TreasuryConfig,
    /// Membership configuration
    pub membership: MembershipConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "guardian-node".to_string(),
            data_dir: PathBuf::from("./data"),
            rpc: RpcConfig::default(),
            storage: StorageConfig::default(),
            governance: GovernanceSection::default(),
            treasury: TreasuryConfig::default(),
            membership: MembershipConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from file.
    /// Path is validated to prevent directory traversal attacks.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        check_path(path)?;

        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: NodeConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Save configuration to file.
    /// Path is validated to prevent directory traversal attacks.
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        check_path(path)?;

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| anyhow::anyhow!("Failed to write config file '{}': {}", path.display(), e))?;
        Ok(())
    }

    /// Database directory; relative paths live under the data directory.
    pub fn db_path(&self) -> PathBuf {
        if self.storage.db_path.is_absolute() {
            self.storage.db_path.clone()
        } else {
            self.data_dir.join(&self.storage.db_path)
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        check_path(&self.data_dir)?;
        check_path(&self.storage.db_path)?;

        if self.rpc.enabled && self.rpc.max_connections == 0 {
            anyhow::bail!("RPC max_connections cannot be 0");
        }

        self.governance_config()?;

        if self.governance.sweep_interval_secs == 0 {
            anyhow::bail!("Sweep interval cannot be 0");
        }

        let retry = &self.treasury.retry;
        if retry.initial_delay_ms == 0 {
            anyhow::bail!("Treasury retry initial delay cannot be 0");
        }
        if retry.multiplier == 0 {
            anyhow::bail!("Treasury retry multiplier cannot be 0");
        }
        if retry.max_delay_ms < retry.initial_delay_ms {
            anyhow::bail!("Treasury retry max delay is below the initial delay");
        }

        self.membership_snapshots()?;

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => anyhow::bail!("Unknown log format '{}' (expected json or pretty)", other),
        }

        Ok(())
    }

    /// Governance parameters for the service.
    pub fn governance_config(&self) -> anyhow::Result<GovernanceConfig> {
        let g = &self.governance;
        if g.default_voting_period_secs == 0 {
            anyhow::bail!("Default voting period cannot be 0");
        }
        if g.default_voting_period_secs > g.max_voting_period_secs {
            anyhow::bail!("Default voting period exceeds the maximum voting period");
        }
        Ok(GovernanceConfig {
            default_quorum: BasisPoints::new(g.default_quorum_bps)
                .map_err(|e| anyhow::anyhow!("governance.default_quorum_bps: {}", e))?,
            default_approval: BasisPoints::new(g.default_approval_bps)
                .map_err(|e| anyhow::anyhow!("governance.default_approval_bps: {}", e))?,
            min_creator_stake: u128::from(g.min_creator_stake),
            default_voting_period_secs: g.default_voting_period_secs,
            max_voting_period_secs: g.max_voting_period_secs,
            retry: self.treasury.retry.policy(),
        })
    }

    /// Members configured for the built-in membership service.
    pub fn membership_snapshots(&self) -> anyhow::Result<Vec<MemberSnapshot>> {
        self.membership
            .members
            .iter()
            .map(|m| {
                let id = MemberId::new(m.id.clone())
                    .map_err(|e| anyhow::anyhow!("membership.members: {}", e))?;
                Ok(MemberSnapshot::new(id, u128::from(m.staked_tokens), m.reputation))
            })
            .collect()
    }

    /// Opening balances of the built-in treasury ledger.
    pub fn treasury_balances(&self) -> Vec<(Currency, u128)> {
        self.treasury
            .balances
            .iter()
            .map(|b| (b.currency, u128::from(b.amount)))
            .collect()
    }
}

fn check_path(path: &Path) -> anyhow::Result<()> {
    if path.to_string_lossy().contains("..") {
        anyhow::bail!("Invalid path: directory traversal detected");
    }
    Ok(())
}

/// RPC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Enable JSON-RPC
    pub enabled: bool,
    /// Listen address
    pub addr: SocketAddr,
    /// Maximum request body size (KB)
    pub max_body_size_kb: u32,
    /// Maximum concurrent connections
    pub max_connections: u32,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: SocketAddr::from(([127, 0, 0, 1], 8645)),
            max_body_size_kb: 1024,
            max_connections: 100,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database directory
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("db"),
        }
    }
}

/// Governance parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceSection {
    /// Default quorum (basis points of eligible power)
    pub default_quorum_bps: u32,
    /// Default approval threshold (basis points of cast power)
    pub default_approval_bps: u32,
    /// Stake required to open a proposal
    pub min_creator_stake: u64,
    /// Voting window when a proposal does not set one
    pub default_voting_period_secs: u64,
    /// Longest voting window accepted
    pub max_voting_period_secs: u64,
    /// Finalization sweep interval
    pub sweep_interval_secs: u64,
}

impl Default for GovernanceSection {
    fn default() -> Self {
        Self {
            default_quorum_bps: 2_000,   // 20%
            default_approval_bps: 5_000, // 50%
            min_creator_stake: 100,
            default_voting_period_secs: 7 * 24 * 3600,
            max_voting_period_secs: 30 * 24 * 3600,
            sweep_interval_secs: 60,
        }
    }
}

/// Treasury retry schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub multiplier: u32,
    pub max_delay_ms: u64,
    pub max_elapsed_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            max_elapsed_ms: policy.max_elapsed.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_elapsed: Duration::from_millis(self.max_elapsed_ms),
        }
    }
}

/// Opening balance of the built-in treasury ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    pub currency: Currency,
    pub amount: u64,
}

/// Treasury configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreasuryConfig {
    /// Retry schedule for transient ledger failures
    pub retry: RetryConfig,
    /// Opening balances (development ledger)
    pub balances: Vec<BalanceConfig>,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            balances: vec![BalanceConfig {
                currency: Currency::Gtt,
                amount: 1_000_000,
            }],
        }
    }
}

/// A member of the built-in membership service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberConfig {
    pub id: String,
    pub staked_tokens: u64,
    #[serde(default)]
    pub reputation: i32,
}

/// Membership configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// Members (development membership service)
    pub members: Vec<MemberConfig>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics
    pub enabled: bool,
    /// Metrics server address
    pub addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: SocketAddr::from(([127, 0, 0, 1], 9190)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log to file
    pub log_file: Option<PathBuf>,
    /// Log format (json|pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
            format: "pretty".to_string(),
        }
    }
}
