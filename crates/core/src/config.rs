//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Deployment config: `<deployment-dir>/ledgerline.toml`
//! 3. Environment variables: `LEDGERLINE_*`
//! 4. CLI flags (applied by the binary)
//!
//! # Example Config
//!
//! ```toml
//! network = "sepolia"
//! concurrency = 16
//!
//! [accounts]
//! deployer = "0x7a3c…"
//!
//! [registry]
//! resource = "AddressResolver"
//! profile = "expensive"
//!
//! [snapshot]
//! resource = "DebtCache"
//! threshold_bps = 100
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// File name of the per-deployment configuration.
pub const CONFIG_FILE_NAME: &str = "ledgerline.toml";

/// Upper bound for the snapshot deviation threshold (100%).
pub const MAX_THRESHOLD_BPS: u32 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Target environment name, used only for reporting and links.
    pub network: String,
    /// Cap on concurrently in-flight read probes.
    pub concurrency: usize,
    pub dry_run: bool,
    /// Ask an operator instead of queueing owner-only actions.
    pub interactive: bool,
    /// Assign nonces locally instead of letting the backend sequence writes.
    pub use_nonce_sequencer: bool,
    pub explorer_url: Option<String>,
    pub rpc: RpcConfig,
    pub accounts: AccountsConfig,
    pub gas: GasConfig,
    pub registry: RegistryConfig,
    pub snapshot: SnapshotConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AccountsConfig {
    /// Signing account for every submission.
    pub deployer: String,
    /// Owner handed to constructors via `{"account": "owner"}`; defaults to the deployer.
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GasConfig {
    pub deploy_limit: u64,
    pub method_call_limit: u64,
    /// Price ceiling in wei.
    pub max_price_wei: u64,
}

/// Execution-cost class of the target network. Rebuild batches are sized
/// per class so a single call stays under the per-call ceiling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProfile {
    #[default]
    Efficient,
    Expensive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Name of the registry resource in the deployment record.
    pub resource: String,
    pub profile: ExecutionProfile,
    pub efficient_chunk_size: usize,
    pub expensive_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Name of the snapshot resource; empty disables the snapshot phase.
    pub resource: String,
    /// Relative deviation, in basis points, that forces a refresh.
    pub threshold_bps: u32,
    pub publicly_callable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilesConfig {
    pub build_dir: PathBuf,
    pub config: PathBuf,
    pub params: PathBuf,
    pub deployment: PathBuf,
    pub steps: PathBuf,
    pub record: PathBuf,
    pub ledger: PathBuf,
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULT IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════

impl Default for Config {
    fn default() -> Self {
        Self {
            network: "local".to_string(),
            concurrency: 8,
            dry_run: false,
            interactive: false,
            use_nonce_sequencer: false,
            explorer_url: None,
            rpc: RpcConfig::default(),
            accounts: AccountsConfig::default(),
            gas: GasConfig::default(),
            registry: RegistryConfig::default(),
            snapshot: SnapshotConfig::default(),
            files: FilesConfig::default(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            deploy_limit: 8_000_000,
            method_call_limit: 500_000,
            max_price_wei: 100_000_000_000,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            resource: "AddressResolver".to_string(),
            profile: ExecutionProfile::Efficient,
            efficient_chunk_size: 20,
            expensive_chunk_size: 7,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            resource: "DebtCache".to_string(),
            threshold_bps: 100,
            publicly_callable: false,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            config: PathBuf::from("config.json"),
            params: PathBuf::from("params.json"),
            deployment: PathBuf::from("deployment.json"),
            steps: PathBuf::from("steps.json"),
            record: PathBuf::from("deployment-record.json"),
            ledger: PathBuf::from("owner-actions.json"),
        }
    }
}

impl RegistryConfig {
    /// Rebuild batch size for the configured profile.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        match self.profile {
            ExecutionProfile::Efficient => self.efficient_chunk_size,
            ExecutionProfile::Expensive => self.expensive_chunk_size,
        }
    }
}

impl FilesConfig {
    /// Resolve every relative path against `dir`.
    #[must_use]
    pub fn rooted_at(&self, dir: &Path) -> Self {
        let root = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                dir.join(p)
            }
        };
        Self {
            build_dir: root(&self.build_dir),
            config: root(&self.config),
            params: root(&self.params),
            deployment: root(&self.deployment),
            steps: root(&self.steps),
            record: root(&self.record),
            ledger: root(&self.ledger),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration for the deployment rooted at `deployment_dir`.
///
/// # Errors
///
/// Returns error if the config file is unreadable or malformed, an
/// environment override does not parse, or the merged values are invalid.
pub fn load_config(deployment_dir: &Path) -> Result<Config> {
    // 1. Start with built-in defaults
    let mut config = Config::default();

    // 2. Deployment config overrides defaults
    let path = deployment_dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        config = load_toml_file(&path)?;
        debug!(path = %path.display(), "loaded deployment config");
    }

    // 3. Environment variable overrides
    config.apply_env_with(|key| std::env::var(key).ok())?;

    // 4. Validate
    config.validate()?;

    config.files = config.files.rooted_at(deployment_dir);
    Ok(config)
}

fn load_toml_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::file_read_failed(path, e.to_string()))?;

    toml::from_str(&content).map_err(|e| Error::toml_parse_failed(path, e.to_string()))
}

impl Config {
    /// Apply `LEDGERLINE_*` overrides using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric or boolean variable fails to parse.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("LEDGERLINE_NETWORK") {
            self.network = value;
        }

        if let Some(value) = lookup("LEDGERLINE_RPC_URL") {
            self.rpc.url = value;
        }

        if let Some(value) = lookup("LEDGERLINE_DEPLOYER") {
            self.accounts.deployer = value;
        }

        if let Some(value) = lookup("LEDGERLINE_OWNER") {
            self.accounts.owner = Some(value);
        }

        if let Some(value) = lookup("LEDGERLINE_CONCURRENCY") {
            self.concurrency = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid LEDGERLINE_CONCURRENCY value: {e}"))
            })?;
        }

        if let Some(value) = lookup("LEDGERLINE_DRY_RUN") {
            self.dry_run = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid LEDGERLINE_DRY_RUN value: {e}"))
            })?;
        }

        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::invalid_config("concurrency must be at least 1"));
        }

        if self.registry.efficient_chunk_size == 0 || self.registry.expensive_chunk_size == 0 {
            return Err(Error::invalid_config("rebuild chunk sizes must be at least 1"));
        }

        if self.snapshot.threshold_bps > MAX_THRESHOLD_BPS {
            return Err(Error::invalid_config(format!(
                "snapshot threshold_bps must be at most {MAX_THRESHOLD_BPS}"
            )));
        }

        Ok(())
    }

    /// Owner account handed to constructors, falling back to the deployer.
    #[must_use]
    pub fn owner_account(&self) -> &str {
        self.accounts
            .owner
            .as_deref()
            .unwrap_or(&self.accounts.deployer)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
