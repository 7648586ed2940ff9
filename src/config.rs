//! Configuration management for the Safe cosigner
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub coordinator: CoordinatorConfig,
    /// Pins the account config instead of reading it from the chain
    #[serde(default)]
    pub account: Option<StaticAccountConfig>,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

/// Options injected into the coordinator at startup
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Multisig account whose transactions are coordinated
    pub account_address: String,
    /// Address that pays for and sends the execution transaction
    #[serde(default)]
    pub sender_identity: Option<String>,
    /// Primary JSON-RPC endpoint
    pub network_endpoint: String,
    /// Additional endpoints used for failover
    #[serde(default)]
    pub fallback_endpoints: Vec<String>,
    pub chain_id: u64,
    /// Account nonce used when a build request does not carry one
    #[serde(default)]
    pub safe_nonce: Option<u64>,
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,
    #[serde(default = "default_broadcast_timeout_ms")]
    pub broadcast_timeout_ms: u64,
    #[serde(default = "default_confirmation_blocks")]
    pub confirmation_blocks: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticAccountConfig {
    pub threshold: u64,
    pub approvers: Vec<String>,
    #[serde(default)]
    pub nonce: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
    /// Name of the environment variable holding the sender's private key
    pub private_key_env: Option<String>,
}

fn default_collaborator_timeout_ms() -> u64 {
    15_000
}

fn default_broadcast_timeout_ms() -> u64 {
    180_000
}

fn default_confirmation_blocks() -> usize {
    1
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("COSIGNER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        let coordinator = &self.coordinator;

        if coordinator.account_address.is_empty() {
            anyhow::bail!("coordinator.account_address is required (set SAFE)");
        }
        Address::from_str(&coordinator.account_address)
            .with_context(|| format!("Invalid account address: {}", coordinator.account_address))?;

        if let Some(sender) = coordinator.sender_identity.as_deref().filter(|s| !s.is_empty()) {
            Address::from_str(sender)
                .with_context(|| format!("Invalid sender identity: {}", sender))?;
        } else {
            tracing::warn!("No sender identity configured - execution will be unavailable");
        }

        if coordinator.network_endpoint.is_empty() {
            anyhow::bail!("coordinator.network_endpoint is required");
        }

        if coordinator.collaborator_timeout_ms == 0 || coordinator.broadcast_timeout_ms == 0 {
            anyhow::bail!("Collaborator timeouts must be greater than zero");
        }

        if let Some(account) = &self.account {
            if account.threshold == 0 {
                tracing::warn!("Static account threshold 0 will be treated as 1");
            }
            for approver in &account.approvers {
                Address::from_str(approver)
                    .with_context(|| format!("Invalid approver address: {}", approver))?;
            }
        }

        if self.storage.backend == StorageBackend::Postgres && self.storage.database_url.is_none()
        {
            anyhow::bail!("storage.database_url is required for the postgres backend");
        }

        Ok(())
    }

    /// All RPC endpoints, primary first
    pub fn rpc_urls(&self) -> Vec<String> {
        std::iter::once(self.coordinator.network_endpoint.clone())
            .chain(self.coordinator.fallback_endpoints.iter().cloned())
            .collect()
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex");

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
