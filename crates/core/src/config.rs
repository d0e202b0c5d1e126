//! Layered configuration for the airdrop workflow.
//!
//! Precedence, lowest to highest: built-in defaults, a TOML file, `SUIADROP_*`
//! environment variables, then command-line flags applied by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::distribution::PublishResult;
use crate::ledger::{ObjectId, SUI_COIN_TYPE};

/// Sui caps a single pure argument at 16 KiB.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 16 * 1024;
/// Largest address batch that stays under `DEFAULT_MAX_BATCH_BYTES`.
pub const DEFAULT_MAX_BATCH_ENTRIES: usize = 511;
pub const DEFAULT_MAX_WHITELIST: usize = 600;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("missing configuration value `{0}`")]
    Missing(&'static str),
}

// =============================================================================
// Sections
// =============================================================================

/// How to reach the network.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Sui JSON-RPC endpoint used for reads.
    pub rpc_url: String,
    /// Faucet endpoint; `None` skips bootstrap funding.
    pub faucet_url: Option<String>,
    /// `sui` binary used for signed writes.
    pub sui_bin: PathBuf,
    pub gas_budget: u64,
    pub http_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://fullnode.devnet.sui.io:443".to_string(),
            faucet_url: None,
            sui_bin: PathBuf::from("sui"),
            gas_budget: 500_000_000,
            http_timeout_secs: 30,
        }
    }
}

impl NetworkConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Abort codes raised by the airdrop module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AbortCodes {
    pub unauthorized: u64,
    pub not_whitelisted: u64,
    pub already_claimed: u64,
}

impl Default for AbortCodes {
    fn default() -> Self {
        Self {
            unauthorized: 0,
            not_whitelisted: 1,
            already_claimed: 2,
        }
    }
}

/// Shape of the deployed Move package.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    pub module: String,
    /// Struct name of the shared distribution-state object.
    pub state_struct: String,
    pub abort_codes: AbortCodes,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            module: "suiadrop".to_string(),
            state_struct: "Global".to_string(),
            abort_codes: AbortCodes::default(),
        }
    }
}

/// Batch and whitelist bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    pub max_batch_entries: usize,
    pub max_batch_bytes: usize,
    /// Entries kept from the input file before the operator is appended.
    pub max_whitelist: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_batch_entries: DEFAULT_MAX_BATCH_ENTRIES,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_whitelist: DEFAULT_MAX_WHITELIST,
        }
    }
}

/// The reward pool. `amount` has no default: decimal scaling and the
/// per-recipient share depend on the token being distributed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub coin_type: String,
    pub amount: Option<u64>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            coin_type: SUI_COIN_TYPE.to_string(),
            amount: None,
        }
    }
}

/// Identifiers of an existing deployment, to resume without publishing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub package_id: Option<ObjectId>,
    pub global_id: Option<ObjectId>,
}

impl DeploymentConfig {
    /// Both ids, or neither.
    pub fn publish_result(&self) -> Result<Option<PublishResult>, ConfigError> {
        match (self.package_id, self.global_id) {
            (Some(package_id), Some(global_id)) => Ok(Some(PublishResult {
                package_id,
                global_id,
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::Invalid(
                "deployment.package_id and deployment.global_id must be set together".to_string(),
            )),
        }
    }
}

// =============================================================================
// AirdropConfig
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AirdropConfig {
    pub network: NetworkConfig,
    pub contract: ContractConfig,
    pub limits: BatchLimits,
    pub reward: RewardConfig,
    pub deployment: DeploymentConfig,
}

impl AirdropConfig {
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Overlay `SUIADROP_*` environment variables. Unparseable values are
    /// logged and ignored.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = non_empty("SUIADROP_RPC_URL") {
            self.network.rpc_url = url;
        }
        if let Some(url) = non_empty("SUIADROP_FAUCET_URL") {
            self.network.faucet_url = Some(url);
        }
        if let Some(bin) = non_empty("SUIADROP_SUI_BIN") {
            self.network.sui_bin = PathBuf::from(bin);
        }
        if let Some(coin_type) = non_empty("SUIADROP_COIN_TYPE") {
            self.reward.coin_type = coin_type;
        }
        if let Some(v) = parsed(&non_empty, "SUIADROP_GAS_BUDGET") {
            self.network.gas_budget = v;
        }
        if let Some(v) = parsed(&non_empty, "SUIADROP_REWARD_AMOUNT") {
            self.reward.amount = Some(v);
        }
        if let Some(v) = parsed(&non_empty, "SUIADROP_MAX_BATCH_ENTRIES") {
            self.limits.max_batch_entries = v;
        }
        if let Some(v) = parsed(&non_empty, "SUIADROP_MAX_BATCH_BYTES") {
            self.limits.max_batch_bytes = v;
        }
        if let Some(v) = parsed(&non_empty, "SUIADROP_MAX_WHITELIST") {
            self.limits.max_whitelist = v;
        }
        if let Some(v) = parsed(&non_empty, "SUIADROP_PACKAGE_ID") {
            self.deployment.package_id = Some(v);
        }
        if let Some(v) = parsed(&non_empty, "SUIADROP_GLOBAL_ID") {
            self.deployment.global_id = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_batch_entries == 0 {
            return Err(ConfigError::Invalid("limits.max_batch_entries must be > 0".to_string()));
        }
        if self.limits.max_batch_bytes == 0 {
            return Err(ConfigError::Invalid("limits.max_batch_bytes must be > 0".to_string()));
        }
        if self.contract.module.is_empty() || self.contract.state_struct.is_empty() {
            return Err(ConfigError::Invalid(
                "contract.module and contract.state_struct must be non-empty".to_string(),
            ));
        }
        if self.reward.coin_type.is_empty() {
            return Err(ConfigError::Invalid("reward.coin_type must be non-empty".to_string()));
        }
        if self.reward.amount == Some(0) {
            return Err(ConfigError::Invalid("reward.amount must be > 0".to_string()));
        }
        self.deployment.publish_result()?;
        Ok(())
    }

    pub fn reward_amount(&self) -> Result<u64, ConfigError> {
        self.reward.amount.ok_or(ConfigError::Missing("reward.amount"))
    }
}

fn parsed<T: std::str::FromStr>(
    non_empty: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = non_empty(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring unparseable environment value");
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = AirdropConfig::default();
        assert_eq!(config.limits.max_batch_entries, 511);
        assert_eq!(config.limits.max_batch_bytes, 16 * 1024);
        assert_eq!(config.limits.max_whitelist, 600);
        assert_eq!(config.reward.coin_type, SUI_COIN_TYPE);
        assert!(config.reward.amount.is_none());
        assert!(config.network.faucet_url.is_none());
        assert_eq!(config.contract.module, "suiadrop");
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.reward_amount(),
            Err(ConfigError::Missing("reward.amount"))
        ));
    }

    #[test]
    fn test_config_env_overlay() {
        let mut config = AirdropConfig::default();
        config.apply_vars(vars(&[
            ("SUIADROP_RPC_URL", "http://127.0.0.1:9000"),
            ("SUIADROP_REWARD_AMOUNT", "1000000001"),
            ("SUIADROP_MAX_BATCH_ENTRIES", "100"),
            ("SUIADROP_FAUCET_URL", "  "),
            ("SUIADROP_GAS_BUDGET", "not-a-number"),
        ]));
        assert_eq!(config.network.rpc_url, "http://127.0.0.1:9000");
        assert_eq!(config.reward.amount, Some(1_000_000_001));
        assert_eq!(config.limits.max_batch_entries, 100);
        assert!(config.network.faucet_url.is_none());
        assert_eq!(config.network.gas_budget, NetworkConfig::default().gas_budget);
    }

    #[test]
    fn test_config_from_toml() {
        let raw = r#"
            [network]
            rpc_url = "http://localhost:9000"
            faucet_url = "http://localhost:9123/gas"

            [limits]
            max_whitelist = 10

            [reward]
            amount = 42

            [contract.abort_codes]
            already_claimed = 7
        "#;
        let config = AirdropConfig::from_toml_str(raw, Path::new("test.toml")).unwrap();
        assert_eq!(config.network.faucet_url.as_deref(), Some("http://localhost:9123/gas"));
        assert_eq!(config.limits.max_whitelist, 10);
        assert_eq!(config.limits.max_batch_entries, 511);
        assert_eq!(config.reward_amount().unwrap(), 42);
        assert_eq!(config.contract.abort_codes.already_claimed, 7);
        assert_eq!(config.contract.abort_codes.not_whitelisted, 1);
    }

    #[test]
    fn test_config_half_deployment_rejected() {
        let mut config = AirdropConfig::default();
        config.deployment.package_id = Some("0x1".parse().unwrap());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.deployment.global_id = Some("0x2".parse().unwrap());
        let resumed = config.deployment.publish_result().unwrap().unwrap();
        assert_eq!(resumed.global_id, "0x2".parse::<ObjectId>().unwrap());
    }

    #[test]
    fn test_config_zero_limits_rejected() {
        let mut config = AirdropConfig::default();
        config.limits.max_batch_bytes = 0;
        assert!(config.validate().is_err());
    }
}
