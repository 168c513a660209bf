//! Configuration management for ZeroCoin

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Sender whose statements need no signature.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Directory for the file backend, database file for sqlite.
    #[serde(default = "default_path")]
    pub path: String,
    /// Fail on ledger lines that do not parse instead of skipping them.
    #[serde(default)]
    pub strict_parsing: bool,
    #[serde(default = "default_true")]
    pub require_positive_amounts: bool,
    /// Number of blocks whose balance deltas are kept in memory. 0 disables.
    #[serde(default = "default_balance_cache_blocks")]
    pub balance_cache_blocks: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            issuer: default_issuer(),
            backend: default_backend(),
            path: default_path(),
            strict_parsing: false,
            require_positive_amounts: true,
            balance_cache_blocks: default_balance_cache_blocks(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_difficulty")]
    pub default_difficulty: usize,
    #[serde(default = "default_cancel_check_interval")]
    pub cancel_check_interval: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            default_difficulty: default_difficulty(),
            cancel_check_interval: default_cancel_check_interval(),
        }
    }
}

impl Config {
    /// In-memory ledger with default settings, mostly for tests.
    pub fn ephemeral() -> Self {
        let mut config = Config::default();
        config.ledger.backend = BackendKind::Memory;
        config
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.ledger.issuer.trim().is_empty() || self.ledger.issuer.contains(char::is_whitespace) {
            return Err(ChainError::ConfigError(
                "ledger.issuer must be a single non-empty word".to_string(),
            ));
        }
        if self.ledger.path.is_empty() && self.ledger.backend != BackendKind::Memory {
            return Err(ChainError::ConfigError("ledger.path must be set".to_string()));
        }
        if self.miner.threads == 0 {
            return Err(ChainError::ConfigError("miner.threads must be at least 1".to_string()));
        }
        if self.miner.cancel_check_interval == 0 {
            return Err(ChainError::ConfigError(
                "miner.cancel_check_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn parse_config(config_str: &str) -> Result<Config, ChainError> {
    let config: Config = toml::from_str(config_str)?;
    config.validate()?;
    Ok(config)
}

/// Loads `path`, falling back to defaults when the file is absent.
pub fn load_config(path: &Path) -> Result<Config, ChainError> {
    let config_str = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(ChainError::ConfigError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };
    parse_config(&config_str)
}

fn default_name() -> String {
    "ZeroCoin".to_string()
}

fn default_issuer() -> String {
    "ZALU".to_string()
}

fn default_backend() -> BackendKind {
    BackendKind::File
}

fn default_path() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

fn default_balance_cache_blocks() -> usize {
    256
}

fn default_threads() -> usize {
    1
}

fn default_difficulty() -> usize {
    2
}

fn default_cancel_check_interval() -> u64 {
    4096
}
