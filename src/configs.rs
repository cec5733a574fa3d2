use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub issuance: IssuanceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding `<FINGERPRINT>.crt` and `<FINGERPRINT>.key` files
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Environment variable holding the passphrase that seals keys at rest
    #[serde(default = "default_key_passphrase_env")]
    pub key_passphrase_env: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            key_passphrase_env: default_key_passphrase_env(),
        }
    }
}

impl StoreConfig {
    /// The key passphrase, if the configured variable is set and non-empty.
    pub fn key_passphrase(&self) -> Option<SecretString> {
        std::env::var(&self.key_passphrase_env)
            .ok()
            .filter(|value| !value.is_empty())
            .map(SecretString::new)
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/store")
}

fn default_key_passphrase_env() -> String {
    "PKI_KEEPER_KEY_PASSPHRASE".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IssuanceConfig {
    #[serde(default = "default_authority_validity")]
    pub authority_validity_days: u32,
    #[serde(default = "default_leaf_validity")]
    pub leaf_validity_days: u32,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            authority_validity_days: default_authority_validity(),
            leaf_validity_days: default_leaf_validity(),
        }
    }
}

fn default_authority_validity() -> u32 {
    3653 // 10 years
}

fn default_leaf_validity() -> u32 {
    398 // browser limit for publicly trusted leaves
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;

        let config: AppConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration with default path (config.toml)
    pub fn load() -> Result<Self> {
        Self::from_file(DEFAULT_CONFIG_PATH)
    }
}
