//! # Engine Configuration
//!
//! Configuration management for the settlement engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     COMPTOIR_DB_PATH=/var/lib/comptoir/comptoir.db                      │
//! │     COMPTOIR_OVERSELL_POLICY=reject                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/comptoir-pos/comptoir.toml (Linux)                        │
//! │     ~/Library/Application Support/com.comptoir.pos/comptoir.toml        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! │     XOF base, FIFO, allow backorder, 5 attempts                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # comptoir.toml
//! [database]
//! path = "comptoir.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [currency]
//! base = "XOF"
//!
//! [inventory]
//! allocation_policy = "fifo"        # fifo | fefo
//! oversell_policy = "allow_backorder"  # allow_backorder | reject
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 20
//! max_backoff_ms = 500
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use comptoir_core::validation::validate_currency_code;
use comptoir_core::{AllocationPolicy, OversellPolicy, DEFAULT_BASE_CURRENCY};
use comptoir_db::DbConfig;

use crate::error::{EngineError, EngineResult};
use crate::retry::RetryPolicy;

// =============================================================================
// Database Settings
// =============================================================================

/// Where and how to open the SQLite database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Created on first connect.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a statement waits on the writer lock before SQLITE_BUSY.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "comptoir", "pos")
        .map(|dirs| dirs.data_dir().join("comptoir.db"))
        .unwrap_or_else(|| PathBuf::from("comptoir.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Currency Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencySettings {
    /// Accounting currency every total is expressed in.
    #[serde(default = "default_base_currency")]
    pub base: String,
}

fn default_base_currency() -> String {
    DEFAULT_BASE_CURRENCY.to_string()
}

impl Default for CurrencySettings {
    fn default() -> Self {
        CurrencySettings {
            base: default_base_currency(),
        }
    }
}

// =============================================================================
// Inventory Settings
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySettings {
    #[serde(default)]
    pub allocation_policy: AllocationPolicy,

    #[serde(default)]
    pub oversell_policy: OversellPolicy,
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Whole-transaction retry on lock contention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    20
}
fn default_max_backoff() -> u64 {
    500
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub currency: CurrencySettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (comptoir.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(contents: &str) -> EngineResult<Self> {
        toml::from_str(contents).map_err(|e| EngineError::Config(e.to_string()))
    }

    fn from_file(path: &Path) -> EngineResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        validate_currency_code(&self.currency.base)
            .map_err(|e| EngineError::Config(format!("currency.base: {e}")))?;

        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::Config("retry.max_attempts must be at least 1".into()));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(EngineError::Config(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("COMPTOIR_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(code) = lookup("COMPTOIR_BASE_CURRENCY") {
            debug!(code = %code, "Overriding base currency from environment");
            self.currency.base = code.trim().to_ascii_uppercase();
        }

        if let Some(policy) = lookup("COMPTOIR_ALLOCATION_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.inventory.allocation_policy = parsed,
                Err(e) => warn!(error = %e, "Ignoring allocation policy from environment"),
            }
        }

        if let Some(policy) = lookup("COMPTOIR_OVERSELL_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.inventory.oversell_policy = parsed,
                Err(e) => warn!(error = %e, "Ignoring oversell policy from environment"),
            }
        }

        if let Some(attempts) = lookup("COMPTOIR_MAX_TX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                debug!(attempts = n, "Overriding transaction attempts from environment");
                self.retry.max_attempts = n;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "comptoir", "pos")
            .map(|dirs| dirs.config_dir().join("comptoir.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Database pool settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    /// Retry settings as a policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    pub fn base_currency(&self) -> &str {
        &self.currency.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.currency.base, "XOF");
        assert_eq!(config.inventory.allocation_policy, AllocationPolicy::Fifo);
        assert_eq!(config.inventory.oversell_policy, OversellPolicy::AllowBackorder);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [inventory]
            allocation_policy = "fefo"
            oversell_policy = "reject"
            "#,
        )
        .unwrap();

        assert_eq!(config.inventory.allocation_policy, AllocationPolicy::Fefo);
        assert_eq!(config.inventory.oversell_policy, OversellPolicy::Reject);
        assert_eq!(config.currency.base, "XOF");
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("[inventory]\nallocation_policy = \"lifo\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("COMPTOIR_DB_PATH", "/tmp/shop.db"),
            ("COMPTOIR_BASE_CURRENCY", "eur"),
            ("COMPTOIR_OVERSELL_POLICY", "reject"),
            ("COMPTOIR_ALLOCATION_POLICY", "sideways"),
            ("COMPTOIR_MAX_TX_ATTEMPTS", "9"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.currency.base, "EUR");
        assert_eq!(config.inventory.oversell_policy, OversellPolicy::Reject);
        // unparseable value is ignored
        assert_eq!(config.inventory.allocation_policy, AllocationPolicy::Fifo);
        assert_eq!(config.retry.max_attempts, 9);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.currency.base = "francs".to_string();
        assert!(config.validate().is_err());

        config.currency.base = "XOF".to_string();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        config.retry.max_attempts = 3;
        config.retry.initial_backoff_ms = 1_000;
        config.retry.max_backoff_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&EngineConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[inventory]"));
        assert!(toml_str.contains("allocation_policy = \"fifo\""));
    }
}
