//! Configuration management for the replication pipeline
//!
//! This module provides a centralized configuration system that supports:
//! - YAML/TOML configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Configuration validation

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure, shared by the producer and consumer processes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FailsafeConfig {
    /// AWS region in which the database instances exist
    pub region: String,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub waiter: WaiterConfig,

    #[serde(default)]
    pub producer: ProducerConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for FailsafeConfig {
    fn default() -> Self {
        Self {
            region: "eu-west-1".to_string(),
            naming: NamingConfig::default(),
            waiter: WaiterConfig::default(),
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl FailsafeConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file specified by FAILSAFE_CONFIG env var
    /// 3. ./config/failsafe.{yaml,toml}
    /// 4. Hardcoded defaults (lowest priority)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(Self::environment())
    }

    fn load_with(environment: Environment) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Ok(config_path) = std::env::var("FAILSAFE_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(File::with_name("./config/failsafe").required(false));

        Self::finish(builder.add_source(environment))
    }

    /// Load configuration from a specific file path, on top of the defaults.
    /// Environment variables still override the file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_file_with(path, Self::environment())
    }

    fn from_file_with<P: AsRef<Path>>(
        path: P,
        environment: Environment,
    ) -> Result<Self, ConfigError> {
        let builder = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .add_source(environment);

        Self::finish(builder)
    }

    /// Example: FAILSAFE_PRODUCER__SHARE_WITH=012345678901
    fn environment() -> Environment {
        Environment::with_prefix("FAILSAFE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("producer.instances")
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config: FailsafeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("region", "eu-west-1")?
            .set_default("naming.automated_prefix", "rds:")?
            .set_default("naming.managed_prefix", "failsafe-")?
            .set_default("waiter.poll_interval_secs", 10)?
            .set_default("waiter.timeout_secs", 3600)?
            .set_default("producer.instances", Vec::<String>::new())?
            .set_default("producer.retention_days", 1)?
            .set_default("producer.renotify_on_replay", true)?
            .set_default("consumer.retention_days", 31)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.is_empty() {
            return Err(ConfigError::Message("region cannot be empty".to_string()));
        }

        if self.naming.automated_prefix.is_empty() || self.naming.managed_prefix.is_empty() {
            return Err(ConfigError::Message(
                "naming prefixes cannot be empty".to_string(),
            ));
        }

        if self.naming.automated_prefix == self.naming.managed_prefix {
            return Err(ConfigError::Message(
                "naming.automated_prefix and naming.managed_prefix must differ".to_string(),
            ));
        }

        if self.waiter.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "waiter.poll_interval_secs must be > 0".to_string(),
            ));
        }

        if self.waiter.timeout_secs < self.waiter.poll_interval_secs {
            return Err(ConfigError::Message(
                "waiter.timeout_secs must be >= waiter.poll_interval_secs".to_string(),
            ));
        }

        if self.producer.retention_days < 1 {
            return Err(ConfigError::Message(
                "producer.retention_days must be >= 1".to_string(),
            ));
        }

        if self.consumer.retention_days < 1 {
            return Err(ConfigError::Message(
                "consumer.retention_days must be >= 1".to_string(),
            ));
        }

        if let Some(account) = &self.producer.share_with {
            if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Message(format!(
                    "producer.share_with must be a 12-digit account id, got '{}'",
                    account
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Message(format!(
                "logging.level must be one of {:?}, got '{}'",
                valid_levels, self.logging.level
            )));
        }

        if self.logging.format != "json" && self.logging.format != "pretty" {
            return Err(ConfigError::Message(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

/// Snapshot naming convention
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NamingConfig {
    /// Prefix the backend gives automatic snapshots (default: "rds:")
    pub automated_prefix: String,

    /// Prefix of snapshots owned by this pipeline (default: "failsafe-")
    pub managed_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            automated_prefix: "rds:".to_string(),
            managed_prefix: "failsafe-".to_string(),
        }
    }
}

/// Completion waiter bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WaiterConfig {
    /// Seconds between status polls (default: 10)
    pub poll_interval_secs: u64,

    /// Upper bound on a single wait (default: 3600)
    pub timeout_secs: u64,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            timeout_secs: 3600,
        }
    }
}

impl WaiterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Live-account settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerConfig {
    /// Database instance identifiers to promote
    #[serde(default)]
    pub instances: Vec<String>,

    /// Account to share promoted snapshots with
    #[serde(default)]
    pub share_with: Option<String>,

    /// Topic announcing availability of a promoted snapshot
    #[serde(default)]
    pub topic_arn: Option<String>,

    /// Days a promoted snapshot is kept in the live account (default: 1)
    pub retention_days: i64,

    /// Re-publish the notice when the promoted snapshot already exists (default: true)
    pub renotify_on_replay: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
            share_with: None,
            topic_arn: None,
            retention_days: 1,
            renotify_on_replay: true,
        }
    }
}

/// Failsafe-account settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    /// Days an ingested snapshot is kept (default: 31)
    pub retention_days: i64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { retention_days: 31 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    pub level: String,

    /// Log format: json or pretty (default: "pretty")
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
