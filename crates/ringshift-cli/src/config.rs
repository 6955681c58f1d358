//! Configuration system for the ringshift CLI.

use ringshift_core::{DEFAULT_CHUNK_PORT, RetryPolicy};
use ringshift_discovery::{DEFAULT_LISTING_PORT, DEFAULT_RING_PORT};
use ringshift_files::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// ringshift configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node configuration
    #[serde(default)]
    pub node: NodeConfig,
    /// Transfer configuration
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Directory holding the whole files this node stores
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Staging directory for chunk artifacts
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bound on listing and chunk requests, in seconds
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Bound on each ring RPC, in seconds
    #[serde(default = "default_ring_peer_timeout_secs")]
    pub ring_peer_timeout_secs: u64,
    /// Ring RPC port
    #[serde(default = "default_ring_port")]
    pub ring_port: u16,
    /// File listing port
    #[serde(default = "default_listing_port")]
    pub listing_port: u16,
    /// Chunk transfer port
    #[serde(default = "default_chunk_port")]
    pub chunk_port: u16,
    /// Pause between joining and migrating, in seconds
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
}

/// Retry configuration for ring RPCs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Randomize backoffs
    #[serde(default = "default_true")]
    pub jitter: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// Default values

fn default_storage_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_ring_peer_timeout_secs() -> u64 {
    5
}

fn default_ring_port() -> u16 {
    DEFAULT_RING_PORT
}

fn default_listing_port() -> u16 {
    DEFAULT_LISTING_PORT
}

fn default_chunk_port() -> u16 {
    DEFAULT_CHUNK_PORT
}

fn default_settle_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_secs: default_rpc_timeout_secs(),
            ring_peer_timeout_secs: default_ring_peer_timeout_secs(),
            ring_port: default_ring_port(),
            listing_port: default_listing_port(),
            chunk_port: default_chunk_port(),
            settle_secs: default_settle_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("ringshift/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.network.rpc_timeout_secs == 0 || self.network.ring_peer_timeout_secs == 0 {
            anyhow::bail!("Timeouts must be at least one second");
        }

        if self.retry.max_retries > 0 && self.retry.initial_backoff_ms > self.retry.max_backoff_ms
        {
            anyhow::bail!("initial_backoff_ms must not exceed max_backoff_ms");
        }

        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!(
                "Chunk size must be between 1 byte and {} bytes",
                MAX_CHUNK_SIZE
            );
        }

        self.to_node_config().validate()?;
        Ok(())
    }

    /// Node configuration handed to the library crates
    #[must_use]
    pub fn to_node_config(&self) -> ringshift_core::NodeConfig {
        ringshift_core::NodeConfig {
            storage_dir: self.node.storage_dir.clone(),
            transfer: ringshift_core::TransferConfig {
                work_dir: self.transfer.work_dir.clone(),
                chunk_size: self.transfer.chunk_size,
            },
            network: ringshift_core::NetworkConfig {
                rpc_timeout: Duration::from_secs(self.network.rpc_timeout_secs),
                ring_peer_timeout: Duration::from_secs(self.network.ring_peer_timeout_secs),
                ring_port: self.network.ring_port,
                listing_port: self.network.listing_port,
                chunk_port: self.network.chunk_port,
            },
        }
    }

    /// Retry policy for ring RPCs
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            jitter: self.retry.jitter,
            ..RetryPolicy::default()
        }
    }

    /// Pause between a join and the migration that follows it
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.network.settle_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.node.storage_dir, PathBuf::from("files"));
        assert_eq!(config.transfer.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.network.ring_port, 5057);
        assert_eq!(config.network.chunk_port, 5058);
        assert_eq!(config.network.listing_port, 5059);
        assert_eq!(config.network.settle_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.transfer.chunk_size = 0;
        assert!(config.validate().is_err());

        config.transfer.chunk_size = 4096;
        config.network.ring_peer_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.network.ring_peer_timeout_secs = 5;
        config.node.storage_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [node]
            storage_dir = "/srv/ring/files"

            [network]
            ring_peer_timeout_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.node.storage_dir, PathBuf::from("/srv/ring/files"));
        assert_eq!(config.network.ring_peer_timeout_secs, 2);
        assert_eq!(config.network.rpc_timeout_secs, 30);
        assert_eq!(config.transfer.work_dir, PathBuf::from("work"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_to_node_config() {
        let mut config = Config::default();
        config.network.ring_peer_timeout_secs = 7;
        config.transfer.chunk_size = 1000;

        let node = config.to_node_config();
        assert_eq!(node.network.ring_peer_timeout, Duration::from_secs(7));
        assert_eq!(node.network.rpc_timeout, Duration::from_secs(30));
        assert_eq!(node.transfer.chunk_size, 1000);
        assert_eq!(node.storage_dir, config.node.storage_dir);
    }

    #[test]
    fn test_retry_policy_conversion() {
        let mut config = Config::default();
        config.retry.max_retries = 0;
        config.retry.jitter = false;

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 0);
        assert!(!policy.jitter);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.network.listing_port = 6000;
        config.logging.file = Some(PathBuf::from("/var/log/ringshift.log"));
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.network.listing_port, 6000);
        assert_eq!(loaded.logging.file, config.logging.file);
    }
}
