//! Node configuration

use crate::error::{NodeError, Result};
use ringshift_discovery::{DEFAULT_LISTING_PORT, DEFAULT_RING_PORT};
use ringshift_files::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

/// Default port of the chunk transfer endpoint
pub const DEFAULT_CHUNK_PORT: u16 = 5058;

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Flat directory of whole files this node stores
    pub storage_dir: PathBuf,

    /// Transfer configuration
    pub transfer: TransferConfig,

    /// Network configuration
    pub network: NetworkConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("files"),
            transfer: TransferConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Check every value is usable
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first offending value.
    pub fn validate(&self) -> Result<()> {
        if self.storage_dir.as_os_str().is_empty() {
            return Err(NodeError::invalid_config("storage_dir must not be empty"));
        }
        self.transfer.validate()?;
        self.network.validate()
    }
}

/// Chunked transfer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Where chunk artifacts and reconstructed files are staged
    pub work_dir: PathBuf,

    /// Chunk payload size in bytes
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("work"),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty work dir or an out-of-range chunk size.
    pub fn validate(&self) -> Result<()> {
        if self.work_dir.as_os_str().is_empty() {
            return Err(NodeError::invalid_config("work_dir must not be empty"));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(NodeError::InvalidConfig(Cow::Owned(format!(
                "chunk_size must be between 1 and {MAX_CHUNK_SIZE} bytes, got {}",
                self.chunk_size
            ))));
        }
        Ok(())
    }
}

/// Network configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bound on listing requests and per-chunk transfers
    pub rpc_timeout: Duration,

    /// Bound on each ring peer call
    pub ring_peer_timeout: Duration,

    /// Ring peer RPC port
    pub ring_port: u16,

    /// File listing endpoint port
    pub listing_port: u16,

    /// Chunk transfer endpoint port
    pub chunk_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(30),
            ring_peer_timeout: Duration::from_secs(5),
            ring_port: DEFAULT_RING_PORT,
            listing_port: DEFAULT_LISTING_PORT,
            chunk_port: DEFAULT_CHUNK_PORT,
        }
    }
}

impl NetworkConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero timeout or port.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_timeout.is_zero() {
            return Err(NodeError::invalid_config("rpc_timeout must be non-zero"));
        }
        if self.ring_peer_timeout.is_zero() {
            return Err(NodeError::invalid_config(
                "ring_peer_timeout must be non-zero",
            ));
        }
        if self.ring_port == 0 || self.listing_port == 0 || self.chunk_port == 0 {
            return Err(NodeError::invalid_config("ports must be non-zero"));
        }
        Ok(())
    }
}
