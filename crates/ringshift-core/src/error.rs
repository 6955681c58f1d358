//! Error types for node operations
//!
//! Errors are classified so callers can decide whether a retry makes sense.
//!
//! # Error Categories
//!
//! - **Transient**: the peer may answer next time (timeouts, refused or reset
//!   connections, transport failures)
//! - **Permanent**: retrying cannot help (bad configuration, corrupt or
//!   incomplete chunk sets, malformed peer responses)
//!
//! # Example
//!
//! ```no_run
//! use ringshift_core::NodeError;
//!
//! fn report(err: &NodeError) {
//!     if err.is_transient() {
//!         eprintln!("peer trouble, try again later: {err}");
//!     } else {
//!         eprintln!("giving up: {err}");
//!     }
//! }
//! ```

use crate::transport::TransportError;
use ringshift_discovery::{ListingError, RingError};
use ringshift_files::ChunkError;
use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur in node operations
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    // ============ Peer Errors ============
    /// A remote call did not complete within its bound
    #[error("Operation timed out: {0}")]
    Timeout(Cow<'static, str>),

    /// Peer could not be reached
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(Cow<'static, str>),

    /// Peer answered with an error
    #[error("Peer rejected request: {0}")]
    Remote(Cow<'static, str>),

    /// Peer answered with something undecodable
    #[error("Protocol error: {0}")]
    Protocol(Cow<'static, str>),

    /// Listing endpoint failed
    #[error("Listing error: {0}")]
    Listing(Cow<'static, str>),

    // ============ Transfer Errors ============
    /// Chunk transport failed
    #[error("Transport error: {0}")]
    Transport(Cow<'static, str>),

    /// Requested chunk does not exist on the peer
    #[error("Not found: {0}")]
    NotFound(Cow<'static, str>),

    /// Chunk 0 manifest line could not be parsed
    #[error("Manifest format error: {0}")]
    ManifestFormat(Cow<'static, str>),

    /// Chunk set does not match the manifest
    #[error("Incomplete transfer: {0}")]
    IncompleteTransfer(Cow<'static, str>),

    /// Reassembled bytes do not match the manifest digest
    #[error("Integrity check failed: {0}")]
    Integrity(Cow<'static, str>),

    // ============ Local Errors ============
    /// Filesystem operation failed
    #[error("File I/O error: {0}")]
    Io(Cow<'static, str>),

    /// Invalid configuration or argument
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Ring is not in a state the operation can work with
    #[error("Invalid state: {0}")]
    InvalidState(Cow<'static, str>),

    /// Blocking task panicked or was cancelled
    #[error("Task join error: {0}")]
    TaskJoin(Cow<'static, str>),
}

impl NodeError {
    /// Returns true if this error is transient and may succeed on retry
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NodeError::Timeout(_) | NodeError::PeerUnreachable(_) | NodeError::Transport(_)
        )
    }

    /// Returns true if this error is permanent and will not succeed on retry
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            NodeError::InvalidConfig(_)
                | NodeError::Protocol(_)
                | NodeError::NotFound(_)
                | NodeError::ManifestFormat(_)
                | NodeError::IncompleteTransfer(_)
                | NodeError::Integrity(_)
        )
    }

    /// Returns true if a retry policy should try again
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }

    /// Create an invalid configuration error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        NodeError::InvalidConfig(Cow::Borrowed(context))
    }

    /// Create an invalid state error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        NodeError::InvalidState(Cow::Borrowed(context))
    }
}

impl From<RingError> for NodeError {
    fn from(err: RingError) -> Self {
        let msg = Cow::Owned(err.to_string());
        match err {
            RingError::Timeout { .. } => NodeError::Timeout(msg),
            RingError::Unreachable { .. } => NodeError::PeerUnreachable(msg),
            RingError::Remote { .. } => NodeError::Remote(msg),
            RingError::Protocol { .. } => NodeError::Protocol(msg),
        }
    }
}

impl From<ListingError> for NodeError {
    fn from(err: ListingError) -> Self {
        match err {
            ListingError::Io { .. } => NodeError::Io(Cow::Owned(err.to_string())),
            _ => NodeError::Listing(Cow::Owned(err.to_string())),
        }
    }
}

impl From<ChunkError> for NodeError {
    fn from(err: ChunkError) -> Self {
        let msg = Cow::Owned(err.to_string());
        match err {
            ChunkError::Io { .. } => NodeError::Io(msg),
            ChunkError::InvalidChunkSize(_) => NodeError::InvalidConfig(msg),
            ChunkError::ManifestFormat(_) => NodeError::ManifestFormat(msg),
            ChunkError::NoChunks
            | ChunkError::NonContiguous { .. }
            | ChunkError::Incomplete { .. } => NodeError::IncompleteTransfer(msg),
            ChunkError::DigestMismatch { .. } => NodeError::Integrity(msg),
        }
    }
}

impl From<TransportError> for NodeError {
    fn from(err: TransportError) -> Self {
        let msg = Cow::Owned(err.to_string());
        match err {
            TransportError::Timeout { .. } => NodeError::Timeout(msg),
            TransportError::NotFound { .. } => NodeError::NotFound(msg),
            TransportError::Io { .. } => NodeError::Io(msg),
            TransportError::Http { .. } | TransportError::Status { .. } => {
                NodeError::Transport(msg)
            }
            TransportError::InvalidName(_) => NodeError::InvalidConfig(msg),
        }
    }
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(Cow::Owned(err.to_string()))
    }
}

impl From<tokio::task::JoinError> for NodeError {
    fn from(err: tokio::task::JoinError) -> Self {
        NodeError::TaskJoin(Cow::Owned(err.to_string()))
    }
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
