//! Ring peer interface.

use super::key::RingKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Ring peer errors
#[derive(Debug, Error)]
pub enum RingError {
    /// Call did not complete within the peer timeout
    #[error("ring peer {peer} did not answer {method} within {timeout:?}")]
    Timeout {
        /// Peer address
        peer: String,
        /// RPC method
        method: &'static str,
        /// Bound that expired
        timeout: Duration,
    },

    /// Connection or socket failure
    #[error("ring peer {peer} unreachable: {source}")]
    Unreachable {
        /// Peer address
        peer: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Peer answered with an error object
    #[error("ring peer {peer} rejected {method}: {message}")]
    Remote {
        /// Peer address
        peer: String,
        /// RPC method
        method: &'static str,
        /// Error reported by the peer
        message: String,
    },

    /// Response could not be decoded
    #[error("malformed response from ring peer {peer}: {reason}")]
    Protocol {
        /// Peer address
        peer: String,
        /// What was wrong
        reason: String,
    },
}

impl RingError {
    /// Whether retrying the same call may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unreachable { .. })
    }
}

/// Identity of a ring participant, as reported by the ring binary
///
/// Wire form is the 3-tuple `(ip, port, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Host the node listens on
    pub ip: String,
    /// Ring RPC port
    pub port: u16,
    /// Ring position
    pub id: RingKey,
}

impl NodeInfo {
    /// Create a node identity
    #[must_use]
    pub fn new(ip: impl Into<String>, port: u16, id: RingKey) -> Self {
        Self {
            ip: ip.into(),
            port,
            id,
        }
    }

    /// Placeholder the ring binary uses for an unset predecessor
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.ip.is_empty()
    }

    /// `ip:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.ip, self.port, self.id)
    }
}

/// Remote-call surface of a ring node
#[async_trait]
pub trait RingPeer: Send + Sync {
    /// Start a new ring with this node as its only member
    async fn create(&self) -> Result<(), RingError>;

    /// Join the ring that `via` belongs to
    async fn join(&self, via: &NodeInfo) -> Result<(), RingError>;

    /// This node's own identity
    async fn get_info(&self) -> Result<NodeInfo, RingError>;

    /// Current predecessor (may be unset, see [`NodeInfo::is_unset`])
    async fn get_predecessor(&self) -> Result<NodeInfo, RingError>;

    /// Entry `index` of the successor list, 0 being the immediate successor
    async fn get_successor(&self, index: u32) -> Result<NodeInfo, RingError>;
}
