//! Join-time data migration.
//!
//! When a node joins the ring it takes over the keys `(predecessor, node]`
//! from its successor. A migration run walks these phases once:
//!
//! 1. **Bootstrap**: ask the new node for its identity, its predecessor and
//!    its immediate successor. Any failure aborts the run.
//! 2. **Enumerate**: list the successor's files. An unreachable listing is
//!    treated as an empty one.
//! 3. **Select**: keep the files whose key falls in the new node's range.
//! 4. **Transfer**: pull each selected file and move it into storage. A
//!    failed file is recorded and the run moves on.
//! 5. **Terminal**: every selected file has been attempted once.

use crate::config::{NetworkConfig, NodeConfig};
use crate::error::{NodeError, Result};
use crate::retry::RetryPolicy;
use crate::transfer::TransferAgent;
use ringshift_discovery::{
    FileListing, FileMap, Interval, NodeInfo, RingKey, RingPeer, RpcRingClient,
};
use ringshift_files::reassembler::partial_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Opens a ring peer handle for a host
pub trait RingConnector: Send + Sync {
    /// Handle for the ring node on `host`
    fn connect(&self, host: &str) -> Arc<dyn RingPeer>;
}

/// Connector producing msgpack-rpc clients
#[derive(Debug, Clone)]
pub struct RpcRingConnector {
    port: u16,
    timeout: Duration,
}

impl RpcRingConnector {
    /// Connector for ring nodes listening on `port`
    #[must_use]
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Connector using the ring port and peer timeout from `network`
    #[must_use]
    pub fn from_config(network: &NetworkConfig) -> Self {
        Self::new(network.ring_port, network.ring_peer_timeout)
    }
}

impl RingConnector for RpcRingConnector {
    fn connect(&self, host: &str) -> Arc<dyn RingPeer> {
        Arc::new(RpcRingClient::new(host, self.port, self.timeout))
    }
}

/// Start a new ring on `host`, returning its identity
///
/// # Errors
///
/// Ring peer errors from `create` or `get_info`.
pub async fn create_ring(connector: &dyn RingConnector, host: &str) -> Result<NodeInfo> {
    let peer = connector.connect(host);
    peer.create().await?;
    let info = peer.get_info().await?;
    info!("Created ring on {}", info);
    Ok(info)
}

/// Have the node on `new_host` join the ring `via_host` belongs to
///
/// Returns the identity of the node joined through.
///
/// # Errors
///
/// Ring peer errors from either node.
pub async fn join_ring(
    connector: &dyn RingConnector,
    new_host: &str,
    via_host: &str,
) -> Result<NodeInfo> {
    let via = connector.connect(via_host).get_info().await?;
    connector.connect(new_host).join(&via).await?;
    info!("{} joined the ring via {}", new_host, via);
    Ok(via)
}

/// Files whose key lies in `interval`, ordered by name
#[must_use]
pub fn select_owned(files: &FileMap, interval: Interval) -> Vec<(String, RingKey)> {
    files
        .iter()
        .filter(|(_, key)| interval.contains(**key))
        .map(|(name, key)| (name.clone(), *key))
        .collect()
}

/// A file moved onto the new node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedFile {
    /// File name
    pub name: String,
    /// Ring key of the name
    pub key: RingKey,
    /// Final location in storage
    pub path: PathBuf,
    /// File size
    pub bytes: u64,
}

/// A selected file that could not be moved
#[derive(Debug, Clone)]
pub struct FailedFile {
    /// File name
    pub name: String,
    /// Ring key of the name
    pub key: RingKey,
    /// What went wrong
    pub error: NodeError,
}

/// Outcome of one migration run
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// The joining node
    pub new_node: NodeInfo,
    /// Node the files were taken from
    pub successor: NodeInfo,
    /// Key range now owned by the new node
    pub interval: Interval,
    /// Files the successor listed
    pub listed: usize,
    /// Names selected for migration
    pub selected: Vec<String>,
    /// Listed files left on the successor
    pub skipped: usize,
    /// Files moved successfully
    pub migrated: Vec<MigratedFile>,
    /// Files that failed to move
    pub failed: Vec<FailedFile>,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl MigrationReport {
    /// Whether every selected file was moved
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Bootstrap {
    new_node: NodeInfo,
    predecessor: NodeInfo,
    successor: NodeInfo,
}

/// Moves files a joining node now owns from its successor
pub struct MigrationCoordinator {
    storage_dir: PathBuf,
    connector: Arc<dyn RingConnector>,
    listing: Arc<dyn FileListing>,
    agent: TransferAgent,
    retry: RetryPolicy,
}

impl MigrationCoordinator {
    /// Create a coordinator placing migrated files in `config.storage_dir`
    #[must_use]
    pub fn new(
        config: &NodeConfig,
        connector: Arc<dyn RingConnector>,
        listing: Arc<dyn FileListing>,
        agent: TransferAgent,
    ) -> Self {
        Self {
            storage_dir: config.storage_dir.clone(),
            connector,
            listing,
            agent,
            retry: RetryPolicy::none(),
        }
    }

    /// Retry bootstrap queries with `policy`
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Run one migration for the node on `new_node_host`
    ///
    /// # Errors
    ///
    /// Only bootstrap failures are returned as errors. Listing and per-file
    /// failures are recorded in the report.
    pub async fn run(&self, new_node_host: &str) -> Result<MigrationReport> {
        let started = Instant::now();

        let Bootstrap {
            new_node,
            predecessor,
            successor,
        } = match self.bootstrap(new_node_host).await {
            Ok(bootstrap) => bootstrap,
            Err(e) => {
                error!("Migration for {} aborted during bootstrap: {}", new_node_host, e);
                return Err(e);
            }
        };

        let interval = Interval::new(predecessor.id, new_node.id);
        let mut report = MigrationReport {
            new_node,
            successor,
            interval,
            listed: 0,
            selected: Vec::new(),
            skipped: 0,
            migrated: Vec::new(),
            failed: Vec::new(),
            elapsed: Duration::ZERO,
        };
        info!(
            "Migration range {} -> {} -> {}",
            predecessor.id, report.new_node.id, report.successor.id
        );

        if report.successor.id == report.new_node.id {
            info!("{} is its own successor, nothing to migrate", report.new_node);
            report.elapsed = started.elapsed();
            return Ok(report);
        }

        let source = report.successor.ip.clone();
        let files = match self.listing.list_files(&source).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Could not list files on {}, treating as empty: {}", source, e);
                FileMap::new()
            }
        };
        report.listed = files.len();

        let selected = select_owned(&files, interval);
        for (name, key) in &files {
            if interval.contains(*key) {
                info!("Selected {} (key {}) for migration to {}", name, key, report.new_node);
            } else {
                info!("Skipping {} (key {}): outside {}", name, key, interval);
            }
        }
        report.skipped = files.len() - selected.len();
        report.selected = selected.iter().map(|(name, _)| name.clone()).collect();

        for (name, key) in selected {
            match self.migrate_file(&source, &name, key).await {
                Ok(file) => {
                    info!("Migrated {} ({} bytes) to {}", name, file.bytes, file.path.display());
                    report.migrated.push(file);
                }
                Err(e) => {
                    warn!("Failed to migrate {} from {}: {}", name, source, e);
                    report.failed.push(FailedFile {
                        name,
                        key,
                        error: e,
                    });
                }
            }
        }

        report.elapsed = started.elapsed();
        info!(
            "Migration to {} finished: {} migrated, {} failed, {} skipped in {:?}",
            report.new_node,
            report.migrated.len(),
            report.failed.len(),
            report.skipped,
            report.elapsed
        );
        Ok(report)
    }

    async fn bootstrap(&self, host: &str) -> Result<Bootstrap> {
        let handle = self.connector.connect(host);
        let peer = handle.as_ref();

        let new_node = self
            .retry
            .retry("get_info", move || async move {
                peer.get_info().await.map_err(NodeError::from)
            })
            .await?;
        let predecessor = self
            .retry
            .retry("get_predecessor", move || async move {
                peer.get_predecessor().await.map_err(NodeError::from)
            })
            .await?;
        if predecessor.is_unset() {
            return Err(NodeError::invalid_state("new node has no predecessor yet"));
        }
        let successor = self
            .retry
            .retry("get_successor", move || async move {
                peer.get_successor(0).await.map_err(NodeError::from)
            })
            .await?;
        if successor.is_unset() {
            return Err(NodeError::invalid_state("new node has no successor yet"));
        }

        debug!(
            "Bootstrap: node {}, predecessor {}, successor {}",
            new_node, predecessor, successor
        );
        Ok(Bootstrap {
            new_node,
            predecessor,
            successor,
        })
    }

    async fn migrate_file(&self, source: &str, name: &str, key: RingKey) -> Result<MigratedFile> {
        let pulled = self.agent.pull_file(source, name).await?;
        let dest = self.storage_dir.join(name);

        if let Err(e) = place_file(&pulled.path, &dest).await {
            let _ = tokio::fs::remove_file(&pulled.path).await;
            return Err(e);
        }

        Ok(MigratedFile {
            name: name.to_string(),
            key,
            path: dest,
            bytes: pulled.bytes,
        })
    }
}

/// Move `src` to `dest` without exposing a partial file at `dest`
///
/// Tries a rename first. If that fails (e.g. across filesystems), copies to
/// `<dest>.partial`, renames that into place and removes `src`. An existing
/// file at `dest` is replaced.
///
/// # Errors
///
/// Returns `Io` if `dest`'s parent cannot be created or the file can be
/// neither renamed nor copied. `dest` is left as it was in that case.
pub async fn place_file(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let Err(rename_err) = tokio::fs::rename(src, dest).await else {
        return Ok(());
    };
    debug!(
        "Rename {} -> {} failed ({}), copying instead",
        src.display(),
        dest.display(),
        rename_err
    );

    let partial = partial_path(dest);
    let copied = match tokio::fs::copy(src, &partial).await {
        Ok(_) => tokio::fs::rename(&partial, dest).await,
        Err(e) => Err(e),
    };
    if let Err(e) = copied {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }
    tokio::fs::remove_file(src).await?;
    Ok(())
}
