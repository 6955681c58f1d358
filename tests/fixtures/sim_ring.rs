//! In-process ring simulation for integration testing
//!
//! Each simulated node owns a directory tree under one temp root:
//!
//! ```text
//! <root>/nodes/<host>/files   whole files the node stores
//! <root>/nodes/<host>/work    staging for transfers into the node
//! <root>/nodes/<host>/inbox   chunks pushed to the node
//! ```
//!
//! The ring topology comes from the node ids handed to [`SimRing::add_node`].
//! Listing and chunk download read straight from a node's `files` directory,
//! splitting on demand the way a chunk server would.
//!
//! # Example
//!
//! ```no_run
//! use ringshift_integration_tests::fixtures::SimRing;
//!
//! # async fn demo() {
//! let mut ring = SimRing::new(1024);
//! ring.add_node("10.0.0.1", 100);
//! ring.add_node("10.0.0.3", 300);
//! ring.put_file("10.0.0.3", "movie.mkv", &[0u8; 4096]);
//!
//! ring.add_node("10.0.0.2", 200);
//! let report = ring.coordinator("10.0.0.2").run("10.0.0.2").await.unwrap();
//! assert!(report.is_clean());
//! # }
//! ```

use async_trait::async_trait;
use ringshift_core::{
    ChunkTransport, MigrationCoordinator, NodeConfig, RingConnector, TransferAgent,
    TransferConfig, TransportError,
};
use ringshift_discovery::{
    FileListing, FileMap, ListingError, NodeInfo, RingError, RingKey, RingPeer, list_local_files,
};
use ringshift_files::parse_chunk_ordinal;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Ring port reported by every simulated node
pub const SIM_PORT: u16 = 5057;

/// A ring of simulated nodes sharing one temp directory
pub struct SimRing {
    root: TempDir,
    members: BTreeMap<String, RingKey>,
    unset_predecessor: HashSet<String>,
    listing: Arc<StoreListing>,
    transport: Arc<StoreTransport>,
    chunk_size: usize,
}

impl SimRing {
    /// Empty ring whose chunk server splits with `chunk_size`
    pub fn new(chunk_size: usize) -> Self {
        let root = TempDir::new().expect("create sim root");
        let nodes = root.path().join("nodes");
        Self {
            listing: Arc::new(StoreListing::new(nodes.clone())),
            transport: Arc::new(StoreTransport::new(nodes, chunk_size)),
            root,
            members: BTreeMap::new(),
            unset_predecessor: HashSet::new(),
            chunk_size,
        }
    }

    fn node_dir(&self, host: &str) -> PathBuf {
        self.root.path().join("nodes").join(host)
    }

    /// Add `host` to the ring at position `id`
    pub fn add_node(&mut self, host: &str, id: u32) -> NodeInfo {
        for sub in ["files", "work", "inbox"] {
            std::fs::create_dir_all(self.node_dir(host).join(sub)).expect("create node dirs");
        }
        self.members.insert(host.to_string(), RingKey(id));
        NodeInfo::new(host, SIM_PORT, RingKey(id))
    }

    /// Make `host` report an unset predecessor
    pub fn forget_predecessor(&mut self, host: &str) {
        self.unset_predecessor.insert(host.to_string());
    }

    /// Directory of whole files stored on `host`
    pub fn store_dir(&self, host: &str) -> PathBuf {
        self.node_dir(host).join("files")
    }

    /// Staging directory for transfers into `host`
    pub fn work_dir(&self, host: &str) -> PathBuf {
        self.node_dir(host).join("work")
    }

    /// Directory receiving chunks pushed to `host`
    pub fn inbox_dir(&self, host: &str) -> PathBuf {
        self.node_dir(host).join("inbox")
    }

    /// Store `data` as `name` on `host`
    pub fn put_file(&self, host: &str, name: &str, data: &[u8]) {
        std::fs::write(self.store_dir(host).join(name), data).expect("seed file");
    }

    /// Names of the files `host` stores, sorted
    pub fn stored(&self, host: &str) -> Vec<String> {
        list_local_files(self.store_dir(host))
            .expect("list store")
            .into_keys()
            .collect()
    }

    /// Every entry left in `host`'s work directory, hidden ones included
    pub fn work_leftovers(&self, host: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.work_dir(host))
            .expect("read work dir")
            .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Members in ring order
    pub fn ring_order(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<NodeInfo> = self
            .members
            .iter()
            .map(|(host, id)| NodeInfo::new(host.as_str(), SIM_PORT, *id))
            .collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    /// Connector over a snapshot of the current topology
    pub fn connector(&self) -> Arc<SimConnector> {
        Arc::new(SimConnector {
            ring: self.ring_order(),
            unset_predecessor: self.unset_predecessor.clone(),
        })
    }

    /// Listing endpoint backed by each node's store
    pub fn listing(&self) -> Arc<StoreListing> {
        self.listing.clone()
    }

    /// Chunk transport backed by each node's store
    pub fn transport(&self) -> Arc<StoreTransport> {
        self.transport.clone()
    }

    /// Node configuration for `host`
    pub fn config(&self, host: &str) -> NodeConfig {
        NodeConfig {
            storage_dir: self.store_dir(host),
            transfer: TransferConfig {
                work_dir: self.work_dir(host),
                chunk_size: self.chunk_size,
            },
            ..Default::default()
        }
    }

    /// Transfer agent staging into `host`'s work directory
    pub fn agent(&self, host: &str) -> TransferAgent {
        TransferAgent::new(self.config(host).transfer, self.transport.clone())
    }

    /// Coordinator migrating files into `host`
    pub fn coordinator(&self, host: &str) -> MigrationCoordinator {
        MigrationCoordinator::new(
            &self.config(host),
            self.connector(),
            self.listing.clone(),
            self.agent(host),
        )
    }
}

/// Connects to simulated ring members
pub struct SimConnector {
    ring: Vec<NodeInfo>,
    unset_predecessor: HashSet<String>,
}

impl RingConnector for SimConnector {
    fn connect(&self, host: &str) -> Arc<dyn RingPeer> {
        let Some(index) = self.ring.iter().position(|n| n.ip == host) else {
            return Arc::new(SimPeer {
                host: host.to_string(),
                view: None,
            });
        };

        let len = self.ring.len();
        let predecessor = if self.unset_predecessor.contains(host) {
            NodeInfo::new("", 0, RingKey(0))
        } else {
            self.ring[(index + len - 1) % len].clone()
        };
        Arc::new(SimPeer {
            host: host.to_string(),
            view: Some(PeerView {
                me: self.ring[index].clone(),
                predecessor,
                successor: self.ring[(index + 1) % len].clone(),
            }),
        })
    }
}

struct PeerView {
    me: NodeInfo,
    predecessor: NodeInfo,
    successor: NodeInfo,
}

/// A ring member, or a host that refuses connections when `view` is `None`
struct SimPeer {
    host: String,
    view: Option<PeerView>,
}

impl SimPeer {
    fn view(&self) -> Result<&PeerView, RingError> {
        self.view.as_ref().ok_or_else(|| RingError::Unreachable {
            peer: format!("{}:{}", self.host, SIM_PORT),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        })
    }
}

#[async_trait]
impl RingPeer for SimPeer {
    async fn create(&self) -> Result<(), RingError> {
        self.view().map(|_| ())
    }

    async fn join(&self, _via: &NodeInfo) -> Result<(), RingError> {
        self.view().map(|_| ())
    }

    async fn get_info(&self) -> Result<NodeInfo, RingError> {
        Ok(self.view()?.me.clone())
    }

    async fn get_predecessor(&self) -> Result<NodeInfo, RingError> {
        Ok(self.view()?.predecessor.clone())
    }

    async fn get_successor(&self, _index: u32) -> Result<NodeInfo, RingError> {
        Ok(self.view()?.successor.clone())
    }
}

/// Listing endpoint reading `<nodes>/<host>/files`
pub struct StoreListing {
    nodes: PathBuf,
    calls: AtomicUsize,
}

impl StoreListing {
    fn new(nodes: PathBuf) -> Self {
        Self {
            nodes,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of listing requests served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileListing for StoreListing {
    async fn list_files(&self, host: &str) -> Result<FileMap, ListingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        list_local_files(self.nodes.join(host).join("files"))
    }
}

/// Chunk server over `<nodes>/<host>/files`
///
/// Downloads split the stored file on demand. Uploads land in
/// `<nodes>/<host>/inbox`.
pub struct StoreTransport {
    nodes: PathBuf,
    chunk_size: usize,
    failing: Mutex<HashSet<String>>,
    downloads: Mutex<Vec<String>>,
    uploads: Mutex<Vec<String>>,
}

impl StoreTransport {
    fn new(nodes: PathBuf, chunk_size: usize) -> Self {
        Self {
            nodes,
            chunk_size,
            failing: Mutex::new(HashSet::new()),
            downloads: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Make every transfer of `chunk_name` time out
    pub fn fail_chunk(&self, chunk_name: &str) {
        self.failing
            .lock()
            .expect("failing lock")
            .insert(chunk_name.to_string());
    }

    /// Chunk names downloaded so far, in request order
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().expect("downloads lock").clone()
    }

    /// Chunk names uploaded so far, in request order
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().expect("uploads lock").clone()
    }

    fn check_failing(&self, peer: &str, chunk_name: &str) -> Result<(), TransportError> {
        if self.failing.lock().expect("failing lock").contains(chunk_name) {
            return Err(TransportError::Timeout {
                peer: peer.to_string(),
                chunk: chunk_name.to_string(),
            });
        }
        Ok(())
    }
}

fn not_found(peer: &str, chunk_name: &str) -> TransportError {
    TransportError::NotFound {
        peer: peer.to_string(),
        chunk: chunk_name.to_string(),
    }
}

fn io_error(path: &Path, source: impl std::fmt::Display) -> TransportError {
    TransportError::Io {
        path: path.to_path_buf(),
        source: io::Error::other(source.to_string()),
    }
}

#[async_trait]
impl ChunkTransport for StoreTransport {
    async fn download_chunk(
        &self,
        peer: &str,
        chunk_name: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransportError> {
        self.downloads
            .lock()
            .expect("downloads lock")
            .push(chunk_name.to_string());
        self.check_failing(peer, chunk_name)?;

        let (name, ordinal) = parse_chunk_ordinal(chunk_name)
            .ok_or_else(|| TransportError::InvalidName(chunk_name.to_string()))?;
        let source = self.nodes.join(peer).join("files").join(name);
        if !source.is_file() {
            return Err(not_found(peer, chunk_name));
        }

        let scratch = TempDir::new().map_err(|e| io_error(dest_dir, e))?;
        let chunks = ringshift_files::split(&source, self.chunk_size, scratch.path())
            .map_err(|e| io_error(&source, e))?;
        let chunk = chunks
            .into_iter()
            .find(|c| c.ordinal == ordinal)
            .ok_or_else(|| not_found(peer, chunk_name))?;

        let dest = dest_dir.join(chunk_name);
        tokio::fs::copy(&chunk.path, &dest)
            .await
            .map_err(|e| io_error(&dest, e))?;
        Ok(dest)
    }

    async fn upload_chunk(&self, peer: &str, chunk_path: &Path) -> Result<(), TransportError> {
        let chunk_name = chunk_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransportError::InvalidName(chunk_path.display().to_string()))?;
        self.uploads
            .lock()
            .expect("uploads lock")
            .push(chunk_name.to_string());
        self.check_failing(peer, chunk_name)?;

        let dest = self.nodes.join(peer).join("inbox").join(chunk_name);
        tokio::fs::copy(chunk_path, &dest)
            .await
            .map_err(|e| io_error(&dest, e))?;
        Ok(())
    }
}
