//! Chunk-by-chunk file transfer against a single peer.
//!
//! Every transfer stages its chunk artifacts in its own directory
//! `<work_dir>/.xfer-<id>`, so concurrent transfers never share artifact
//! names. The staging directory is removed when the transfer ends, whatever
//! the outcome. A pulled file is handed back under a name carrying the same
//! id, `<work_dir>/<name>.pulled-<id>`, and the caller places it.

use crate::config::TransferConfig;
use crate::error::{NodeError, Result};
use crate::transport::ChunkTransport;
use ringshift_files::{ChunkHandle, Manifest, chunk_file_name, combine, read_manifest, split};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Progress callback: `(chunks_done, chunks_total)`
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Outcome of a successful pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// File name as requested
    pub file_name: String,
    /// Reconstructed file, `<work_dir>/<file_name>.pulled-<id>`, unique per pull
    pub path: PathBuf,
    /// Number of chunks received
    pub chunks: u64,
    /// Size of the reconstructed file
    pub bytes: u64,
    /// Whether the manifest carried a digest that was checked
    pub verified: bool,
}

/// Outcome of a push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    /// Base name the receiver will reconstruct
    pub file_name: String,
    /// Chunks produced by the split
    pub total_chunks: u64,
    /// Chunks the peer accepted
    pub uploaded: u64,
    /// Ordinals whose upload failed
    pub failed: Vec<u64>,
}

impl PushReport {
    /// Whether every chunk reached the peer
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.uploaded == self.total_chunks
    }
}

/// Private per-transfer directory, removed on drop
struct StagingDir {
    id: String,
    path: PathBuf,
}

impl StagingDir {
    async fn create(work_dir: &Path) -> Result<Self> {
        let id = hex::encode(rand::random::<[u8; 8]>());
        let path = work_dir.join(format!(".xfer-{id}"));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { id, path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Where a file assembled here is handed over in `work_dir`
    fn handoff_path(&self, work_dir: &Path, file_name: &str) -> PathBuf {
        work_dir.join(format!("{file_name}.pulled-{}", self.id))
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove staging dir {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Drives a [`ChunkTransport`] to move whole files
#[derive(Clone)]
pub struct TransferAgent {
    config: TransferConfig,
    transport: Arc<dyn ChunkTransport>,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for TransferAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransferAgent {
    /// Create an agent
    #[must_use]
    pub fn new(config: TransferConfig, transport: Arc<dyn ChunkTransport>) -> Self {
        Self {
            config,
            transport,
            progress: None,
        }
    }

    /// Report per-chunk progress to `progress`
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report_progress(&self, done: u64, total: u64) {
        if let Some(progress) = &self.progress {
            progress(done, total);
        }
    }

    /// Fetch `file_name` from `peer` and reconstruct it in the work directory
    ///
    /// Chunk 0 is fetched first to learn the chunk count, then the remaining
    /// chunks in increasing ordinal order. The first failed download aborts
    /// the transfer; no partial file is left behind and every downloaded
    /// chunk artifact is removed.
    ///
    /// The result lands at a path no other pull uses (see
    /// [`TransferReport::path`]), so nothing already in the work directory is
    /// overwritten. Moving it to its final place is up to the caller.
    ///
    /// # Errors
    ///
    /// Transport errors, `ManifestFormat` for an unreadable chunk 0,
    /// `Integrity` if the reconstructed bytes fail the digest check, `Io` for
    /// local filesystem failures.
    pub async fn pull_file(&self, peer: &str, file_name: &str) -> Result<TransferReport> {
        validate_file_name(file_name)?;
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let staging = StagingDir::create(&self.config.work_dir).await?;

        tracing::info!("Pulling {} from {}", file_name, peer);
        let first = self
            .transport
            .download_chunk(peer, &chunk_file_name(file_name, 0), staging.path())
            .await?;
        let manifest = read_manifest(&first)?;
        if manifest.original_file_name != file_name {
            tracing::warn!(
                "Manifest of {} names {}, keeping the requested name",
                file_name,
                manifest.original_file_name
            );
        }
        let total = manifest.total_chunks;
        self.report_progress(1, total);

        let mut chunks = Vec::new();
        chunks.push(ChunkHandle::new(0, first));
        for ordinal in 1..total {
            let name = chunk_file_name(file_name, ordinal);
            match self
                .transport
                .download_chunk(peer, &name, staging.path())
                .await
            {
                Ok(path) => chunks.push(ChunkHandle::new(ordinal, path)),
                Err(e) => {
                    tracing::warn!(
                        "Chunk {}/{} of {} failed, aborting: {}",
                        ordinal,
                        total,
                        file_name,
                        e
                    );
                    for chunk in &chunks {
                        let _ = chunk.remove();
                    }
                    return Err(e.into());
                }
            }
            self.report_progress(ordinal + 1, total);
        }

        let assembled = staging.path().join(file_name);
        let manifest = combine_blocking(chunks, assembled.clone()).await?;

        let dest = staging.handoff_path(&self.config.work_dir, file_name);
        tokio::fs::rename(&assembled, &dest).await?;
        let bytes = tokio::fs::metadata(&dest).await?.len();

        tracing::info!(
            "Pulled {} from {} ({} chunk(s), {} bytes)",
            file_name,
            peer,
            total,
            bytes
        );
        Ok(TransferReport {
            file_name: file_name.to_string(),
            path: dest,
            chunks: total,
            bytes,
            verified: manifest.digest.is_some(),
        })
    }

    /// Split `path` and upload every chunk to `peer` in ordinal order
    ///
    /// A failed chunk upload is logged and recorded in the report; the
    /// remaining chunks are still sent. Each chunk artifact is deleted right
    /// after its upload attempt.
    ///
    /// # Errors
    ///
    /// Only errors before the first upload (unreadable source, split
    /// failure, staging directory) are returned as `Err`.
    pub async fn push_file(&self, path: &Path, peer: &str) -> Result<PushReport> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let staging = StagingDir::create(&self.config.work_dir).await?;

        let source = path.to_path_buf();
        let out_dir = staging.path().to_path_buf();
        let chunk_size = self.config.chunk_size;
        let chunks =
            tokio::task::spawn_blocking(move || split(&source, chunk_size, &out_dir)).await??;

        let total = chunks.len() as u64;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!("Pushing {} to {} ({} chunk(s))", file_name, peer, total);

        let mut report = PushReport {
            file_name,
            total_chunks: total,
            uploaded: 0,
            failed: Vec::new(),
        };
        for chunk in &chunks {
            let result = self.transport.upload_chunk(peer, &chunk.path).await;
            if let Err(e) = chunk.remove() {
                tracing::warn!("Failed to delete {}: {}", chunk.path.display(), e);
            }
            match result {
                Ok(()) => report.uploaded += 1,
                Err(e) => {
                    tracing::warn!("Upload of chunk {} to {} failed: {}", chunk.ordinal, peer, e);
                    report.failed.push(chunk.ordinal);
                }
            }
            self.report_progress(chunk.ordinal + 1, total);
        }

        if report.is_complete() {
            tracing::info!("Pushed {} to {}", report.file_name, peer);
        } else {
            tracing::warn!(
                "Pushed {} to {} with {} of {} chunk(s) missing",
                report.file_name,
                peer,
                report.failed.len(),
                total
            );
        }
        Ok(report)
    }
}

fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\n']) {
        return Err(NodeError::InvalidConfig(Cow::Owned(format!(
            "not a plain file name: {name:?}"
        ))));
    }
    Ok(())
}

async fn combine_blocking(chunks: Vec<ChunkHandle>, output: PathBuf) -> Result<Manifest> {
    let manifest = tokio::task::spawn_blocking(move || combine(&chunks, &output)).await??;
    Ok(manifest)
}
