//! Single-chunk transfer primitives.
//!
//! A [`ChunkTransport`] moves exactly one chunk artifact per call and never
//! retries internally. Two implementations are provided:
//!
//! - [`HttpChunkTransport`]: `GET`/`PUT http://<peer>:<port>/chunks/<name>`
//! - [`DirectoryChunkTransport`]: peers are directories under a shared root

use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Chunk transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transfer did not finish within the configured bound
    #[error("chunk {chunk} on {peer} timed out")]
    Timeout {
        /// Peer host
        peer: String,
        /// Chunk artifact name
        chunk: String,
    },

    /// Peer does not have the chunk
    #[error("chunk {chunk} not found on {peer}")]
    NotFound {
        /// Peer host
        peer: String,
        /// Chunk artifact name
        chunk: String,
    },

    /// Peer answered with an unexpected status
    #[error("chunk {chunk} on {peer}: HTTP {status}")]
    Status {
        /// Peer host
        peer: String,
        /// Chunk artifact name
        chunk: String,
        /// HTTP status code
        status: u16,
    },

    /// Request failed below the HTTP layer
    #[error("chunk {chunk} on {peer}: {source}")]
    Http {
        /// Peer host
        peer: String,
        /// Chunk artifact name
        chunk: String,
        /// Underlying error
        #[source]
        source: reqwest::Error,
    },

    /// Local file operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Local path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Chunk name cannot be used as a single path component
    #[error("invalid chunk name: {0:?}")]
    InvalidName(String),
}

impl TransportError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        TransportError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Moves one chunk artifact to or from a peer
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// Fetch `chunk_name` from `peer` into `dest_dir`, returning the local path
    async fn download_chunk(
        &self,
        peer: &str,
        chunk_name: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransportError>;

    /// Send the artifact at `chunk_path` to `peer` under its file name
    async fn upload_chunk(&self, peer: &str, chunk_path: &Path) -> Result<(), TransportError>;
}

/// Reject names that would escape a directory or a URL path segment
fn checked_name(name: &str) -> Result<&str, TransportError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(TransportError::InvalidName(name.to_string()));
    }
    Ok(name)
}

fn artifact_name(chunk_path: &Path) -> Result<&str, TransportError> {
    chunk_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TransportError::InvalidName(chunk_path.display().to_string()))
        .and_then(checked_name)
}

/// Chunk transport over HTTP
#[derive(Debug, Clone)]
pub struct HttpChunkTransport {
    client: reqwest::Client,
    port: u16,
}

impl HttpChunkTransport {
    /// Transport talking to `port` on each peer, each request bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns `Http` if the client cannot be built.
    pub fn new(port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| TransportError::Http {
                peer: String::new(),
                chunk: String::new(),
                source,
            })?;
        Ok(Self { client, port })
    }

    fn chunk_url(&self, peer: &str, chunk_name: &str) -> Result<Url, TransportError> {
        let mut url = Url::parse(&format!("http://{peer}:{}/", self.port))
            .map_err(|_| TransportError::InvalidName(peer.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidName(peer.to_string()))?
            .pop_if_empty()
            .extend(["chunks", chunk_name]);
        Ok(url)
    }

    fn http_error(peer: &str, chunk: &str, source: reqwest::Error) -> TransportError {
        if source.is_timeout() {
            TransportError::Timeout {
                peer: peer.to_string(),
                chunk: chunk.to_string(),
            }
        } else {
            TransportError::Http {
                peer: peer.to_string(),
                chunk: chunk.to_string(),
                source,
            }
        }
    }

    fn status_error(peer: &str, chunk: &str, status: reqwest::StatusCode) -> TransportError {
        if status == reqwest::StatusCode::NOT_FOUND {
            TransportError::NotFound {
                peer: peer.to_string(),
                chunk: chunk.to_string(),
            }
        } else {
            TransportError::Status {
                peer: peer.to_string(),
                chunk: chunk.to_string(),
                status: status.as_u16(),
            }
        }
    }
}

#[async_trait]
impl ChunkTransport for HttpChunkTransport {
    async fn download_chunk(
        &self,
        peer: &str,
        chunk_name: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransportError> {
        let chunk_name = checked_name(chunk_name)?;
        let url = self.chunk_url(peer, chunk_name)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::http_error(peer, chunk_name, e))?;
        if !response.status().is_success() {
            return Err(Self::status_error(peer, chunk_name, response.status()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::http_error(peer, chunk_name, e))?;

        let dest = dest_dir.join(chunk_name);
        tokio::fs::write(&dest, &body)
            .await
            .map_err(|e| TransportError::io(&dest, e))?;
        tracing::debug!("Downloaded {} ({} bytes) from {}", chunk_name, body.len(), peer);
        Ok(dest)
    }

    async fn upload_chunk(&self, peer: &str, chunk_path: &Path) -> Result<(), TransportError> {
        let chunk_name = artifact_name(chunk_path)?;
        let url = self.chunk_url(peer, chunk_name)?;
        let body = tokio::fs::read(chunk_path)
            .await
            .map_err(|e| TransportError::io(chunk_path, e))?;
        let len = body.len();

        let response = self
            .client
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::http_error(peer, chunk_name, e))?;
        if !response.status().is_success() {
            return Err(Self::status_error(peer, chunk_name, response.status()));
        }
        tracing::debug!("Uploaded {} ({} bytes) to {}", chunk_name, len, peer);
        Ok(())
    }
}

/// Chunk transport where each peer is the directory `<root>/<peer>`
#[derive(Debug, Clone)]
pub struct DirectoryChunkTransport {
    root: PathBuf,
}

impl DirectoryChunkTransport {
    /// Transport rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory standing in for `peer`
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if `peer` is not a single path component.
    pub fn peer_dir(&self, peer: &str) -> Result<PathBuf, TransportError> {
        Ok(self.root.join(checked_name(peer)?))
    }
}

#[async_trait]
impl ChunkTransport for DirectoryChunkTransport {
    async fn download_chunk(
        &self,
        peer: &str,
        chunk_name: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransportError> {
        let source = self.peer_dir(peer)?.join(checked_name(chunk_name)?);
        let dest = dest_dir.join(chunk_name);
        match tokio::fs::copy(&source, &dest).await {
            Ok(_) => Ok(dest),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !source.exists() => {
                Err(TransportError::NotFound {
                    peer: peer.to_string(),
                    chunk: chunk_name.to_string(),
                })
            }
            Err(e) => Err(TransportError::io(&dest, e)),
        }
    }

    async fn upload_chunk(&self, peer: &str, chunk_path: &Path) -> Result<(), TransportError> {
        let dir = self.peer_dir(peer)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| TransportError::io(&dir, e))?;
        let dest = dir.join(artifact_name(chunk_path)?);
        tokio::fs::copy(chunk_path, &dest)
            .await
            .map_err(|e| TransportError::io(chunk_path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_checked_name() {
        assert!(checked_name("a.txt.chunk0").is_ok());
        assert!(checked_name("../a").is_err());
        assert!(checked_name("..").is_err());
        assert!(checked_name("").is_err());
        assert_eq!(checked_name("q3\\totals.csv.chunk0").unwrap(), "q3\\totals.csv.chunk0");
    }

    #[test]
    fn test_chunk_url_encodes_name() {
        let transport = HttpChunkTransport::new(5058, Duration::from_secs(1)).unwrap();
        let url = transport.chunk_url("10.0.0.3", "my file.txt.chunk0").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.3:5058/chunks/my%20file.txt.chunk0");

        let url = transport.chunk_url("10.0.0.3", "a\\b.chunk0").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.3:5058/chunks/a%5Cb.chunk0");
    }

    #[tokio::test]
    async fn test_directory_transport_roundtrip() {
        let root = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let transport = DirectoryChunkTransport::new(root.path());

        let chunk = local.path().join("a.bin.chunk1");
        std::fs::write(&chunk, b"payload").unwrap();
        transport.upload_chunk("node-b", &chunk).await.unwrap();
        assert!(root.path().join("node-b/a.bin.chunk1").exists());

        let inbox = TempDir::new().unwrap();
        let path = transport
            .download_chunk("node-b", "a.bin.chunk1", inbox.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_directory_transport_missing_chunk() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("node-b")).unwrap();
        let transport = DirectoryChunkTransport::new(root.path());
        let inbox = TempDir::new().unwrap();

        assert!(matches!(
            transport
                .download_chunk("node-b", "nope.chunk0", inbox.path())
                .await,
            Err(TransportError::NotFound { .. })
        ));
    }
}
