//! File listings: which files a peer stores and where they sit on the ring.
//!
//! A peer's listing endpoint answers `GET /get_files` with
//! `{"status": "success", "data": {"<name>": <ring key>, ...}}`.

use crate::ring::{RingKey, hash_key};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default listing endpoint port
pub const DEFAULT_LISTING_PORT: u16 = 5059;

/// File name to ring key
pub type FileMap = BTreeMap<String, RingKey>;

/// Listing errors
#[derive(Debug, Error)]
pub enum ListingError {
    /// Request failed or the body could not be decoded
    #[error("listing request to {host} failed: {source}")]
    Http {
        /// Peer host
        host: String,
        /// Underlying error
        #[source]
        source: reqwest::Error,
    },

    /// Endpoint answered with a non-success status code
    #[error("listing endpoint on {host} returned HTTP {status}")]
    Status {
        /// Peer host
        host: String,
        /// HTTP status code
        status: u16,
    },

    /// Endpoint reported an error in the body
    #[error("listing endpoint on {host} reported failure: {message}")]
    Rejected {
        /// Peer host
        host: String,
        /// Message from the body, if any
        message: String,
    },

    /// Local directory could not be read
    #[error("cannot list {path}: {source}")]
    Io {
        /// Directory being listed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Body of the listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingBody {
    /// `"success"` or `"error"`
    pub status: String,
    /// Listed files, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<FileMap>,
    /// Failure description, present on error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ListingBody {
    /// Successful listing
    #[must_use]
    pub fn success(files: FileMap) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(files),
            message: None,
        }
    }

    /// Convert into the file map, or the reported failure
    fn into_files(self, host: &str) -> Result<FileMap, ListingError> {
        if self.status != "success" {
            return Err(ListingError::Rejected {
                host: host.to_string(),
                message: self.message.unwrap_or(self.status),
            });
        }
        Ok(self.data.unwrap_or_default())
    }
}

/// Source of a peer's stored files
#[async_trait]
pub trait FileListing: Send + Sync {
    /// Every file `host` currently stores, with its ring key
    async fn list_files(&self, host: &str) -> Result<FileMap, ListingError>;
}

/// HTTP client for peers' listing endpoints
#[derive(Debug, Clone)]
pub struct HttpListingClient {
    client: reqwest::Client,
    port: u16,
}

impl HttpListingClient {
    /// Create a client querying `port` on each peer, bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns `Http` if the underlying client cannot be built.
    pub fn new(port: u16, timeout: Duration) -> Result<Self, ListingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ListingError::Http {
                host: String::new(),
                source,
            })?;
        Ok(Self { client, port })
    }

    fn url(&self, host: &str) -> String {
        format!("http://{host}:{}/get_files", self.port)
    }
}

#[async_trait]
impl FileListing for HttpListingClient {
    async fn list_files(&self, host: &str) -> Result<FileMap, ListingError> {
        let http = |source| ListingError::Http {
            host: host.to_string(),
            source,
        };

        let response = self.client.get(self.url(host)).send().await.map_err(http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Status {
                host: host.to_string(),
                status: status.as_u16(),
            });
        }

        let files = response
            .json::<ListingBody>()
            .await
            .map_err(http)?
            .into_files(host)?;
        tracing::debug!("{} lists {} file(s)", host, files.len());
        Ok(files)
    }
}

/// Files stored directly in `dir`, keyed for the ring
///
/// Every regular file counts, whatever its name looks like. Directories
/// and names that are not valid UTF-8 are left out.
///
/// # Errors
///
/// Returns `Io` if the directory cannot be read.
pub fn list_local_files(dir: impl AsRef<Path>) -> Result<FileMap, ListingError> {
    let dir = dir.as_ref();
    let io_err = |source| ListingError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = FileMap::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        // Follows symlinks, like the endpoint always has
        let is_file = fs::metadata(entry.path()).is_ok_and(|m| m.is_file());
        if !is_file {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::warn!("Skipping non UTF-8 file name in {}", dir.display());
            continue;
        };
        let key = hash_key(&name);
        files.insert(name, key);
    }

    Ok(files)
}
