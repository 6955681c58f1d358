//! Error types for the chunk codec.

use std::path::PathBuf;
use thiserror::Error;

/// Chunk codec errors
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Underlying filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Chunk size must be a positive integer
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// Chunk 0 metadata line could not be parsed
    #[error("manifest format error: {0}")]
    ManifestFormat(String),

    /// Combine was given no chunks
    #[error("no chunks to combine")]
    NoChunks,

    /// Chunk ordinals are not 0, 1, 2, ... in order
    #[error("chunk sequence not contiguous: expected ordinal {expected}, found {found}")]
    NonContiguous {
        /// Ordinal expected at this position
        expected: u64,
        /// Ordinal actually supplied
        found: u64,
    },

    /// Fewer or more chunks than the manifest declares
    #[error("incomplete chunk set for {file}: manifest declares {expected} chunks, got {actual}")]
    Incomplete {
        /// Original file name
        file: String,
        /// `total_chunks` from the manifest
        expected: u64,
        /// Number of chunks supplied
        actual: u64,
    },

    /// Reassembled file does not match the manifest digest
    #[error("digest mismatch for {file}: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Original file name
        file: String,
        /// Digest from the manifest
        expected: String,
        /// Digest of the reassembled output
        actual: String,
    },
}

impl ChunkError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ChunkError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for chunk codec operations
pub type Result<T> = std::result::Result<T, ChunkError>;
