//! Chunk 0 manifest.
//!
//! The manifest is a single line of compact JSON terminated by `\n` at the very
//! start of chunk 0. Keys `original_file_name` and `total_chunks` are always
//! present; `blake3` is added by this implementation and is optional on read so
//! chunks produced by older tooling still reassemble.

use crate::error::{ChunkError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Longest manifest line accepted on read.
pub const MAX_MANIFEST_LINE: usize = 64 * 1024;

/// Reconstruction metadata embedded in chunk 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Base name of the source file
    pub original_file_name: String,
    /// Number of chunks composing the file (at least 1)
    pub total_chunks: u64,
    /// Hex BLAKE3 digest of the whole file
    #[serde(rename = "blake3", default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl Manifest {
    /// Create a manifest without a digest
    #[must_use]
    pub fn new(original_file_name: impl Into<String>, total_chunks: u64) -> Self {
        Self {
            original_file_name: original_file_name.into(),
            total_chunks,
            digest: None,
        }
    }

    /// Attach a hex BLAKE3 digest
    #[must_use]
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Serialize to the wire line, including the trailing newline
    ///
    /// # Errors
    ///
    /// Returns `ManifestFormat` if the manifest itself is invalid.
    pub fn to_line(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut line =
            serde_json::to_vec(self).map_err(|e| ChunkError::ManifestFormat(e.to_string()))?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parse a manifest line (with or without its trailing newline)
    ///
    /// # Errors
    ///
    /// Returns `ManifestFormat` if the line is not valid UTF-8 JSON with the
    /// required keys, or if the decoded values are out of range.
    pub fn parse_line(line: &[u8]) -> Result<Self> {
        let trimmed = line.strip_suffix(b"\n").unwrap_or(line);
        let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
        let manifest: Manifest = serde_json::from_slice(trimmed)
            .map_err(|e| ChunkError::ManifestFormat(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read and parse the manifest line from a reader positioned at chunk 0's start
    ///
    /// Returns the manifest and the number of bytes consumed (line + newline).
    ///
    /// # Errors
    ///
    /// Returns `ManifestFormat` if no newline appears within
    /// [`MAX_MANIFEST_LINE`] bytes or the line does not parse.
    pub fn read_from<R: BufRead>(reader: &mut R, path: &Path) -> Result<(Self, usize)> {
        let mut line = Vec::new();
        let consumed = reader
            .by_ref()
            .take(MAX_MANIFEST_LINE as u64 + 1)
            .read_until(b'\n', &mut line)
            .map_err(|e| ChunkError::io(path, e))?;

        if line.last() != Some(&b'\n') {
            return Err(ChunkError::ManifestFormat(format!(
                "no manifest line terminator in {}",
                path.display()
            )));
        }

        Ok((Self::parse_line(&line)?, consumed))
    }

    fn validate(&self) -> Result<()> {
        if self.total_chunks == 0 {
            return Err(ChunkError::ManifestFormat("total_chunks must be >= 1".into()));
        }
        let name = &self.original_file_name;
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\n']) {
            return Err(ChunkError::ManifestFormat(format!(
                "invalid original_file_name: {name:?}"
            )));
        }
        Ok(())
    }
}

/// Read the manifest from a chunk 0 artifact on disk
///
/// # Errors
///
/// Returns `Io` if the file cannot be opened and `ManifestFormat` if the
/// first line is not a valid manifest.
pub fn read_manifest(chunk0: impl AsRef<Path>) -> Result<Manifest> {
    let path = chunk0.as_ref();
    let file = File::open(path).map_err(|e| ChunkError::io(path, e))?;
    let mut reader = BufReader::new(file);
    Manifest::read_from(&mut reader, path).map(|(manifest, _)| manifest)
}
