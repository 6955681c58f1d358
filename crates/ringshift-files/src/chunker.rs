//! File chunking into on-disk chunk artifacts.
//!
//! Chunk artifacts are named `<name>.chunk<ordinal>` and written into a caller
//! supplied directory, normally the working directory of a single transfer.

use crate::chunk_count;
use crate::error::{ChunkError, Result};
use crate::hasher::file_digest;
use crate::manifest::Manifest;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// A chunk artifact on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHandle {
    /// Position of the chunk within the file, starting at 0
    pub ordinal: u64,
    /// Location of the artifact
    pub path: PathBuf,
}

impl ChunkHandle {
    /// Create a handle
    #[must_use]
    pub fn new(ordinal: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            ordinal,
            path: path.into(),
        }
    }

    /// Whether this is chunk 0 (the one carrying the manifest)
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.ordinal == 0
    }

    /// Artifact file name (`<name>.chunk<ordinal>`)
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Delete the artifact. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Io` for any failure other than `NotFound`.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChunkError::io(&self.path, e)),
        }
    }
}

/// Artifact name for chunk `ordinal` of `file_name`
#[must_use]
pub fn chunk_file_name(file_name: &str, ordinal: u64) -> String {
    format!("{file_name}.chunk{ordinal}")
}

/// Split an artifact name back into `(file_name, ordinal)`
///
/// Returns `None` for names that are not chunk artifacts.
#[must_use]
pub fn parse_chunk_ordinal(artifact: &str) -> Option<(&str, u64)> {
    let (name, ordinal) = artifact.rsplit_once(".chunk")?;
    if name.is_empty() || ordinal.is_empty() || !ordinal.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((name, ordinal.parse().ok()?))
}

/// Sequential fixed-size reader over a file
pub struct FileChunker {
    reader: BufReader<File>,
    path: PathBuf,
    chunk_size: usize,
    total_size: u64,
    current_offset: u64,
}

impl FileChunker {
    /// Open a file for chunking
    ///
    /// # Errors
    ///
    /// Returns `InvalidChunkSize` for a zero chunk size and `Io` if the file
    /// cannot be opened or its metadata read.
    pub fn new(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize(chunk_size));
        }

        let file = File::open(path).map_err(|e| ChunkError::io(path, e))?;
        let metadata = file.metadata().map_err(|e| ChunkError::io(path, e))?;
        if !metadata.is_file() {
            return Err(ChunkError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        Ok(Self {
            reader: BufReader::with_capacity(chunk_size.min(1024 * 1024), file),
            path: path.to_path_buf(),
            chunk_size,
            total_size: metadata.len(),
            current_offset: 0,
        })
    }

    /// Total number of chunks, never less than one
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        chunk_count(self.total_size, self.chunk_size)
    }

    /// Read the next chunk's payload, `None` once the file is exhausted
    ///
    /// # Errors
    ///
    /// Returns `Io` if reading fails or the file shrinks while being read.
    pub fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.current_offset >= self.total_size {
            return Ok(None);
        }

        let remaining = self.total_size - self.current_offset;
        let chunk_len = remaining.min(self.chunk_size as u64) as usize;
        let mut buffer = vec![0u8; chunk_len];
        self.reader
            .read_exact(&mut buffer)
            .map_err(|e| ChunkError::io(&self.path, e))?;
        self.current_offset += chunk_len as u64;

        Ok(Some(buffer))
    }
}

/// Split `path` into chunk artifacts inside `out_dir`
///
/// Chunk 0 starts with the manifest line (file base name, chunk count, BLAKE3
/// digest). A zero-byte file produces a single manifest-only chunk. On error,
/// every artifact written by this call is removed again.
///
/// # Errors
///
/// Returns `InvalidChunkSize` for a zero chunk size, `ManifestFormat` if the
/// base name is not representable in a manifest, and `Io` for filesystem
/// failures.
pub fn split(
    path: impl AsRef<Path>,
    chunk_size: usize,
    out_dir: impl AsRef<Path>,
) -> Result<Vec<ChunkHandle>> {
    let path = path.as_ref();
    let out_dir = out_dir.as_ref();

    let mut chunker = FileChunker::new(path, chunk_size)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ChunkError::ManifestFormat(format!("unusable file name: {}", path.display()))
        })?
        .to_string();

    let total_chunks = chunker.num_chunks();
    let manifest = Manifest::new(name.as_str(), total_chunks).with_digest(file_digest(path)?);
    let header = manifest.to_line()?;

    let mut handles = Vec::with_capacity(total_chunks as usize);
    if let Err(e) = write_chunks(&mut chunker, &name, &header, out_dir, &mut handles) {
        for handle in &handles {
            let _ = handle.remove();
        }
        return Err(e);
    }

    tracing::debug!(
        "Split {} into {} chunk(s) of up to {} bytes",
        name,
        total_chunks,
        chunk_size
    );

    Ok(handles)
}

fn write_chunks(
    chunker: &mut FileChunker,
    name: &str,
    header: &[u8],
    out_dir: &Path,
    handles: &mut Vec<ChunkHandle>,
) -> Result<()> {
    for ordinal in 0..chunker.num_chunks() {
        let payload = chunker.read_chunk()?.unwrap_or_default();
        let handle = ChunkHandle::new(ordinal, out_dir.join(chunk_file_name(name, ordinal)));
        // Registered before writing so a half-written artifact is cleaned up too
        handles.push(handle.clone());

        let mut out = File::create(&handle.path).map_err(|e| ChunkError::io(&handle.path, e))?;
        if handle.is_first() {
            out.write_all(header)
                .map_err(|e| ChunkError::io(&handle.path, e))?;
        }
        out.write_all(&payload)
            .map_err(|e| ChunkError::io(&handle.path, e))?;
        out.flush().map_err(|e| ChunkError::io(&handle.path, e))?;
    }
    Ok(())
}
