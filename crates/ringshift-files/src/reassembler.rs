//! Chunk reassembly on the receiving side.
//!
//! Chunks are consumed strictly in ordinal order. Each artifact is deleted right
//! after it has been read, and the output only becomes visible at its final
//! path once every chunk has been written and the digest (when present)
//! verified.

use crate::chunker::ChunkHandle;
use crate::error::{ChunkError, Result};
use crate::manifest::{Manifest, read_manifest};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writer adapter that hashes everything passing through it
struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
            written: 0,
        }
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Path used for the in-progress output
#[must_use]
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

/// Reassemble `chunks` into `output`
///
/// The chunk list must be non-empty, ordered and contiguous from ordinal 0,
/// and match the manifest's `total_chunks`; otherwise nothing is read or
/// deleted. Once reassembly starts, every listed artifact is deleted by the
/// time this returns, whether it succeeds or not.
///
/// Returns the manifest read from chunk 0.
///
/// # Errors
///
/// - `NoChunks` / `NonContiguous` / `Incomplete` for an unusable chunk list
/// - `ManifestFormat` if chunk 0 has no valid manifest line
/// - `DigestMismatch` if the reassembled bytes do not match the manifest digest
/// - `Io` for filesystem failures
pub fn combine(chunks: &[ChunkHandle], output: impl AsRef<Path>) -> Result<Manifest> {
    let output = output.as_ref();

    let first = chunks.first().ok_or(ChunkError::NoChunks)?;
    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.ordinal != position as u64 {
            return Err(ChunkError::NonContiguous {
                expected: position as u64,
                found: chunk.ordinal,
            });
        }
    }

    let manifest = read_manifest(&first.path)?;
    if manifest.total_chunks != chunks.len() as u64 {
        return Err(ChunkError::Incomplete {
            file: manifest.original_file_name,
            expected: manifest.total_chunks,
            actual: chunks.len() as u64,
        });
    }

    let partial = partial_path(output);
    let result = write_all_chunks(chunks, &partial).and_then(|(digest, written)| {
        if let Some(expected) = &manifest.digest {
            if !expected.eq_ignore_ascii_case(&digest) {
                return Err(ChunkError::DigestMismatch {
                    file: manifest.original_file_name.clone(),
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }
        fs::rename(&partial, output).map_err(|e| ChunkError::io(output, e))?;
        Ok(written)
    });

    match result {
        Ok(written) => {
            tracing::debug!(
                "Reassembled {} from {} chunk(s) ({} bytes) into {}",
                manifest.original_file_name,
                chunks.len(),
                written,
                output.display()
            );
            Ok(manifest)
        }
        Err(e) => {
            // Chunks not reached before the failure are discarded as well
            for chunk in chunks {
                let _ = chunk.remove();
            }
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

/// Write every chunk payload to `partial`, deleting each chunk after reading it.
///
/// Returns the hex digest and byte count of what was written.
fn write_all_chunks(chunks: &[ChunkHandle], partial: &Path) -> Result<(String, u64)> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(partial)
        .map_err(|e| ChunkError::io(partial, e))?;
    let mut out = HashingWriter::new(BufWriter::new(file));

    for chunk in chunks {
        let copied = copy_payload(chunk, &mut out);
        let removed = chunk.remove();
        copied?;
        removed?;
    }

    out.flush().map_err(|e| ChunkError::io(partial, e))?;
    let HashingWriter {
        inner,
        hasher,
        written,
    } = out;
    let file = inner
        .into_inner()
        .map_err(|e| ChunkError::io(partial, e.into_error()))?;
    file.sync_all().map_err(|e| ChunkError::io(partial, e))?;

    Ok((hasher.finalize().to_hex().to_string(), written))
}

fn copy_payload<W: Write>(chunk: &ChunkHandle, out: &mut W) -> Result<u64> {
    let file = File::open(&chunk.path).map_err(|e| ChunkError::io(&chunk.path, e))?;
    let mut reader = BufReader::new(file);

    if chunk.is_first() {
        let (manifest, _) = Manifest::read_from(&mut reader, &chunk.path)?;
        tracing::trace!("Stripped manifest line: {:?}", manifest);
    }

    io::copy(&mut reader, out).map_err(|e| ChunkError::io(&chunk.path, e))
}
