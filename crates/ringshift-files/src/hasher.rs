//! BLAKE3 hashing for file integrity.

use crate::error::{ChunkError, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const READ_BUF: usize = 64 * 1024;

/// Hash an entire file, streaming, and return the hex digest
///
/// # Errors
///
/// Returns `Io` if the file cannot be read.
pub fn file_digest(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ChunkError::io(path, e))?;
    let mut reader = BufReader::with_capacity(READ_BUF, file);
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; READ_BUF];

    loop {
        let n = reader.read(&mut buf).map_err(|e| ChunkError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
