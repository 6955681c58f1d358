//! # ringshift Files
//!
//! Chunk codec for the ringshift transfer protocol.
//!
//! This crate provides:
//! - Splitting a file into fixed-size chunk artifacts (`<name>.chunk<N>`)
//! - A one-line JSON manifest prepended to chunk 0
//! - Reassembly in strict ordinal order with immediate chunk cleanup
//! - BLAKE3 file digests for end-to-end integrity
//!
//! ## Chunk 0 layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┬────┬──────────────┐
//! │ {"original_file_name":"a.bin","total_chunks":3,...}      │ \n │ payload[0..C]│
//! └──────────────────────────────────────────────────────────┴────┴──────────────┘
//! ```
//!
//! Chunks `1..N-1` carry payload bytes only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod error;
pub mod hasher;
pub mod manifest;
pub mod reassembler;

pub use chunker::{ChunkHandle, chunk_file_name, parse_chunk_ordinal, split};
pub use error::{ChunkError, Result};
pub use hasher::file_digest;
pub use manifest::{Manifest, read_manifest};
pub use reassembler::combine;

/// Default chunk size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Upper bound for a configured chunk size (64 MiB).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Number of chunks needed for `file_size` bytes.
///
/// A zero-byte file still occupies one chunk, which carries only the manifest.
#[must_use]
pub fn chunk_count(file_size: u64, chunk_size: usize) -> u64 {
    file_size.div_ceil(chunk_size as u64).max(1)
}
