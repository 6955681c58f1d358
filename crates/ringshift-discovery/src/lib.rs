//! # ringshift Discovery
//!
//! Ring membership for ringshift.
//!
//! This crate provides:
//! - The 32-bit ring key space (`hash_key`, `in_range`, `Interval`)
//! - A msgpack-rpc client for the ring binary's peer interface
//! - File listings, both a peer's HTTP listing endpoint and the local directory
//!   view behind it
//!
//! ## Ownership
//!
//! A node with key `n` whose predecessor has key `p` owns every key in
//! `(p, n]`, wrapping through zero when `p >= n`:
//!
//! ```text
//!            0
//!        ┌───●───┐
//!      p ●       │   keys in (p, n] belong to n
//!        │       ● n
//!        └───────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ringshift_discovery::ring::{RingKey, hash_key, in_range};
//!
//! let key = hash_key("video.mp4");
//! assert!(in_range(RingKey(key.get().wrapping_sub(1)), key, key));
//! assert!(in_range(RingKey(4_000_000_000), RingKey(100), RingKey(500)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod listing;
pub mod ring;

pub use listing::{
    DEFAULT_LISTING_PORT, FileListing, FileMap, HttpListingClient, ListingBody, ListingError,
    list_local_files,
};
pub use ring::{
    DEFAULT_RING_PORT, Interval, NodeInfo, RingError, RingKey, RingPeer, RpcRingClient, hash_key,
    in_range,
};
