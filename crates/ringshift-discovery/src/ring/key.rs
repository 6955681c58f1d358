//! 32-bit ring key space.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Position on the 32-bit ring
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RingKey(pub u32);

impl RingKey {
    /// Raw key value
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for RingKey {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for RingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ring key of a file name
///
/// MD5 of the UTF-8 name, keeping the low 32 bits of the digest read as a
/// big-endian integer. This is what the ring tooling and the listing endpoint
/// report, so it must not change.
#[must_use]
pub fn hash_key(name: &str) -> RingKey {
    let digest = Md5::digest(name.as_bytes());
    let mut tail = [0u8; 4];
    tail.copy_from_slice(&digest[12..16]);
    RingKey(u32::from_be_bytes(tail))
}

/// Whether `candidate` lies in the circular interval `(predecessor, node]`
///
/// When `predecessor > node` the interval wraps through zero. When the two
/// are equal the interval is the whole ring minus that single point.
#[must_use]
pub fn in_range(predecessor: RingKey, candidate: RingKey, node: RingKey) -> bool {
    let (p, c, n) = (predecessor.0, candidate.0, node.0);
    match p.cmp(&n) {
        Ordering::Less => p < c && c <= n,
        Ordering::Greater => c > p || c <= n,
        Ordering::Equal => c != p,
    }
}

/// The key range `(predecessor, node]` owned by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Exclusive lower bound
    pub predecessor: RingKey,
    /// Inclusive upper bound, the owning node's key
    pub node: RingKey,
}

impl Interval {
    /// Create an interval
    #[must_use]
    pub const fn new(predecessor: RingKey, node: RingKey) -> Self {
        Self { predecessor, node }
    }

    /// Membership test
    #[must_use]
    pub fn contains(&self, key: RingKey) -> bool {
        in_range(self.predecessor, key, self.node)
    }

    /// Whether the interval passes through key 0
    #[must_use]
    pub fn wraps(&self) -> bool {
        self.predecessor >= self.node
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.predecessor, self.node)
    }
}
