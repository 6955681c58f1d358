//! Chord ring membership: key space and the ring peer RPC surface.

pub mod key;
pub mod peer;
pub mod rpc;

pub use key::{Interval, RingKey, hash_key, in_range};
pub use peer::{NodeInfo, RingError, RingPeer};
pub use rpc::{DEFAULT_RING_PORT, RpcRingClient};
