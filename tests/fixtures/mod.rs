//! Test fixtures

mod sim_ring;

pub use sim_ring::{SimRing, StoreListing, StoreTransport};
