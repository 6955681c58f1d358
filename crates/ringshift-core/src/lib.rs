//! # ringshift Core
//!
//! Node logic for ringshift: moving whole files between ring nodes as
//! chunk artifacts, and migrating the files a joining node now owns.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │               MigrationCoordinator                 │
//! │  bootstrap → enumerate → select → transfer → done  │
//! └──────┬───────────────┬───────────────┬─────────────┘
//!        │ RingPeer      │ FileListing   │
//!        ▼               ▼               ▼
//!   ring binary     listing endpoint   TransferAgent
//!                                        │ ChunkTransport
//!                                        ▼
//!                                   chunk codec (split / combine)
//! ```
//!
//! Nothing here retries on its own. Remote calls are bounded by timeouts and
//! callers may wrap them in a [`RetryPolicy`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod migration;
pub mod retry;
pub mod transfer;
pub mod transport;

pub use config::{DEFAULT_CHUNK_PORT, NetworkConfig, NodeConfig, TransferConfig};
pub use error::{NodeError, Result};
pub use migration::{
    FailedFile, MigratedFile, MigrationCoordinator, MigrationReport, RingConnector,
    RpcRingConnector, create_ring, join_ring, place_file, select_owned,
};
pub use retry::RetryPolicy;
pub use transfer::{ProgressFn, PushReport, TransferAgent, TransferReport};
pub use transport::{ChunkTransport, DirectoryChunkTransport, HttpChunkTransport, TransportError};
