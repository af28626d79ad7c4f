//! # stratus block synchronization core
//!
//! The subsystem that acquires validated block data from untrusted remote
//! peers and installs it into the local chain in canonical order. Two engines
//! make up the core:
//!
//! - [`queue`]: the batched pipeline queue — an ordered sequence of
//!   contiguous height ranges, each holding independent, resumable fetches
//!   for headers, bodies and receipts. It dispenses work units to fetchers,
//!   validates every delivery against the hash chain and the committed
//!   roots, and releases completed contiguous prefixes to the caller.
//! - [`syncer`]: the peer-driven sync driver — a two-mode (bulk / watch)
//!   engine that selects candidate peers from the [`peer_registry`], streams
//!   blocks from one peer at a time, verifies and persists them through the
//!   [`chain`] collaborator, and fails over to another peer on mid-stream
//!   errors.
//!
//! The wire protocol, peer discovery and block execution are external: the
//! driver consumes them through the [`transport::PeerTransport`] and
//! [`chain::Chain`] contracts.

pub mod chain;
pub mod error;
pub mod peer_registry;
pub mod progress;
pub mod queue;
pub mod syncer;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ChainError, QueueError, SyncError, TransportError};
pub use peer_registry::PeerRegistry;
pub use queue::{BatchQueue, MAX_BATCH};
pub use syncer::{SyncConfig, Syncer};
pub use types::{NoForkPeer, PeerEvent, PeerId};
