use crate::types::PeerId;
use stratus_common::InvalidBlockError;
use stratus_common::types::{BlockHash, BlockNumber};
use thiserror::Error;

/// Failures surfaced by the batch queue when a delivery cannot be accepted.
///
/// These are reported to the caller and never tear the queue down; unless an
/// operation explicitly transitions it, the affected track keeps the state it
/// had when the call was made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("delivery references unknown batch id {0}")]
    UnknownBatch(u32),
    #[error("{track} track of batch {id} is already completed")]
    AlreadyCompleted { id: u32, track: &'static str },
    #[error("batch {id} received {got} {track} but only has room for {room}")]
    TooManyItems {
        id: u32,
        track: &'static str,
        got: usize,
        room: usize,
    },
    #[error("header {number} must chain on parent {expected}, but links to {got}")]
    BadLinkage {
        number: BlockNumber,
        expected: BlockHash,
        got: BlockHash,
    },
    #[error("batch {id}, slot {number}: {source}")]
    RootMismatch {
        id: u32,
        number: BlockNumber,
        source: InvalidBlockError,
    },
}

/// Failures at the peer transport boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to open block stream: {0}")]
    StreamOpen(String),
    #[error("peer {0} is not connected")]
    PeerNotFound(PeerId),
    #[error("failed to close block stream: {0}")]
    StreamClose(String),
    #[error("transport is shut down")]
    Closed,
}

/// Failures reported by the chain collaborator.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] InvalidBlockError),
    #[error("block does not extend the canonical tip")]
    NonCanonicalParent,
    #[error("{0}")]
    Custom(String),
}

/// Driver-level error taxonomy.
///
/// Every kind except [`SyncError::Cancelled`] only disqualifies the peer the
/// driver is currently streaming from; the outer sync loops swallow it and
/// move on to the remaining candidates.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Peer(#[from] TransportError),
    #[error("no block received within the inactivity window")]
    Timeout,
    #[error("block verification failed: {0}")]
    Verify(ChainError),
    #[error("block write failed: {0}")]
    Write(ChainError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// True for errors that abandon the current peer but leave the driver
    /// running.
    pub fn is_per_peer(&self) -> bool {
        !matches!(self, SyncError::Cancelled)
    }
}
