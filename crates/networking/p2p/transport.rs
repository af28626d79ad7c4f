//! Contract for the peer transport the sync driver consumes.
//!
//! The wire protocol (peer RPC for headers, bodies, receipts and blocks),
//! dial management and fork filtering are implemented externally; the driver
//! only sees status snapshots, lifecycle events and per-peer block streams.

use crate::error::TransportError;
use crate::types::{NoForkPeer, PeerEvent, PeerId};
use async_trait::async_trait;
use stratus_common::types::{Block, BlockNumber};
use tokio::sync::mpsc;

/// A finite, non-restartable sequence of blocks streamed by one peer.
///
/// The stream cannot be rewound or re-opened at an earlier height; the driver
/// layers its per-block inactivity timeout on top of [`BlockStream::recv`]
/// and asks the transport for a fresh stream after any interruption.
pub struct BlockStream {
    receiver: mpsc::Receiver<Block>,
}

impl BlockStream {
    pub fn new(receiver: mpsc::Receiver<Block>) -> Self {
        Self { receiver }
    }

    /// Next block, or `None` once the peer closed the stream.
    pub async fn recv(&mut self) -> Option<Block> {
        self.receiver.recv().await
    }

    /// Stops accepting further blocks, letting the producer observe the
    /// closure.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    async fn start(&self) -> Result<(), TransportError>;

    async fn close(&self);

    async fn get_peer_status(&self, peer: PeerId) -> Result<NoForkPeer, TransportError>;

    async fn get_connected_peer_statuses(&self) -> Vec<NoForkPeer>;

    /// Opens a block stream from `peer` starting at height `start`.
    async fn get_blocks(
        &self,
        peer: PeerId,
        start: BlockNumber,
    ) -> Result<BlockStream, TransportError>;

    /// Advertised-status updates. The channel is taken once, by the driver's
    /// status task; later calls receive a closed channel.
    fn peer_status_updates(&self) -> mpsc::UnboundedReceiver<NoForkPeer>;

    /// Connection lifecycle events. Taken once, by the driver's event task.
    fn peer_events(&self) -> mpsc::UnboundedReceiver<PeerEvent>;

    /// Tears down the block stream currently open towards `peer`, if any.
    async fn close_stream(&self, peer: PeerId) -> Result<(), TransportError>;
}
