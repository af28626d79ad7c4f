//! Peer-driven sync driver.
//!
//! Two modes share one streaming engine. Bulk mode drains the best available
//! peers until none is ahead of the local chain; watch mode sits on the
//! registry's new-status signal and streams whenever a peer pulls ahead.
//! Every per-peer failure (stream errors, the per-block inactivity timeout,
//! verification and write failures) abandons that peer only; the driver keeps
//! going with the remaining candidates.

use crate::chain::Chain;
use crate::error::SyncError;
use crate::peer_registry::PeerRegistry;
use crate::progress::{ProgressionReporter, SyncProgression};
use crate::transport::PeerTransport;
use crate::types::{NoForkPeer, PeerEvent, PeerId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use stratus_common::types::{Block, BlockNumber};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default per-block inactivity window for peer block streams.
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables for the sync driver.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Per-block idle timeout. Expiry abandons the stream, not the driver.
    pub block_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
        }
    }
}

/// Outcome of streaming from a single peer.
#[derive(Debug)]
pub struct PeerSyncOutcome {
    /// Highest block written during the attempt; the local height at entry
    /// when nothing was written.
    pub last_synced: BlockNumber,
    /// The block callback asked to stop.
    pub should_terminate: bool,
    pub err: Option<SyncError>,
}

pub struct Syncer<C: Chain, T: PeerTransport> {
    chain: Arc<C>,
    transport: Arc<T>,
    peers: PeerRegistry,
    progression: ProgressionReporter,
    config: SyncConfig,
    cancel_token: CancellationToken,
}

impl<C: Chain, T: PeerTransport> Syncer<C, T> {
    pub fn new(
        chain: Arc<C>,
        transport: Arc<T>,
        config: SyncConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            chain,
            transport,
            peers: PeerRegistry::new(),
            progression: ProgressionReporter::new(),
            config,
            cancel_token,
        }
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    /// Snapshot of the sync operation in flight, if any.
    pub fn sync_progression(&self) -> Option<SyncProgression> {
        self.progression.get_sync_progression()
    }

    /// Starts the transport and the registry maintenance tasks: an initial
    /// population from the currently connected peers, a task consuming
    /// advertised-status updates, and a task consuming connection events.
    /// The tasks run until the cancellation token fires.
    pub async fn start(&self) -> Result<(), SyncError> {
        self.transport.start().await?;

        self.peers
            .put_peers(self.transport.get_connected_peer_statuses().await);

        let mut status_updates = self.transport.peer_status_updates();
        let peers = self.peers.clone();
        let token = self.cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    update = status_updates.recv() => match update {
                        Some(peer) => peers.put(peer),
                        None => break,
                    }
                }
            }
        });

        let mut events = self.transport.peer_events();
        let peers = self.peers.clone();
        let transport = self.transport.clone();
        let token = self.cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Some(PeerEvent::Connected(id)) => {
                            match transport.get_peer_status(id).await {
                                Ok(peer) => peers.put(peer),
                                Err(err) => {
                                    debug!(peer = %id, %err, "could not fetch status of connected peer");
                                }
                            }
                        }
                        Some(PeerEvent::Disconnected(id)) => peers.remove(&id),
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        });

        Ok(())
    }

    /// Cancels the driver and its registry tasks, then shuts the transport
    /// down.
    pub async fn close(&self) {
        self.cancel_token.cancel();
        self.transport.close().await;
    }

    /// Bulk (catch-up) sync.
    ///
    /// Repeatedly selects the best advertised peer ahead of the local chain
    /// and streams from it. Per-peer failures discard that peer for the rest
    /// of the run; the operation succeeds once no candidate remains, or ends
    /// early when `callback` returns true for a written block.
    pub async fn bulk_sync<F>(&self, mut callback: F) -> Result<(), SyncError>
    where
        F: FnMut(&Block) -> bool + Send,
    {
        let local = self.chain.header().number;
        self.progression
            .start_progression(local + 1, self.chain.subscribe_events());
        info!(from = local + 1, "bulk sync started");
        let result = self.bulk_sync_inner(&mut callback).await;
        self.progression.stop_progression();
        result
    }

    async fn bulk_sync_inner<F>(&self, callback: &mut F) -> Result<(), SyncError>
    where
        F: FnMut(&Block) -> bool + Send,
    {
        let mut discarded: HashSet<PeerId> = HashSet::new();
        loop {
            if self.cancel_token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let local = self.chain.header().number;
            let Some(peer) = self.best_peer_excluding(local, &discarded) else {
                info!(height = local, "bulk sync finished, no peer is ahead");
                return Ok(());
            };
            self.progression.update_highest_progression(peer.number);

            let outcome = self.sync_with_peer(&peer, callback).await;
            if let Some(err) = outcome.err {
                if !err.is_per_peer() {
                    return Err(err);
                }
                warn!(peer = %peer.id, %err, "sync against peer failed, trying another");
                discarded.insert(peer.id);
                continue;
            }
            if outcome.should_terminate {
                return Ok(());
            }
            // The stream ended cleanly short of the advertised height; a peer
            // that made no progress is not re-selected this run.
            if outcome.last_synced <= local {
                debug!(peer = %peer.id, "peer stream ended without progress");
                discarded.insert(peer.id);
            }
        }
    }

    /// Watch (steady-state) sync.
    ///
    /// Waits on the registry's new-status signal and streams from the best
    /// peer whenever one is ahead of the local chain. Returns once `callback`
    /// asks to stop; cancellation surfaces as [`SyncError::Cancelled`].
    pub async fn watch_sync<F>(&self, mut callback: F) -> Result<(), SyncError>
    where
        F: FnMut(&Block) -> bool + Send,
    {
        let local = self.chain.header().number;
        self.progression
            .start_progression(local + 1, self.chain.subscribe_events());
        let result = self.watch_sync_inner(&mut callback).await;
        self.progression.stop_progression();
        result
    }

    async fn watch_sync_inner<F>(&self, callback: &mut F) -> Result<(), SyncError>
    where
        F: FnMut(&Block) -> bool + Send,
    {
        let notifier = self.peers.new_status_notifier();
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => return Err(SyncError::Cancelled),
                _ = notifier.notified() => {}
            }

            let local = self.chain.header().number;
            let Some(peer) = self.peers.best_peer(local) else {
                continue;
            };
            self.progression.update_highest_progression(peer.number);

            let outcome = self.sync_with_peer(&peer, callback).await;
            if let Some(err) = outcome.err {
                if !err.is_per_peer() {
                    return Err(err);
                }
                debug!(peer = %peer.id, %err, "watch sync against peer failed");
            }
            if outcome.should_terminate {
                return Ok(());
            }
        }
    }

    /// Streams blocks from `peer` starting right above the local tip,
    /// verifying and writing each one.
    ///
    /// A per-block inactivity timer bounds every receive; expiry closes the
    /// stream and surfaces [`SyncError::Timeout`]. `callback` is evaluated
    /// exactly once per written block, and a true return stops the stream
    /// with `should_terminate` set. Errors never outlive the peer: the stream
    /// is closed and the outcome reports how far the chain advanced.
    pub async fn sync_with_peer<F>(&self, peer: &NoForkPeer, callback: &mut F) -> PeerSyncOutcome
    where
        F: FnMut(&Block) -> bool + Send,
    {
        let local = self.chain.header().number;
        let mut last_synced = local;
        debug!(peer = %peer.id, from = local + 1, "opening block stream");

        let mut stream = match self.transport.get_blocks(peer.id, local + 1).await {
            Ok(stream) => stream,
            Err(err) => {
                return PeerSyncOutcome {
                    last_synced,
                    should_terminate: false,
                    err: Some(err.into()),
                };
            }
        };

        loop {
            let received = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    stream.close();
                    self.close_stream(peer.id).await;
                    return PeerSyncOutcome {
                        last_synced,
                        should_terminate: false,
                        err: Some(SyncError::Cancelled),
                    };
                }
                received = timeout(self.config.block_timeout, stream.recv()) => received,
            };

            let block = match received {
                // The idle window elapsed without a block.
                Err(_) => {
                    stream.close();
                    self.close_stream(peer.id).await;
                    return PeerSyncOutcome {
                        last_synced,
                        should_terminate: false,
                        err: Some(SyncError::Timeout),
                    };
                }
                // Stream exhausted.
                Ok(None) => break,
                Ok(Some(block)) => block,
            };

            if let Err(err) = self.chain.verify_finalized_block(&block) {
                stream.close();
                self.close_stream(peer.id).await;
                return PeerSyncOutcome {
                    last_synced,
                    should_terminate: false,
                    err: Some(SyncError::Verify(err)),
                };
            }
            if let Err(err) = self.chain.write_block(&block).await {
                stream.close();
                self.close_stream(peer.id).await;
                return PeerSyncOutcome {
                    last_synced,
                    should_terminate: false,
                    err: Some(SyncError::Write(err)),
                };
            }
            last_synced = block.number();

            if callback(&block) {
                stream.close();
                self.close_stream(peer.id).await;
                return PeerSyncOutcome {
                    last_synced,
                    should_terminate: true,
                    err: None,
                };
            }
        }

        PeerSyncOutcome {
            last_synced,
            should_terminate: false,
            err: None,
        }
    }

    fn best_peer_excluding(
        &self,
        local: BlockNumber,
        discarded: &HashSet<PeerId>,
    ) -> Option<NoForkPeer> {
        let mut best: Option<NoForkPeer> = None;
        self.peers.range(|peer| {
            if peer.number > local
                && !discarded.contains(&peer.id)
                && best.as_ref().is_none_or(|current| peer.is_better(current))
            {
                best = Some(peer.clone());
            }
            true
        });
        best
    }

    async fn close_stream(&self, peer: PeerId) {
        if let Err(err) = self.transport.close_stream(peer).await {
            debug!(peer = %peer, %err, "failed to close block stream");
        }
    }
}
