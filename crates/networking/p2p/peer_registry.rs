//! Concurrent registry of no-fork peers and the chain tips they advertise.
//!
//! Reads take a snapshot; iteration order is unspecified and snapshots are
//! not coherent with concurrent writers. Best-peer selection tolerates that
//! because the driver re-selects on every outer-loop iteration.

use crate::types::{NoForkPeer, PeerId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use stratus_common::types::BlockNumber;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<RwLock<HashMap<PeerId, NoForkPeer>>>,
    /// Wakes watch-mode syncs whenever any peer advertises a new status. The
    /// signal is coalesced and dropped when nobody is waiting.
    new_status: Arc<Notify>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PeerId, NoForkPeer>> {
        self.peers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PeerId, NoForkPeer>> {
        self.peers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Idempotent upsert. Fires the new-status signal.
    pub fn put(&self, peer: NoForkPeer) {
        trace!(peer = %peer.id, number = peer.number, "peer status update");
        self.write().insert(peer.id, peer);
        self.new_status.notify_one();
    }

    pub fn put_peers(&self, peers: Vec<NoForkPeer>) {
        for peer in peers {
            self.put(peer);
        }
    }

    pub fn remove(&self, id: &PeerId) {
        self.write().remove(id);
    }

    pub fn get(&self, id: &PeerId) -> Option<NoForkPeer> {
        self.read().get(id).cloned()
    }

    /// Visits a snapshot of the registry until `visit` returns false.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&NoForkPeer) -> bool,
    {
        let snapshot: Vec<NoForkPeer> = self.read().values().cloned().collect();
        for peer in &snapshot {
            if !visit(peer) {
                break;
            }
        }
    }

    /// The peer with the maximum (number, distance) whose advertised number
    /// exceeds `local_height`.
    pub fn best_peer(&self, local_height: BlockNumber) -> Option<NoForkPeer> {
        self.read()
            .values()
            .filter(|peer| peer.number > local_height)
            .max_by_key(|peer| (peer.number, peer.distance))
            .cloned()
    }

    /// True when at least one registered peer is ahead of `local_height`.
    pub fn has_sync_peer(&self, local_height: BlockNumber) -> bool {
        self.read().values().any(|peer| peer.number > local_height)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Handle used by watch-mode syncs to wait for the next status update.
    pub fn new_status_notifier(&self) -> Arc<Notify> {
        self.new_status.clone()
    }
}
