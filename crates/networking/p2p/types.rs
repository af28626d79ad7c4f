use serde::{Deserialize, Serialize};
use stratus_common::{H256, U256};
use stratus_common::types::BlockNumber;

/// Identifier the transport assigns to a connected peer.
pub type PeerId = H256;

/// A connected peer advertising a chain tip on our chain.
///
/// Fork detection happens before a peer ever reaches the registry, so every
/// entry is assumed to extend the same history we do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoForkPeer {
    pub id: PeerId,
    /// Highest block number the peer advertises.
    pub number: BlockNumber,
    /// Opaque ordering key used to break ties between equal advertised
    /// heights; larger wins.
    pub distance: U256,
}

impl NoForkPeer {
    pub fn new(id: PeerId, number: BlockNumber, distance: U256) -> Self {
        Self {
            id,
            number,
            distance,
        }
    }

    /// Ordering used by best-peer selection: advertised height first, the
    /// distance metric as the tie break.
    pub fn is_better(&self, other: &NoForkPeer) -> bool {
        (self.number, self.distance) > (other.number, other.distance)
    }
}

/// Peer lifecycle notifications surfaced by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    FailedToConnect(PeerId),
    DialCompleted(PeerId),
    AddedToDialQueue(PeerId),
}
