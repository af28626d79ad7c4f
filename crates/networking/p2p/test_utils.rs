//! Shared test fixtures: deterministic header chains, an in-memory chain
//! collaborator and a scriptable peer transport.
//!
//! Compiled for this crate's own tests and, behind the `test-utils` feature,
//! for downstream integration tests.

use crate::chain::{Chain, ChainEvent};
use crate::error::{ChainError, TransportError};
use crate::transport::{BlockStream, PeerTransport};
use crate::types::{NoForkPeer, PeerEvent, PeerId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use stratus_common::types::{
    Block, BlockBody, BlockHash, BlockHeader, BlockNumber, EMPTY_RECEIPTS_ROOT,
    EMPTY_TRANSACTIONS_ROOT, EMPTY_UNCLES_HASH, Receipt, Transaction, compute_receipts_root,
    compute_transactions_root, compute_uncles_hash,
};
use stratus_common::{Bytes, U256};
use tokio::sync::{broadcast, mpsc};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Header committing to no transactions, uncles or receipts.
pub fn empty_root_header(number: BlockNumber, parent_hash: BlockHash) -> BlockHeader {
    BlockHeader {
        number,
        parent_hash,
        transactions_root: *EMPTY_TRANSACTIONS_ROOT,
        uncles_hash: *EMPTY_UNCLES_HASH,
        receipts_root: *EMPTY_RECEIPTS_ROOT,
        timestamp: number,
        extra_data: Bytes::new(),
    }
}

/// `count` chained empty-payload headers starting at `start`, on top of the
/// tip identified by `head`.
pub fn header_chain(head: BlockHash, start: BlockNumber, count: usize) -> Vec<BlockHeader> {
    variant_header_chain(head, start, count, b"")
}

/// Like [`header_chain`], with `extra` mixed into every header so two
/// variants of the same range end on different hashes.
pub fn variant_header_chain(
    head: BlockHash,
    start: BlockNumber,
    count: usize,
    extra: &[u8],
) -> Vec<BlockHeader> {
    let mut headers = Vec::with_capacity(count);
    let mut parent_hash = head;
    for number in start..start + count as u64 {
        let mut header = empty_root_header(number, parent_hash);
        header.extra_data = Bytes::copy_from_slice(extra);
        parent_hash = header.hash();
        headers.push(header);
    }
    headers
}

/// A block together with the payloads its header commits to.
#[derive(Clone, Debug)]
pub struct PayloadBlock {
    pub header: BlockHeader,
    pub body: BlockBody,
    pub receipts: Vec<Receipt>,
}

/// `count` chained blocks carrying one transaction and one receipt each.
pub fn payload_chain(head: BlockHash, start: BlockNumber, count: usize) -> Vec<PayloadBlock> {
    let mut blocks = Vec::with_capacity(count);
    let mut parent_hash = head;
    for number in start..start + count as u64 {
        let body = BlockBody {
            transactions: vec![Transaction {
                nonce: number,
                to: None,
                value: U256::from(number),
                data: Bytes::new(),
            }],
            uncles: vec![],
        };
        let receipts = vec![Receipt::new(true, 21_000 * number, vec![])];
        let header = BlockHeader {
            number,
            parent_hash,
            transactions_root: compute_transactions_root(&body.transactions),
            uncles_hash: compute_uncles_hash(&body.uncles),
            receipts_root: compute_receipts_root(&receipts),
            timestamp: number,
            extra_data: Bytes::new(),
        };
        parent_hash = header.hash();
        blocks.push(PayloadBlock {
            header,
            body,
            receipts,
        });
    }
    blocks
}

/// `count` chained empty blocks starting at `start`, on top of `head`.
pub fn block_chain(head: BlockHash, start: BlockNumber, count: usize) -> Vec<Block> {
    header_chain(head, start, count)
        .into_iter()
        .map(|header| Block::new(header, BlockBody::empty()))
        .collect()
}

/// Chain collaborator backed by a vector of blocks.
pub struct InMemoryChain {
    blocks: Mutex<Vec<Block>>,
    events: broadcast::Sender<ChainEvent>,
    verify_failures: Mutex<Vec<BlockNumber>>,
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChain {
    /// Chain holding only the genesis block.
    pub fn new() -> Self {
        let genesis = Block::new(empty_root_header(0, BlockHash::zero()), BlockBody::empty());
        let (events, _) = broadcast::channel(64);
        Self {
            blocks: Mutex::new(vec![genesis]),
            events,
            verify_failures: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the next verification of block `number` to fail.
    pub fn fail_verification_once(&self, number: BlockNumber) {
        lock(&self.verify_failures).push(number);
    }

    /// Numbers of the non-genesis blocks written so far, in write order.
    pub fn written_numbers(&self) -> Vec<BlockNumber> {
        lock(&self.blocks)
            .iter()
            .skip(1)
            .map(Block::number)
            .collect()
    }

    pub fn tip_number(&self) -> BlockNumber {
        self.header().number
    }
}

#[async_trait]
impl Chain for InMemoryChain {
    fn header(&self) -> BlockHeader {
        match lock(&self.blocks).last() {
            Some(block) => block.header.clone(),
            None => unreachable!("the chain always holds at least genesis"),
        }
    }

    fn get_block_by_number(&self, number: BlockNumber, _full: bool) -> Option<Block> {
        lock(&self.blocks).get(number as usize).cloned()
    }

    fn verify_finalized_block(&self, block: &Block) -> Result<(), ChainError> {
        let mut failures = lock(&self.verify_failures);
        if let Some(position) = failures.iter().position(|n| *n == block.number()) {
            failures.remove(position);
            return Err(ChainError::Custom(format!(
                "scripted verification failure for block {}",
                block.number()
            )));
        }
        Ok(())
    }

    async fn write_block(&self, block: &Block) -> Result<(), ChainError> {
        let mut blocks = lock(&self.blocks);
        let tip_hash = match blocks.last() {
            Some(tip) => tip.hash(),
            None => unreachable!("the chain always holds at least genesis"),
        };
        if block.header.parent_hash != tip_hash {
            return Err(ChainError::NonCanonicalParent);
        }
        blocks.push(block.clone());
        let _ = self.events.send(ChainEvent::NewHead {
            number: block.number(),
        });
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }
}

struct PeerScript {
    status: NoForkPeer,
    blocks: Vec<Block>,
    block_delay: Duration,
}

/// Scriptable transport: every registered peer owns the chain of blocks it
/// can stream, optionally spaced out in time.
pub struct MockTransport {
    scripts: Mutex<HashMap<PeerId, PeerScript>>,
    status_tx: mpsc::UnboundedSender<NoForkPeer>,
    status_rx: Mutex<Option<mpsc::UnboundedReceiver<NoForkPeer>>>,
    event_tx: mpsc::UnboundedSender<PeerEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<PeerEvent>>>,
    closed_streams: Mutex<Vec<PeerId>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            scripts: Mutex::new(HashMap::new()),
            status_tx,
            status_rx: Mutex::new(Some(status_rx)),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            closed_streams: Mutex::new(Vec::new()),
        }
    }

    /// Registers a peer together with the blocks it can stream.
    pub fn add_peer(&self, status: NoForkPeer, blocks: Vec<Block>) {
        self.add_peer_with_delay(status, blocks, Duration::ZERO);
    }

    /// Like [`MockTransport::add_peer`], with a pause before every block.
    pub fn add_peer_with_delay(
        &self,
        status: NoForkPeer,
        blocks: Vec<Block>,
        block_delay: Duration,
    ) {
        lock(&self.scripts).insert(
            status.id,
            PeerScript {
                status,
                blocks,
                block_delay,
            },
        );
    }

    /// Pushes a status update through the driver's status channel.
    pub fn announce_status(&self, peer: NoForkPeer) {
        let _ = self.status_tx.send(peer);
    }

    /// Pushes a connection event through the driver's event channel.
    pub fn emit_event(&self, event: PeerEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Peers whose stream the driver explicitly closed.
    pub fn closed_streams(&self) -> Vec<PeerId> {
        lock(&self.closed_streams).clone()
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) {}

    async fn get_peer_status(&self, peer: PeerId) -> Result<NoForkPeer, TransportError> {
        lock(&self.scripts)
            .get(&peer)
            .map(|script| script.status.clone())
            .ok_or(TransportError::PeerNotFound(peer))
    }

    async fn get_connected_peer_statuses(&self) -> Vec<NoForkPeer> {
        lock(&self.scripts)
            .values()
            .map(|script| script.status.clone())
            .collect()
    }

    async fn get_blocks(
        &self,
        peer: PeerId,
        start: BlockNumber,
    ) -> Result<BlockStream, TransportError> {
        let (blocks, block_delay) = {
            let scripts = lock(&self.scripts);
            let script = scripts
                .get(&peer)
                .ok_or(TransportError::PeerNotFound(peer))?;
            let blocks: Vec<Block> = script
                .blocks
                .iter()
                .filter(|block| block.number() >= start)
                .cloned()
                .collect();
            (blocks, script.block_delay)
        };

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for block in blocks {
                if !block_delay.is_zero() {
                    tokio::time::sleep(block_delay).await;
                }
                if tx.send(block).await.is_err() {
                    break;
                }
            }
        });
        Ok(BlockStream::new(rx))
    }

    fn peer_status_updates(&self) -> mpsc::UnboundedReceiver<NoForkPeer> {
        lock(&self.status_rx).take().unwrap_or_else(|| {
            let (_tx, rx) = mpsc::unbounded_channel();
            rx
        })
    }

    fn peer_events(&self) -> mpsc::UnboundedReceiver<PeerEvent> {
        lock(&self.event_rx).take().unwrap_or_else(|| {
            let (_tx, rx) = mpsc::unbounded_channel();
            rx
        })
    }

    async fn close_stream(&self, peer: PeerId) -> Result<(), TransportError> {
        lock(&self.closed_streams).push(peer);
        Ok(())
    }
}
