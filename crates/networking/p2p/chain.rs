//! Contract for the local chain the sync driver writes into.
//!
//! Block execution, state transition and fork choice all live behind this
//! trait; the driver only reads the tip, verifies and appends.

use crate::error::ChainError;
use async_trait::async_trait;
use stratus_common::types::{Block, BlockHeader, BlockNumber};
use tokio::sync::broadcast;

/// Published by the chain collaborator when its canonical head moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    NewHead { number: BlockNumber },
}

#[async_trait]
pub trait Chain: Send + Sync + 'static {
    /// Current canonical tip.
    fn header(&self) -> BlockHeader;

    fn get_block_by_number(&self, number: BlockNumber, full: bool) -> Option<Block>;

    /// Consensus-verifies a block that is about to be written.
    fn verify_finalized_block(&self, block: &Block) -> Result<(), ChainError>;

    /// Appends a verified block to the canonical chain.
    async fn write_block(&self, block: &Block) -> Result<(), ChainError>;

    fn subscribe_events(&self) -> broadcast::Receiver<ChainEvent>;
}
