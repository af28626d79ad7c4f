use crate::merkle_tree::compute_merkle_root;
use crate::types::{Receipt, Transaction};
use crate::{Bytes, H256};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use stratus_crypto::keccak::Keccak256;
use thiserror::Error;

pub type BlockNumber = u64;
pub type BlockHash = H256;

lazy_static! {
    /// Root committed by headers whose block carries no transactions.
    pub static ref EMPTY_TRANSACTIONS_ROOT: H256 = compute_transactions_root(&[]);
    /// Hash committed by headers whose block carries no uncles.
    pub static ref EMPTY_UNCLES_HASH: H256 = compute_uncles_hash(&[]);
    /// Root committed by headers whose block produced no receipts.
    pub static ref EMPTY_RECEIPTS_ROOT: H256 = compute_receipts_root(&[]);
}

/// Immutable block header. Headers are content-addressed by [`BlockHeader::hash`]
/// and chained through `parent_hash`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: BlockNumber,
    pub parent_hash: BlockHash,
    pub transactions_root: H256,
    pub uncles_hash: H256,
    pub receipts_root: H256,
    pub timestamp: u64,
    pub extra_data: Bytes,
}

impl BlockHeader {
    pub fn hash(&self) -> BlockHash {
        let mut state = Keccak256::new();
        state.update(self.number.to_be_bytes());
        state.update(self.parent_hash);
        state.update(self.transactions_root);
        state.update(self.uncles_hash);
        state.update(self.receipts_root);
        state.update(self.timestamp.to_be_bytes());
        state.update(&self.extra_data);
        H256(state.finalize())
    }

    /// A header owns a body worth fetching iff it commits to at least one
    /// transaction or uncle.
    pub fn has_body(&self) -> bool {
        self.transactions_root != *EMPTY_TRANSACTIONS_ROOT
            || self.uncles_hash != *EMPTY_UNCLES_HASH
    }

    /// A header owns receipts worth fetching iff its receipts root is not the
    /// empty sentinel.
    pub fn has_receipts(&self) -> bool {
        self.receipts_root != *EMPTY_RECEIPTS_ROOT
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    pub transactions: Vec<Transaction>,
    pub uncles: Vec<BlockHeader>,
}

impl BlockBody {
    pub const fn empty() -> Self {
        Self {
            transactions: Vec::new(),
            uncles: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn new(header: BlockHeader, body: BlockBody) -> Self {
        Self { header, body }
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn number(&self) -> BlockNumber {
        self.header.number
    }
}

/// Ordered Merkle root over the transaction hashes.
pub fn compute_transactions_root(transactions: &[Transaction]) -> H256 {
    let hashes: Vec<H256> = transactions.iter().map(Transaction::hash).collect();
    compute_merkle_root(&hashes)
}

/// Ordered Merkle root over the receipt hashes.
pub fn compute_receipts_root(receipts: &[Receipt]) -> H256 {
    let hashes: Vec<H256> = receipts.iter().map(Receipt::hash).collect();
    compute_merkle_root(&hashes)
}

/// Commitment to the uncle list: Keccak over the concatenated uncle hashes.
pub fn compute_uncles_hash(uncles: &[BlockHeader]) -> H256 {
    let mut state = Keccak256::new();
    for uncle in uncles {
        state.update(uncle.hash());
    }
    H256(state.finalize())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidBlockError {
    #[error("transactions root does not match the one committed by the header")]
    TransactionsRootMismatch,
    #[error("uncles hash does not match the one committed by the header")]
    UnclesHashMismatch,
    #[error("receipts root does not match the one committed by the header")]
    ReceiptsRootMismatch,
}

/// Checks that `body` is the body `header` commits to.
pub fn validate_block_body(
    header: &BlockHeader,
    body: &BlockBody,
) -> Result<(), InvalidBlockError> {
    if compute_transactions_root(&body.transactions) != header.transactions_root {
        return Err(InvalidBlockError::TransactionsRootMismatch);
    }
    if compute_uncles_hash(&body.uncles) != header.uncles_hash {
        return Err(InvalidBlockError::UnclesHashMismatch);
    }
    Ok(())
}

/// Checks that `receipts` are the receipts `header` commits to.
pub fn validate_receipts(
    header: &BlockHeader,
    receipts: &[Receipt],
) -> Result<(), InvalidBlockError> {
    if compute_receipts_root(receipts) != header.receipts_root {
        return Err(InvalidBlockError::ReceiptsRootMismatch);
    }
    Ok(())
}
