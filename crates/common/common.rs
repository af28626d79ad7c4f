// Keep H256, H160, Address from ethereum_types
pub use ethereum_types::{Address, H256, U256};

pub use bytes::Bytes;

pub mod merkle_tree;
pub mod types;

pub use types::InvalidBlockError;
