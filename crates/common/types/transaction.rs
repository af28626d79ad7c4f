use crate::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use stratus_crypto::keccak::Keccak256;

/// Minimal transaction record.
///
/// Execution payloads are opaque to the sync core; a transaction only needs a
/// stable content hash so bodies can be checked against the transactions root
/// their header commits to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub nonce: u64,
    /// `None` for contract-creating transactions.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

impl Transaction {
    pub fn hash(&self) -> H256 {
        let mut state = Keccak256::new();
        state.update(self.nonce.to_be_bytes());
        match &self.to {
            Some(to) => state.update(to),
            None => state.update([0u8]),
        }
        state.update(self.value.to_big_endian());
        state.update(&self.data);
        H256(state.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_covers_every_field() {
        let base = Transaction {
            nonce: 1,
            to: Some(Address::repeat_byte(0xaa)),
            value: U256::from(10),
            data: Bytes::from_static(b"payload"),
        };
        let mut other = base.clone();
        other.nonce = 2;
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.to = None;
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.value = U256::from(11);
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.data = Bytes::from_static(b"other");
        assert_ne!(base.hash(), other.hash());
    }
}
