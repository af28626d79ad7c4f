use crate::{Address, Bytes, H256};
use serde::{Deserialize, Serialize};
use stratus_crypto::keccak::Keccak256;

/// Result of executing one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub succeeded: bool,
    /// Cumulative gas used by this and all previous transactions in the block.
    pub cumulative_gas_used: u64,
    pub logs: Vec<Log>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

impl Receipt {
    pub fn new(succeeded: bool, cumulative_gas_used: u64, logs: Vec<Log>) -> Self {
        Self {
            succeeded,
            cumulative_gas_used,
            logs,
        }
    }

    pub fn hash(&self) -> H256 {
        let mut state = Keccak256::new();
        state.update([self.succeeded as u8]);
        state.update(self.cumulative_gas_used.to_be_bytes());
        for log in &self.logs {
            state.update(log.address);
            for topic in &log.topics {
                state.update(topic);
            }
            state.update(&log.data);
        }
        H256(state.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_change_the_hash() {
        let bare = Receipt::new(true, 21_000, vec![]);
        let logged = Receipt::new(
            true,
            21_000,
            vec![Log {
                address: Address::repeat_byte(1),
                topics: vec![H256::repeat_byte(2)],
                data: Bytes::from_static(b"event"),
            }],
        );
        assert_ne!(bare.hash(), logged.hash());
    }
}
