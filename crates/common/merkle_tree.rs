//! Ordered Merkle tree over Keccak-256 hashes.
//!
//! Derived roots commit to *ordered* item lists, so sibling pairs are hashed
//! in position order and an odd tail node is promoted to the next level
//! unchanged. The empty list hashes to Keccak-256 of the empty string; the
//! empty-root sentinels in `types::block` are derived from that value.

use crate::H256;
use stratus_crypto::keccak::{Keccak256, keccak_hash};

/// Compute the ordered Merkle root of `hashes`.
pub fn compute_merkle_root(hashes: &[H256]) -> H256 {
    match hashes {
        [] => H256(keccak_hash([])),
        [single] => *single,
        _ => {
            let mut current_level: Vec<H256> = hashes.to_vec();
            while current_level.len() > 1 {
                current_level = merkle_next_level(&current_level);
            }
            current_level.first().copied().unwrap_or_default()
        }
    }
}

fn merkle_next_level(level: &[H256]) -> Vec<H256> {
    let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
    for pair in level.chunks(2) {
        match pair {
            [left, right] => {
                let mut state = Keccak256::new();
                state.update(left);
                state.update(right);
                next_level.push(H256(state.finalize()));
            }
            [odd] => next_level.push(*odd),
            _ => {}
        }
    }
    next_level
}
