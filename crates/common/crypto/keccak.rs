//! Keccak-256 hashing used for content addressing across the client.

use tiny_keccak::Hasher;

/// One-shot Keccak-256 over `data`.
pub fn keccak_hash(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut state = Keccak256::new();
    state.update(data);
    state.finalize()
}

/// Incremental Keccak-256 state.
#[derive(Clone)]
pub struct Keccak256 {
    state: tiny_keccak::Keccak,
}

impl Default for Keccak256 {
    fn default() -> Self {
        Self {
            state: tiny_keccak::Keccak::v256(),
        }
    }
}

impl Keccak256 {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        self.state.update(data.as_ref());
    }

    #[inline]
    pub fn finalize(self) -> [u8; 32] {
        let mut output = [0u8; 32];
        self.state.finalize(&mut output);
        output
    }
}
