//! Ciphertext container of the clear backend.

use crate::backend::PackingScheme;

/// (payload, level) bound to the key set that produced it.
#[derive(Clone, Debug)]
pub struct Cipher {
    pub(crate) scheme: PackingScheme,
    pub(crate) payload: Vec<u128>, // length = ring_dim
    pub(crate) level: usize,       // ciphertext×ciphertext products so far
    pub(crate) key_id: u64,
}

impl Cipher {
    /// Packing discipline of the encrypted payload.
    pub fn scheme(&self) -> PackingScheme {
        self.scheme
    }

    /// Multiplicative level consumed so far.
    pub fn level(&self) -> usize {
        self.level
    }
}
