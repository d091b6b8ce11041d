//! Stable 64-bit hashing over symbols, values, and byte buffers.
//!
//! Plan hashes are persisted in corpus files and trajectory fingerprints
//! gate corpus growth, so the hash must be identical across runs, processes,
//! and platforms. Uses xxh64 with seed 0 throughout.

use crate::symbol::Symbol;
use crate::value::Value;
use xxhash_rust::xxh64::{xxh64, Xxh64};

/// Hash a byte buffer in one shot.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    xxh64(bytes, 0)
}

/// A streaming hasher with helpers for the engine's folding conventions.
#[derive(Clone)]
pub struct StableHasher(Xxh64);

impl StableHasher {
    pub fn new() -> Self {
        StableHasher(Xxh64::new(0))
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn add_str(&mut self, s: &str) {
        self.0.update(s.as_bytes());
    }

    pub fn add_u64(&mut self, v: u64) {
        self.0.update(&v.to_le_bytes());
    }

    pub fn add_symbol(&mut self, s: &Symbol) {
        self.add_str(s.as_str());
    }

    /// Fold a value through its canonical textual form, so hashing agrees
    /// with serialization.
    pub fn add_value(&mut self, v: &Value) {
        self.add_str(&v.to_string());
    }

    /// Fold one `key=value` observation.
    pub fn add_key_value(&mut self, key: &Symbol, value: &Value) {
        self.add_symbol(key);
        self.add_str("=");
        self.add_value(value);
    }

    pub fn finish(&self) -> u64 {
        self.0.digest()
    }
}

impl Default for StableHasher {
    fn default() -> Self {
        Self::new()
    }
}
