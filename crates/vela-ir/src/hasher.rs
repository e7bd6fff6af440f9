//! Deterministic hasher for structural node identity.
//!
//! `FxHasher` is unseeded, so the same structure hashes identically across
//! processes and runs — the property plan caching relies on.

use rustc_hash::FxHasher;
use std::hash::Hasher;

pub struct ExprHasher {
    inner: FxHasher,
}

impl ExprHasher {
    pub fn new() -> Self {
        Self {
            inner: FxHasher::default(),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.inner.write(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.inner.write_u8(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.inner.write_u64(v);
    }

    pub fn write_usize(&mut self, v: usize) {
        self.inner.write_u64(v as u64);
    }

    pub fn finish(&self) -> u64 {
        self.inner.finish()
    }
}

impl Default for ExprHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for ExprHasher {
    fn finish(&self) -> u64 {
        self.inner.finish()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.inner.write(bytes);
    }
}
