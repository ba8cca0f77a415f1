//! Content hashing shared by every container for the `hash_code` prefilter.
//!
//! `ahash` is the teacher's choice of fast, non-cryptographic hash for
//! cache keys (`Cargo.toml`'s `ahash` dependency); kept here unchanged.

use std::hash::Hasher;

pub fn hash32(bytes: &[u8]) -> u32 {
    let mut hasher = ahash::AHasher::default();
    hasher.write(bytes);
    let full = hasher.finish();
    (full as u32) ^ ((full >> 32) as u32)
}
