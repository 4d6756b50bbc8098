// src/cache/mod.rs

//! Execution cache: content fingerprints of container tasks and the stores
//! that map them to previously recorded outputs.

pub mod fingerprint;
pub mod store;

pub use fingerprint::{CacheKey, compute_fingerprint, hash_str, to_canonical_json};
pub use store::{CacheStore, FileCacheStore, MemoryCacheStore};
