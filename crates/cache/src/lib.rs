//! simbatch-cache
//!
//! Result caching for simulation runs: content fingerprinting, a
//! pluggable result store, key/value index backends with lazy TTL
//! expiry, and the composed [`SimulationCache`] entry point.

pub mod backends;
pub mod hasher;
pub mod record;
pub mod simulation_cache;
pub mod store;

pub use backends::{FilesystemBackend, MemoryBackend};
pub use hasher::{ContentHasher, FileHashPolicy};
pub use record::CacheRecord;
pub use simulation_cache::{CacheStats, SimulationCache};
pub use store::{codec_for, ResultStore, StoreStats, StoredResult, TimeseriesCodec};
