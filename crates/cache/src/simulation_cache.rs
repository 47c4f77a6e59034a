//! The cache entry point composing hasher, result store and index.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use simbatch_core::{
    CacheBackend, CacheBackendKind, CacheConfig, SimResult, SimulationOutcome, SimulationRequest,
    TimeSeries,
};

use crate::backends::{FilesystemBackend, MemoryBackend};
use crate::hasher::{ContentHasher, FileHashPolicy};
use crate::record::CacheRecord;
use crate::store::{codec_for, ResultStore, StoreStats, StoredResult};

/// Hit/miss counters plus store size, returned by [`SimulationCache::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Single entry point for "get cached result for (model, params)" and
/// "store result for (model, params)".
///
/// The index backend is an advisory existence/TTL gate in front of the
/// result store; the store stays authoritative. A gate miss can also mean
/// the index entry was lost (failed write, cleared index directory), so
/// lookups fall through to the store and a store hit repairs the gate.
/// Freshness on that path comes from the payload's own write time.
///
/// With `enabled = false` every lookup returns `None`, every write is a
/// no-op returning an empty fingerprint, and no storage directory is ever
/// created.
pub struct SimulationCache {
    inner: Option<CacheInner>,
    counters: RwLock<Counters>,
}

struct CacheInner {
    hasher: ContentHasher,
    store: ResultStore,
    index: Option<Arc<dyn CacheBackend>>,
    default_ttl: Option<Duration>,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    sets: u64,
}

impl CacheInner {
    /// Payload-age freshness check for lookups that bypassed the gate.
    fn is_stale(&self, stored: &StoredResult, now: DateTime<Utc>) -> bool {
        match (self.default_ttl, stored.stored_at) {
            (Some(ttl), Some(stored_at)) => {
                now >= stored_at + chrono::Duration::seconds(ttl.as_secs() as i64)
            }
            _ => false,
        }
    }

    /// Write the index record for a stored payload. Failure is not an
    /// error: the store holds the payload, so the next lookup still
    /// reaches it through the fall-through path.
    async fn write_index_entry(&self, request: &SimulationRequest, fingerprint: &str) {
        let Some(index) = &self.index else { return };
        let record = CacheRecord::new(
            fingerprint,
            request.model.path(),
            request.parameters.clone(),
            self.default_ttl.map(|d| d.as_secs()),
        );
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = index.set(fingerprint, &bytes, self.default_ttl).await {
                    warn!(fingerprint = %fingerprint, error = %e, "cache index write failed");
                }
            }
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "cache record serialization failed")
            }
        }
    }
}

impl SimulationCache {
    /// Build the cache subsystem from configuration: store directory,
    /// codec, index backend and hashing policy all come from `config`.
    pub fn from_config(config: &CacheConfig) -> SimResult<Self> {
        if !config.enabled {
            return Ok(Self {
                inner: None,
                counters: RwLock::new(Counters::default()),
            });
        }

        let policy = if config.strict_file_hashing {
            FileHashPolicy::Strict
        } else {
            FileHashPolicy::Lenient
        };
        let hasher = ContentHasher::new(
            config.ignored_keys.iter().cloned(),
            config.include_file_content,
            policy,
        );

        let store = ResultStore::new(config.root_dir.join("results"), codec_for(config.codec))?;

        let index: Arc<dyn CacheBackend> = match config.backend {
            CacheBackendKind::Filesystem => {
                Arc::new(FilesystemBackend::new(config.root_dir.join("index"))?)
            }
            CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
        };

        Ok(Self {
            inner: Some(CacheInner {
                hasher,
                store,
                index: Some(index),
                default_ttl: config.default_ttl_seconds.map(Duration::from_secs),
            }),
            counters: RwLock::new(Counters::default()),
        })
    }

    /// Assemble an enabled cache from explicit parts (tests, custom
    /// backends).
    pub fn new(
        hasher: ContentHasher,
        store: ResultStore,
        index: Option<Arc<dyn CacheBackend>>,
        default_ttl: Option<Duration>,
    ) -> Self {
        Self {
            inner: Some(CacheInner {
                hasher,
                store,
                index,
                default_ttl,
            }),
            counters: RwLock::new(Counters::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Look up a previously computed result for this request.
    pub async fn get_cached_result(
        &self,
        request: &SimulationRequest,
    ) -> SimResult<Option<SimulationOutcome>> {
        let Some(inner) = &self.inner else {
            return Ok(None);
        };
        let fingerprint = inner
            .hasher
            .compute_hash(&request.model, &request.effective_parameters())?;

        let mut gate_missed = false;
        if let Some(index) = &inner.index {
            match index.exists(&fingerprint).await {
                Ok(true) => {}
                Ok(false) => gate_missed = true,
                Err(e) => warn!(error = %e, "cache index lookup failed, falling through to store"),
            }
        }

        match inner.store.load(&fingerprint).await? {
            Some(stored) => {
                if gate_missed {
                    if inner.is_stale(&stored, Utc::now()) {
                        debug!(fingerprint = %fingerprint, "stored payload past its TTL, treating as miss");
                        self.counters.write().await.misses += 1;
                        return Ok(None);
                    }
                    debug!(fingerprint = %fingerprint, "store hit without index entry, repairing gate");
                    inner.write_index_entry(request, &fingerprint).await;
                }
                self.counters.write().await.hits += 1;
                debug!(fingerprint = %fingerprint, "cache hit");
                let mut outcome = SimulationOutcome::success(stored.timeseries, 0.0).from_cache();
                outcome.metadata = stored.metadata;
                Ok(Some(outcome))
            }
            None => {
                self.counters.write().await.misses += 1;
                Ok(None)
            }
        }
    }

    /// Persist a computed result, returning the fingerprint it was stored
    /// under (empty string when caching is disabled).
    pub async fn cache_result(
        &self,
        request: &SimulationRequest,
        timeseries: &TimeSeries,
        metadata: &std::collections::HashMap<String, serde_json::Value>,
    ) -> SimResult<String> {
        let Some(inner) = &self.inner else {
            return Ok(String::new());
        };
        let fingerprint = inner
            .hasher
            .compute_hash(&request.model, &request.effective_parameters())?;

        inner.store.store(&fingerprint, timeseries, metadata).await?;
        inner.write_index_entry(request, &fingerprint).await;

        self.counters.write().await.sets += 1;
        info!(fingerprint = %fingerprint, model = %request.model.name, "cached simulation result");
        Ok(fingerprint)
    }

    /// Drop the cached result for this request, returning whether one existed.
    pub async fn invalidate(&self, request: &SimulationRequest) -> SimResult<bool> {
        let Some(inner) = &self.inner else {
            return Ok(false);
        };
        let fingerprint = inner
            .hasher
            .compute_hash(&request.model, &request.effective_parameters())?;
        if let Some(index) = &inner.index {
            let _ = index.delete(&fingerprint).await;
        }
        inner.store.remove(&fingerprint).await
    }

    /// Drop every cached result.
    pub async fn clear_all(&self) -> SimResult<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        if let Some(index) = &inner.index {
            index.clear().await?;
        }
        inner.store.clear().await
    }

    pub async fn stats(&self) -> SimResult<CacheStats> {
        let StoreStats {
            entry_count,
            total_bytes,
        } = match &self.inner {
            Some(inner) => inner.store.stats().await?,
            None => StoreStats::default(),
        };
        let counters = self.counters.read().await;
        Ok(CacheStats {
            entry_count,
            total_bytes,
            hits: counters.hits,
            misses: counters.misses,
            sets: counters.sets,
        })
    }
}
