//! Result store: per-fingerprint timeseries payload plus metadata sidecar.

pub mod codec;

pub use codec::{codec_for, BincodeCodec, DelimitedCodec, JsonCodec, TimeseriesCodec};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use simbatch_core::{SimResult, SimulationError, TimeSeries};

/// Metadata sidecar document stored next to each payload file.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataDocument {
    fingerprint: String,
    stored_at: DateTime<Utc>,
    metadata: HashMap<String, serde_json::Value>,
}

/// Aggregate size of the store, reported by [`ResultStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entry_count: usize,
    pub total_bytes: u64,
}

/// A loaded result together with its sidecar contents.
#[derive(Debug)]
pub struct StoredResult {
    pub timeseries: TimeSeries,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Write time from the sidecar; None when the sidecar is missing or
    /// corrupt.
    pub stored_at: Option<DateTime<Utc>>,
}

/// Persists simulation outputs keyed by fingerprint.
///
/// Layout: `<root>/<fingerprint>.<ext>` for the timeseries payload (codec
/// dependent) and `<root>/<fingerprint>.meta.json` for the metadata
/// document. The fingerprint-to-filename mapping is stable for a given
/// hash algorithm choice. A missing or corrupt payload on load is a cache
/// miss, never an error surfaced to the caller.
pub struct ResultStore {
    root: PathBuf,
    codec: Box<dyn TimeseriesCodec>,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>, codec: Box<dyn TimeseriesCodec>) -> SimResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, codec })
    }

    fn payload_path(&self, fingerprint: &str) -> PathBuf {
        self.root
            .join(format!("{fingerprint}.{}", self.codec.extension()))
    }

    fn metadata_path(&self, fingerprint: &str) -> PathBuf {
        self.root.join(format!("{fingerprint}.meta.json"))
    }

    /// Store a result. Overwrites of the same fingerprint rewrite identical
    /// content by construction, so the race between two orchestrator
    /// processes computing the same request is benign.
    pub async fn store(
        &self,
        fingerprint: &str,
        timeseries: &TimeSeries,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> SimResult<()> {
        let payload = self.codec.encode(timeseries)?;
        let doc = MetadataDocument {
            fingerprint: fingerprint.to_string(),
            stored_at: Utc::now(),
            metadata: metadata.clone(),
        };
        let doc_bytes = serde_json::to_vec_pretty(&doc)?;

        write_atomic(&self.payload_path(fingerprint), &payload).await?;
        write_atomic(&self.metadata_path(fingerprint), &doc_bytes).await?;
        debug!(fingerprint = %fingerprint, bytes = payload.len(), "stored simulation result");
        Ok(())
    }

    /// Load a result; `Ok(None)` covers both "never stored" and "stored but
    /// unreadable/corrupt".
    pub async fn load(&self, fingerprint: &str) -> SimResult<Option<StoredResult>> {
        let payload = match tokio::fs::read(self.payload_path(fingerprint)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "result payload unreadable, treating as miss");
                return Ok(None);
            }
        };
        let timeseries = match self.codec.decode(&payload) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "result payload corrupt, treating as miss");
                return Ok(None);
            }
        };

        let (metadata, stored_at) = match tokio::fs::read(self.metadata_path(fingerprint)).await {
            Ok(bytes) => match serde_json::from_slice::<MetadataDocument>(&bytes) {
                Ok(doc) => (doc.metadata, Some(doc.stored_at)),
                Err(e) => {
                    warn!(fingerprint = %fingerprint, error = %e, "metadata sidecar corrupt, returning empty metadata");
                    (HashMap::new(), None)
                }
            },
            Err(_) => (HashMap::new(), None),
        };

        Ok(Some(StoredResult {
            timeseries,
            metadata,
            stored_at,
        }))
    }

    /// Remove a stored result, returning whether anything was deleted.
    pub async fn remove(&self, fingerprint: &str) -> SimResult<bool> {
        let had_payload = remove_if_exists(&self.payload_path(fingerprint)).await?;
        let _ = remove_if_exists(&self.metadata_path(fingerprint)).await?;
        Ok(had_payload)
    }

    /// Delete every stored result.
    pub async fn clear(&self) -> SimResult<()> {
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
        Ok(())
    }

    /// Count payload entries and total bytes (payloads + sidecars).
    pub async fn stats(&self) -> SimResult<StoreStats> {
        let mut stats = StoreStats::default();
        let payload_ext = self.codec.extension();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            stats.total_bytes += meta.len();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            // Sidecars end in .meta.json and must not count as payloads
            // even when the codec extension is also "json".
            if name.ends_with(&format!(".{payload_ext}")) && !name.ends_with(".meta.json") {
                stats.entry_count += 1;
            }
        }
        Ok(stats)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> SimResult<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(SimulationError::from)
}

async fn remove_if_exists(path: &Path) -> SimResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
