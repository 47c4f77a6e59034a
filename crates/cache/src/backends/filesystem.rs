//! Filesystem cache backend: one envelope file per key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use simbatch_core::{CacheBackend, SimResult, SimulationError};

/// On-disk envelope wrapping the value bytes with expiry bookkeeping.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    stored_at: DateTime<Utc>,
    ttl_seconds: Option<u64>,
    payload: Vec<u8>,
}

impl Envelope {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_seconds {
            Some(ttl) => now >= self.stored_at + chrono::Duration::seconds(ttl as i64),
            None => false,
        }
    }
}

/// Key/value backend persisting each entry as a bincode envelope under a
/// root directory. The key-to-filename mapping (`<key>.entry`) is stable:
/// keys are fingerprint hex digests, which are filesystem-safe by
/// construction. TTL'd entries are deleted lazily on read.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> SimResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.entry"))
    }

    async fn read_envelope(&self, path: &Path) -> SimResult<Option<Envelope>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match bincode::deserialize(&bytes) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                // A corrupt entry is a miss; drop the file so it cannot
                // shadow a future write.
                warn!(path = %path.display(), error = %e, "corrupt cache entry, removing");
                let _ = tokio::fs::remove_file(path).await;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CacheBackend for FilesystemBackend {
    async fn get(&self, key: &str) -> SimResult<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        let Some(envelope) = self.read_envelope(&path).await? else {
            return Ok(None);
        };
        if envelope.is_expired(Utc::now()) {
            debug!(key = %key, "cache entry expired, removing");
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(envelope.payload))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> SimResult<()> {
        let envelope = Envelope {
            stored_at: Utc::now(),
            ttl_seconds: ttl.map(|d| d.as_secs()),
            payload: value.to_vec(),
        };
        let bytes = bincode::serialize(&envelope)
            .map_err(|e| SimulationError::Serialization(e.to_string()))?;
        // Write-then-rename keeps concurrent readers off half-written
        // entries; two processes racing on the same fingerprint both write
        // the same content, so last-rename-wins is benign.
        let tmp = self.root.join(format!("{key}.entry.tmp"));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, self.entry_path(key)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> SimResult<bool> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> SimResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn clear(&self) -> SimResult<()> {
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "entry").unwrap_or(false) {
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
        Ok(())
    }
}
