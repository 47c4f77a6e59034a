//! Cache index record.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Small per-fingerprint record held by the cache index.
///
/// The record carries enough context to audit where a cached result came
/// from; the result payload itself lives in the result store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// 64-character lowercase hex SHA-256 digest.
    pub fingerprint: String,
    /// Model file the fingerprint was computed from.
    pub model_path: PathBuf,
    /// Parameter snapshot of the request. Keys the hasher ignores for the
    /// digest are still present here.
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Optional expiry for the index entry, in seconds.
    pub ttl_seconds: Option<u64>,
}

impl CacheRecord {
    pub fn new(
        fingerprint: impl Into<String>,
        model_path: impl Into<PathBuf>,
        parameters: BTreeMap<String, serde_json::Value>,
        ttl_seconds: Option<u64>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            model_path: model_path.into(),
            parameters,
            created_at: Utc::now(),
            ttl_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_round_trips_through_json() {
        let mut params = BTreeMap::new();
        params.insert("gain".to_string(), json!(1.5));
        let record = CacheRecord::new("ab12", "/models/m.fmu", params, Some(600));

        let bytes = serde_json::to_vec(&record).unwrap();
        let back: CacheRecord = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.fingerprint, "ab12");
        assert_eq!(back.ttl_seconds, Some(600));
        assert_eq!(back.parameters["gain"], json!(1.5));
    }
}
