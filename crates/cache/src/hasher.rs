//! Content fingerprinting for simulation requests.

use std::collections::BTreeMap;
use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use simbatch_core::{ModelRef, SimResult, SimulationError};

/// Policy for hashing when the model file cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileHashPolicy {
    /// Proceed without the file bytes (the fingerprint still covers the
    /// canonical model string and the parameters).
    Lenient,
    /// Fail the hash computation with an error.
    Strict,
}

/// Derives a stable SHA-256 fingerprint from (model identity, model file
/// content, normalized parameter set).
///
/// The digest is fed, in order, with the model's canonical string form,
/// the raw model file bytes (optional, policy-controlled), and the JSON
/// serialization of the parameter map with ignored keys removed. Parameter
/// keys are serialized in lexicographic order, so insertion order never
/// affects the fingerprint.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    ignored_keys: HashSet<String>,
    include_file_content: bool,
    file_policy: FileHashPolicy,
}

impl ContentHasher {
    pub fn new(
        ignored_keys: impl IntoIterator<Item = String>,
        include_file_content: bool,
        file_policy: FileHashPolicy,
    ) -> Self {
        Self {
            ignored_keys: ignored_keys.into_iter().collect(),
            include_file_content,
            file_policy,
        }
    }

    /// Compute the lowercase hex fingerprint for a request.
    pub fn compute_hash(
        &self,
        model: &ModelRef,
        parameters: &BTreeMap<String, serde_json::Value>,
    ) -> SimResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(model.canonical_string().as_bytes());

        if self.include_file_content {
            match std::fs::read(model.path()) {
                Ok(bytes) => hasher.update(&bytes),
                Err(e) => match self.file_policy {
                    FileHashPolicy::Strict => {
                        return Err(SimulationError::InvalidParams(format!(
                            "model file {} is not readable: {e}",
                            model.path().display()
                        )));
                    }
                    FileHashPolicy::Lenient => {
                        warn!(
                            model = %model.path().display(),
                            error = %e,
                            "model file not readable, fingerprint computed without file content"
                        );
                    }
                },
            }
        }

        // BTreeMap serialization is already lexicographic; filtering borrows
        // into a second ordered map so ignored keys never reach the digest.
        let filtered: BTreeMap<&String, &serde_json::Value> = parameters
            .iter()
            .filter(|(k, _)| !self.ignored_keys.contains(*k))
            .collect();
        let param_json = serde_json::to_vec(&filtered)?;
        hasher.update(&param_json);

        let fingerprint = hex::encode(hasher.finalize());
        debug!(fingerprint = %fingerprint, model = %model.name, "computed content hash");
        Ok(fingerprint)
    }
}
