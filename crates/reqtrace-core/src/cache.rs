//! Content-addressable memoization of analyses.
//!
//! The key is `analysis:<version>:<sha256hex>`, where the digest covers the
//! base text, the updated text and the JSON encoding of the test table, in
//! that order, each prefixed with its byte length. Bumping the version orphans every earlier entry without
//! touching stored data.
//!
//! Entries hold the final classified [`AnalysisResult`], so a hit is returned
//! as-is. Writes are whole-value replaces on a key derived from the inputs;
//! a late write from an abandoned computation stores the same logical value.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::analyze::Analyzer;
use crate::error::Result;
use crate::models::AnalysisResult;
use crate::store::{analysis_key, KvStore};

/// Tag mixed into cache keys; bump when merge output changes shape or values.
pub const DEFAULT_ANALYSIS_VERSION: &str = "v3";

/// Freshness window of a cached analysis.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// SHA-256 hex digest over the three analysis inputs.
///
/// Each field is length-prefixed so text cannot shift across a field
/// boundary without changing the digest.
pub fn fingerprint(base: &str, updated: &str, test_rows: &[Vec<String>]) -> Result<String> {
    let tests = serde_json::to_string(test_rows)?;
    let mut hasher = Sha256::new();
    for field in [base, updated, tests.as_str()] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Clone)]
pub struct AnalysisCache {
    kv: Arc<dyn KvStore>,
    analyzer: Analyzer,
    version: String,
    ttl: Duration,
}

impl AnalysisCache {
    pub fn new(kv: Arc<dyn KvStore>, analyzer: Analyzer) -> Self {
        Self {
            kv,
            analyzer,
            version: DEFAULT_ANALYSIS_VERSION.to_string(),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Return the stored analysis for these inputs, or analyze and store it.
    pub async fn get_or_compute(
        &self,
        base: &str,
        updated: &str,
        test_rows: &[Vec<String>],
    ) -> Result<AnalysisResult> {
        let digest = fingerprint(base, updated, test_rows)?;
        let key = analysis_key(&self.version, &digest);

        if let Some(json) = self.kv.get(&key).await? {
            match serde_json::from_str::<AnalysisResult>(&json) {
                Ok(result) => {
                    tracing::info!(key = %key, "analysis cache hit");
                    return Ok(result);
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "discarding unreadable cache entry"),
            }
        }

        tracing::info!(key = %key, "analysis cache miss");
        let result = self.analyzer.analyze(base, updated, test_rows).await?;
        let json = serde_json::to_string(&result)?;
        self.kv.set(&key, &json, Some(self.ttl)).await?;
        Ok(result)
    }
}
