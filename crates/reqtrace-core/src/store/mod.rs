//! Key-value storage abstraction for reqtrace.
//!
//! The [`KvStore`] trait is the pipeline's only persistence mechanism:
//! opaque string keys mapped to JSON string values, each with an optional
//! time-to-live. Backends are pluggable (SQLite in the app crate, the
//! in-memory store here for tests and ephemeral runs).
//!
//! There is no transaction or compare-and-swap discipline. Every write is a
//! whole-value replace, so concurrent writers to one key race and the last
//! write wins. Callers rely on one orchestrator driving a job at a time.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Abstract key-value backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](KvStore::get) | Read a live value |
/// | [`set`](KvStore::set) | Replace a value, optionally with a TTL |
/// | [`delete`](KvStore::delete) | Remove a key |
/// | [`exists`](KvStore::exists) | Check for a live key |
/// | [`keys`](KvStore::keys) | List live keys matching a glob (`*`, `?`) |
/// | [`expire`](KvStore::expire) | Attach a TTL to an existing key |
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value if the key exists and has not expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Removes the key. Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Lists live keys matching a glob pattern such as `job:*:searchableData`.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Sets a TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;
}

/// Key of a job's base64 file blobs.
pub fn files_key(job_id: &str) -> String {
    format!("job:{}:files", job_id)
}

pub fn status_key(job_id: &str) -> String {
    format!("job:{}:status", job_id)
}

pub fn result_key(job_id: &str) -> String {
    format!("job:{}:result", job_id)
}

pub fn searchable_key(job_id: &str) -> String {
    format!("job:{}:searchableData", job_id)
}

pub fn file_names_key(job_id: &str) -> String {
    format!("job:{}:fileNames", job_id)
}

/// Pattern matching every job's searchable items.
pub const SEARCHABLE_PATTERN: &str = "job:*:searchableData";

/// Key of a cached analysis: `analysis:<version>:<sha256hex>`.
pub fn analysis_key(version: &str, fingerprint: &str) -> String {
    format!("analysis:{}:{}", version, fingerprint)
}
