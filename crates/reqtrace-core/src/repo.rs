//! Typed job repository over a [`KvStore`].
//!
//! This is the only code that knows the key scheme. Each artifact is one
//! JSON value under its own key:
//!
//! | Key | Value | Lifetime |
//! |-----|-------|----------|
//! | `job:<id>:files` | [`JobFiles`] | until the result is taken |
//! | `job:<id>:status` | [`Status`] | until the result is taken |
//! | `job:<id>:result` | [`AnalysisResult`] | until the result is taken |
//! | `job:<id>:searchableData` | `[SearchableItem]` | indefinite |
//! | `job:<id>:fileNames` | [`FileNames`] | indefinite |

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::models::{AnalysisResult, FileNames, JobFiles, SearchableItem, Status};
use crate::store::{self, KvStore};

#[derive(Clone)]
pub struct JobRepository {
    kv: Arc<dyn KvStore>,
}

impl JobRepository {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// The backing store, for components that manage their own keys.
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.kv.set(key, &json, None).await?;
        Ok(())
    }

    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn put_files(&self, job_id: &str, files: &JobFiles) -> Result<()> {
        self.put(&store::files_key(job_id), files).await
    }

    pub async fn files(&self, job_id: &str) -> Result<Option<JobFiles>> {
        self.fetch(&store::files_key(job_id)).await
    }

    pub async fn put_status(&self, job_id: &str, status: &Status) -> Result<()> {
        self.put(&store::status_key(job_id), status).await
    }

    pub async fn status(&self, job_id: &str) -> Result<Option<Status>> {
        self.fetch(&store::status_key(job_id)).await
    }

    pub async fn put_result(&self, job_id: &str, result: &AnalysisResult) -> Result<()> {
        self.put(&store::result_key(job_id), result).await
    }

    pub async fn result(&self, job_id: &str) -> Result<Option<AnalysisResult>> {
        self.fetch(&store::result_key(job_id)).await
    }

    pub async fn put_file_names(&self, job_id: &str, names: &FileNames) -> Result<()> {
        self.put(&store::file_names_key(job_id), names).await
    }

    pub async fn file_names(&self, job_id: &str) -> Result<Option<FileNames>> {
        self.fetch(&store::file_names_key(job_id)).await
    }

    pub async fn put_searchable(&self, job_id: &str, items: &[SearchableItem]) -> Result<()> {
        self.put(&store::searchable_key(job_id), items).await
    }

    pub async fn searchable(&self, job_id: &str) -> Result<Option<Vec<SearchableItem>>> {
        self.fetch(&store::searchable_key(job_id)).await
    }

    /// Searchable items of every job that has any, in key order.
    pub async fn all_searchable(&self) -> Result<Vec<SearchableItem>> {
        let keys = self.kv.keys(store::SEARCHABLE_PATTERN).await?;
        let mut items = Vec::new();
        for key in keys {
            if let Some(batch) = self.fetch::<Vec<SearchableItem>>(&key).await? {
                items.extend(batch);
            }
        }
        Ok(items)
    }

    /// Drops the job's ephemeral state (files, status, result).
    ///
    /// Searchable items and file names are kept; they back search across jobs.
    pub async fn cleanup(&self, job_id: &str) -> Result<()> {
        self.kv.delete(&store::files_key(job_id)).await?;
        self.kv.delete(&store::status_key(job_id)).await?;
        self.kv.delete(&store::result_key(job_id)).await?;
        Ok(())
    }
}
