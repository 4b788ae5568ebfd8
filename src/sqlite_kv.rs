//! SQLite-backed [`KvStore`] implementation.
//!
//! One row per key in the `kv` table. Expiry is stored as a Unix timestamp
//! in milliseconds; rows past it are filtered out of every read and deleted
//! on the next write. Pattern scans use SQLite `GLOB`, which shares the
//! `*` / `?` syntax of the in-memory backend.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use reqtrace_core::store::KvStore;

use crate::config::Config;
use crate::{db, migrate};

pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect using `[store]` settings and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(ttl: Duration) -> i64 {
    now_ms().saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64)
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM kv WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let now = now_ms();
        sqlx::query("DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO kv (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl.map(expiry))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM kv WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM kv WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM kv WHERE key GLOB ? AND (expires_at IS NULL OR expires_at > ?) ORDER BY key",
        )
        .bind(pattern)
        .bind(now_ms())
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE kv SET expires_at = ? WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(expiry(ttl))
        .bind(key)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
