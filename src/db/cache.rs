//! TTL response cache stored in the `api_cache` table.
//!
//! The cache is best-effort: if SQLite cannot be read or written the value is
//! computed and returned anyway, only the caching is skipped. Concurrent
//! misses on one key all recompute and all write; the last upsert wins.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::db::models::CacheRow;
use crate::db::now_ms;
use crate::error::Result;

/// A value plus whether it was served from a fresh cache row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cached<T> {
    pub value: T,
    pub cached: bool,
}

#[derive(Clone)]
pub struct ResponseCache {
    pool: SqlitePool,
}

/// `endpoint:{json params}` with object keys sorted, so equal params always
/// produce the same key.
pub fn cache_key<P: Serialize + ?Sized>(endpoint: &str, params: &P) -> Result<String> {
    let value = canonicalize(serde_json::to_value(params)?);
    Ok(format!("{endpoint}:{}", serde_json::to_string(&value)?))
}

fn canonicalize(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, canonicalize(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

impl ResponseCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the fresh cached payload for `key`, or runs `compute`, stores
    /// its output with `expires_at = now + ttl`, and returns it.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let now = now_ms();

        match self.lookup::<T>(key, now).await {
            Ok(Some(value)) => {
                debug!(cache_key = key, "cache hit");
                return Ok(Cached { value, cached: true });
            }
            Ok(None) => debug!(cache_key = key, "cache miss"),
            Err(e) => warn!(cache_key = key, error = %e, "cache read failed, computing uncached"),
        }

        let value = compute().await?;

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_ms().saturating_add(ttl_ms);
        if let Err(e) = self.store(key, &value, expires_at).await {
            warn!(cache_key = key, error = %e, "cache write failed");
        }

        Ok(Cached { value, cached: false })
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str, now: i64) -> Result<Option<T>> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT payload, expires_at
            FROM api_cache
            WHERE cache_key = ? AND expires_at > ?
            "#,
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // A payload written by an older schema is treated as a miss.
        match serde_json::from_str(&row.payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(cache_key = key, expires_at = row.expires_at, error = %e, "discarding undecodable cache row");
                Ok(None)
            }
        }
    }

    pub async fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T, expires_at: i64) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO api_cache (cache_key, payload, expires_at, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(key)
        .bind(payload)
        .bind(expires_at)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_cache WHERE cache_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every row whose expiry has passed. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM api_cache WHERE expires_at <= ?")
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
