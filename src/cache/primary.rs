//! Durable result store backed by Postgres.
//!
//! One row per (endpoint, fingerprint). Writes upsert; reads are point
//! lookups; hit accounting is a separate, independently recoverable update.
//! Every operation is deadline-bounded. The store is abstracted behind
//! [`ResultStore`] so tests can substitute a fake.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgPool;
use thiserror::Error;
use time::OffsetDateTime;

use super::deadline::{DeadlineExceeded, bounded};

const CREATE_TABLE_SQL: &str = "\
CREATE TABLE IF NOT EXISTS ai_cache (
    id BIGSERIAL PRIMARY KEY,
    endpoint TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    body JSONB NOT NULL,
    result JSONB NOT NULL,
    hits INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    last_accessed TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    meta JSONB
)";

const CREATE_KEY_INDEX_SQL: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_ai_cache_endpoint_fingerprint \
     ON ai_cache (endpoint, fingerprint)";

const CREATE_CREATED_AT_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_ai_cache_created_at ON ai_cache (created_at)";

/// A primary-store operation failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
    #[error("primary store rejected `{operation}`: {source}")]
    Rejected {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    fn rejected(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Rejected { operation, source }
    }

    /// True when the operation was abandoned at its deadline rather than
    /// rejected by the store.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Deadline(_))
    }
}

/// The payload a point lookup resolves to.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredResult {
    pub result: Value,
    pub created_at: OffsetDateTime,
}

/// A full cache row, as surfaced by the administrative browse endpoint.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CacheEntryRecord {
    pub id: i64,
    pub endpoint: String,
    pub fingerprint: String,
    pub body: Value,
    pub result: Value,
    pub hits: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_accessed: OffsetDateTime,
}

/// Deadline-bounded access to the durable cache table.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Idempotently create the table and its indexes. Best-effort: callers
    /// log and swallow failures.
    async fn ensure_schema(&self, deadline: Duration) -> Result<(), StoreError>;

    /// Point lookup for one key.
    async fn read(
        &self,
        endpoint: &str,
        fingerprint: &str,
        deadline: Duration,
    ) -> Result<Option<StoredResult>, StoreError>;

    /// Insert the row with hits = 1, or on conflict replace the result/body,
    /// increment hits and refresh last_accessed, in a single statement.
    async fn upsert(
        &self,
        endpoint: &str,
        fingerprint: &str,
        body: &Value,
        result: &Value,
        deadline: Duration,
    ) -> Result<(), StoreError>;

    /// Bump hits and last_accessed for an existing row. Failures here never
    /// invalidate the result already returned to the caller.
    async fn record_hit(
        &self,
        endpoint: &str,
        fingerprint: &str,
        deadline: Duration,
    ) -> Result<(), StoreError>;

    /// Most recent rows for one endpoint, newest first.
    async fn browse(
        &self,
        endpoint: &str,
        limit: i64,
        offset: i64,
        deadline: Duration,
    ) -> Result<Vec<CacheEntryRecord>, StoreError>;
}

/// Postgres-backed [`ResultStore`].
#[derive(Clone)]
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn ensure_schema(&self, deadline: Duration) -> Result<(), StoreError> {
        bounded("ensure_schema", deadline, async {
            sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
            sqlx::query(CREATE_KEY_INDEX_SQL).execute(&self.pool).await?;
            sqlx::query(CREATE_CREATED_AT_INDEX_SQL)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await?
        .map_err(|source| StoreError::rejected("ensure_schema", source))
    }

    async fn read(
        &self,
        endpoint: &str,
        fingerprint: &str,
        deadline: Duration,
    ) -> Result<Option<StoredResult>, StoreError> {
        bounded(
            "read",
            deadline,
            sqlx::query_as::<_, StoredResult>(
                "SELECT result, created_at FROM ai_cache \
                 WHERE endpoint = $1 AND fingerprint = $2 \
                 LIMIT 1",
            )
            .bind(endpoint)
            .bind(fingerprint)
            .fetch_optional(&self.pool),
        )
        .await?
        .map_err(|source| StoreError::rejected("read", source))
    }

    async fn upsert(
        &self,
        endpoint: &str,
        fingerprint: &str,
        body: &Value,
        result: &Value,
        deadline: Duration,
    ) -> Result<(), StoreError> {
        bounded(
            "upsert",
            deadline,
            sqlx::query(
                "INSERT INTO ai_cache (endpoint, fingerprint, body, result, hits) \
                 VALUES ($1, $2, $3, $4, 1) \
                 ON CONFLICT (endpoint, fingerprint) DO UPDATE SET \
                     result = EXCLUDED.result, \
                     body = EXCLUDED.body, \
                     hits = ai_cache.hits + 1, \
                     last_accessed = NOW()",
            )
            .bind(endpoint)
            .bind(fingerprint)
            .bind(body)
            .bind(result)
            .execute(&self.pool),
        )
        .await?
        .map(|_| ())
        .map_err(|source| StoreError::rejected("upsert", source))
    }

    async fn record_hit(
        &self,
        endpoint: &str,
        fingerprint: &str,
        deadline: Duration,
    ) -> Result<(), StoreError> {
        bounded(
            "record_hit",
            deadline,
            sqlx::query(
                "UPDATE ai_cache SET hits = hits + 1, last_accessed = NOW() \
                 WHERE endpoint = $1 AND fingerprint = $2",
            )
            .bind(endpoint)
            .bind(fingerprint)
            .execute(&self.pool),
        )
        .await?
        .map(|_| ())
        .map_err(|source| StoreError::rejected("record_hit", source))
    }

    async fn browse(
        &self,
        endpoint: &str,
        limit: i64,
        offset: i64,
        deadline: Duration,
    ) -> Result<Vec<CacheEntryRecord>, StoreError> {
        bounded(
            "browse",
            deadline,
            sqlx::query_as::<_, CacheEntryRecord>(
                "SELECT id, endpoint, fingerprint, body, result, hits, created_at, last_accessed \
                 FROM ai_cache \
                 WHERE endpoint = $1 \
                 ORDER BY created_at DESC \
                 LIMIT $2 OFFSET $3",
            )
            .bind(endpoint)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool),
        )
        .await?
        .map_err(|source| StoreError::rejected("browse", source))
    }
}
