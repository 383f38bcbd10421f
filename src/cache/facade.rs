//! Two-tier result cache facade.
//!
//! The only cache surface the rest of the service talks to. A `get` consults
//! the primary store under a deadline, then the file tier; a `put` upserts
//! into the primary store and unconditionally mirrors into the file tier.
//! No failure below this facade ever reaches a request handler: the worst
//! outcome of a total cache outage is a miss.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;

use super::deadline::Deadlines;
use super::fallback::FallbackStore;
use super::fingerprint::fingerprint;
use super::primary::{CacheEntryRecord, ResultStore, StoreError};

pub const METRIC_DB_HIT: &str = "sorso_cache_db_hit_total";
pub const METRIC_DB_MISS: &str = "sorso_cache_db_miss_total";
pub const METRIC_DB_ERROR: &str = "sorso_cache_db_error_total";
pub const METRIC_FILE_HIT: &str = "sorso_cache_file_hit_total";
pub const METRIC_FILE_MISS: &str = "sorso_cache_file_miss_total";
pub const METRIC_FILE_WRITE_ERROR: &str = "sorso_cache_file_write_error_total";

/// The storage tier that answered (or was probed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Db,
    File,
}

impl CacheTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Db => "db",
            Self::File => "file",
        }
    }
}

/// What a single tier probe observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Hit,
    Miss,
    Expired,
    Error,
    TimedOut,
    Written,
    WriteFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierProbe {
    pub tier: CacheTier,
    pub outcome: ProbeOutcome,
    pub elapsed_ms: u64,
}

/// Diagnostic timings captured alongside a cache operation.
///
/// Annotation only: capturing timings never changes which tier answers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheTimings {
    pub probes: Vec<TierProbe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub served_by: Option<CacheTier>,
    pub total_ms: u64,
}

impl CacheTimings {
    fn probe(&mut self, tier: CacheTier, outcome: ProbeOutcome, started: Instant) {
        self.probes.push(TierProbe {
            tier,
            outcome,
            elapsed_ms: elapsed_ms(started),
        });
    }
}

/// Whether an operation should capture diagnostic timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingMode {
    Off,
    Capture,
}

/// A cache outcome, with or without timings — selected by the caller's
/// [`TimingMode`], never inferred from shape.
#[derive(Debug)]
pub enum Traced<T> {
    Plain(T),
    WithTimings(T, CacheTimings),
}

impl<T> Traced<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Plain(value) | Self::WithTimings(value, _) => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Plain(value) | Self::WithTimings(value, _) => value,
        }
    }

    pub fn timings(&self) -> Option<&CacheTimings> {
        match self {
            Self::Plain(_) => None,
            Self::WithTimings(_, timings) => Some(timings),
        }
    }

    pub fn into_parts(self) -> (T, Option<CacheTimings>) {
        match self {
            Self::Plain(value) => (value, None),
            Self::WithTimings(value, timings) => (value, Some(timings)),
        }
    }

    fn seal(value: T, mode: TimingMode, mut timings: CacheTimings, started: Instant) -> Self {
        match mode {
            TimingMode::Off => Self::Plain(value),
            TimingMode::Capture => {
                timings.total_ms = elapsed_ms(started);
                Self::WithTimings(value, timings)
            }
        }
    }
}

/// An administrative primary-store query could not be served.
#[derive(Debug, Error)]
pub enum PrimaryQueryError {
    #[error("primary store is not configured")]
    NotConfigured,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates key derivation, the primary store, the file tier, TTL
/// evaluation and hit accounting.
#[derive(Clone)]
pub struct ResultCache {
    primary: Option<Arc<dyn ResultStore>>,
    fallback: FallbackStore,
    deadlines: Deadlines,
    default_ttl: Option<Duration>,
}

impl ResultCache {
    /// `primary: None` is the "not configured" operating mode: every lookup
    /// goes straight to the file tier.
    pub fn new(
        primary: Option<Arc<dyn ResultStore>>,
        fallback: FallbackStore,
        deadlines: Deadlines,
        default_ttl: Option<Duration>,
    ) -> Self {
        Self {
            primary,
            fallback,
            deadlines,
            default_ttl,
        }
    }

    /// Best-effort schema creation. Resolves immediately when no primary
    /// store is configured; failures are logged and swallowed so an
    /// unreachable store never blocks startup.
    pub async fn ensure_schema(&self) {
        let Some(store) = self.primary.as_ref() else {
            return;
        };

        if let Err(err) = store.ensure_schema(self.deadlines.schema).await {
            warn!(
                target: "sorso::cache",
                error = %err,
                "cache schema creation failed, continuing on the file tier"
            );
        }
    }

    /// Look up a previously computed result.
    ///
    /// `ttl` overrides the configured default; entries older than the
    /// effective TTL read as a miss without being deleted. No TTL anywhere
    /// means entries never expire.
    pub async fn get(
        &self,
        endpoint: &str,
        body: &Value,
        ttl: Option<Duration>,
        mode: TimingMode,
    ) -> Traced<Option<Value>> {
        let started = Instant::now();
        let key = fingerprint(endpoint, body);
        let ttl = ttl.or(self.default_ttl);
        let mut timings = CacheTimings::default();

        if let Some(store) = self.primary.as_ref() {
            let probe = Instant::now();
            match store.read(endpoint, &key, self.deadlines.read).await {
                Ok(Some(found)) => {
                    if is_fresh(found.created_at, ttl) {
                        counter!(METRIC_DB_HIT).increment(1);
                        timings.probe(CacheTier::Db, ProbeOutcome::Hit, probe);
                        timings.served_by = Some(CacheTier::Db);
                        self.spawn_hit_update(store.clone(), endpoint, &key);
                        return Traced::seal(Some(found.result), mode, timings, started);
                    }
                    counter!(METRIC_DB_MISS).increment(1);
                    timings.probe(CacheTier::Db, ProbeOutcome::Expired, probe);
                }
                Ok(None) => {
                    counter!(METRIC_DB_MISS).increment(1);
                    timings.probe(CacheTier::Db, ProbeOutcome::Miss, probe);
                }
                Err(err) => {
                    counter!(METRIC_DB_ERROR).increment(1);
                    warn!(
                        target: "sorso::cache",
                        endpoint,
                        error = %err,
                        "primary read failed, trying file tier"
                    );
                    let outcome = if err.is_timeout() {
                        ProbeOutcome::TimedOut
                    } else {
                        ProbeOutcome::Error
                    };
                    timings.probe(CacheTier::Db, outcome, probe);
                }
            }
        }

        let probe = Instant::now();
        match self.fallback.read(endpoint, &key, ttl).await {
            Some(result) => {
                counter!(METRIC_FILE_HIT).increment(1);
                timings.probe(CacheTier::File, ProbeOutcome::Hit, probe);
                timings.served_by = Some(CacheTier::File);
                Traced::seal(Some(result), mode, timings, started)
            }
            None => {
                counter!(METRIC_FILE_MISS).increment(1);
                timings.probe(CacheTier::File, ProbeOutcome::Miss, probe);
                Traced::seal(None, mode, timings, started)
            }
        }
    }

    /// Store a freshly computed result under its content-derived key.
    ///
    /// The primary write is attempted first; the file tier is written
    /// regardless of the primary outcome. The returned flag reflects the
    /// primary outcome (vacuously true when no primary store is configured);
    /// a lost file write is logged but does not change it.
    pub async fn put(
        &self,
        endpoint: &str,
        body: &Value,
        result: &Value,
        mode: TimingMode,
    ) -> Traced<bool> {
        let started = Instant::now();
        let key = fingerprint(endpoint, body);
        let mut timings = CacheTimings::default();
        let mut success = true;

        if let Some(store) = self.primary.as_ref() {
            let probe = Instant::now();
            match store
                .upsert(endpoint, &key, body, result, self.deadlines.write)
                .await
            {
                Ok(()) => timings.probe(CacheTier::Db, ProbeOutcome::Written, probe),
                Err(err) => {
                    success = false;
                    counter!(METRIC_DB_ERROR).increment(1);
                    warn!(
                        target: "sorso::cache",
                        endpoint,
                        error = %err,
                        "primary write failed, keeping the file tier copy"
                    );
                    let outcome = if err.is_timeout() {
                        ProbeOutcome::TimedOut
                    } else {
                        ProbeOutcome::Error
                    };
                    timings.probe(CacheTier::Db, outcome, probe);
                }
            }
        }

        let probe = Instant::now();
        if self.fallback.write(endpoint, &key, body, result).await {
            timings.probe(CacheTier::File, ProbeOutcome::Written, probe);
        } else {
            counter!(METRIC_FILE_WRITE_ERROR).increment(1);
            timings.probe(CacheTier::File, ProbeOutcome::WriteFailed, probe);
        }

        Traced::seal(success, mode, timings, started)
    }

    /// Recent primary-store rows for one endpoint, newest first. Serves the
    /// administrative browse panel; unlike `get`, errors surface to the
    /// caller.
    pub async fn browse(
        &self,
        endpoint: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CacheEntryRecord>, PrimaryQueryError> {
        let store = self
            .primary
            .as_ref()
            .ok_or(PrimaryQueryError::NotConfigured)?;
        Ok(store
            .browse(endpoint, limit, offset, self.deadlines.read)
            .await?)
    }

    /// Point lookup against the primary store for the administrative
    /// endpoint. TTL is intentionally not applied here: operators want to
    /// see what is stored.
    pub async fn lookup(
        &self,
        endpoint: &str,
        body: &Value,
    ) -> Result<Option<Value>, PrimaryQueryError> {
        let store = self
            .primary
            .as_ref()
            .ok_or(PrimaryQueryError::NotConfigured)?;
        let key = fingerprint(endpoint, body);
        let found = store.read(endpoint, &key, self.deadlines.read).await?;
        Ok(found.map(|stored| stored.result))
    }

    fn spawn_hit_update(&self, store: Arc<dyn ResultStore>, endpoint: &str, key: &str) {
        let endpoint = endpoint.to_string();
        let key = key.to_string();
        let deadline = self.deadlines.hit_update;
        tokio::spawn(async move {
            if let Err(err) = store.record_hit(&endpoint, &key, deadline).await {
                warn!(
                    target: "sorso::cache",
                    endpoint,
                    error = %err,
                    "failed to update cache hit stats"
                );
            }
        });
    }
}

fn is_fresh(created_at: OffsetDateTime, ttl: Option<Duration>) -> bool {
    let Some(ttl) = ttl else {
        return true;
    };
    let age = OffsetDateTime::now_utc() - created_at;
    age <= time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
