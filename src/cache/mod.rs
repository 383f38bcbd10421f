//! Sorso result cache.
//!
//! Memoizes AI completion results behind two tiers:
//!
//! - **Primary**: a durable Postgres table keyed by (endpoint, fingerprint),
//!   the source of truth when reachable. Every access is deadline-bounded.
//! - **Fallback**: per-namespace JSON files under `cache.directory`, a
//!   node-local backstop consulted when the primary tier is absent, failed,
//!   or answered empty.
//!
//! Callers only ever see "hit with result" or "miss"; cache-internal
//! failures are logged and absorbed. Expiry is logical: entries older than
//! the effective TTL read as a miss but are never deleted here.
//!
//! ## Configuration
//!
//! ```toml
//! [database]
//! url = "postgres://..."        # absent: file tier only
//!
//! [cache]
//! directory = "data/cache"
//! default_ttl_seconds = 604800  # 0 or absent: entries never expire
//! read_timeout_ms = 2000        # see config.rs for all deadlines
//! ```

mod deadline;
mod facade;
mod fallback;
mod fingerprint;
mod primary;

pub use deadline::{DeadlineExceeded, Deadlines, bounded};
pub use facade::{
    CacheTier, CacheTimings, METRIC_DB_ERROR, METRIC_DB_HIT, METRIC_DB_MISS,
    METRIC_FILE_HIT, METRIC_FILE_MISS, METRIC_FILE_WRITE_ERROR, PrimaryQueryError, ProbeOutcome,
    ResultCache, TierProbe, TimingMode, Traced,
};
pub use fallback::FallbackStore;
pub use fingerprint::fingerprint;
pub use primary::{CacheEntryRecord, PgResultStore, ResultStore, StoreError, StoredResult};
