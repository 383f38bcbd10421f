//! Deadline-bounded execution for primary-store operations.
//!
//! An unreachable store should fail fast, not block requests on transport
//! timeouts. Every primary-store call is raced against its own deadline; the
//! losing future is dropped, so the caller observes exactly one outcome.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time;

use crate::config::CacheSettings;

/// Per-operation deadlines for the primary store.
#[derive(Debug, Clone)]
pub struct Deadlines {
    pub schema: Duration,
    pub read: Duration,
    pub write: Duration,
    pub hit_update: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            schema: Duration::from_secs(2),
            read: Duration::from_secs(2),
            write: Duration::from_secs(2),
            hit_update: Duration::from_millis(500),
        }
    }
}

impl From<&CacheSettings> for Deadlines {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            schema: settings.schema_timeout,
            read: settings.read_timeout,
            write: settings.write_timeout,
            hit_update: settings.hit_update_timeout,
        }
    }
}

/// An operation did not complete within its deadline.
///
/// Distinct from a store rejection: the operation may still have been
/// executing when it was abandoned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("`{operation}` did not complete within {deadline_ms}ms")]
pub struct DeadlineExceeded {
    pub operation: &'static str,
    pub deadline_ms: u64,
}

/// Race `future` against `deadline`.
pub async fn bounded<F>(
    operation: &'static str,
    deadline: Duration,
    future: F,
) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    time::timeout(deadline, future)
        .await
        .map_err(|_| DeadlineExceeded {
            operation,
            deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fast_operations_complete() {
        let value = bounded("read", Duration::from_secs(1), async { 42 }).await;
        assert_eq!(value, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_operations_are_abandoned() {
        let outcome = bounded("upsert", Duration::from_millis(10), async {
            time::sleep(Duration::from_secs(60)).await;
            42
        })
        .await;

        let err = outcome.expect_err("deadline should fire first");
        assert_eq!(err.operation, "upsert");
        assert_eq!(err.deadline_ms, 10);
    }

    #[test]
    fn settings_map_onto_deadlines() {
        let deadlines = Deadlines::default();
        assert_eq!(deadlines.read, Duration::from_secs(2));
        assert_eq!(deadlines.hit_update, Duration::from_millis(500));
    }
}
