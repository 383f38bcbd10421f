//! Node-local file tier.
//!
//! One JSON record per key at `<root>/<namespace>/<fingerprint>.json`. The
//! file tier answers only when the primary store is absent, failed, or came
//! back empty, and absorbs every write as a local backstop. All failures
//! here degrade to a miss or a lost write; none propagate.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, warn};

const RECORD_VERSION: u32 = 1;

// Distinguishes temp files written by concurrent writers in one process.
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct FallbackRecord {
    meta: RecordMeta,
    data: RecordData,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordMeta {
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordData {
    body: Value,
    result: Value,
}

/// Filesystem-backed fallback cache rooted at a configured directory.
#[derive(Debug, Clone)]
pub struct FallbackStore {
    root: PathBuf,
}

impl FallbackStore {
    /// Namespace directories are created lazily on first write.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Load the result for a key. A record older than `ttl` (when supplied)
    /// is treated as absent; nothing is deleted. Missing files, unreadable
    /// files, and malformed records all read as a miss.
    pub async fn read(
        &self,
        namespace: &str,
        fingerprint: &str,
        ttl: Option<Duration>,
    ) -> Option<Value> {
        let path = self.record_path(namespace, fingerprint)?;

        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                debug!(
                    target: "sorso::cache",
                    path = %path.display(),
                    error = %err,
                    "file tier read failed"
                );
                return None;
            }
        };

        let record: FallbackRecord = match serde_json::from_slice(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    target: "sorso::cache",
                    path = %path.display(),
                    error = %err,
                    "file tier record is malformed, treating as miss"
                );
                return None;
            }
        };

        if let Some(ttl) = ttl {
            let age = OffsetDateTime::now_utc() - record.meta.created_at;
            let ttl = time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
            if age > ttl {
                return None;
            }
        }

        Some(record.data.result)
    }

    /// Persist a record for a key, overwriting any previous one. Best-effort:
    /// failures are logged and reported via the return value, never raised.
    ///
    /// The record lands in a temp file first and is renamed into place, so a
    /// concurrent reader sees either the old record or the new one, never a
    /// torn one.
    pub async fn write(
        &self,
        namespace: &str,
        fingerprint: &str,
        body: &Value,
        result: &Value,
    ) -> bool {
        match self.persist(namespace, fingerprint, body, result).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    target: "sorso::cache",
                    namespace,
                    error = %err,
                    "file tier write failed"
                );
                false
            }
        }
    }

    async fn persist(
        &self,
        namespace: &str,
        fingerprint: &str,
        body: &Value,
        result: &Value,
    ) -> Result<(), std::io::Error> {
        let path = self
            .record_path(namespace, fingerprint)
            .ok_or_else(|| std::io::Error::other("unsafe cache path component"))?;

        let directory = self.root.join(namespace);
        fs::create_dir_all(&directory).await?;

        let record = FallbackRecord {
            meta: RecordMeta {
                created_at: OffsetDateTime::now_utc(),
                version: RECORD_VERSION,
            },
            data: RecordData {
                body: body.clone(),
                result: result.clone(),
            },
        };
        let payload = serde_json::to_vec_pretty(&record)?;

        let temp = directory.join(format!(
            ".{fingerprint}.{}.{}.tmp",
            process::id(),
            TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, payload).await?;

        if let Err(err) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err);
        }

        Ok(())
    }

    fn record_path(&self, namespace: &str, fingerprint: &str) -> Option<PathBuf> {
        if !safe_component(namespace) || !safe_component(fingerprint) {
            return None;
        }
        Some(self.root.join(namespace).join(format!("{fingerprint}.json")))
    }

    #[cfg(test)]
    fn path_for(&self, namespace: &str, fingerprint: &str) -> Option<PathBuf> {
        self.record_path(namespace, fingerprint)
    }
}

fn safe_component(component: &str) -> bool {
    !component.is_empty()
        && !component.starts_with('.')
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn store(dir: &TempDir) -> FallbackStore {
        FallbackStore::new(dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);

        let body = json!({"photo": "abc"});
        let result = json!({"ingredients": ["vodka", "mint"]});

        assert!(store.write("identify", "aaaa", &body, &result).await);
        let loaded = store.read("identify", "aaaa", None).await;
        assert_eq!(loaded, Some(result));
    }

    #[tokio::test]
    async fn missing_record_reads_as_miss() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);

        assert!(store.read("identify", "feed", None).await.is_none());
    }

    #[tokio::test]
    async fn stale_record_reads_as_miss_but_survives_on_disk() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        let path = store.path_for("recipes", "bbbb").expect("path");

        let aged = OffsetDateTime::now_utc() - time::Duration::hours(2);
        let record = serde_json::json!({
            "meta": {
                "createdAt": aged
                    .format(&time::format_description::well_known::Rfc3339)
                    .expect("format"),
                "version": 1,
            },
            "data": {"body": {}, "result": {"recipes": []}},
        });
        fs::create_dir_all(path.parent().expect("parent"))
            .await
            .expect("mkdir");
        fs::write(&path, serde_json::to_vec(&record).expect("encode"))
            .await
            .expect("write");

        let expired = store
            .read("recipes", "bbbb", Some(Duration::from_secs(3600)))
            .await;
        assert!(expired.is_none());

        // Logical expiry only: the record is still there and readable
        // without a TTL.
        assert!(store.read("recipes", "bbbb", None).await.is_some());
    }

    #[tokio::test]
    async fn fresh_record_survives_ttl_check() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);

        store
            .write("recipes", "cccc", &json!({}), &json!({"recipes": []}))
            .await;

        let hit = store
            .read("recipes", "cccc", Some(Duration::from_secs(3600)))
            .await;
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn malformed_record_reads_as_miss() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        let path = store.path_for("identify", "dddd").expect("path");

        fs::create_dir_all(path.parent().expect("parent"))
            .await
            .expect("mkdir");
        fs::write(&path, b"not json").await.expect("write");

        assert!(store.read("identify", "dddd", None).await.is_none());
    }

    #[tokio::test]
    async fn traversal_components_are_refused() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);

        assert!(
            !store
                .write("../escape", "aaaa", &json!({}), &json!({}))
                .await
        );
        assert!(store.read("identify", "../../etc", None).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_writers_never_tear_a_record() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);

        let mut handles = Vec::new();
        for round in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let result = json!({"round": round});
                store.write("recipes", "eeee", &json!({}), &result).await
            }));
        }
        for handle in handles {
            assert!(handle.await.expect("join"));
        }

        // Whichever writer won, the record parses and has the shape of one
        // complete write.
        let loaded = store.read("recipes", "eeee", None).await.expect("record");
        assert!(loaded.get("round").is_some());
    }
}
