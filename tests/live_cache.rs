//! Live cache tests against a real Postgres instance.
//!
//! - Exercises schema creation, upsert conflict handling, hit accounting
//!   and the admin browse query through the real store.
//! - Marked `#[ignore]` so the suite stays green without a database; run
//!   with `SORSO_DATABASE_URL=postgres://... cargo test -- --ignored`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tempfile::TempDir;

use sorso::cache::{
    CacheTier, Deadlines, FallbackStore, PgResultStore, ResultCache, ResultStore, TimingMode,
};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

const DEADLINE: Duration = Duration::from_secs(5);

async fn connect() -> TestResult<PgResultStore> {
    let url = std::env::var("SORSO_DATABASE_URL")
        .map_err(|_| "SORSO_DATABASE_URL is not set; point it at a scratch database")?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await?;
    let store = PgResultStore::new(pool);
    store.ensure_schema(DEADLINE).await?;
    Ok(store)
}

/// Each run works on fresh keys so reruns do not observe earlier rows.
fn unique_body(label: &str) -> serde_json::Value {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    json!({"label": label, "run": nanos.to_string()})
}

#[tokio::test]
#[ignore = "needs a running Postgres instance"]
async fn live_schema_creation_is_idempotent() -> TestResult<()> {
    let store = connect().await?;
    store.ensure_schema(DEADLINE).await?;
    store.ensure_schema(DEADLINE).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "needs a running Postgres instance"]
async fn live_read_after_write_through_the_facade() -> TestResult<()> {
    let store = Arc::new(connect().await?);
    let dir = TempDir::new()?;
    let cache = ResultCache::new(
        Some(store),
        FallbackStore::new(dir.path().to_path_buf()),
        Deadlines::default(),
        None,
    );

    let body = unique_body("read-after-write");
    let result = json!({"ingredients": ["vodka", "mint"]});

    let miss = cache.get("identify", &body, None, TimingMode::Off).await;
    assert!(miss.into_value().is_none());

    let stored = cache.put("identify", &body, &result, TimingMode::Off).await;
    assert!(stored.into_value());

    let found = cache
        .get("identify", &body, None, TimingMode::Capture)
        .await;
    assert_eq!(found.value().as_ref(), Some(&result));
    assert_eq!(
        found.timings().expect("timings").served_by,
        Some(CacheTier::Db)
    );
    Ok(())
}

#[tokio::test]
#[ignore = "needs a running Postgres instance"]
async fn live_upsert_conflict_increments_hits() -> TestResult<()> {
    let store = connect().await?;
    let body = unique_body("hits");
    let fingerprint = format!("livetest{}", body["run"].as_str().unwrap_or("0"));

    store
        .upsert("recipes", &fingerprint, &body, &json!({"recipes": []}), DEADLINE)
        .await?;
    store
        .upsert("recipes", &fingerprint, &body, &json!({"recipes": ["v2"]}), DEADLINE)
        .await?;
    store.record_hit("recipes", &fingerprint, DEADLINE).await?;

    let found = store
        .read("recipes", &fingerprint, DEADLINE)
        .await?
        .ok_or("row missing after upsert")?;
    assert_eq!(found.result, json!({"recipes": ["v2"]}));

    let rows = store.browse("recipes", 100, 0, DEADLINE).await?;
    let row = rows
        .iter()
        .find(|row| row.fingerprint == fingerprint)
        .ok_or("row missing from browse")?;
    // 1 on insert, +1 on conflict, +1 from the explicit hit update.
    assert_eq!(row.hits, 3);
    assert!(row.last_accessed >= row.created_at);
    Ok(())
}

#[tokio::test]
#[ignore = "needs a running Postgres instance"]
async fn live_browse_returns_newest_first() -> TestResult<()> {
    let store = connect().await?;

    for round in 0..3 {
        let body = unique_body("browse");
        let fingerprint = format!(
            "livebrowse{}x{round}",
            body["run"].as_str().unwrap_or("0")
        );
        store
            .upsert("identify", &fingerprint, &body, &json!({"round": round}), DEADLINE)
            .await?;
    }

    let rows = store.browse("identify", 10, 0, DEADLINE).await?;
    assert!(rows.len() >= 3);
    for pair in rows.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }
    Ok(())
}
