//! Live integration tests for cosme-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/cosme-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{Duration, Utc};
use cosme_core::{RunStatus, ScrapedProduct, TriggerSource};
use cosme_db::{CatalogStore, DbError, PgStore, RunLedger, SummaryStore, UpsertSummary};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn scraped(id: &str, rank: i32) -> ScrapedProduct {
    ScrapedProduct {
        product_id: id.to_string(),
        genre: "skincare".to_string(),
        channel: "drugstore".to_string(),
        name: format!("Lotion {id}"),
        brand: "Hada Labo".to_string(),
        image_url: format!("https://img.example/{id}.jpg"),
        product_url: Some(format!("https://shop.example/{id}")),
        brand_url: None,
        rank,
    }
}

// ---------------------------------------------------------------------------
// Section 1: Catalog
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_reports_inserts_then_updates(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);

    let first = store
        .upsert_products(&[scraped("p1", 1), scraped("p2", 2)])
        .await
        .expect("first upsert failed");
    assert_eq!(first, UpsertSummary { inserted: 2, updated: 0 });

    let second = store
        .upsert_products(&[scraped("p1", 2), scraped("p2", 1)])
        .await
        .expect("second upsert failed");
    assert_eq!(second, UpsertSummary { inserted: 0, updated: 2 });

    let ids: Vec<String> = store
        .list_candidates("skincare", "drugstore")
        .await
        .expect("list failed")
        .into_iter()
        .map(|p| p.product_id)
        .collect();
    assert_eq!(ids, vec!["p2", "p1"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn reingest_preserves_first_seen_and_last_used(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let batch = vec![scraped("p1", 1)];
    store.upsert_products(&batch).await.expect("upsert failed");

    let used_at = Utc::now();
    store.mark_used("p1", used_at).await.expect("mark_used failed");
    let before = store.get_product("p1").await.expect("get failed").expect("exists");

    store.upsert_products(&batch).await.expect("re-upsert failed");
    let after = store.get_product("p1").await.expect("get failed").expect("exists");

    assert_eq!(before, after);
    assert!(after.last_used.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn mark_used_is_monotonic(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    store.upsert_products(&[scraped("p1", 1)]).await.expect("upsert failed");

    let t1 = Utc::now();
    store.mark_used("p1", t1).await.expect("mark t1 failed");
    store
        .mark_used("p1", t1 - Duration::hours(6))
        .await
        .expect("mark t0 failed");

    let product = store.get_product("p1").await.expect("get failed").expect("exists");
    let last_used = product.last_used.expect("last_used set");
    // Postgres stores microseconds.
    assert!((last_used - t1).num_milliseconds().abs() < 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn mark_used_unknown_product_fails(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let err = store
        .mark_used("missing", Utc::now())
        .await
        .expect_err("unknown product should fail");
    assert!(matches!(err, DbError::ProductNotFound { .. }));
}

// ---------------------------------------------------------------------------
// Section 2: Summary cache
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn summary_put_get_and_overwrite(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    store.upsert_products(&[scraped("p1", 1)]).await.expect("upsert failed");

    assert!(store.get_summary("p1").await.expect("get failed").is_none());

    let texts = vec!["しっとり".to_string(), "べたつかない".to_string()];
    store
        .put_summary("p1", &texts, Utc::now())
        .await
        .expect("put failed");
    store
        .put_summary("p1", &["さっぱり".to_string()], Utc::now())
        .await
        .expect("overwrite failed");

    let entry = store.get_summary("p1").await.expect("get failed").expect("exists");
    assert_eq!(entry.summaries, vec!["さっぱり"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn summary_for_unknown_product_is_not_found(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let err = store
        .put_summary("missing", &["text".to_string()], Utc::now())
        .await
        .expect_err("unknown product should fail");
    assert!(matches!(err, DbError::ProductNotFound { .. }));
}

// ---------------------------------------------------------------------------
// Section 3: Run ledger
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn run_lifecycle_started_to_success(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let run = store
        .start("skincare", "drugstore", TriggerSource::Cli, Utc::now())
        .await
        .expect("start failed");
    assert_eq!(run.status(), RunStatus::Started);

    store
        .finish_success(run.id, "p1", "gs://bucket/videos/a.mp4")
        .await
        .expect("finish failed");

    let fetched = store.get_run(run.id).await.expect("get failed").expect("exists");
    assert_eq!(fetched.status(), RunStatus::Success);
    assert_eq!(fetched.state.output_location(), Some("gs://bucket/videos/a.mp4"));
    assert!(fetched.finished_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn second_finalize_is_rejected(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let run = store
        .start("skincare", "drugstore", TriggerSource::Api, Utc::now())
        .await
        .expect("start failed");
    store
        .finish_error(run.id, None, "no_eligible_product: catalog exhausted")
        .await
        .expect("finish failed");

    let err = store
        .finish_success(run.id, "p1", "gs://bucket/videos/a.mp4")
        .await
        .expect_err("second finalize should fail");
    assert!(matches!(
        err,
        DbError::InvalidRunTransition {
            from: RunStatus::Error,
            to: RunStatus::Success,
            ..
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn finalize_unknown_run_is_not_found(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let err = store
        .finish_error(999_999, None, "x")
        .await
        .expect_err("unknown run should fail");
    assert!(matches!(err, DbError::RunNotFound { run_id: 999_999 }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_recent_filters_and_orders(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let a = store
        .start("skincare", "drugstore", TriggerSource::Cli, Utc::now())
        .await
        .expect("start a failed");
    let b = store
        .start("skincare", "drugstore", TriggerSource::Cli, Utc::now())
        .await
        .expect("start b failed");
    store
        .finish_error(a.id, None, "renderer_failed: exit 1")
        .await
        .expect("finish failed");

    let all = store.list_recent(10, None).await.expect("list failed");
    assert_eq!(all.first().map(|r| r.id), Some(b.id));

    let started = store
        .list_recent(10, Some(RunStatus::Started))
        .await
        .expect("list failed");
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].id, b.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn sweep_finalizes_stuck_runs(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let run = store
        .start("skincare", "drugstore", TriggerSource::Scheduler, Utc::now())
        .await
        .expect("start failed");

    let swept = store
        .sweep_stale(Utc::now() + Duration::minutes(1))
        .await
        .expect("sweep failed");
    assert_eq!(swept, vec![run.id]);

    let fetched = store.get_run(run.id).await.expect("get failed").expect("exists");
    assert!(fetched
        .state
        .error_detail()
        .is_some_and(|d| d.starts_with("abandoned:")));

    let again = store
        .sweep_stale(Utc::now() + Duration::minutes(1))
        .await
        .expect("second sweep failed");
    assert!(again.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn start_uses_the_supplied_time_not_the_database_clock(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let started_at = chrono::DateTime::parse_from_rfc3339("2026-10-19T09:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc);
    let run = store
        .start("skincare", "drugstore", TriggerSource::Scheduler, started_at)
        .await
        .expect("start failed");
    assert_eq!(run.created_at, started_at);

    let not_yet = store
        .sweep_stale(started_at)
        .await
        .expect("sweep failed");
    assert!(not_yet.is_empty());

    let swept = store
        .sweep_stale(started_at + Duration::seconds(1))
        .await
        .expect("sweep failed");
    assert_eq!(swept, vec![run.id]);
}
