use super::*;
use chrono::Duration;
use cosme_core::ManualClock;

fn clock() -> Arc<ManualClock> {
    let start = DateTime::parse_from_rfc3339("2026-10-01T09:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc);
    Arc::new(ManualClock::new(start))
}

fn store(clock: &Arc<ManualClock>) -> MemoryStore {
    MemoryStore::new(clock.clone())
}

fn scraped(id: &str, rank: i32) -> ScrapedProduct {
    ScrapedProduct {
        product_id: id.to_string(),
        genre: "skincare".to_string(),
        channel: "drugstore".to_string(),
        name: format!("Moist Lotion {id}"),
        brand: "Hada Labo".to_string(),
        image_url: format!("https://img.example/{id}.jpg"),
        product_url: None,
        brand_url: None,
        rank,
    }
}

#[tokio::test]
async fn upsert_counts_inserts_and_updates() {
    let clock = clock();
    let store = store(&clock);

    let first = store
        .upsert_products(&[scraped("p1", 1), scraped("p2", 2)])
        .await
        .unwrap();
    assert_eq!(first, UpsertSummary { inserted: 2, updated: 0 });

    let second = store
        .upsert_products(&[scraped("p2", 1), scraped("p3", 3)])
        .await
        .unwrap();
    assert_eq!(second, UpsertSummary { inserted: 1, updated: 1 });
    assert_eq!(store.product_count().await, 3);
}

#[tokio::test]
async fn upsert_is_idempotent_and_preserves_first_seen_and_last_used() {
    let clock = clock();
    let store = store(&clock);
    let batch = vec![scraped("p1", 1), scraped("p2", 2)];

    store.upsert_products(&batch).await.unwrap();
    let used_at = clock.now();
    store.mark_used("p1", used_at).await.unwrap();
    let before = store.list_candidates("skincare", "drugstore").await.unwrap();

    clock.advance(Duration::hours(5));
    store.upsert_products(&batch).await.unwrap();
    let after = store.list_candidates("skincare", "drugstore").await.unwrap();

    assert_eq!(before, after);
    assert_eq!(after[0].last_used, Some(used_at));
}

#[tokio::test]
async fn upsert_refreshes_rank_and_moves_channel() {
    let clock = clock();
    let store = store(&clock);
    store.upsert_products(&[scraped("p1", 4)]).await.unwrap();

    let mut moved = scraped("p1", 1);
    moved.channel = "department".to_string();
    store.upsert_products(&[moved]).await.unwrap();

    assert!(store
        .list_candidates("skincare", "drugstore")
        .await
        .unwrap()
        .is_empty());
    let product = store.get_product("p1").await.unwrap().unwrap();
    assert_eq!(product.channel, "department");
    assert_eq!(product.scraped_rank, 1);
}

#[tokio::test]
async fn upsert_rejects_empty_ids_without_partial_writes() {
    let clock = clock();
    let store = store(&clock);

    let err = store
        .upsert_products(&[scraped("p1", 1), scraped("", 2)])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidProduct(_)));
    assert_eq!(store.product_count().await, 0);
}

#[tokio::test]
async fn candidates_are_ordered_by_rank_then_id() {
    let clock = clock();
    let store = store(&clock);
    store
        .upsert_products(&[scraped("b", 2), scraped("c", 1), scraped("a", 2)])
        .await
        .unwrap();

    let ids: Vec<String> = store
        .list_candidates("skincare", "drugstore")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.product_id)
        .collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn mark_used_never_moves_backwards() {
    let clock = clock();
    let store = store(&clock);
    store.upsert_products(&[scraped("p1", 1)]).await.unwrap();

    let t1 = clock.now();
    let t0 = t1 - Duration::hours(3);
    store.mark_used("p1", t1).await.unwrap();
    store.mark_used("p1", t0).await.unwrap();

    let product = store.get_product("p1").await.unwrap().unwrap();
    assert_eq!(product.last_used, Some(t1));
}

#[tokio::test]
async fn mark_used_unknown_product_is_not_found() {
    let clock = clock();
    let store = store(&clock);

    let err = store.mark_used("ghost", clock.now()).await.unwrap_err();
    assert!(matches!(err, DbError::ProductNotFound { ref product_id } if product_id == "ghost"));
}

#[tokio::test]
async fn put_summary_validates_count_and_product() {
    let clock = clock();
    let store = store(&clock);
    store.upsert_products(&[scraped("p1", 1)]).await.unwrap();

    let err = store.put_summary("p1", &[], clock.now()).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidSummaryCount { count: 0, .. }));

    let four: Vec<String> = (0..4).map(|i| format!("text {i}")).collect();
    assert!(store.put_summary("p1", &four, clock.now()).await.is_err());

    let err = store
        .put_summary("ghost", &["fine".to_string()], clock.now())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ProductNotFound { .. }));
}

#[tokio::test]
async fn put_summary_overwrites_in_place() {
    let clock = clock();
    let store = store(&clock);
    store.upsert_products(&[scraped("p1", 1)]).await.unwrap();

    store
        .put_summary("p1", &["old".to_string()], clock.now())
        .await
        .unwrap();
    clock.advance(Duration::days(40));
    let refreshed_at = clock.now();
    store
        .put_summary("p1", &["new".to_string(), "newer".to_string()], refreshed_at)
        .await
        .unwrap();

    let entry = store.get_summary("p1").await.unwrap().unwrap();
    assert_eq!(entry.summaries, vec!["new", "newer"]);
    assert_eq!(entry.updated_at, refreshed_at);
}

#[tokio::test]
async fn run_ids_increase_and_start_as_started() {
    let clock = clock();
    let store = store(&clock);

    let a = store
        .start("skincare", "drugstore", TriggerSource::Cli, clock.now())
        .await
        .unwrap();
    let b = store
        .start("skincare", "drugstore", TriggerSource::Scheduler, clock.now())
        .await
        .unwrap();

    assert!(b.id > a.id);
    assert_eq!(a.status(), RunStatus::Started);
    assert_eq!(a.created_at, clock.now());
    assert!(a.finished_at.is_none());
}

#[tokio::test]
async fn finalize_is_exactly_once() {
    let clock = clock();
    let store = store(&clock);
    let run = store
        .start("skincare", "drugstore", TriggerSource::Cli, clock.now())
        .await
        .unwrap();

    store
        .finish_success(run.id, "p1", "gs://bucket/videos/a.mp4")
        .await
        .unwrap();

    let err = store
        .finish_error(run.id, None, "renderer_failed: late")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidRunTransition {
            from: RunStatus::Success,
            to: RunStatus::Error,
            ..
        }
    ));

    let err = store
        .finish_success(run.id, "p1", "gs://bucket/videos/b.mp4")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidRunTransition { .. }));

    let stored = store.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.state.output_location(), Some("gs://bucket/videos/a.mp4"));
    assert_eq!(stored.product_id.as_deref(), Some("p1"));
}

#[tokio::test]
async fn finalize_unknown_run_is_not_found() {
    let clock = clock();
    let store = store(&clock);

    let err = store.finish_error(99, None, "x").await.unwrap_err();
    assert!(matches!(err, DbError::RunNotFound { run_id: 99 }));
}

#[tokio::test]
async fn list_recent_is_newest_first_and_filters_by_status() {
    let clock = clock();
    let store = store(&clock);

    let first = store
        .start("skincare", "drugstore", TriggerSource::Cli, clock.now())
        .await
        .unwrap();
    clock.advance(Duration::minutes(1));
    let second = store
        .start("skincare", "drugstore", TriggerSource::Cli, clock.now())
        .await
        .unwrap();
    store
        .finish_error(first.id, None, "no_eligible_product: none")
        .await
        .unwrap();

    let all = store.list_recent(10, None).await.unwrap();
    assert_eq!(
        all.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );

    let errors = store.list_recent(10, Some(RunStatus::Error)).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].id, first.id);

    assert_eq!(store.list_recent(1, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sweep_finalizes_only_old_started_runs() {
    let clock = clock();
    let store = store(&clock);

    let old = store
        .start("skincare", "drugstore", TriggerSource::Scheduler, clock.now())
        .await
        .unwrap();
    let finished = store
        .start("skincare", "drugstore", TriggerSource::Scheduler, clock.now())
        .await
        .unwrap();
    store
        .finish_success(finished.id, "p1", "gs://b/videos/x.mp4")
        .await
        .unwrap();
    clock.advance(Duration::hours(3));
    let fresh = store
        .start("skincare", "drugstore", TriggerSource::Scheduler, clock.now())
        .await
        .unwrap();

    let swept = store
        .sweep_stale(clock.now() - Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(swept, vec![old.id]);

    let old = store.get_run(old.id).await.unwrap().unwrap();
    assert!(old
        .state
        .error_detail()
        .is_some_and(|d| d.starts_with("abandoned:")));
    let fresh = store.get_run(fresh.id).await.unwrap().unwrap();
    assert_eq!(fresh.status(), RunStatus::Started);
}
