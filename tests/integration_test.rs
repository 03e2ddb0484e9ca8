//! End-to-end runs against an in-process title source.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use catalog_roi::config::Config;
use catalog_roi::error::{FetchError, PipelineError};
use catalog_roi::fetch::TitleSource;
use catalog_roi::model::RawPayload;
use catalog_roi::pipeline::{Phase, Pipeline};
use catalog_roi::storage::{BlobMetadata, StorageGateway, StorageGatewayRef};

/// Serves canned payloads and answers 404 for everything else.
struct FakeCatalog {
    titles: HashMap<i64, Value>,
    calls: Mutex<Vec<i64>>,
}

impl FakeCatalog {
    fn new(titles: Vec<(i64, Value)>) -> Arc<Self> {
        Arc::new(Self {
            titles: titles.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls_for(&self, id: i64) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == id).count()
    }
}

#[async_trait]
impl TitleSource for FakeCatalog {
    async fn lookup(&self, id: i64) -> Result<RawPayload, FetchError> {
        self.calls.lock().unwrap().push(id);
        match self.titles.get(&id) {
            Some(body) => Ok(RawPayload::new(id, body.clone())),
            None => Err(FetchError::NotFound { id }),
        }
    }

    fn name(&self) -> &str {
        "fake_catalog"
    }
}

fn bebop() -> (i64, Value) {
    (
        1,
        json!({"data": {
            "mal_id": 1,
            "title": "Cowboy Bebop",
            "title_english": "Cowboy Bebop",
            "type": "TV",
            "episodes": 26,
            "status": "Finished Airing",
            "aired": {"from": "1998-04-03T00:00:00+00:00", "to": "1999-04-24T00:00:00+00:00"},
            "score": 8.75,
            "scored_by": 914193,
            "rank": 28,
            "popularity": 43,
            "members": 1771505,
            "favorites": 78525,
            "source": "Original",
            "year": 1998,
            "studios": [{"name": "Sunrise"}],
            "genres": [{"name": "Action"}, {"name": "Sci-Fi"}]
        }}),
    )
}

fn bebop_movie() -> (i64, Value) {
    (
        5,
        json!({"data": {
            "mal_id": 5,
            "title": "Cowboy Bebop: Tengoku no Tobira",
            "type": "Movie",
            "episodes": 1,
            "score": 8.38,
            "popularity": 631,
            "year": 2001,
            "studios": [{"name": "Bones"}]
        }}),
    )
}

fn config(extra: &str) -> Config {
    let yaml = format!(
        r#"
source:
  identifiers_path: ids.txt
  min_interval_ms: 0
  retry:
    max_attempts: 3
    delay_secs: 0
storage:
  url: "memory://"
{extra}"#
    );
    Config::from_yaml(&yaml).unwrap()
}

async fn memory_storage() -> StorageGatewayRef {
    Arc::new(StorageGateway::for_url("memory://").await.unwrap())
}

async fn put_text(storage: &StorageGateway, key: &str, text: &str) {
    storage
        .put(key, Bytes::from(text.to_string()), "text/csv", &BlobMetadata::new())
        .await
        .unwrap();
}

async fn read_text(storage: &StorageGateway, key: &str) -> String {
    String::from_utf8(storage.get(key).await.unwrap().to_vec()).unwrap()
}

mod runs {
    use super::*;

    #[tokio::test]
    async fn test_mixed_batch_counts_and_layout() {
        let storage = memory_storage().await;
        let source = FakeCatalog::new(vec![bebop(), bebop_movie()]);
        let mut pipeline = Pipeline::new(config(""), storage.clone(), source.clone());

        let report = pipeline.run(&[1, 5, 9999999]).await.unwrap();

        assert_eq!(report.stats.total_requested, 3);
        assert_eq!(report.stats.succeeded, 2);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.skipped, 0);
        assert_eq!(report.stats.success_rate_display(), "66.7%");
        assert_eq!(report.stats.fetch_calls, 3);
        assert_eq!(source.calls_for(9999999), 1);
        assert_eq!(pipeline.phase(), Phase::Reported);

        let keys = storage.list("anime-impact").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "anime-impact/processed/title_catalog_clean.csv",
                "anime-impact/raw/1/full.json",
                "anime-impact/raw/5/full.json",
            ]
        );

        let catalog = read_text(&storage, "anime-impact/processed/title_catalog_clean.csv").await;
        let lines: Vec<&str> = catalog.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,title,"));
        assert!(lines[1].starts_with("1,Cowboy Bebop,"));
        assert!(lines[1].contains("Sunrise"));
        assert!(lines[1].contains("Action|Sci-Fi"));

        let raw: Value =
            serde_json::from_str(&read_text(&storage, "anime-impact/raw/1/full.json").await)
                .unwrap();
        assert_eq!(raw, bebop().1);

        // No licensing inputs configured: nothing is reported missing.
        assert!(report.is_complete());
        assert!(report.licensing.is_none());
        assert_eq!(report.validation.total_rows, 2);
    }

    #[tokio::test]
    async fn test_licensing_artifacts_and_roi() {
        let storage = memory_storage().await;
        put_text(
            &storage,
            "sources/deals.csv",
            "anime_id,anime_title,region_code,license_start_date,license_end_date,licensing_type,estimated_cost_usd\n\
             1,Cowboy Bebop,US,2022-10-01,2027-10-01,Exclusive,750000\n\
             5,Cowboy Bebop Movie,UK,2023-01-01,2025-01-01,Shared,200000\n\
             42,Unknown,US,2023-01-01,2025-01-01,Shared,1000\n",
        )
        .await;
        put_text(
            &storage,
            "sources/regional.csv",
            "region_code,quarter_date,estimated_subscriber_count,estimated_revenue_usd,arpu_usd,churn_rate_percent\n\
             US,2024-Q1,1200000,15600000,13.00,2.1\n\
             UK,2024-Q1,400000,4000000,10.00,3.0\n",
        )
        .await;

        let cfg = config(
            r#"
licensing:
  deals_key: sources/deals.csv
  regional_key: sources/regional.csv
"#,
        );
        let source = FakeCatalog::new(vec![bebop(), bebop_movie()]);
        let mut pipeline = Pipeline::new(cfg, storage.clone(), source);

        let report = pipeline.run(&[1, 5]).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.written.len(), 5);
        let processed = storage.list("anime-impact/processed").await.unwrap();
        assert_eq!(processed.len(), 5);

        let licensing = report.licensing.unwrap();
        assert_eq!(licensing.deal_rows, 3);
        assert_eq!(licensing.unmatched_titles, 1);

        let roi = read_text(&storage, "anime-impact/processed/licensing_roi.csv").await;
        let rows: Vec<&str> = roi.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("title_id,title,region_code,license_type"));
        // US: 15.6M * 0.15 = 2.34M against 750k -> 212%
        assert!(rows[1].starts_with("1,Cowboy Bebop,US,"));
        assert!(rows[1].contains(",212"));

        let summary = report.roi.unwrap();
        assert_eq!(summary.records, 2);
    }

    #[tokio::test]
    async fn test_missing_licensing_inputs_fail_only_those_artifacts() {
        let storage = memory_storage().await;
        let cfg = config(
            r#"
licensing:
  deals_key: sources/missing.csv
  regional_key: sources/missing.csv
"#,
        );
        let mut pipeline = Pipeline::new(cfg, storage.clone(), FakeCatalog::new(vec![bebop()]));

        let report = pipeline.run(&[1]).await.unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failed_artifacts.len(), 4);
        assert_eq!(
            report.failed_names(),
            "licensing_deals_clean.csv, licensing_enriched.csv, regional_performance_clean.csv, licensing_roi.csv"
        );
        assert_eq!(
            storage.list("anime-impact/processed").await.unwrap(),
            vec!["anime-impact/processed/title_catalog_clean.csv"]
        );
    }

    #[tokio::test]
    async fn test_no_survivors_writes_nothing() {
        let storage = memory_storage().await;
        let mut pipeline = Pipeline::new(config(""), storage.clone(), FakeCatalog::new(vec![]));

        let err = pipeline.run(&[9999998, 9999999]).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::NoSurvivors {
                requested: 2,
                failed: 2,
                skipped: 0
            }
        ));
        assert!(storage.list("anime-impact").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_items_are_counted_by_reason() {
        let storage = memory_storage().await;
        let source = FakeCatalog::new(vec![
            bebop(),
            (7, json!({"data": {"mal_id": 7, "title": "Overrated", "score": 11.0}})),
            (8, json!({"status": 500, "message": "upstream"})),
        ]);
        let mut pipeline = Pipeline::new(config(""), storage.clone(), source);

        let report = pipeline.run(&[1, 1, 7, 8]).await.unwrap();
        let stats = &report.stats;

        assert_eq!(stats.total_requested, 4);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.skipped_duplicate, 1);
        assert_eq!(stats.skipped_validation, 1);
        assert_eq!(stats.skipped_parse, 1);
        assert_eq!(stats.succeeded + stats.failed + stats.skipped, stats.total_requested);

        // The quality report sees every parsed record, duplicates included.
        assert_eq!(report.validation.total_rows, 3);
        assert_eq!(report.validation.duplicate_ids, 1);

        let catalog = read_text(&storage, "anime-impact/processed/title_catalog_clean.csv").await;
        assert_eq!(catalog.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_failure_log_records_each_dropped_item() {
        let storage = memory_storage().await;
        let cfg = config(
            r#"
error_handling:
  failure_log: true
"#,
        );
        let mut pipeline = Pipeline::new(cfg, storage.clone(), FakeCatalog::new(vec![bebop()]));

        let report = pipeline.run(&[1, 404]).await.unwrap();
        assert_eq!(report.failures.fetch, 1);
        assert_eq!(report.failures.total(), 1);

        let keys = storage.list("anime-impact/failures").await.unwrap();
        assert_eq!(keys.len(), 1);
        let log = read_text(&storage, &keys[0]).await;
        let line: Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
        assert_eq!(line["item"], "404");
        assert_eq!(line["stage"], "fetch");
    }
}

mod storage_failures {
    use super::*;

    async fn local_storage(dir: &std::path::Path) -> StorageGatewayRef {
        Arc::new(
            StorageGateway::for_url(dir.to_str().unwrap())
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_raw_upload_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("anime-impact")).unwrap();
        // A regular file where the raw directory should be.
        std::fs::write(dir.path().join("anime-impact/raw"), b"blocked").unwrap();

        let storage = local_storage(dir.path()).await;
        let mut pipeline = Pipeline::new(config(""), storage, FakeCatalog::new(vec![bebop()]));

        let report = pipeline.run(&[1]).await.unwrap();

        assert_eq!(report.stats.raw_upload_failures, 1);
        assert_eq!(report.stats.succeeded, 1);
        assert!(report.is_complete());
        assert!(
            dir.path()
                .join("anime-impact/processed/title_catalog_clean.csv")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_processed_upload_failure_marks_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("anime-impact")).unwrap();
        std::fs::write(dir.path().join("anime-impact/processed"), b"blocked").unwrap();

        let storage = local_storage(dir.path()).await;
        let mut pipeline = Pipeline::new(config(""), storage, FakeCatalog::new(vec![bebop()]));

        let report = pipeline.run(&[1]).await.unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failed_names(), "title_catalog_clean.csv");
        assert!(report.written.is_empty());
        assert!(dir.path().join("anime-impact/raw/1/full.json").exists());
    }

    #[tokio::test]
    async fn test_local_copy_of_processed_tables() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let cfg = config(&format!("output:\n  local_dir: {}\n", out.display()));

        let mut pipeline = Pipeline::new(cfg, memory_storage().await, FakeCatalog::new(vec![bebop()]));
        pipeline.run(&[1]).await.unwrap();

        let copy = std::fs::read_to_string(out.join("title_catalog_clean.csv")).unwrap();
        assert!(copy.starts_with("id,title,"));
    }
}

mod entry_point {
    use super::*;
    use catalog_roi::run_pipeline;

    #[tokio::test]
    async fn test_unreadable_identifier_list_halts_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config("");
        cfg.source.identifiers_path = dir.path().join("missing.txt");

        let err = run_pipeline(cfg, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::ReadIdentifiers { .. }));
    }

    #[test]
    fn test_config_defaults() {
        let cfg = Config::from_yaml(
            r#"
source:
  identifiers_path: config/anime_ids.txt
storage:
  url: "s3://bucket"
"#,
        )
        .unwrap();

        assert_eq!(cfg.source.base_url, "https://api.jikan.moe/v4");
        assert_eq!(cfg.source.min_interval_ms, 550);
        assert_eq!(cfg.source.retry.max_attempts, 3);
        assert_eq!(cfg.namespace(), "anime-impact");
        assert!(cfg.licensing.is_none());
        assert!(!cfg.metrics.enabled);
    }
}
