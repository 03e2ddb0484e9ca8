//! Batch orchestration.
//!
//! A run moves through [`Phase`]s strictly in order:
//! fetch every identifier and store its raw payload, transform and validate
//! the payloads, aggregate the catalog with the licensing tables, persist the
//! processed artifacts, report. Everything happens on one task, one item at a
//! time.
//!
//! Per-item failures are counted and the run continues. The run stops early
//! only when nothing survives to aggregation.

mod identifiers;
mod licensing;
mod persist;
mod stats;

pub use identifiers::{IdentifierList, load_identifiers, parse_identifiers};
pub use licensing::{LicensingTables, build_tables, load_source};
pub use persist::{ArtifactWriter, CSV_CONTENT_TYPE, JSON_CONTENT_TYPE};
pub use stats::{LicensingSummary, Phase, PipelineRunStats, RunReport};

use chrono::Utc;
use snafu::prelude::*;
use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::emit;
use crate::error::{
    FetchSetupSnafu, PersistError, PipelineError, PipelineStorageSnafu, ValidationIssue,
};
use crate::failures::{FailureLog, FailureStats};
use crate::fetch::{JikanSource, RateLimitedFetchClient, TitleSourceRef};
use crate::metrics::events::{FailureStage, ItemFailed, ItemProcessed, ItemStatus, PhaseEntered, RunProgress};
use crate::model::{DealSourceRow, RawPayload, RegionalSourceRow, TitleRecord};
use crate::roi::RoiSummary;
use crate::storage::{StorageGateway, StorageGatewayRef};
use crate::table::{Artifact, TableRow};
use crate::transform::parse_title;
use crate::validate::{check_title, validate_batch};

/// Items between progress reports.
pub const PROGRESS_EVERY: usize = 10;

pub struct Pipeline {
    config: Config,
    storage: StorageGatewayRef,
    fetcher: RateLimitedFetchClient,
    writer: ArtifactWriter,
    failures: Option<FailureLog>,
    phase: Phase,
    stats: PipelineRunStats,
}

impl Pipeline {
    /// Wire a pipeline from its collaborators.
    pub fn new(config: Config, storage: StorageGatewayRef, source: TitleSourceRef) -> Self {
        let namespace = config.namespace().to_string();

        let fetcher = RateLimitedFetchClient::new(
            source,
            config.source.min_interval(),
            config.source.retry.policy(),
        );
        let writer = ArtifactWriter::new(
            storage.clone(),
            &namespace,
            config.output.local_dir.clone(),
        );
        let failures = config.error_handling.failure_log.then(|| {
            FailureLog::new(storage.clone(), &namespace, Utc::now())
                .with_flush_every(config.error_handling.flush_every)
        });

        Self {
            config,
            storage,
            fetcher,
            writer,
            failures,
            phase: Phase::Idle,
            stats: PipelineRunStats::default(),
        }
    }

    /// Build the storage gateway and HTTP source described by `config`.
    pub async fn from_config(config: Config) -> Result<Self, PipelineError> {
        let storage = Arc::new(
            StorageGateway::for_url_with_options(
                &config.storage.url,
                config.storage.storage_options.clone(),
            )
            .await
            .context(PipelineStorageSnafu)?,
        );
        info!("Storage: {}", storage.canonical_url());

        let source = Arc::new(
            JikanSource::new(&config.source.base_url, config.source.request_timeout())
                .context(FetchSetupSnafu)?,
        );

        Ok(Self::new(config, storage, source))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(next > self.phase);
        info!("Phase {} -> {}", self.phase, next);
        self.phase = next;
        emit!(PhaseEntered {
            phase: next.as_str()
        });
    }

    async fn record_failure(&mut self, item: &str, error: &(dyn Display + Sync), stage: FailureStage) {
        match self.failures.as_mut() {
            Some(log) => log.record(item, &error.to_string(), stage).await,
            None => emit!(ItemFailed { stage }),
        }
    }

    async fn finalize_failures(&mut self) -> FailureStats {
        let Some(log) = self.failures.as_mut() else {
            return FailureStats::default();
        };
        match log.finalize().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Failed to write failure log: {}", e);
                log.stats()
            }
        }
    }

    /// Run over an identifier list, counting its malformed lines.
    pub async fn run_list(&mut self, list: &IdentifierList) -> Result<RunReport, PipelineError> {
        self.stats.malformed_identifiers = list.malformed.len();
        self.run(&list.ids).await
    }

    /// Run the whole batch for `ids`.
    pub async fn run(&mut self, ids: &[i64]) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        self.stats.total_requested = ids.len();
        info!("Starting run for {} identifiers", ids.len());

        self.enter(Phase::Fetching);
        let payloads = self.fetch_all(ids).await;

        self.enter(Phase::TransformingValidating);
        let Transformed { parsed, titles } = self.transform_all(&payloads).await;

        if titles.is_empty() {
            let failures = self.finalize_failures().await;
            warn!(
                "No titles survived ({} failed, {} skipped, {} failure records); nothing written",
                self.stats.failed,
                self.stats.skipped,
                failures.total()
            );
            return Err(PipelineError::NoSurvivors {
                requested: self.stats.total_requested,
                failed: self.stats.failed,
                skipped: self.stats.skipped,
            });
        }

        self.enter(Phase::Aggregating);
        let validation = validate_batch(&parsed);
        let licensing = self.aggregate_licensing(&titles).await;

        self.enter(Phase::Persisting);
        let mut written = Vec::new();
        let mut failed_artifacts = Vec::new();

        let mut outcomes = vec![(
            Artifact::TitleCatalog,
            self.persist(Artifact::TitleCatalog, &titles).await,
        )];
        match &licensing {
            LicensingOutcome::Built(tables) => {
                outcomes.push((
                    Artifact::LicensingDeals,
                    self.persist(Artifact::LicensingDeals, &tables.deals).await,
                ));
                outcomes.push((
                    Artifact::LicensingEnriched,
                    self.persist(Artifact::LicensingEnriched, &tables.enriched).await,
                ));
                outcomes.push((
                    Artifact::RegionalPerformance,
                    self.persist(Artifact::RegionalPerformance, &tables.regional).await,
                ));
                outcomes.push((
                    Artifact::LicensingRoi,
                    self.persist(Artifact::LicensingRoi, &tables.roi).await,
                ));
            }
            LicensingOutcome::Unavailable => {
                failed_artifacts.extend(&Artifact::ALL[1..]);
            }
            LicensingOutcome::NotConfigured => {}
        }

        for (artifact, result) in outcomes {
            match result {
                Ok(()) => written.push(artifact),
                Err(e) => {
                    warn!("Failed to store {}: {}", artifact, e);
                    self.record_failure(artifact.file_name(), &e, FailureStage::Upload)
                        .await;
                    failed_artifacts.push(artifact);
                }
            }
        }
        failed_artifacts.sort_by_key(|a| Artifact::ALL.iter().position(|b| b == a));

        let failures = self.finalize_failures().await;
        self.stats.fetch_calls = self.fetcher.stats().calls_made;
        self.enter(Phase::Reported);

        let (licensing_summary, roi): (Option<LicensingSummary>, Option<RoiSummary>) =
            match licensing {
                LicensingOutcome::Built(tables) => {
                    (Some(tables.summary.clone()), Some(tables.roi_summary()))
                }
                _ => (None, None),
            };

        Ok(RunReport {
            stats: self.stats.clone(),
            written,
            failed_artifacts,
            validation,
            licensing: licensing_summary,
            roi,
            failures,
            elapsed: started.elapsed(),
        })
    }

    /// Fetch every identifier and store the raw payloads that arrive.
    async fn fetch_all(&mut self, ids: &[i64]) -> Vec<RawPayload> {
        let total = ids.len();
        let mut payloads = Vec::with_capacity(total);

        for (idx, &id) in ids.iter().enumerate() {
            match self.fetcher.fetch(id).await {
                Ok(payload) => {
                    self.store_raw(&payload).await;
                    payloads.push(payload);
                }
                Err(e) => {
                    warn!("Fetch failed for title {}: {}", id, e);
                    self.stats.failed += 1;
                    emit!(ItemProcessed {
                        status: ItemStatus::Failed
                    });
                    self.record_failure(&id.to_string(), &e, FailureStage::Fetch)
                        .await;
                }
            }

            let done = idx + 1;
            if done % PROGRESS_EVERY == 0 || done == total {
                info!("Progress: {}/{} titles fetched", done, total);
                emit!(RunProgress {
                    processed: done,
                    total
                });
            }
        }
        payloads
    }

    async fn store_raw(&mut self, payload: &RawPayload) {
        let source = self.fetcher.source_name().to_string();
        match self.writer.store_raw(payload, &source).await {
            Ok(key) => debug!("Stored raw payload at {}", key),
            Err(e) => {
                warn!("Raw upload failed for title {}: {}", payload.requested_id, e);
                self.stats.raw_upload_failures += 1;
                self.record_failure(&payload.requested_id.to_string(), &e, FailureStage::Upload)
                    .await;
            }
        }
    }

    /// Parse and validate payloads, dropping duplicates after the first.
    async fn transform_all(&mut self, payloads: &[RawPayload]) -> Transformed {
        let mut parsed = Vec::with_capacity(payloads.len());
        let mut titles = Vec::with_capacity(payloads.len());
        let mut seen = HashSet::with_capacity(payloads.len());

        for payload in payloads {
            let item = payload.requested_id.to_string();

            let record = match parse_title(payload) {
                Ok(record) => record,
                Err(reason) => {
                    warn!("Skipping title {}: {}", item, reason);
                    self.stats.skipped += 1;
                    self.stats.skipped_parse += 1;
                    emit!(ItemProcessed {
                        status: ItemStatus::Skipped
                    });
                    self.record_failure(&item, &reason, FailureStage::Parse).await;
                    continue;
                }
            };

            parsed.push(record.clone());
            let issue = match check_title(&record) {
                Ok(id) if seen.insert(id) => None,
                Ok(id) => {
                    self.stats.skipped_duplicate += 1;
                    Some(ValidationIssue::DuplicateId { id })
                }
                Err(issue) => {
                    self.stats.skipped_validation += 1;
                    Some(issue)
                }
            };

            match issue {
                None => {
                    self.stats.succeeded += 1;
                    emit!(ItemProcessed {
                        status: ItemStatus::Succeeded
                    });
                    titles.push(record);
                }
                Some(issue) => {
                    warn!("Skipping title {}: {}", item, issue);
                    self.stats.skipped += 1;
                    emit!(ItemProcessed {
                        status: ItemStatus::Skipped
                    });
                    self.record_failure(&item, &issue, FailureStage::Validate).await;
                }
            }
        }

        info!(
            "Transformed {} payloads: {} valid, {} skipped",
            payloads.len(),
            titles.len(),
            payloads.len() - titles.len()
        );
        Transformed { parsed, titles }
    }

    async fn aggregate_licensing(&self, titles: &[TitleRecord]) -> LicensingOutcome {
        let Some(licensing) = self.config.licensing.clone() else {
            info!("No licensing inputs configured; writing the title catalog only");
            return LicensingOutcome::NotConfigured;
        };

        let deal_rows = load_source::<DealSourceRow>(&self.storage, &licensing.deals_key).await;
        let regional_rows =
            load_source::<RegionalSourceRow>(&self.storage, &licensing.regional_key).await;

        match (deal_rows, regional_rows) {
            (Ok(deal_rows), Ok(regional_rows)) => LicensingOutcome::Built(Box::new(build_tables(
                &deal_rows,
                &regional_rows,
                titles,
                &licensing.attribution,
            ))),
            (deals, regional) => {
                for e in [deals.err(), regional.err()].into_iter().flatten() {
                    warn!("Licensing input unavailable: {}", e);
                }
                LicensingOutcome::Unavailable
            }
        }
    }

    async fn persist<T: TableRow>(&self, artifact: Artifact, rows: &[T]) -> Result<(), PersistError> {
        let bytes = self.writer.write_table(artifact, rows).await?;
        info!("Stored {} ({} rows, {} bytes)", artifact, rows.len(), bytes);
        Ok(())
    }
}

/// Output of the transform phase.
struct Transformed {
    /// Every record that parsed, before validation and duplicate filtering.
    /// The batch quality report covers these.
    parsed: Vec<TitleRecord>,
    /// Records that passed validation, first occurrence of each id only.
    titles: Vec<TitleRecord>,
}

enum LicensingOutcome {
    NotConfigured,
    Unavailable,
    Built(Box<LicensingTables>),
}

/// Run a batch described entirely by `config`. `ids` overrides the
/// configured identifier list.
pub async fn run_pipeline(config: Config, ids: Option<Vec<i64>>) -> Result<RunReport, PipelineError> {
    let list = match ids {
        Some(ids) => IdentifierList {
            ids,
            malformed: Vec::new(),
        },
        None => load_identifiers(&config.source.identifiers_path).await?,
    };

    let mut pipeline = Pipeline::from_config(config).await?;
    pipeline.run_list(&list).await
}
