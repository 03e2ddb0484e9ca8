//! Run statistics, orchestrator phases and the final report.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::failures::FailureStats;
use crate::roi::RoiSummary;
use crate::table::Artifact;
use crate::validate::ValidationReport;

/// Orchestrator lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    Fetching,
    TransformingValidating,
    Aggregating,
    Persisting,
    Reported,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Fetching => "fetching",
            Phase::TransformingValidating => "transforming_validating",
            Phase::Aggregating => "aggregating",
            Phase::Persisting => "persisting",
            Phase::Reported => "reported",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item counters for one run.
///
/// `total_requested == succeeded + failed + skipped` once fetching and
/// transformation have finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineRunStats {
    pub total_requested: usize,
    pub succeeded: usize,
    /// Identifiers whose fetch failed (not found or retries exhausted).
    pub failed: usize,
    /// Identifiers fetched but dropped by parsing, validation or dedup.
    pub skipped: usize,
    pub skipped_parse: usize,
    pub skipped_validation: usize,
    pub skipped_duplicate: usize,
    /// Raw payloads that could not be stored. Processing continued.
    pub raw_upload_failures: usize,
    /// Lines of the identifier list that were not integers.
    pub malformed_identifiers: usize,
    /// External calls, retries included.
    pub fetch_calls: u64,
}

impl PipelineRunStats {
    /// `succeeded / total_requested * 100`, 0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total_requested == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total_requested as f64 * 100.0
        }
    }

    pub fn success_rate_display(&self) -> String {
        format!("{:.1}%", self.success_rate())
    }
}

/// Licensing-side counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LicensingSummary {
    pub deal_rows: usize,
    pub deals_rejected: usize,
    pub regional_rows: usize,
    pub regional_rejected: usize,
    /// Deals whose title is not in the catalog.
    pub unmatched_titles: usize,
    /// Enriched deals whose region has no performance row.
    pub unmatched_regions: usize,
}

/// Everything a finished run reports.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: PipelineRunStats,
    pub written: Vec<Artifact>,
    pub failed_artifacts: Vec<Artifact>,
    pub validation: ValidationReport,
    pub licensing: Option<LicensingSummary>,
    pub roi: Option<RoiSummary>,
    pub failures: FailureStats,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.failed_artifacts.is_empty()
    }

    pub fn failed_names(&self) -> String {
        self.failed_artifacts
            .iter()
            .map(Artifact::file_name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn log(&self) {
        let stats = &self.stats;
        info!("Run finished in {:.1}s", self.elapsed.as_secs_f64());
        info!("  Requested: {}", stats.total_requested);
        info!("  Succeeded: {}", stats.succeeded);
        info!("  Failed: {}", stats.failed);
        info!(
            "  Skipped: {} (parse={}, validation={}, duplicate={})",
            stats.skipped, stats.skipped_parse, stats.skipped_validation, stats.skipped_duplicate
        );
        info!("  Success rate: {}", stats.success_rate_display());
        info!("  External calls: {}", stats.fetch_calls);
        if stats.raw_upload_failures > 0 {
            warn!("  Raw upload failures: {}", stats.raw_upload_failures);
        }
        if stats.malformed_identifiers > 0 {
            warn!("  Malformed identifiers: {}", stats.malformed_identifiers);
        }

        let v = &self.validation;
        info!(
            "  Catalog: {} rows x {} columns, {} with positive score, mean score {}",
            v.total_rows,
            v.total_columns,
            v.rows_with_positive_score,
            fmt_opt(v.mean_score)
        );

        if let Some(licensing) = &self.licensing {
            info!(
                "  Licensing: {} deals ({} rejected, {} without title), {} regional rows ({} rejected)",
                licensing.deal_rows,
                licensing.deals_rejected,
                licensing.unmatched_titles,
                licensing.regional_rows,
                licensing.regional_rejected
            );
        }
        if let Some(roi) = &self.roi {
            info!(
                "  ROI: {} records, mean {}%, median {}%, exclusive {}%, non-exclusive {}%",
                roi.records,
                fmt_opt(roi.mean_roi_percent),
                fmt_opt(roi.median_roi_percent),
                fmt_opt(roi.exclusive_mean_roi_percent),
                fmt_opt(roi.non_exclusive_mean_roi_percent)
            );
        }

        for artifact in &self.written {
            info!("  Wrote {}", artifact);
        }
        for artifact in &self.failed_artifacts {
            warn!("  Failed {}", artifact);
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}
