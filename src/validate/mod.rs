//! Record checks and batch quality reports.
//!
//! Checks never repair a record. A failing record is skipped by the caller
//! and counted under the returned [`ValidationIssue`].

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;

use crate::error::ValidationIssue;
use crate::model::{Identifier, LicensingDeal, RegionalPerformance, TitleRecord};
use crate::table::TableRow;

/// Inclusive score bounds.
pub const SCORE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=10.0;

/// Check a catalog record and return its integer id when it passes.
pub fn check_title(record: &TitleRecord) -> Result<i64, ValidationIssue> {
    let id = match &record.id {
        Identifier::Int(id) => *id,
        Identifier::Malformed(raw) => {
            return Err(ValidationIssue::NonIntegerId { raw: raw.clone() });
        }
    };
    if record.title.trim().is_empty() {
        return Err(ValidationIssue::EmptyTitle);
    }
    if let Some(score) = record.score
        && !SCORE_RANGE.contains(&score)
    {
        return Err(ValidationIssue::ScoreOutOfRange { score });
    }
    if let Some(episodes) = record.episodes
        && episodes < 0
    {
        return Err(ValidationIssue::NegativeEpisodes { episodes });
    }
    Ok(id)
}

pub fn validate_title(record: &TitleRecord) -> bool {
    check_title(record).is_ok()
}

/// Check a parsed licensing deal.
pub fn check_deal(deal: &LicensingDeal) -> Result<(), ValidationIssue> {
    if deal.region_code.trim().is_empty() {
        return Err(ValidationIssue::EmptyRegion);
    }
    if deal.cost_usd < 0.0 {
        return Err(ValidationIssue::NegativeCost {
            cost: deal.cost_usd,
        });
    }
    Ok(())
}

/// Check a parsed regional snapshot.
pub fn check_regional(row: &RegionalPerformance) -> Result<(), ValidationIssue> {
    if row.region_code.trim().is_empty() {
        return Err(ValidationIssue::EmptyRegion);
    }
    if row.revenue_usd < 0.0 {
        return Err(ValidationIssue::NegativeValue {
            field: "revenue_usd",
            value: row.revenue_usd,
        });
    }
    if let Some(subscribers) = row.subscriber_count
        && subscribers < 0
    {
        return Err(ValidationIssue::NegativeValue {
            field: "subscriber_count",
            value: subscribers as f64,
        });
    }
    Ok(())
}

/// Data quality summary for a batch of catalog records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub total_rows: usize,
    pub total_columns: usize,
    /// Absent values per column, in column order.
    pub null_counts: IndexMap<String, usize>,
    /// Rows whose id was already seen earlier in the batch.
    pub duplicate_ids: usize,
    pub rows_with_positive_score: usize,
    pub mean_score: Option<f64>,
    pub mean_episodes: Option<f64>,
}

/// Summarize a batch without mutating it.
pub fn validate_batch(records: &[TitleRecord]) -> ValidationReport {
    let columns = TitleRecord::COLUMNS;
    let mut null_counts: IndexMap<String, usize> =
        columns.iter().map(|c| (c.to_string(), 0)).collect();

    let mut seen = HashSet::with_capacity(records.len());
    let mut duplicate_ids = 0;

    for record in records {
        if !seen.insert(&record.id) {
            duplicate_ids += 1;
        }
        // Column names are the serialized field names.
        if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(record) {
            for (column, count) in null_counts.iter_mut() {
                if row.get(column).is_none_or(serde_json::Value::is_null) {
                    *count += 1;
                }
            }
        }
    }

    let scores: Vec<f64> = records.iter().filter_map(|r| r.score).collect();
    let episodes: Vec<f64> = records
        .iter()
        .filter_map(|r| r.episodes.map(|e| e as f64))
        .collect();

    ValidationReport {
        total_rows: records.len(),
        total_columns: columns.len(),
        null_counts,
        duplicate_ids,
        rows_with_positive_score: scores.iter().filter(|s| **s > 0.0).count(),
        mean_score: mean(&scores),
        mean_episodes: mean(&episodes),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
