//! Revenue attribution and return on investment per licensing deal.
//!
//! Revenue for a region is attributed to a title with a tiered rate chosen
//! from the title's score and the deal's exclusivity. The rates are a
//! heuristic; they are configuration so they can be tuned without a rebuild.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ConfigError, InvalidAttributionRateSnafu};
use crate::model::{EnrichedDeal, RegionalPerformance, RoiRecord};

/// Months of attributed revenue per regional snapshot.
pub const MONTHS_PER_QUARTER: f64 = 3.0;

/// Attribution rates by title score and deal exclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributionRates {
    /// Scored title under an exclusive deal.
    #[serde(default = "default_scored_exclusive")]
    pub scored_exclusive: f64,

    /// Scored title under a shared or broadcast deal.
    #[serde(default = "default_scored_shared")]
    pub scored_shared: f64,

    /// Title without a score.
    #[serde(default = "default_unscored")]
    pub unscored: f64,
}

fn default_scored_exclusive() -> f64 {
    0.15
}

fn default_scored_shared() -> f64 {
    0.10
}

fn default_unscored() -> f64 {
    0.05
}

impl Default for AttributionRates {
    fn default() -> Self {
        Self {
            scored_exclusive: default_scored_exclusive(),
            scored_shared: default_scored_shared(),
            unscored: default_unscored(),
        }
    }
}

impl AttributionRates {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("scored_exclusive", self.scored_exclusive),
            ("scored_shared", self.scored_shared),
            ("unscored", self.unscored),
        ] {
            ensure!(
                (0.0..=1.0).contains(&value),
                InvalidAttributionRateSnafu { name, value }
            );
        }
        Ok(())
    }

    /// Pick the rate for one title/deal pair.
    pub fn rate_for(&self, score: Option<f64>, is_exclusive: bool) -> f64 {
        match (score.is_some(), is_exclusive) {
            (true, true) => self.scored_exclusive,
            (true, false) => self.scored_shared,
            (false, _) => self.unscored,
        }
    }
}

/// `(attributed - cost) / cost * 100`, or 0 for a free deal.
pub fn roi_percent(attributed: f64, cost: f64) -> f64 {
    if cost > 0.0 {
        (attributed - cost) / cost * 100.0
    } else {
        0.0
    }
}

/// Months to recover the cost from attributed monthly revenue.
///
/// Zero for a free deal, absent when a paid deal attributes nothing.
pub fn payback_months(attributed: f64, cost: f64) -> Option<f64> {
    if cost <= 0.0 {
        return Some(0.0);
    }
    let monthly = attributed / MONTHS_PER_QUARTER;
    (monthly > 0.0).then(|| cost / monthly)
}

/// Records plus the deals that had no regional snapshot.
#[derive(Debug, Clone, Default)]
pub struct RoiOutcome {
    pub records: Vec<RoiRecord>,
    pub unmatched_region: usize,
}

/// Compute one ROI record per enriched deal, using the first regional
/// snapshot of the deal's region.
pub fn compute_roi(
    enriched: &[EnrichedDeal],
    regional: &[RegionalPerformance],
    rates: &AttributionRates,
) -> RoiOutcome {
    let mut revenue_by_region: HashMap<&str, f64> = HashMap::new();
    for row in regional {
        revenue_by_region
            .entry(row.region_code.as_str())
            .or_insert(row.revenue_usd);
    }

    let mut outcome = RoiOutcome::default();
    for deal in enriched {
        let Some(&revenue) = revenue_by_region.get(deal.region_code.as_str()) else {
            debug!(
                "No regional performance for {} (title {})",
                deal.region_code, deal.title_id
            );
            outcome.unmatched_region += 1;
            continue;
        };

        let attribution_rate = rates.rate_for(deal.score, deal.is_exclusive);
        let attributed = revenue * attribution_rate;

        outcome.records.push(RoiRecord {
            title_id: deal.title_id,
            title: deal.title.clone(),
            region_code: deal.region_code.clone(),
            license_type: deal.license_type,
            licensing_cost_usd: deal.cost_usd,
            attribution_rate,
            attributed_revenue_usd: attributed,
            roi_percent: roi_percent(attributed, deal.cost_usd),
            payback_period_months: payback_months(attributed, deal.cost_usd),
            score: deal.score,
            is_exclusive: deal.is_exclusive,
        });
    }
    outcome
}

/// Aggregate ROI figures for the run report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoiSummary {
    pub records: usize,
    pub mean_roi_percent: Option<f64>,
    pub median_roi_percent: Option<f64>,
    pub max_roi_percent: Option<f64>,
    pub min_roi_percent: Option<f64>,
    pub exclusive_mean_roi_percent: Option<f64>,
    pub non_exclusive_mean_roi_percent: Option<f64>,
}

impl RoiSummary {
    pub fn from_records(records: &[RoiRecord]) -> Self {
        let mut all: Vec<f64> = records.iter().map(|r| r.roi_percent).collect();
        all.sort_by(f64::total_cmp);

        let exclusive: Vec<f64> = records
            .iter()
            .filter(|r| r.is_exclusive)
            .map(|r| r.roi_percent)
            .collect();
        let shared: Vec<f64> = records
            .iter()
            .filter(|r| !r.is_exclusive)
            .map(|r| r.roi_percent)
            .collect();

        Self {
            records: records.len(),
            mean_roi_percent: mean(&all),
            median_roi_percent: median(&all),
            max_roi_percent: all.last().copied(),
            min_roi_percent: all.first().copied(),
            exclusive_mean_roi_percent: mean(&exclusive),
            non_exclusive_mean_roi_percent: mean(&shared),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of an already sorted slice.
fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LicenseType;

    fn deal(region: &str, cost: f64, score: Option<f64>, license_type: LicenseType) -> EnrichedDeal {
        EnrichedDeal {
            title_id: 1,
            title: "Cowboy Bebop".to_string(),
            region_code: region.to_string(),
            license_start_date: None,
            license_end_date: None,
            license_type,
            cost_usd: cost,
            duration_days: None,
            cost_per_day_usd: 0.0,
            is_exclusive: license_type == LicenseType::Exclusive,
            release_year: Some(1998),
            score,
            popularity_tier: None,
        }
    }

    fn region(code: &str, revenue: f64) -> RegionalPerformance {
        RegionalPerformance {
            region_code: code.to_string(),
            period: Some("2024-Q1".to_string()),
            quarter_start: None,
            subscriber_count: None,
            revenue_usd: revenue,
            arpu_usd: None,
            churn_rate_percent: None,
            revenue_per_subscriber: None,
        }
    }

    #[test]
    fn test_attribution_rate_selection() {
        let rates = AttributionRates::default();
        assert_eq!(rates.rate_for(Some(8.75), true), 0.15);
        assert_eq!(rates.rate_for(Some(8.75), false), 0.10);
        assert_eq!(rates.rate_for(None, true), 0.05);
        assert_eq!(rates.rate_for(None, false), 0.05);
    }

    #[test]
    fn test_zero_score_counts_as_scored() {
        assert_eq!(AttributionRates::default().rate_for(Some(0.0), true), 0.15);
    }

    #[test]
    fn test_exclusive_scored_deal() {
        let outcome = compute_roi(
            &[deal("US", 750000.0, Some(8.75), LicenseType::Exclusive)],
            &[region("US", 15600000.0)],
            &AttributionRates::default(),
        );
        let record = &outcome.records[0];
        assert!((record.attributed_revenue_usd - 2340000.0).abs() < 1e-6);
        assert!((record.roi_percent - 212.0).abs() < 1e-9);
        let payback = record.payback_period_months.unwrap();
        assert!((payback - 750000.0 / 780000.0).abs() < 1e-9);
    }

    #[test]
    fn test_free_deal_has_zero_roi_and_payback() {
        let outcome = compute_roi(
            &[deal("US", 0.0, Some(8.0), LicenseType::Shared)],
            &[region("US", 1000.0)],
            &AttributionRates::default(),
        );
        assert_eq!(outcome.records[0].roi_percent, 0.0);
        assert_eq!(outcome.records[0].payback_period_months, Some(0.0));
    }

    #[test]
    fn test_payback_absent_without_revenue() {
        let outcome = compute_roi(
            &[deal("US", 500000.0, Some(8.0), LicenseType::Exclusive)],
            &[region("US", 0.0)],
            &AttributionRates::default(),
        );
        let record = &outcome.records[0];
        assert_eq!(record.payback_period_months, None);
        assert_eq!(record.roi_percent, -100.0);
    }

    #[test]
    fn test_first_region_row_wins_and_unmatched_counted() {
        let outcome = compute_roi(
            &[
                deal("US", 100.0, None, LicenseType::Broadcast),
                deal("BR", 100.0, None, LicenseType::Broadcast),
            ],
            &[region("US", 1000.0), region("US", 9999.0)],
            &AttributionRates::default(),
        );
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.unmatched_region, 1);
        assert!((outcome.records[0].attributed_revenue_usd - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rates_validation() {
        assert!(AttributionRates::default().validate().is_ok());
        let bad = AttributionRates {
            unscored: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidAttributionRate { name: "unscored", .. })
        ));
    }

    #[test]
    fn test_summary() {
        let outcome = compute_roi(
            &[
                deal("US", 100.0, Some(7.0), LicenseType::Exclusive),
                deal("US", 100.0, Some(7.0), LicenseType::Shared),
                deal("US", 100.0, None, LicenseType::Shared),
            ],
            &[region("US", 2000.0)],
            &AttributionRates::default(),
        );
        // attributed: 300, 200, 100 -> roi: 200, 100, 0
        let summary = RoiSummary::from_records(&outcome.records);
        let close = |v: Option<f64>, expected: f64| (v.unwrap() - expected).abs() < 1e-6;
        assert_eq!(summary.records, 3);
        assert!(close(summary.max_roi_percent, 200.0));
        assert!(close(summary.min_roi_percent, 0.0));
        assert!(close(summary.median_roi_percent, 100.0));
        assert!(close(summary.mean_roi_percent, 100.0));
        assert!(close(summary.exclusive_mean_roi_percent, 200.0));
        assert!(close(summary.non_exclusive_mean_roi_percent, 50.0));

        assert_eq!(RoiSummary::from_records(&[]).mean_roi_percent, None);
    }
}
