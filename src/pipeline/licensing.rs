//! Licensing side of a run: source tables into deals, regional performance,
//! enriched deals and ROI records.

use serde::de::DeserializeOwned;
use snafu::prelude::*;
use tracing::{info, warn};

use crate::emit;
use crate::error::{LicensingDecodeSnafu, LicensingError, LicensingReadSnafu, Rejection, ValidationIssue};
use crate::metrics::events::RoiRecordsComputed;
use crate::model::{
    DealSourceRow, EnrichedDeal, LicensingDeal, RegionalPerformance, RegionalSourceRow, RoiRecord,
    TitleRecord,
};
use crate::roi::{AttributionRates, RoiSummary, compute_roi};
use crate::storage::StorageGateway;
use crate::table;
use crate::transform::{enrich, parse_deal, parse_regional, parse_rows};
use crate::validate::{check_deal, check_regional};

use super::stats::LicensingSummary;

/// Derived licensing tables for one run.
#[derive(Debug, Clone, Default)]
pub struct LicensingTables {
    pub deals: Vec<LicensingDeal>,
    pub enriched: Vec<EnrichedDeal>,
    pub regional: Vec<RegionalPerformance>,
    pub roi: Vec<RoiRecord>,
    pub summary: LicensingSummary,
}

/// Read and decode one source table from storage.
pub async fn load_source<R: DeserializeOwned>(
    storage: &StorageGateway,
    key: &str,
) -> Result<Vec<R>, LicensingError> {
    let bytes = storage.get(key).await.context(LicensingReadSnafu { key })?;
    let rows = table::decode(key, &bytes).context(LicensingDecodeSnafu { key })?;
    info!("Loaded {} rows from {}", rows.len(), key);
    Ok(rows)
}

/// Parse and check rows, keeping those that pass both.
fn clean<R, T>(
    table: &str,
    rows: &[R],
    parse: impl Fn(&R) -> Result<T, Rejection>,
    check: impl Fn(&T) -> Result<(), ValidationIssue>,
) -> (Vec<T>, usize) {
    let batch = parse_rows(table, rows, parse);
    let mut rejected = batch.rejected.len();

    let mut kept = Vec::with_capacity(batch.records.len());
    for record in batch.records {
        match check(&record) {
            Ok(()) => kept.push(record),
            Err(issue) => {
                warn!("Rejected {} row: {}", table, issue);
                rejected += 1;
            }
        }
    }
    (kept, rejected)
}

/// Build every licensing table from source rows and the validated catalog.
pub fn build_tables(
    deal_rows: &[DealSourceRow],
    regional_rows: &[RegionalSourceRow],
    titles: &[TitleRecord],
    rates: &AttributionRates,
) -> LicensingTables {
    let (deals, deals_rejected) = clean("licensing_deals", deal_rows, parse_deal, check_deal);
    let (regional, regional_rejected) =
        clean("regional_performance", regional_rows, parse_regional, check_regional);

    let enrichment = enrich(&deals, titles);
    let outcome = compute_roi(&enrichment.deals, &regional, rates);
    emit!(RoiRecordsComputed {
        count: outcome.records.len(),
        unmatched: outcome.unmatched_region,
    });

    LicensingTables {
        summary: LicensingSummary {
            deal_rows: deal_rows.len(),
            deals_rejected,
            regional_rows: regional_rows.len(),
            regional_rejected,
            unmatched_titles: enrichment.unmatched,
            unmatched_regions: outcome.unmatched_region,
        },
        deals,
        enriched: enrichment.deals,
        regional,
        roi: outcome.records,
    }
}

impl LicensingTables {
    pub fn roi_summary(&self) -> RoiSummary {
        RoiSummary::from_records(&self.roi)
    }
}
