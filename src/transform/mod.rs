//! Raw payloads and source rows into typed records.
//!
//! Parsing only rejects records that lack an identity (id, title, region,
//! cost, revenue). Everything else is coerced tolerantly and range checks are
//! left to [`crate::validate`].

pub mod coerce;

use serde_json::Value;
use snafu::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{
    MissingDataSnafu, MissingFieldSnafu, NotNumericSnafu, Rejection, UnknownLicenseTypeSnafu,
};
use crate::model::{
    DealSourceRow, EnrichedDeal, Identifier, LicenseType, LicensingDeal, PopularityTier,
    RawPayload, RegionalPerformance, RegionalSourceRow, TitleRecord,
};

/// Separator used when flattening name collections.
pub const LIST_SEPARATOR: &str = "|";

/// Parse a raw API payload into a catalog record.
pub fn parse_title(payload: &RawPayload) -> Result<TitleRecord, Rejection> {
    let data = payload
        .body
        .get("data")
        .filter(|d| d.is_object())
        .context(MissingDataSnafu)?;

    let id = data
        .get("mal_id")
        .filter(|v| !v.is_null())
        .context(MissingFieldSnafu { field: "mal_id" })?;
    let title = data
        .get("title")
        .and_then(Value::as_str)
        .context(MissingFieldSnafu { field: "title" })?;

    let aired = data.get("aired");
    let popularity_rank = coerce::json_i64(data.get("popularity"));

    Ok(TitleRecord {
        id: Identifier::from_json(id),
        title: title.to_string(),
        title_english: coerce::json_text(data.get("title_english")),
        title_japanese: coerce::json_text(data.get("title_japanese")),
        media_type: coerce::json_text(data.get("type")),
        episodes: coerce::json_i64(data.get("episodes")),
        status: coerce::json_text(data.get("status")),
        aired_from: coerce::json_text(aired.and_then(|a| a.get("from"))),
        aired_to: coerce::json_text(aired.and_then(|a| a.get("to"))),
        score: coerce::json_f64(data.get("score")),
        scored_by: coerce::json_i64(data.get("scored_by")),
        rank: coerce::json_i64(data.get("rank")),
        popularity_rank,
        members: coerce::json_i64(data.get("members")),
        favorites: coerce::json_i64(data.get("favorites")),
        source_material: coerce::json_text(data.get("source")),
        rating: coerce::json_text(data.get("rating")),
        season: coerce::json_text(data.get("season")),
        release_year: coerce::json_i64(data.get("year")),
        duration: coerce::json_text(data.get("duration")),
        studios: joined_names(data.get("studios")),
        producers: joined_names(data.get("producers")),
        genres: joined_names(data.get("genres")),
        popularity_tier: popularity_tier(popularity_rank),
    })
}

/// Flatten `[{"name": ..}, ..]` into a separator-joined string in source order.
fn joined_names(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR)
        })
        .unwrap_or_default()
}

/// Bin a popularity rank into a tier over `(0,100]`, `(100,500]`,
/// `(500,1000]` and `(1000,∞)`. Absent or non-positive ranks get no tier.
pub fn popularity_tier(rank: Option<i64>) -> Option<PopularityTier> {
    match rank? {
        r if r <= 0 => None,
        r if r <= 100 => Some(PopularityTier::Blockbuster),
        r if r <= 500 => Some(PopularityTier::High),
        r if r <= 1000 => Some(PopularityTier::Medium),
        _ => Some(PopularityTier::Niche),
    }
}

/// Days between start and end. Absent when either date is missing or the
/// range is inverted.
pub fn deal_duration(
    start: Option<chrono::NaiveDate>,
    end: Option<chrono::NaiveDate>,
) -> Option<i64> {
    let days = (end? - start?).num_days();
    (days >= 0).then_some(days)
}

/// Cost spread over the deal duration; zero when the duration is zero or
/// undefined.
pub fn cost_per_day(cost: f64, duration_days: Option<i64>) -> f64 {
    match duration_days {
        Some(days) if days > 0 => cost / days as f64,
        _ => 0.0,
    }
}

fn required<'a>(cell: &'a Option<String>, field: &'static str) -> Result<&'a str, Rejection> {
    cell.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .context(MissingFieldSnafu { field })
}

fn optional(cell: &Option<String>) -> Option<&str> {
    cell.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a source deal row into a licensing deal with derived economics.
pub fn parse_deal(row: &DealSourceRow) -> Result<LicensingDeal, Rejection> {
    let raw_id = required(&row.anime_id, "anime_id")?;
    let title_id = coerce::text_i64(raw_id).context(NotNumericSnafu {
        field: "anime_id",
        value: raw_id,
    })?;
    let region_code = required(&row.region_code, "region_code")?;
    let raw_type = required(&row.licensing_type, "licensing_type")?;
    let license_type =
        LicenseType::parse(raw_type).context(UnknownLicenseTypeSnafu { value: raw_type })?;
    let raw_cost = required(&row.estimated_cost_usd, "estimated_cost_usd")?;
    let cost_usd = coerce::text_f64(raw_cost).context(NotNumericSnafu {
        field: "estimated_cost_usd",
        value: raw_cost,
    })?;

    let license_start_date = optional(&row.license_start_date).and_then(coerce::text_date);
    let license_end_date = optional(&row.license_end_date).and_then(coerce::text_date);
    let duration_days = deal_duration(license_start_date, license_end_date);

    Ok(LicensingDeal {
        title_id,
        source_title: optional(&row.anime_title).map(str::to_string),
        region_code: region_code.to_string(),
        license_start_date,
        license_end_date,
        license_type,
        cost_usd,
        duration_days,
        cost_per_day_usd: cost_per_day(cost_usd, duration_days),
        is_exclusive: license_type == LicenseType::Exclusive,
    })
}

/// Parse a source regional row.
pub fn parse_regional(row: &RegionalSourceRow) -> Result<RegionalPerformance, Rejection> {
    let region_code = required(&row.region_code, "region_code")?;
    let raw_revenue = required(&row.estimated_revenue_usd, "estimated_revenue_usd")?;
    let revenue_usd = coerce::text_f64(raw_revenue).context(NotNumericSnafu {
        field: "estimated_revenue_usd",
        value: raw_revenue,
    })?;

    let period = optional(&row.quarter_date).map(str::to_string);
    let subscriber_count = optional(&row.estimated_subscriber_count).and_then(coerce::text_i64);
    let revenue_per_subscriber = match subscriber_count {
        Some(n) if n > 0 => Some(revenue_usd / n as f64),
        _ => None,
    };

    Ok(RegionalPerformance {
        region_code: region_code.to_string(),
        quarter_start: period.as_deref().and_then(coerce::quarter_start),
        period,
        subscriber_count,
        revenue_usd,
        arpu_usd: optional(&row.arpu_usd).and_then(coerce::text_f64),
        churn_rate_percent: optional(&row.churn_rate_percent).and_then(coerce::text_f64),
        revenue_per_subscriber,
    })
}

/// Outcome of transforming a batch of source rows.
#[derive(Debug, Clone)]
pub struct RowBatch<T> {
    pub records: Vec<T>,
    /// Zero-based row index and reason for every rejected row.
    pub rejected: Vec<(usize, Rejection)>,
}

/// Transform every row, keeping rejections for the report.
pub fn parse_rows<R, T>(
    table: &str,
    rows: &[R],
    parse: impl Fn(&R) -> Result<T, Rejection>,
) -> RowBatch<T> {
    let mut records = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        match parse(row) {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!("Rejected {} row {}: {}", table, idx, reason);
                rejected.push((idx, reason));
            }
        }
    }

    debug!(
        "Transformed {}: {} rows kept, {} rejected",
        table,
        records.len(),
        rejected.len()
    );
    RowBatch { records, rejected }
}

/// Result of joining deals to the catalog.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub deals: Vec<EnrichedDeal>,
    /// Deals whose title id is not in the catalog.
    pub unmatched: usize,
}

/// Join each deal with its catalog title. Deals without a title are
/// excluded and counted.
pub fn enrich(deals: &[LicensingDeal], titles: &[TitleRecord]) -> Enrichment {
    let mut by_id: HashMap<i64, &TitleRecord> = HashMap::with_capacity(titles.len());
    for title in titles {
        if let Some(id) = title.id.as_int() {
            by_id.entry(id).or_insert(title);
        }
    }

    let mut enrichment = Enrichment::default();
    for deal in deals {
        match by_id.get(&deal.title_id) {
            Some(title) => enrichment.deals.push(EnrichedDeal::new(deal, title)),
            None => {
                debug!(
                    "No catalog title {} for deal in {}",
                    deal.title_id, deal.region_code
                );
                enrichment.unmatched += 1;
            }
        }
    }
    enrichment
}
