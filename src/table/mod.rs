//! CSV encoding of output artifacts and decoding of source tables.

use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::prelude::*;
use std::fmt;

use crate::error::{CsvFlushSnafu, CsvReadSnafu, CsvWriteSnafu, TableError};
use crate::model::{EnrichedDeal, LicensingDeal, RegionalPerformance, RoiRecord, TitleRecord};

/// A record that is written as one CSV row.
///
/// `COLUMNS` must list the serialized field names in declaration order. The
/// header is written from it so that an empty table still has one.
pub trait TableRow: Serialize + DeserializeOwned {
    const COLUMNS: &'static [&'static str];
}

impl TableRow for TitleRecord {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "title",
        "title_english",
        "title_japanese",
        "media_type",
        "episodes",
        "status",
        "aired_from",
        "aired_to",
        "score",
        "scored_by",
        "rank",
        "popularity_rank",
        "members",
        "favorites",
        "source_material",
        "rating",
        "season",
        "release_year",
        "duration",
        "studios",
        "producers",
        "genres",
        "popularity_tier",
    ];
}

impl TableRow for LicensingDeal {
    const COLUMNS: &'static [&'static str] = &[
        "title_id",
        "source_title",
        "region_code",
        "license_start_date",
        "license_end_date",
        "license_type",
        "cost_usd",
        "duration_days",
        "cost_per_day_usd",
        "is_exclusive",
    ];
}

impl TableRow for EnrichedDeal {
    const COLUMNS: &'static [&'static str] = &[
        "title_id",
        "title",
        "region_code",
        "license_start_date",
        "license_end_date",
        "license_type",
        "cost_usd",
        "duration_days",
        "cost_per_day_usd",
        "is_exclusive",
        "release_year",
        "score",
        "popularity_tier",
    ];
}

impl TableRow for RegionalPerformance {
    const COLUMNS: &'static [&'static str] = &[
        "region_code",
        "period",
        "quarter_start",
        "subscriber_count",
        "revenue_usd",
        "arpu_usd",
        "churn_rate_percent",
        "revenue_per_subscriber",
    ];
}

impl TableRow for RoiRecord {
    const COLUMNS: &'static [&'static str] = &[
        "title_id",
        "title",
        "region_code",
        "license_type",
        "licensing_cost_usd",
        "attribution_rate",
        "attributed_revenue_usd",
        "roi_percent",
        "payback_period_months",
        "score",
        "is_exclusive",
    ];
}

/// The processed tables a run can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    TitleCatalog,
    LicensingDeals,
    LicensingEnriched,
    RegionalPerformance,
    LicensingRoi,
}

impl Artifact {
    pub const ALL: [Artifact; 5] = [
        Artifact::TitleCatalog,
        Artifact::LicensingDeals,
        Artifact::LicensingEnriched,
        Artifact::RegionalPerformance,
        Artifact::LicensingRoi,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::TitleCatalog => "title_catalog_clean.csv",
            Artifact::LicensingDeals => "licensing_deals_clean.csv",
            Artifact::LicensingEnriched => "licensing_enriched.csv",
            Artifact::RegionalPerformance => "regional_performance_clean.csv",
            Artifact::LicensingRoi => "licensing_roi.csv",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Encode rows as a comma-delimited UTF-8 table with a header line.
pub fn encode<T: TableRow>(table: &str, rows: &[T]) -> Result<Vec<u8>, TableError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer
        .write_record(T::COLUMNS)
        .context(CsvWriteSnafu { table })?;
    for row in rows {
        writer.serialize(row).context(CsvWriteSnafu { table })?;
    }

    writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context(CsvFlushSnafu { table })
}

/// Decode a headed table. Columns are matched by name; unknown columns are
/// ignored and missing ones deserialize as absent where the row type allows.
pub fn decode<T: DeserializeOwned>(table: &str, bytes: &[u8]) -> Result<Vec<T>, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    reader
        .deserialize()
        .map(|row| row.context(CsvReadSnafu { table }))
        .collect()
}
