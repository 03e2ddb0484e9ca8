//! Typed records flowing through the pipeline.
//!
//! Every struct here doubles as a CSV row: field order is column order, and
//! absent values are `None` (an empty cell), never zero.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Unmodified upstream record for one requested title.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    /// The identifier the payload was requested with.
    pub requested_id: i64,
    pub body: serde_json::Value,
}

impl RawPayload {
    pub fn new(requested_id: i64, body: serde_json::Value) -> Self {
        Self { requested_id, body }
    }
}

/// A title identifier as found in the source.
///
/// Non-integer identifiers survive parsing so that validation can reject
/// them explicitly instead of the parser guessing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Int(i64),
    Malformed(String),
}

impl Identifier {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(id) => Identifier::Int(id),
                None => Identifier::Malformed(n.to_string()),
            },
            serde_json::Value::String(s) => Identifier::Malformed(s.clone()),
            other => Identifier::Malformed(other.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Identifier::Int(id) => Some(*id),
            Identifier::Malformed(_) => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Int(id) => write!(f, "{id}"),
            Identifier::Malformed(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Identifier::Int(id) => serializer.serialize_i64(*id),
            Identifier::Malformed(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().parse::<i64>() {
            Ok(id) => Identifier::Int(id),
            Err(_) => Identifier::Malformed(raw),
        })
    }
}

/// Categorical bucket over popularity rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PopularityTier {
    Blockbuster,
    High,
    Medium,
    Niche,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleRecord {
    pub id: Identifier,
    pub title: String,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    pub media_type: Option<String>,
    pub episodes: Option<i64>,
    pub status: Option<String>,
    pub aired_from: Option<String>,
    pub aired_to: Option<String>,
    pub score: Option<f64>,
    pub scored_by: Option<i64>,
    pub rank: Option<i64>,
    pub popularity_rank: Option<i64>,
    pub members: Option<i64>,
    pub favorites: Option<i64>,
    pub source_material: Option<String>,
    pub rating: Option<String>,
    pub season: Option<String>,
    pub release_year: Option<i64>,
    pub duration: Option<String>,
    pub studios: String,
    pub producers: String,
    pub genres: String,
    pub popularity_tier: Option<PopularityTier>,
}

/// Kind of licensing contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseType {
    Exclusive,
    Shared,
    Broadcast,
}

impl LicenseType {
    /// Case-insensitive parse of the source spelling.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exclusive" => Some(LicenseType::Exclusive),
            "shared" => Some(LicenseType::Shared),
            "broadcast" => Some(LicenseType::Broadcast),
            _ => None,
        }
    }
}

/// A licensing deal row as it arrives from the source table.
///
/// Every cell is optional text; coercion happens in the transformer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealSourceRow {
    #[serde(default)]
    pub anime_id: Option<String>,
    #[serde(default)]
    pub anime_title: Option<String>,
    #[serde(default)]
    pub region_code: Option<String>,
    #[serde(default)]
    pub license_start_date: Option<String>,
    #[serde(default)]
    pub license_end_date: Option<String>,
    #[serde(default)]
    pub licensing_type: Option<String>,
    #[serde(default)]
    pub estimated_cost_usd: Option<String>,
}

/// A regional subscriber snapshot as it arrives from the source table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionalSourceRow {
    #[serde(default)]
    pub region_code: Option<String>,
    #[serde(default)]
    pub quarter_date: Option<String>,
    #[serde(default)]
    pub estimated_subscriber_count: Option<String>,
    #[serde(default)]
    pub estimated_revenue_usd: Option<String>,
    #[serde(default)]
    pub arpu_usd: Option<String>,
    #[serde(default)]
    pub churn_rate_percent: Option<String>,
}

/// One licensing contract for a title in a region, with derived economics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicensingDeal {
    pub title_id: i64,
    pub source_title: Option<String>,
    pub region_code: String,
    pub license_start_date: Option<NaiveDate>,
    pub license_end_date: Option<NaiveDate>,
    pub license_type: LicenseType,
    pub cost_usd: f64,
    pub duration_days: Option<i64>,
    pub cost_per_day_usd: f64,
    pub is_exclusive: bool,
}

/// Subscriber and revenue snapshot for one region in one quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalPerformance {
    pub region_code: String,
    pub period: Option<String>,
    pub quarter_start: Option<NaiveDate>,
    pub subscriber_count: Option<i64>,
    pub revenue_usd: f64,
    pub arpu_usd: Option<f64>,
    pub churn_rate_percent: Option<f64>,
    pub revenue_per_subscriber: Option<f64>,
}

/// A licensing deal joined with its catalog title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedDeal {
    pub title_id: i64,
    pub title: String,
    pub region_code: String,
    pub license_start_date: Option<NaiveDate>,
    pub license_end_date: Option<NaiveDate>,
    pub license_type: LicenseType,
    pub cost_usd: f64,
    pub duration_days: Option<i64>,
    pub cost_per_day_usd: f64,
    pub is_exclusive: bool,
    pub release_year: Option<i64>,
    pub score: Option<f64>,
    pub popularity_tier: Option<PopularityTier>,
}

impl EnrichedDeal {
    pub fn new(deal: &LicensingDeal, title: &TitleRecord) -> Self {
        Self {
            title_id: deal.title_id,
            title: title.title.clone(),
            region_code: deal.region_code.clone(),
            license_start_date: deal.license_start_date,
            license_end_date: deal.license_end_date,
            license_type: deal.license_type,
            cost_usd: deal.cost_usd,
            duration_days: deal.duration_days,
            cost_per_day_usd: deal.cost_per_day_usd,
            is_exclusive: deal.is_exclusive,
            release_year: title.release_year,
            score: title.score,
            popularity_tier: title.popularity_tier,
        }
    }
}

/// Computed economics for one deal in its region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiRecord {
    pub title_id: i64,
    pub title: String,
    pub region_code: String,
    pub license_type: LicenseType,
    pub licensing_cost_usd: f64,
    pub attribution_rate: f64,
    pub attributed_revenue_usd: f64,
    pub roi_percent: f64,
    pub payback_period_months: Option<f64>,
    pub score: Option<f64>,
    pub is_exclusive: bool,
}
