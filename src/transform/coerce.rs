//! Tolerant value coercion.
//!
//! Unparsable or missing input becomes `None`. Non-finite floats are treated
//! as unparsable so NaN and infinity never reach an output table.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

/// Coerce a JSON value to a finite float.
pub fn json_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => text_f64(s),
        _ => None,
    }
}

/// Coerce a JSON value to an integer. Integral floats are accepted.
pub fn json_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => text_i64(s),
        _ => None,
    }
}

/// Non-empty JSON string. Empty strings count as absent.
pub fn json_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Parse a text cell to a finite float.
pub fn text_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a text cell to an integer. Integral decimal text ("12.0") is accepted.
pub fn text_i64(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| text_f64(raw).and_then(integral))
}

/// Parse a calendar date from `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn text_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Parse a `YYYY-Qn` period into the first day of that quarter.
pub fn quarter_start(raw: &str) -> Option<NaiveDate> {
    let (year, quarter) = raw.trim().split_once("-Q")?;
    let year: i32 = year.parse().ok()?;
    let quarter: u32 = quarter.parse().ok()?;
    if !(1..=4).contains(&quarter) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1)
}

fn integral(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}
