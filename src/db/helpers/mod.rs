use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime};

use crate::db::models::CleanTrafficLevel;

/// Storage format of `traffic_data.timestamp` and of the export checkpoint:
/// local wall-clock capture time, ISO-8601 with a space separator. Values in
/// this format sort lexicographically in time order.
pub const RAW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_INPUT_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

pub fn format_raw_timestamp(value: &NaiveDateTime) -> String {
    value.format(RAW_TIMESTAMP_FORMAT).to_string()
}

/// Parse a naive ISO-8601 timestamp with either separator and optional
/// fractional seconds.
pub fn parse_naive_timestamp(value: &str, field: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    NAIVE_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| anyhow!("{field} '{value}' is not an ISO-8601 timestamp"))
}

/// Canonical ISO-8601 form: `T` separator, fractional seconds only when
/// present, and the UTC offset kept when the input carried one.
pub fn normalize_iso8601(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(with_offset.format("%Y-%m-%dT%H:%M:%S%.f%:z").to_string());
    }

    parse_naive_timestamp(trimmed, field)
        .map(|naive| naive.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        .with_context(|| format!("failed to normalize {field}"))
}

/// Round a speed ratio to two decimals. Works on the exact binary value with
/// ties to even, so `0.625` becomes `0.62` and `0.295` (stored just below)
/// becomes `0.29`.
pub fn round_ratio(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

pub fn flag_from_sql(value: Option<i64>) -> bool {
    // Column default is 1; a NULL flag is treated the same way.
    value.map(|flag| flag != 0).unwrap_or(true)
}

pub fn parse_clean_level(value: &str) -> Result<CleanTrafficLevel> {
    match value {
        "SEVERE" => Ok(CleanTrafficLevel::Severe),
        "HEAVY" => Ok(CleanTrafficLevel::Heavy),
        "MODERATE" => Ok(CleanTrafficLevel::Moderate),
        "FREE" => Ok(CleanTrafficLevel::Free),
        other => Err(anyhow!("unknown clean traffic level {other}")),
    }
}
