//! Raw → clean re-derivation.
//!
//! Each raw row is validated, its ratio recomputed and rounded, relabelled
//! with [`CleanThresholds`], its timestamp normalized, and then inserted
//! into the clean store with insert-if-absent on `(id, timestamp)`. Running
//! the transform again over the same raw data changes nothing.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::db::{
    helpers::{normalize_iso8601, round_ratio},
    CleanReading, CleanTrafficLevel, Database, TrafficReading,
};

use super::config::CleanThresholds;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const INSERT_CHUNK: usize = 500;

impl CleanThresholds {
    pub fn classify(&self, ratio: f64) -> CleanTrafficLevel {
        if ratio < self.severe_below {
            CleanTrafficLevel::Severe
        } else if ratio < self.heavy_below {
            CleanTrafficLevel::Heavy
        } else if ratio < self.moderate_below {
            CleanTrafficLevel::Moderate
        } else {
            CleanTrafficLevel::Free
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanMode {
    /// Every raw row.
    Full,
    /// Raw rows with an id above the largest id already in the clean store.
    Incremental,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub scanned: usize,
    pub inserted: usize,
    pub already_present: usize,
    pub rejected: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub enum RowVerdict {
    Clean(CleanReading),
    /// Dropped by validation; not an error.
    Rejected(&'static str),
    /// The row could not be processed (e.g. unparseable timestamp).
    Failed(anyhow::Error),
}

pub fn clean_row(raw: &TrafficReading, thresholds: &CleanThresholds) -> RowVerdict {
    let Some(current) = raw.current_speed_kmh else {
        return RowVerdict::Rejected("current_speed_kmh is null");
    };
    let free_flow = match raw.free_flow_speed_kmh {
        None => return RowVerdict::Rejected("free_flow_speed_kmh is null"),
        Some(value) if value == 0.0 => return RowVerdict::Rejected("free_flow_speed_kmh is zero"),
        Some(value) => value,
    };

    let speed_ratio = round_ratio(current / free_flow);

    let timestamp = match normalize_iso8601(&raw.timestamp, "timestamp") {
        Ok(timestamp) => timestamp,
        Err(err) => return RowVerdict::Failed(err),
    };

    let location = raw
        .location_name
        .clone()
        .unwrap_or_else(|| raw.location_id.to_string());

    RowVerdict::Clean(CleanReading {
        id: raw.id,
        timestamp,
        location,
        current_speed_kmh: current,
        free_flow_speed_kmh: free_flow,
        speed_ratio,
        traffic_level: thresholds.classify(speed_ratio),
        confidence: raw.confidence,
    })
}

/// Run the transform once. Row-level problems are logged and counted;
/// storage failures abort the run.
pub async fn run_cleaning(
    raw: &Database,
    clean: &Database,
    mode: CleanMode,
    thresholds: &CleanThresholds,
) -> Result<CleaningReport> {
    let after_id = match mode {
        CleanMode::Full => 0,
        CleanMode::Incremental => clean
            .max_clean_id()
            .await
            .context("failed to read clean-store high-water mark")?,
    };

    let rows = raw
        .traffic_readings_after_id(after_id)
        .await
        .context("failed to read raw traffic readings")?;

    let mut report = CleaningReport {
        scanned: rows.len(),
        ..CleaningReport::default()
    };

    let mut pending = Vec::with_capacity(rows.len().min(INSERT_CHUNK));
    for row in &rows {
        match clean_row(row, thresholds) {
            RowVerdict::Clean(reading) => pending.push(reading),
            RowVerdict::Rejected(reason) => {
                report.rejected += 1;
                log_info!("dropping raw row {}: {}", row.id, reason);
            }
            RowVerdict::Failed(err) => {
                report.failed += 1;
                log_warn!("failed to clean raw row {}: {err:#}", row.id);
            }
        }
    }

    let candidates = pending.len();
    for chunk in pending.chunks(INSERT_CHUNK) {
        report.inserted += clean
            .insert_clean_readings(chunk)
            .await
            .context("failed to write clean readings")?;
    }
    report.already_present = candidates - report.inserted;

    log_info!(
        "cleaning done: scanned={} inserted={} already_present={} rejected={} failed={}",
        report.scanned,
        report.inserted,
        report.already_present,
        report.rejected,
        report.failed
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: i64, current: Option<f64>, free: Option<f64>) -> TrafficReading {
        TrafficReading {
            id,
            timestamp: "2025-03-01 07:20:00".into(),
            location_id: 2,
            location_name: Some("Nga_5_Dong_Da".into()),
            current_speed_kmh: current,
            free_flow_speed_kmh: free,
            speed_ratio: None,
            traffic_level: Some("DONG".into()),
            confidence: Some(0.9),
        }
    }

    fn expect_clean(verdict: RowVerdict) -> CleanReading {
        match verdict {
            RowVerdict::Clean(reading) => reading,
            other => panic!("expected clean row, got {other:?}"),
        }
    }

    #[test]
    fn clean_thresholds_bucket_the_rounded_ratio() {
        let t = CleanThresholds::default();
        assert_eq!(t.classify(0.0), CleanTrafficLevel::Severe);
        assert_eq!(t.classify(0.29), CleanTrafficLevel::Severe);
        assert_eq!(t.classify(0.3), CleanTrafficLevel::Heavy);
        assert_eq!(t.classify(0.49), CleanTrafficLevel::Heavy);
        assert_eq!(t.classify(0.5), CleanTrafficLevel::Moderate);
        assert_eq!(t.classify(0.69), CleanTrafficLevel::Moderate);
        assert_eq!(t.classify(0.7), CleanTrafficLevel::Free);
        assert_eq!(t.classify(1.3), CleanTrafficLevel::Free);
    }

    #[test]
    fn rounding_happens_before_classification() {
        // 0.296 rounds to 0.30 and is therefore HEAVY, not SEVERE.
        let reading = expect_clean(clean_row(&raw(1, Some(29.6), Some(100.0)), &Default::default()));
        assert_eq!(reading.speed_ratio, 0.3);
        assert_eq!(reading.traffic_level, CleanTrafficLevel::Heavy);
    }

    #[test]
    fn ratio_ties_and_near_ties_round_like_decimal() {
        let t = CleanThresholds::default();
        let reading = expect_clean(clean_row(&raw(1, Some(5.0), Some(8.0)), &t));
        assert_eq!(reading.speed_ratio, 0.62);
        assert_eq!(reading.traffic_level, CleanTrafficLevel::Moderate);

        // 29.5 / 100 is stored just below 0.295.
        let reading = expect_clean(clean_row(&raw(2, Some(29.5), Some(100.0)), &t));
        assert_eq!(reading.speed_ratio, 0.29);
        assert_eq!(reading.traffic_level, CleanTrafficLevel::Severe);
    }

    #[test]
    fn row_is_recomputed_and_normalized() {
        let reading = expect_clean(clean_row(&raw(9, Some(20.0), Some(40.0)), &Default::default()));
        assert_eq!(reading.id, 9);
        assert_eq!(reading.timestamp, "2025-03-01T07:20:00");
        assert_eq!(reading.location, "Nga_5_Dong_Da");
        assert_eq!(reading.speed_ratio, 0.5);
        assert_eq!(reading.traffic_level, CleanTrafficLevel::Moderate);
        assert_eq!(reading.confidence, Some(0.9));
    }

    #[test]
    fn unknown_location_falls_back_to_id() {
        let mut row = raw(1, Some(20.0), Some(40.0));
        row.location_name = None;
        assert_eq!(expect_clean(clean_row(&row, &Default::default())).location, "2");
    }

    #[test]
    fn null_or_zero_speeds_are_rejected() {
        let t = CleanThresholds::default();
        assert!(matches!(clean_row(&raw(1, None, Some(40.0)), &t), RowVerdict::Rejected(_)));
        assert!(matches!(clean_row(&raw(1, Some(20.0), None), &t), RowVerdict::Rejected(_)));
        assert!(matches!(clean_row(&raw(1, Some(20.0), Some(0.0)), &t), RowVerdict::Rejected(_)));
    }

    #[test]
    fn bad_timestamp_fails_only_that_row() {
        let mut row = raw(1, Some(20.0), Some(40.0));
        row.timestamp = "not a time".into();
        assert!(matches!(clean_row(&row, &Default::default()), RowVerdict::Failed(_)));
    }
}
