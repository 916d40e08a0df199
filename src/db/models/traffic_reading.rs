//! Raw-store reading models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Collection-time congestion label. A coarse live signal; the analytic
/// label is [`super::CleanTrafficLevel`], computed with other thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveTrafficLevel {
    /// Free flowing.
    Thoang,
    /// Moderate.
    Dong,
    /// Congested.
    KetXe,
}

impl LiveTrafficLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveTrafficLevel::Thoang => "THOANG",
            LiveTrafficLevel::Dong => "DONG",
            LiveTrafficLevel::KetXe => "KET_XE",
        }
    }
}

/// A row produced by one collection cycle, before it has an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrafficReading {
    pub timestamp: NaiveDateTime,
    pub location_id: i64,
    pub current_speed_kmh: f64,
    pub free_flow_speed_kmh: f64,
    pub speed_ratio: f64,
    pub traffic_level: LiveTrafficLevel,
    pub confidence: f64,
}

/// A row as stored in `traffic_data`. Columns are nullable in the schema,
/// so every measured value is optional here and the timestamp is kept as
/// the stored text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficReading {
    pub id: i64,
    pub timestamp: String,
    pub location_id: i64,
    pub location_name: Option<String>,
    pub current_speed_kmh: Option<f64>,
    pub free_flow_speed_kmh: Option<f64>,
    pub speed_ratio: Option<f64>,
    pub traffic_level: Option<String>,
    pub confidence: Option<f64>,
}
