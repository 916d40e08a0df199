//! Clean-zone reading model.

use serde::{Deserialize, Serialize};

/// Analytic congestion label assigned by the cleaning transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleanTrafficLevel {
    Severe,
    Heavy,
    Moderate,
    Free,
}

impl CleanTrafficLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanTrafficLevel::Severe => "SEVERE",
            CleanTrafficLevel::Heavy => "HEAVY",
            CleanTrafficLevel::Moderate => "MODERATE",
            CleanTrafficLevel::Free => "FREE",
        }
    }
}

/// Row of `traffic_data_clean`, primary key `(id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanReading {
    pub id: i64,
    /// Normalized ISO-8601.
    pub timestamp: String,
    /// Location name, or the raw location id as text when the name is unknown.
    pub location: String,
    pub current_speed_kmh: f64,
    pub free_flow_speed_kmh: f64,
    pub speed_ratio: f64,
    pub traffic_level: CleanTrafficLevel,
    pub confidence: Option<f64>,
}
