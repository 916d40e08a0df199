//! Points of interest polled by the crawler.

use serde::{Deserialize, Serialize};

/// A registered point. `name` is unique and `id` never changes once assigned;
/// locations are deactivated, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub active: bool,
}

/// Seed entry for the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl NewLocation {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }
}

/// Built-in Quy Nhon intersections used when no seed file is supplied.
pub fn default_locations() -> Vec<NewLocation> {
    vec![
        NewLocation::new("Nga_5_Dong_Da", 13.783255328622369, 109.21968988347302),
        NewLocation::new("HOÀNG VĂN THỤ - TâY SƠN", 13.759429398523837, 109.20579782420032),
        NewLocation::new("Vong_xoay_Nguyen_Tat_Thanh", 13.771844981726773, 109.222182156807),
        NewLocation::new("VÒNG XOAY NGUYỄN THÁI HỌC", 13.775568025517046, 109.22246023281485),
        NewLocation::new("Nga_3 THÁP ĐÔI", 13.785601361791992, 109.21037595228529),
    ]
}
