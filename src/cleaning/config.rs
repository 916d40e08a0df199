/// Clean-zone congestion thresholds, applied to the speed ratio rounded to
/// two decimals. Separate from the crawler's live policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanThresholds {
    /// Ratios below this are SEVERE.
    pub severe_below: f64,
    /// Ratios below this (and not SEVERE) are HEAVY.
    pub heavy_below: f64,
    /// Ratios below this (and not HEAVY) are MODERATE; everything else is FREE.
    pub moderate_below: f64,
}

impl Default for CleanThresholds {
    fn default() -> Self {
        Self {
            severe_below: 0.3,
            heavy_below: 0.5,
            moderate_below: 0.7,
        }
    }
}
