//! One collection cycle: fetch every active location, classify, and turn the
//! successes into raw rows.
//!
//! Classification here is the live policy (`> 0.8` THOANG, `> 0.5` DONG,
//! otherwise KET_XE), not the clean-zone policy in
//! [`crate::cleaning`].

use std::{sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use futures::{stream, StreamExt};

use crate::db::{helpers::round_ratio, LiveTrafficLevel, Location, NewTrafficReading};
use crate::provider::{FlowSample, FlowSource, ProviderError};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub fn classify_live(ratio: f64) -> LiveTrafficLevel {
    if ratio > 0.8 {
        LiveTrafficLevel::Thoang
    } else if ratio > 0.5 {
        LiveTrafficLevel::Dong
    } else {
        LiveTrafficLevel::KetXe
    }
}

/// `current / free`, or 0 when the free-flow speed is zero (or otherwise
/// unusable). A zero free-flow reading therefore lands in the worst tier
/// instead of failing the location.
pub fn live_speed_ratio(current: f64, free_flow: f64) -> f64 {
    if free_flow > 0.0 && free_flow.is_finite() {
        current / free_flow
    } else {
        0.0
    }
}

#[derive(Debug)]
pub struct LocationFailure {
    pub location_id: i64,
    pub location_name: String,
    pub error: ProviderError,
}

#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// In registry order.
    pub readings: Vec<NewTrafficReading>,
    pub failures: Vec<LocationFailure>,
}

pub struct Collector {
    source: Arc<dyn FlowSource>,
    max_concurrent: usize,
    fetch_timeout: Duration,
}

impl Collector {
    /// `max_concurrent == 0` issues one fetch per location at once.
    pub fn new(source: Arc<dyn FlowSource>, max_concurrent: usize, fetch_timeout: Duration) -> Self {
        Self {
            source,
            max_concurrent,
            fetch_timeout,
        }
    }

    /// One attempt per location. A failing or slow location is recorded in
    /// `failures` and never affects its siblings.
    pub async fn collect(&self, locations: &[Location], captured_at: NaiveDateTime) -> CycleOutcome {
        if locations.is_empty() {
            log_info!("no active locations; nothing to collect");
            return CycleOutcome::default();
        }

        let limit = if self.max_concurrent == 0 {
            locations.len()
        } else {
            self.max_concurrent
        };

        let results: Vec<(Location, Result<FlowSample, ProviderError>)> =
            stream::iter(locations.to_vec())
                .map(|location| {
                    let source = Arc::clone(&self.source);
                    let fetch_timeout = self.fetch_timeout;
                    async move {
                        let fetched =
                            tokio::time::timeout(fetch_timeout, source.fetch(location.lat, location.lon))
                                .await
                                .unwrap_or(Err(ProviderError::Timeout(fetch_timeout)));
                        (location, fetched)
                    }
                })
                .buffered(limit)
                .collect()
                .await;

        let mut outcome = CycleOutcome::default();
        for (location, fetched) in results {
            match fetched {
                Ok(sample) => outcome.readings.push(to_reading(&location, sample, captured_at)),
                Err(error) => {
                    log_warn!(
                        "skipping location {} ({}): {}",
                        location.name,
                        location.id,
                        error
                    );
                    outcome.failures.push(LocationFailure {
                        location_id: location.id,
                        location_name: location.name.clone(),
                        error,
                    });
                }
            }
        }

        outcome
    }
}

fn to_reading(location: &Location, sample: FlowSample, captured_at: NaiveDateTime) -> NewTrafficReading {
    let ratio = live_speed_ratio(sample.current_speed, sample.free_flow_speed);
    NewTrafficReading {
        timestamp: captured_at,
        location_id: location.id,
        current_speed_kmh: sample.current_speed,
        free_flow_speed_kmh: sample.free_flow_speed,
        speed_ratio: round_ratio(ratio),
        traffic_level: classify_live(ratio),
        confidence: sample.confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    /// Answers by latitude; latitudes without an entry fail.
    struct FakeSource {
        samples: HashMap<u64, FlowSample>,
        slow_lat: Option<f64>,
    }

    impl FakeSource {
        fn new(entries: &[(f64, f64, f64)]) -> Self {
            let samples = entries
                .iter()
                .map(|&(lat, current, free)| {
                    (
                        lat.to_bits(),
                        FlowSample {
                            current_speed: current,
                            free_flow_speed: free,
                            confidence: 1.0,
                        },
                    )
                })
                .collect();
            Self {
                samples,
                slow_lat: None,
            }
        }
    }

    #[async_trait]
    impl FlowSource for FakeSource {
        async fn fetch(&self, lat: f64, _lon: f64) -> Result<FlowSample, ProviderError> {
            if self.slow_lat == Some(lat) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.samples
                .get(&lat.to_bits())
                .copied()
                .ok_or_else(|| ProviderError::Status(503))
        }
    }

    fn location(id: i64, lat: f64) -> Location {
        Location {
            id,
            name: format!("loc-{id}"),
            lat,
            lon: 109.0,
            active: true,
        }
    }

    fn captured_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(7, 20, 0)
            .unwrap()
    }

    #[test]
    fn live_thresholds_are_exclusive_lower_bounds() {
        assert_eq!(classify_live(0.81), LiveTrafficLevel::Thoang);
        assert_eq!(classify_live(0.8), LiveTrafficLevel::Dong);
        assert_eq!(classify_live(0.51), LiveTrafficLevel::Dong);
        assert_eq!(classify_live(0.5), LiveTrafficLevel::KetXe);
        assert_eq!(classify_live(0.0), LiveTrafficLevel::KetXe);
    }

    #[test]
    fn zero_free_flow_yields_zero_ratio() {
        assert_eq!(live_speed_ratio(25.0, 0.0), 0.0);
        assert_eq!(classify_live(live_speed_ratio(25.0, 0.0)), LiveTrafficLevel::KetXe);
    }

    #[tokio::test]
    async fn two_failures_out_of_five_leave_three_rows() {
        let source = FakeSource::new(&[(1.0, 40.0, 40.0), (3.0, 30.0, 50.0), (5.0, 10.0, 40.0)]);
        let collector = Collector::new(Arc::new(source), 0, Duration::from_secs(5));
        let locations: Vec<Location> = (1..=5).map(|id| location(id, id as f64)).collect();

        let outcome = collector.collect(&locations, captured_at()).await;

        let ids: Vec<i64> = outcome.readings.iter().map(|r| r.location_id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        let failed: Vec<i64> = outcome.failures.iter().map(|f| f.location_id).collect();
        assert_eq!(failed, vec![2, 4]);

        assert_eq!(outcome.readings[0].traffic_level, LiveTrafficLevel::Thoang);
        assert_eq!(outcome.readings[1].traffic_level, LiveTrafficLevel::Dong);
        assert_eq!(outcome.readings[1].speed_ratio, 0.6);
        assert_eq!(outcome.readings[2].traffic_level, LiveTrafficLevel::KetXe);
        assert!(outcome.readings.iter().all(|r| r.timestamp == captured_at()));
    }

    #[tokio::test]
    async fn stored_ratio_is_rounded_but_level_uses_raw_ratio() {
        let source = FakeSource::new(&[(1.0, 5.0, 8.0)]);
        let collector = Collector::new(Arc::new(source), 0, Duration::from_secs(5));

        let outcome = collector.collect(&[location(1, 1.0)], captured_at()).await;

        assert_eq!(outcome.readings[0].speed_ratio, 0.62);
        assert_eq!(outcome.readings[0].traffic_level, LiveTrafficLevel::Dong);
    }

    #[tokio::test]
    async fn collection_runs_on_a_spawned_task() {
        let source = FakeSource::new(&[(1.0, 30.0, 40.0), (2.0, 10.0, 40.0)]);
        let collector = Arc::new(Collector::new(Arc::new(source), 1, Duration::from_secs(5)));
        let locations = vec![location(1, 1.0), location(2, 2.0)];

        let outcome = tokio::spawn(async move { collector.collect(&locations, captured_at()).await })
            .await
            .unwrap();

        assert_eq!(outcome.readings.len(), 2);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn zero_free_flow_row_is_kept_in_worst_tier() {
        let source = FakeSource::new(&[(1.0, 25.0, 0.0)]);
        let collector = Collector::new(Arc::new(source), 1, Duration::from_secs(5));

        let outcome = collector.collect(&[location(1, 1.0)], captured_at()).await;

        assert_eq!(outcome.readings.len(), 1);
        assert_eq!(outcome.readings[0].speed_ratio, 0.0);
        assert_eq!(outcome.readings[0].traffic_level, LiveTrafficLevel::KetXe);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_location_times_out_without_blocking_siblings() {
        let mut source = FakeSource::new(&[(1.0, 40.0, 40.0), (2.0, 40.0, 40.0)]);
        source.slow_lat = Some(2.0);
        let collector = Collector::new(Arc::new(source), 0, Duration::from_secs(10));

        let outcome = collector
            .collect(&[location(1, 1.0), location(2, 2.0)], captured_at())
            .await;

        assert_eq!(outcome.readings.len(), 1);
        assert_eq!(outcome.readings[0].location_id, 1);
        assert!(matches!(outcome.failures[0].error, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn no_locations_no_rows() {
        let collector = Collector::new(Arc::new(FakeSource::new(&[])), 0, Duration::from_secs(1));
        let outcome = collector.collect(&[], captured_at()).await;
        assert!(outcome.readings.is_empty() && outcome.failures.is_empty());
    }
}
