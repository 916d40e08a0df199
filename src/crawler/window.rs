use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::config::ScheduleSettings;

/// Daily collection window `[start_hour, end_hour)` in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for ActiveWindow {
    fn default() -> Self {
        Self {
            start_hour: 6,
            end_hour: 22,
        }
    }
}

impl From<&ScheduleSettings> for ActiveWindow {
    fn from(settings: &ScheduleSettings) -> Self {
        Self {
            start_hour: settings.window_start_hour,
            end_hour: settings.window_end_hour,
        }
    }
}

impl ActiveWindow {
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        let hour = now.hour();
        self.start_hour <= hour && hour < self.end_hour
    }

    /// Seconds until the next window start: today's if the start hour has not
    /// been reached yet, otherwise tomorrow's.
    pub fn seconds_until_start(&self, now: NaiveDateTime) -> u64 {
        let start = NaiveTime::from_hms_opt(self.start_hour, 0, 0).unwrap_or_default();
        let mut target = now.date().and_time(start);
        if now.hour() >= self.start_hour {
            target += Duration::days(1);
        }
        u64::try_from((target - now).num_seconds()).unwrap_or(0)
    }
}
