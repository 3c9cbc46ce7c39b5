//! Sleep night record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quality value stored for a night that has not been rated yet.
pub const UNRATED_QUALITY: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SleepNight {
    /// Row id assigned on insert; `0` until the night has been stored.
    pub night_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub sleep_quality: i32,
}

impl SleepNight {
    /// A fresh night starting now. End equals start until tracking stops.
    pub fn new() -> Self {
        Self::starting_at(now_millis())
    }

    pub fn starting_at(start_time: DateTime<Utc>) -> Self {
        Self {
            night_id: 0,
            start_time,
            end_time: start_time,
            sleep_quality: UNRATED_QUALITY,
        }
    }

    /// Still being tracked: the end time has not moved off the start time.
    pub fn is_active(&self) -> bool {
        self.end_time == self.start_time
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds().max(0)
    }
}

impl Default for SleepNight {
    fn default() -> Self {
        Self::new()
    }
}

/// Current time truncated to whole milliseconds, the precision nights are stored with.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
