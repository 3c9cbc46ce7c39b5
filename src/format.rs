//! Turns the stored night history into the text shown under the tracker.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{SleepNight, UNRATED_QUALITY};

const DATE_FORMAT: &str = "%A %b-%d-%Y Time: %H:%M";

/// User-facing labels. Every field falls back to English when missing from
/// the settings file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct StringTable {
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    pub quality: String,
    pub hours_slept: String,
    pub unrated: String,
    pub very_bad: String,
    pub poor: String,
    pub so_so: String,
    pub ok: String,
    pub pretty_good: String,
    pub excellent: String,
}

impl Default for StringTable {
    fn default() -> Self {
        Self {
            title: "Here is your sleep data".into(),
            start_time: "Start:".into(),
            end_time: "End:".into(),
            quality: "Quality:".into(),
            hours_slept: "Hours:Minutes:Seconds:".into(),
            unrated: "--".into(),
            very_bad: "Very bad".into(),
            poor: "Poor".into(),
            so_so: "So-so".into(),
            ok: "OK".into(),
            pretty_good: "Pretty good".into(),
            excellent: "Excellent".into(),
        }
    }
}

/// Localization context handed to the formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resources {
    pub strings: StringTable,
    pub offset: FixedOffset,
}

impl Resources {
    pub fn new(strings: StringTable, offset: FixedOffset) -> Self {
        Self { strings, offset }
    }
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            strings: StringTable::default(),
            offset: Utc.fix(),
        }
    }
}

pub fn quality_label(quality: i32, resources: &Resources) -> &str {
    let strings = &resources.strings;
    match quality {
        UNRATED_QUALITY => &strings.unrated,
        0 => &strings.very_bad,
        1 => &strings.poor,
        2 => &strings.so_so,
        4 => &strings.pretty_good,
        5 => &strings.excellent,
        _ => &strings.ok,
    }
}

pub fn format_timestamp(value: &DateTime<Utc>, resources: &Resources) -> String {
    value
        .with_timezone(&resources.offset)
        .format(DATE_FORMAT)
        .to_string()
}

/// Elapsed time as `H:MM:SS`.
pub fn format_elapsed(duration_ms: i64) -> String {
    let total_secs = duration_ms.max(0) / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

/// Title line, then one block per night. Active nights only show their
/// start time.
pub fn format_nights(nights: &[SleepNight], resources: &Resources) -> String {
    let strings = &resources.strings;
    let mut out = strings.title.clone();

    for night in nights {
        out.push('\n');
        let _ = write!(
            out,
            "\n{}\t{}",
            strings.start_time,
            format_timestamp(&night.start_time, resources)
        );

        if !night.is_active() {
            let _ = write!(
                out,
                "\n{}\t{}\n{}\t{}\n{}\t{}",
                strings.end_time,
                format_timestamp(&night.end_time, resources),
                strings.quality,
                quality_label(night.sleep_quality, resources),
                strings.hours_slept,
                format_elapsed(night.duration_ms()),
            );
        }
    }

    out
}
