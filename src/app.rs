use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Duration;
use log::info;

use crate::{
    db::{models::now_millis, Database, SleepNight},
    settings::{DisplaySettings, SettingsStore},
    tracker::SleepTracker,
};

const DB_FILE_NAME: &str = "sleep-tracker.sqlite3";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// `<platform data dir>/sleep-tracker`.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("sleep-tracker"))
        .ok_or_else(|| anyhow!("could not determine a data directory; pass --data-dir"))
}

pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
}

impl AppState {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).with_context(|| {
            format!("failed to create data directory {}", data_dir.display())
        })?;

        let db = Database::new(data_dir.join(DB_FILE_NAME))?;
        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE_NAME))?;

        Ok(Self { db, settings })
    }

    /// A tracker over this app's database, already loading tonight.
    pub fn tracker(&self) -> Result<SleepTracker> {
        let resources = self.settings.resources()?;
        Ok(SleepTracker::new(Arc::new(self.db.clone()), resources))
    }

    /// Changes the display offset and writes settings.json back to disk.
    pub fn set_utc_offset(&self, minutes: i32) -> Result<DisplaySettings> {
        let mut display = self.settings.display();
        display.utc_offset_minutes = minutes;
        self.settings.update_display(display.clone())?;
        info!("display offset set to {minutes} minutes");
        Ok(display)
    }

    /// Ends the night in progress with the given rating. `None` when nothing
    /// is being tracked.
    pub async fn finish_tonight(&self, quality: i32) -> Result<Option<SleepNight>> {
        if !(0..=5).contains(&quality) {
            bail!("sleep quality must be between 0 and 5, got {quality}");
        }

        let Some(mut night) = self.db.get_tonight().await?.filter(SleepNight::is_active) else {
            return Ok(None);
        };

        // A night stopped within the same millisecond would still read as active.
        night.end_time = now_millis().max(night.start_time + Duration::milliseconds(1));
        night.sleep_quality = quality;
        self.db.update_night(&night).await?;

        info!(
            "finished night {} after {} ms",
            night.night_id,
            night.duration_ms()
        );
        Ok(Some(night))
    }
}
