use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, to_i32},
    models::SleepNight,
};

const NIGHT_COLUMNS: &str = "night_id, start_time, end_time, quality_rating";

fn row_to_night(row: &Row) -> Result<SleepNight> {
    let start_time: String = row.get("start_time")?;
    let end_time: String = row.get("end_time")?;
    let quality: i64 = row.get("quality_rating")?;

    Ok(SleepNight {
        night_id: row.get("night_id")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_datetime(&end_time, "end_time")?,
        sleep_quality: to_i32(quality, "quality_rating")?,
    })
}

pub(crate) fn load_all_nights(conn: &Connection) -> Result<Vec<SleepNight>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NIGHT_COLUMNS}
         FROM daily_sleep_quality_table
         ORDER BY night_id DESC"
    ))?;

    let mut rows = stmt.query([])?;
    let mut nights = Vec::new();
    while let Some(row) = rows.next()? {
        nights.push(row_to_night(row)?);
    }

    Ok(nights)
}

impl Database {
    /// Stores a night and returns the id SQLite assigned to it. The incoming
    /// `night_id` is ignored.
    pub async fn insert_night(&self, night: &SleepNight) -> Result<i64> {
        let record = night.clone();
        self.execute_write(move |conn| {
            conn.execute(
                "INSERT INTO daily_sleep_quality_table (start_time, end_time, quality_rating)
                 VALUES (?1, ?2, ?3)",
                params![
                    format_datetime(&record.start_time),
                    format_datetime(&record.end_time),
                    record.sleep_quality,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn update_night(&self, night: &SleepNight) -> Result<()> {
        let record = night.clone();
        self.execute_write(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE daily_sleep_quality_table
                 SET start_time = ?1,
                     end_time = ?2,
                     quality_rating = ?3
                 WHERE night_id = ?4",
                params![
                    format_datetime(&record.start_time),
                    format_datetime(&record.end_time),
                    record.sleep_quality,
                    record.night_id,
                ],
            )?;

            if rows_affected == 0 {
                bail!("night {} not found", record.night_id);
            }

            Ok(())
        })
        .await
    }

    pub async fn get_night(&self, night_id: i64) -> Result<Option<SleepNight>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NIGHT_COLUMNS}
                 FROM daily_sleep_quality_table
                 WHERE night_id = ?1"
            ))?;

            stmt.query_row(params![night_id], |row| Ok(row_to_night(row)))
                .optional()?
                .transpose()
        })
        .await
    }

    /// The most recently inserted night, finished or not.
    pub async fn get_tonight(&self) -> Result<Option<SleepNight>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NIGHT_COLUMNS}
                 FROM daily_sleep_quality_table
                 ORDER BY night_id DESC
                 LIMIT 1"
            ))?;

            let mut rows = stmt.query([])?;
            let night = match rows.next()? {
                Some(row) => Some(row_to_night(row)?),
                None => None,
            };
            Ok(night)
        })
        .await
    }

    pub async fn get_all_nights(&self) -> Result<Vec<SleepNight>> {
        self.execute(|conn| load_all_nights(conn)).await
    }

    /// Deletes every night. Returns how many rows were removed.
    pub async fn clear(&self) -> Result<usize> {
        self.execute_write(|conn| {
            let removed = conn.execute("DELETE FROM daily_sleep_quality_table", [])?;
            Ok(removed)
        })
        .await
    }
}
