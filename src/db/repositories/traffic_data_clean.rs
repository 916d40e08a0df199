use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{connection::Database, helpers::parse_clean_level, models::CleanReading};

fn row_to_clean_reading(row: &Row) -> Result<CleanReading> {
    let level: String = row.get("traffic_level")?;
    Ok(CleanReading {
        id: row.get("id")?,
        timestamp: row.get("timestamp")?,
        location: row.get("location")?,
        current_speed_kmh: row.get("current_speed_kmh")?,
        free_flow_speed_kmh: row.get("free_flow_speed_kmh")?,
        speed_ratio: row.get("speed_ratio")?,
        traffic_level: parse_clean_level(&level)?,
        confidence: row.get("confidence")?,
    })
}

impl Database {
    /// Insert-if-absent on `(id, timestamp)`. Existing rows are left
    /// untouched. Returns how many rows were actually inserted.
    pub async fn insert_clean_readings(&self, readings: &[CleanReading]) -> Result<usize> {
        if readings.is_empty() {
            return Ok(0);
        }

        let records = readings.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO traffic_data_clean (
                        id,
                        timestamp,
                        location,
                        current_speed_kmh,
                        free_flow_speed_kmh,
                        speed_ratio,
                        traffic_level,
                        confidence
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;

                for record in &records {
                    inserted += stmt
                        .execute(params![
                            record.id,
                            record.timestamp,
                            record.location,
                            record.current_speed_kmh,
                            record.free_flow_speed_kmh,
                            record.speed_ratio,
                            record.traffic_level.as_str(),
                            record.confidence,
                        ])
                        .with_context(|| format!("failed to insert clean row {}", record.id))?;
                }
            }
            tx.commit().context("failed to commit clean readings")?;
            Ok(inserted)
        })
        .await
    }

    pub async fn list_clean_readings(&self) -> Result<Vec<CleanReading>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, location, current_speed_kmh, free_flow_speed_kmh,
                        speed_ratio, traffic_level, confidence
                 FROM traffic_data_clean
                 ORDER BY id ASC, timestamp ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_clean_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }

    /// Largest raw id already cleaned, or 0 for an empty clean store.
    pub async fn max_clean_id(&self) -> Result<i64> {
        self.execute(|conn| {
            let max: Option<i64> =
                conn.query_row("SELECT MAX(id) FROM traffic_data_clean", [], |row| row.get(0))?;
            Ok(max.unwrap_or(0))
        })
        .await
    }
}
