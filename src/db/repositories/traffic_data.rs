use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::format_raw_timestamp,
    models::{NewTrafficReading, TrafficReading},
};

const SELECT_READINGS: &str = "SELECT
        t.id,
        t.timestamp,
        t.location,
        l.name AS location_name,
        t.current_speed_kmh,
        t.free_flow_speed_kmh,
        t.speed_ratio,
        t.traffic_level,
        t.confidence
    FROM traffic_data t
    LEFT JOIN locations l ON l.id = t.location";

fn row_to_reading(row: &Row) -> Result<TrafficReading> {
    Ok(TrafficReading {
        id: row.get("id")?,
        timestamp: row.get("timestamp")?,
        location_id: row.get("location")?,
        location_name: row.get("location_name")?,
        current_speed_kmh: row.get("current_speed_kmh")?,
        free_flow_speed_kmh: row.get("free_flow_speed_kmh")?,
        speed_ratio: row.get("speed_ratio")?,
        traffic_level: row.get("traffic_level")?,
        confidence: row.get("confidence")?,
    })
}

impl Database {
    /// Append one cycle's rows in a single transaction. Every row receives a
    /// fresh autoincrement id; an empty slice is a no-op.
    pub async fn insert_traffic_readings(&self, readings: &[NewTrafficReading]) -> Result<usize> {
        if readings.is_empty() {
            return Ok(0);
        }

        let records = readings.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO traffic_data (
                        timestamp,
                        location,
                        current_speed_kmh,
                        free_flow_speed_kmh,
                        speed_ratio,
                        traffic_level,
                        confidence
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;

                for record in &records {
                    stmt.execute(params![
                        format_raw_timestamp(&record.timestamp),
                        record.location_id,
                        record.current_speed_kmh,
                        record.free_flow_speed_kmh,
                        record.speed_ratio,
                        record.traffic_level.as_str(),
                        record.confidence,
                    ])
                    .with_context(|| {
                        format!("failed to insert reading for location {}", record.location_id)
                    })?;
                }
            }
            tx.commit().context("failed to commit traffic readings")?;
            Ok(records.len())
        })
        .await
    }

    /// Rows strictly newer than `after`, oldest first. `after` must be in the
    /// raw timestamp format so the text comparison is chronological.
    pub async fn traffic_readings_after(&self, after: &str) -> Result<Vec<TrafficReading>> {
        let after = after.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_READINGS}
                 WHERE t.timestamp > ?1
                 ORDER BY t.timestamp ASC, t.id ASC"
            ))?;

            let mut rows = stmt.query(params![after])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }

    /// Rows with an id greater than `after_id`, in id order. Pass 0 for all.
    pub async fn traffic_readings_after_id(&self, after_id: i64) -> Result<Vec<TrafficReading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_READINGS}
                 WHERE t.id > ?1
                 ORDER BY t.id ASC"
            ))?;

            let mut rows = stmt.query(params![after_id])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }

    pub async fn count_traffic_readings(&self) -> Result<i64> {
        self.execute(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM traffic_data", [], |row| row.get(0))?;
            Ok(count)
        })
        .await
    }
}
