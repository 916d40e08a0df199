use anyhow::{bail, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::flag_from_sql,
    models::{Location, NewLocation},
};

fn row_to_location(row: &Row) -> Result<Location> {
    let active: Option<i64> = row.get("active")?;
    Ok(Location {
        id: row.get("id")?,
        name: row.get("name")?,
        lat: row.get("lat")?,
        lon: row.get("lon")?,
        active: flag_from_sql(active),
    })
}

impl Database {
    /// Active locations in id order. An empty registry is not an error.
    pub async fn list_active_locations(&self) -> Result<Vec<Location>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, lat, lon, active
                 FROM locations
                 WHERE active = 1
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut locations = Vec::new();
            while let Some(row) = rows.next()? {
                locations.push(row_to_location(row)?);
            }
            Ok(locations)
        })
        .await
    }

    pub async fn list_locations(&self) -> Result<Vec<Location>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, lat, lon, active
                 FROM locations
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut locations = Vec::new();
            while let Some(row) = rows.next()? {
                locations.push(row_to_location(row)?);
            }
            Ok(locations)
        })
        .await
    }

    /// Insert locations whose name is not yet registered. Existing rows keep
    /// their id, coordinates and activation flag. Returns how many were added.
    pub async fn seed_locations(&self, locations: &[NewLocation]) -> Result<usize> {
        let records = locations.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO locations (name, lat, lon, active)
                     VALUES (?1, ?2, ?3, 1)",
                )?;
                for record in &records {
                    inserted += stmt.execute(params![record.name, record.lat, record.lon])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    pub async fn set_location_active(&self, name: &str, active: bool) -> Result<()> {
        let name = name.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE locations SET active = ?1 WHERE name = ?2",
                params![i64::from(active), name],
            )?;

            if rows_affected == 0 {
                bail!("location '{name}' not found");
            }
            Ok(())
        })
        .await
    }
}
