mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use migrations::Store;
pub use models::{
    CleanReading, CleanTrafficLevel, LiveTrafficLevel, Location, NewLocation, NewTrafficReading,
    TrafficReading,
};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reading(location_id: i64, hour: u32, minute: u32) -> NewTrafficReading {
        NewTrafficReading {
            timestamp: NaiveDate::from_ymd_opt(2025, 3, 1)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap(),
            location_id,
            current_speed_kmh: 30.0,
            free_flow_speed_kmh: 40.0,
            speed_ratio: 0.75,
            traffic_level: LiveTrafficLevel::Dong,
            confidence: 0.9,
        }
    }

    async fn raw_store(dir: &tempfile::TempDir) -> Database {
        let db = Database::open(dir.path().join("raw/traffic.db"), Store::Raw).unwrap();
        db.seed_locations(&[
            NewLocation::new("A", 13.0, 109.0),
            NewLocation::new("B", 13.1, 109.1),
            NewLocation::new("C", 13.2, 109.2),
        ])
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn reopening_keeps_schema_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw/traffic.db");
        {
            let db = Database::open(&path, Store::Raw).unwrap();
            db.seed_locations(&[NewLocation::new("A", 1.0, 2.0)]).await.unwrap();
        }
        let db = Database::open(&path, Store::Raw).unwrap();
        assert_eq!(db.list_locations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn seeding_is_insert_if_absent_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let db = raw_store(&dir).await;

        let added = db
            .seed_locations(&[NewLocation::new("A", 99.0, 99.0), NewLocation::new("D", 1.0, 1.0)])
            .await
            .unwrap();
        assert_eq!(added, 1);

        let all = db.list_locations().await.unwrap();
        let a = all.iter().find(|l| l.name == "A").unwrap();
        assert_eq!((a.id, a.lat), (1, 13.0));
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn deactivated_locations_are_not_listed_as_active() {
        let dir = tempfile::tempdir().unwrap();
        let db = raw_store(&dir).await;

        db.set_location_active("B", false).await.unwrap();
        let names: Vec<String> = db
            .list_active_locations()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["A", "C"]);

        db.set_location_active("B", true).await.unwrap();
        assert_eq!(db.list_active_locations().await.unwrap().len(), 3);
        assert!(db.set_location_active("nowhere", false).await.is_err());
    }

    #[tokio::test]
    async fn empty_registry_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("raw.db"), Store::Raw).unwrap();
        assert!(db.list_active_locations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appending_nothing_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let db = raw_store(&dir).await;
        assert_eq!(db.insert_traffic_readings(&[]).await.unwrap(), 0);
        assert_eq!(db.count_traffic_readings().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn appended_rows_get_fresh_ids_and_are_readable_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let db = raw_store(&dir).await;

        db.insert_traffic_readings(&[reading(1, 7, 0), reading(2, 7, 0)])
            .await
            .unwrap();
        db.insert_traffic_readings(&[reading(1, 7, 20)]).await.unwrap();

        let rows = db.traffic_readings_after_id(0).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(rows[0].timestamp, "2025-03-01 07:00:00");
        assert_eq!(rows[0].location_name.as_deref(), Some("A"));
        assert_eq!(rows[0].traffic_level.as_deref(), Some("DONG"));
    }

    #[tokio::test]
    async fn readings_after_checkpoint_are_strictly_newer_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let db = raw_store(&dir).await;

        db.insert_traffic_readings(&[reading(1, 9, 0), reading(2, 7, 0), reading(3, 8, 0)])
            .await
            .unwrap();

        let rows = db.traffic_readings_after("2025-03-01 07:00:00").await.unwrap();
        let stamps: Vec<&str> = rows.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["2025-03-01 08:00:00", "2025-03-01 09:00:00"]);
    }

    #[tokio::test]
    async fn clean_insert_ignores_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("clean.db"), Store::Clean).unwrap();

        let row = CleanReading {
            id: 7,
            timestamp: "2025-03-01T07:00:00".into(),
            location: "A".into(),
            current_speed_kmh: 10.0,
            free_flow_speed_kmh: 40.0,
            speed_ratio: 0.25,
            traffic_level: CleanTrafficLevel::Severe,
            confidence: Some(1.0),
        };
        assert_eq!(db.insert_clean_readings(&[row.clone()]).await.unwrap(), 1);

        let mut changed = row.clone();
        changed.location = "overwritten?".into();
        assert_eq!(db.insert_clean_readings(&[changed]).await.unwrap(), 0);

        assert_eq!(db.list_clean_readings().await.unwrap(), vec![row]);
        assert_eq!(db.max_clean_id().await.unwrap(), 7);
    }
}
