use anyhow::{bail, Context, Result};
use rusqlite::{Connection, Transaction};

/// Which schema a database file carries. Each store versions itself
/// independently through `PRAGMA user_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    /// `locations` + append-only `traffic_data`.
    Raw,
    /// `traffic_data_clean`, keyed by `(id, timestamp)`.
    Clean,
}

impl Store {
    pub fn as_str(&self) -> &'static str {
        match self {
            Store::Raw => "raw",
            Store::Clean => "clean",
        }
    }

    fn current_version(&self) -> i32 {
        match self {
            Store::Raw => 2,
            Store::Clean => 1,
        }
    }
}

pub fn run_migrations(conn: &mut Connection, store: Store) -> Result<()> {
    let target = store.current_version();
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > target {
        bail!(
            "{} database version ({}) is newer than supported schema ({})",
            store.as_str(),
            version,
            target
        );
    }

    if version == target {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    while version < target {
        let next_version = version + 1;
        apply_migration(&tx, store, next_version)
            .with_context(|| format!("migration to version {next_version} failed"))?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", target)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, store: Store, version: i32) -> Result<()> {
    match (store, version) {
        (Store::Raw, 1) => {
            tx.execute_batch(include_str!("schemas/raw_v1.sql"))
                .context("failed to execute raw_v1.sql")?;
            Ok(())
        }
        (Store::Raw, 2) => {
            tx.execute_batch(include_str!("schemas/raw_v2.sql"))
                .context("failed to execute raw_v2.sql")?;
            Ok(())
        }
        (Store::Clean, 1) => {
            tx.execute_batch(include_str!("schemas/clean_v1.sql"))
                .context("failed to execute clean_v1.sql")?;
            Ok(())
        }
        _ => bail!(
            "unknown migration target version {version} for {} store",
            store.as_str()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        names
            .into_iter()
            .filter(|name| !name.starts_with("sqlite_"))
            .collect()
    }

    #[test]
    fn raw_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn, Store::Raw).unwrap();
        run_migrations(&mut conn, Store::Raw).unwrap();

        assert_eq!(table_names(&conn), vec!["locations", "traffic_data"]);
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn schema_created_outside_migrations_is_adopted() {
        let mut conn = Connection::open_in_memory().unwrap();
        // A file created by an older crawler has the tables but no user_version.
        conn.execute_batch(include_str!("schemas/raw_v1.sql")).unwrap();
        run_migrations(&mut conn, Store::Raw).unwrap();
        assert_eq!(table_names(&conn), vec!["locations", "traffic_data"]);
    }

    #[test]
    fn clean_store_has_only_clean_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn, Store::Clean).unwrap();
        assert_eq!(table_names(&conn), vec!["traffic_data_clean"]);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 99).unwrap();
        assert!(run_migrations(&mut conn, Store::Clean).is_err());
    }
}
