//! Entry points behind each CLI subcommand. Every command opens only the
//! stores it needs from the resolved [`AppConfig`].

use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};

use crate::cleaning::{run_cleaning, CleanMode, CleanThresholds, CleaningReport};
use crate::config::AppConfig;
use crate::crawler::{local_clock, run_cycle, Collector, CrawlSettings, CrawlerController, CycleSummary};
use crate::db::{models::default_locations, Database, Location, NewLocation, Store};
use crate::export::{CheckpointStore, ExportError, ExportOutcome, ExportSettings, Exporter};
use crate::provider::TomTomClient;
use crate::storage::build_blob_store;

const ENABLE_LOGS: bool = true;

use crate::log_info;

pub fn open_raw(config: &AppConfig) -> Result<Database> {
    Database::open(&config.raw_db, Store::Raw)
}

pub fn open_clean(config: &AppConfig) -> Result<Database> {
    Database::open(&config.clean_db, Store::Clean)
}

fn build_collector(config: &AppConfig) -> Result<Arc<Collector>> {
    config.require_api_key()?;
    let client = TomTomClient::new(&config.provider).context("failed to build provider client")?;
    Ok(Arc::new(Collector::new(
        Arc::new(client),
        config.provider.max_concurrent_fetches,
        config.provider.timeout(),
    )))
}

/// Run the scheduler until Ctrl-C.
pub async fn crawl(config: &AppConfig) -> Result<()> {
    let collector = build_collector(config)?;
    let db = open_raw(config)?;

    let mut controller = CrawlerController::new();
    controller.start(
        db,
        collector,
        CrawlSettings::from(&config.schedule),
        local_clock(),
    )?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    log_info!("stop requested");
    controller.stop().await
}

/// One collection cycle, ignoring the active window.
pub async fn collect_once(config: &AppConfig) -> Result<CycleSummary> {
    let collector = build_collector(config)?;
    let db = open_raw(config)?;
    run_cycle(&db, &collector, (local_clock())()).await
}

pub async fn clean(config: &AppConfig, incremental: bool) -> Result<CleaningReport> {
    let raw = open_raw(config)?;
    let clean = open_clean(config)?;
    let mode = if incremental {
        CleanMode::Incremental
    } else {
        CleanMode::Full
    };
    run_cleaning(&raw, &clean, mode, &CleanThresholds::default()).await
}

pub async fn export(config: &AppConfig) -> Result<ExportOutcome, ExportError> {
    let raw = open_raw(config).map_err(ExportError::Read)?;
    let store = build_blob_store(&config.storage).map_err(ExportError::Read)?;
    let exporter = Exporter::new(
        raw,
        store,
        CheckpointStore::new(&config.checkpoint_path),
        ExportSettings::from(config),
    );
    exporter.run().await
}

pub fn read_seed_file(path: &Path) -> Result<Vec<NewLocation>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse seed file {}", path.display()))
}

/// Returns how many locations were newly registered.
pub async fn seed_locations(config: &AppConfig, file: Option<&Path>) -> Result<usize> {
    let locations = match file {
        Some(path) => read_seed_file(path)?,
        None => default_locations(),
    };
    let db = open_raw(config)?;
    let added = db.seed_locations(&locations).await?;
    log_info!("seeded {} of {} locations", added, locations.len());
    Ok(added)
}

pub async fn list_locations(config: &AppConfig) -> Result<Vec<Location>> {
    open_raw(config)?.list_locations().await
}

pub async fn set_location_active(config: &AppConfig, name: &str, active: bool) -> Result<()> {
    open_raw(config)?.set_location_active(name, active).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(dir: &Path) -> AppConfig {
        AppConfig {
            data_dir: dir.to_path_buf(),
            ..AppConfig::default()
        }
        .resolved()
    }

    #[tokio::test]
    async fn seeding_from_file_and_toggling() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let seed: PathBuf = dir.path().join("seed.json");
        fs::write(
            &seed,
            r#"[{"name": "A", "lat": 13.7, "lon": 109.2}, {"name": "B", "lat": 13.8, "lon": 109.3}]"#,
        )
        .unwrap();

        assert_eq!(seed_locations(&config, Some(&seed)).await.unwrap(), 2);
        assert_eq!(seed_locations(&config, Some(&seed)).await.unwrap(), 0);

        set_location_active(&config, "B", false).await.unwrap();
        let listed = list_locations(&config).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].active);
        assert!(!listed[1].active);

        assert!(set_location_active(&config, "missing", true).await.is_err());
    }

    #[tokio::test]
    async fn builtin_seed_registers_five_points() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        assert_eq!(seed_locations(&config, None).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn collection_without_api_key_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.provider.api_key.clear();
        assert!(collect_once(&config).await.is_err());
        assert!(!config.raw_db.exists());
    }
}
