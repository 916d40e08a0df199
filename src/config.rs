use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const API_KEY_ENV: &str = "TRAFFICFLOW_API_KEY";
pub const DATA_DIR_ENV: &str = "TRAFFICFLOW_DATA_DIR";

const DEFAULT_FLOW_URL: &str =
    "https://api.tomtom.com/traffic/services/4/flowSegmentData/absolute/10/json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    /// Upper bound on in-flight fetches per cycle; 0 means one per location.
    pub max_concurrent_fetches: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FLOW_URL.into(),
            api_key: String::new(),
            timeout_secs: 10,
            max_concurrent_fetches: 0,
        }
    }
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub window_start_hour: u32,
    pub window_end_hour: u32,
    pub cycle_interval_secs: u64,
    pub error_backoff_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            window_start_hour: 6,
            window_end_hour: 22,
            cycle_interval_secs: 20 * 60,
            error_backoff_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Http,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStyle {
    /// `prefix/YYYY-MM-DD/file`
    Date,
    /// `prefix/year=YYYY/month=MM/day=DD/file`
    Hive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Root directory for the local backend; buckets are subdirectories.
    pub root: PathBuf,
    pub endpoint: String,
    pub bucket: String,
    pub prefix: String,
    pub partition_style: PartitionStyle,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root: PathBuf::from("object_store"),
            endpoint: "http://localhost:9000".into(),
            bucket: "raw-traffic-data".into(),
            prefix: "traffic/parquet".into(),
            partition_style: PartitionStyle::Date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub raw_db: PathBuf,
    pub clean_db: PathBuf,
    pub checkpoint_path: PathBuf,
    pub export_dir: PathBuf,
    pub provider: ProviderSettings,
    pub schedule: ScheduleSettings,
    pub storage: StorageSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            raw_db: PathBuf::from("raw/data_traffic_QN.db"),
            clean_db: PathBuf::from("clean/data_traffic_clean.db"),
            checkpoint_path: PathBuf::from("state/export_checkpoint.json"),
            export_dir: PathBuf::from("tmp/export"),
            provider: ProviderSettings::default(),
            schedule: ScheduleSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (defaults when absent), apply environment overrides
    /// and resolve every relative path against `data_dir`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            Some(path) => {
                log::warn!("config {} not found, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        Ok(config.with_env_overrides().resolved())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.provider.api_key = key;
            }
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        self
    }

    /// Anchor relative paths at `data_dir`. Absolute paths are kept.
    pub fn resolved(mut self) -> Self {
        let base = self.data_dir.clone();
        let anchor = |path: &PathBuf| -> PathBuf {
            if path.is_absolute() {
                path.clone()
            } else {
                base.join(path)
            }
        };

        self.raw_db = anchor(&self.raw_db);
        self.clean_db = anchor(&self.clean_db);
        self.checkpoint_path = anchor(&self.checkpoint_path);
        self.export_dir = anchor(&self.export_dir);
        self.storage.root = anchor(&self.storage.root);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let schedule = &self.schedule;
        if schedule.window_start_hour >= schedule.window_end_hour || schedule.window_end_hour > 24 {
            bail!(
                "invalid active window [{}, {})",
                schedule.window_start_hour,
                schedule.window_end_hour
            );
        }
        if self.storage.bucket.trim().is_empty() {
            bail!("storage.bucket must not be empty");
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str> {
        let key = self.provider.api_key.trim();
        if key.is_empty() {
            bail!("provider.api_key is empty; set it in the config file or {API_KEY_ENV}");
        }
        Ok(key)
    }
}
