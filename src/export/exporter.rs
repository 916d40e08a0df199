//! One incremental export run.
//!
//! Phases run strictly in order: load checkpoint, query rows newer than it,
//! write them to a Parquet file, upload, advance the checkpoint to the newest
//! exported timestamp, remove the local file. The checkpoint is written only
//! after the blob store confirms the object, so any failure before that point
//! leaves the next run to re-select the same rows.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;

use crate::config::{AppConfig, PartitionStyle};
use crate::db::{Database, TrafficReading};
use crate::storage::{BlobStore, UploadError, PARQUET_CONTENT_TYPE};

use super::checkpoint::CheckpointStore;
use super::columnar;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to read raw readings")]
    Read(#[source] anyhow::Error),
    #[error("failed to write export file")]
    Materialize(#[source] anyhow::Error),
    #[error("upload failed")]
    Upload(#[from] UploadError),
    #[error("failed to advance checkpoint")]
    Checkpoint(#[source] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub bucket: String,
    pub prefix: String,
    pub partition_style: PartitionStyle,
    pub export_dir: PathBuf,
}

impl From<&AppConfig> for ExportSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            prefix: config.storage.prefix.clone(),
            partition_style: config.storage.partition_style,
            export_dir: config.export_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    NoNewData {
        checkpoint: String,
    },
    Exported {
        rows: usize,
        object_key: String,
        checkpoint: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportPhase {
    CheckpointLoaded,
    Queried,
    NoNewData,
    BatchReady,
    Exported,
    CheckpointAdvanced,
    CleanedUp,
}

impl ExportPhase {
    fn as_str(&self) -> &'static str {
        match self {
            ExportPhase::CheckpointLoaded => "checkpoint_loaded",
            ExportPhase::Queried => "queried",
            ExportPhase::NoNewData => "no_new_data",
            ExportPhase::BatchReady => "batch_ready",
            ExportPhase::Exported => "exported",
            ExportPhase::CheckpointAdvanced => "checkpoint_advanced",
            ExportPhase::CleanedUp => "cleaned_up",
        }
    }
}

fn enter(phase: ExportPhase, detail: impl std::fmt::Display) {
    log_info!("export phase={} {}", phase.as_str(), detail);
}

/// Rows selected past the checkpoint, ordered by timestamp.
#[derive(Debug, Clone)]
pub struct ExportBatch {
    pub rows: Vec<TrafficReading>,
    pub max_timestamp: String,
}

/// An export batch written to disk, ready for upload.
#[derive(Debug, Clone)]
pub struct MaterializedBatch {
    pub path: PathBuf,
    pub file_name: String,
    pub captured_at: DateTime<Utc>,
    pub rows: usize,
    pub max_timestamp: String,
}

/// `traffic_data_20250301T072000.123Z.parquet`
pub fn export_file_name(captured_at: DateTime<Utc>) -> String {
    format!(
        "traffic_data_{}.parquet",
        captured_at.format("%Y%m%dT%H%M%S%.3fZ")
    )
}

pub fn object_key(
    prefix: &str,
    style: PartitionStyle,
    captured_at: DateTime<Utc>,
    file_name: &str,
) -> String {
    let partition = match style {
        PartitionStyle::Date => captured_at.format("%Y-%m-%d").to_string(),
        PartitionStyle::Hive => format!(
            "year={:04}/month={:02}/day={:02}",
            captured_at.year(),
            captured_at.month(),
            captured_at.day()
        ),
    };

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{partition}/{file_name}")
    } else {
        format!("{prefix}/{partition}/{file_name}")
    }
}

pub struct Exporter {
    raw: Database,
    store: Arc<dyn BlobStore>,
    checkpoint: CheckpointStore,
    settings: ExportSettings,
}

impl Exporter {
    pub fn new(
        raw: Database,
        store: Arc<dyn BlobStore>,
        checkpoint: CheckpointStore,
        settings: ExportSettings,
    ) -> Self {
        Self {
            raw,
            store,
            checkpoint,
            settings,
        }
    }

    pub fn load_checkpoint(&self) -> String {
        let checkpoint = self.checkpoint.load();
        enter(ExportPhase::CheckpointLoaded, format!("last_uploaded_ts={checkpoint}"));
        checkpoint
    }

    /// Rows strictly newer than `checkpoint`, or `None` when there are none.
    pub async fn query_batch(&self, checkpoint: &str) -> Result<Option<ExportBatch>, ExportError> {
        let rows = self
            .raw
            .traffic_readings_after(checkpoint)
            .await
            .map_err(ExportError::Read)?;
        enter(ExportPhase::Queried, format!("rows={}", rows.len()));

        // Ordered by timestamp, so the last row holds the maximum.
        let Some(max_timestamp) = rows.last().map(|row| row.timestamp.clone()) else {
            return Ok(None);
        };
        Ok(Some(ExportBatch {
            rows,
            max_timestamp,
        }))
    }

    pub async fn materialize(
        &self,
        batch: ExportBatch,
        captured_at: DateTime<Utc>,
    ) -> Result<MaterializedBatch, ExportError> {
        let file_name = export_file_name(captured_at);
        let path = self.settings.export_dir.join(&file_name);
        let rows = batch.rows.len();

        let write_path = path.clone();
        let readings = batch.rows;
        let bytes = tokio::task::spawn_blocking(move || {
            columnar::write_readings(&write_path, &readings)
        })
        .await
        .map_err(|err| ExportError::Materialize(anyhow::Error::new(err)))?
        .map_err(ExportError::Materialize)?;

        enter(
            ExportPhase::BatchReady,
            format!("file={} rows={} bytes={}", path.display(), rows, bytes),
        );

        Ok(MaterializedBatch {
            path,
            file_name,
            captured_at,
            rows,
            max_timestamp: batch.max_timestamp,
        })
    }

    /// Upload and return the object key once the store has confirmed it.
    pub async fn upload(&self, batch: &MaterializedBatch) -> Result<String, ExportError> {
        let key = object_key(
            &self.settings.prefix,
            self.settings.partition_style,
            batch.captured_at,
            &batch.file_name,
        );

        self.store.ensure_bucket(&self.settings.bucket).await?;
        self.store
            .put_file(&self.settings.bucket, &key, &batch.path, PARQUET_CONTENT_TYPE)
            .await?;

        enter(
            ExportPhase::Exported,
            format!("bucket={} key={}", self.settings.bucket, key),
        );
        Ok(key)
    }

    pub fn advance_checkpoint(
        &self,
        current: &str,
        batch: &MaterializedBatch,
    ) -> Result<String, ExportError> {
        let next = self
            .checkpoint
            .advance(current, &batch.max_timestamp)
            .map_err(ExportError::Checkpoint)?;
        enter(
            ExportPhase::CheckpointAdvanced,
            format!("from={current} to={next}"),
        );
        Ok(next)
    }

    /// Remove the local file. Failures are logged only.
    pub fn cleanup(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => enter(ExportPhase::CleanedUp, path.display()),
            Err(err) => log_warn!("failed to remove {}: {err}", path.display()),
        }
    }

    pub async fn run(&self) -> Result<ExportOutcome, ExportError> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, captured_at: DateTime<Utc>) -> Result<ExportOutcome, ExportError> {
        let checkpoint = self.load_checkpoint();

        let Some(batch) = self.query_batch(&checkpoint).await? else {
            enter(ExportPhase::NoNewData, format!("checkpoint={checkpoint}"));
            return Ok(ExportOutcome::NoNewData { checkpoint });
        };

        let materialized = self.materialize(batch, captured_at).await?;

        let object_key = match self.upload(&materialized).await {
            Ok(key) => key,
            Err(err) => {
                // The file is regenerable from the raw store.
                self.cleanup(&materialized.path);
                return Err(err);
            }
        };

        let advanced = self.advance_checkpoint(&checkpoint, &materialized);
        self.cleanup(&materialized.path);
        let advanced = advanced?;

        Ok(ExportOutcome::Exported {
            rows: materialized.rows,
            object_key,
            checkpoint: advanced,
        })
    }
}
