//! Durable `last_uploaded_ts` marker for the incremental exporter.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::db::helpers::{format_raw_timestamp, parse_naive_timestamp};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Checkpoint used when none has been written yet, or the file is unusable.
pub const EPOCH_CHECKPOINT: &str = "1970-01-01 00:00:00";

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    last_uploaded_ts: String,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current checkpoint in raw-store timestamp format. A missing,
    /// unreadable or malformed file falls back to [`EPOCH_CHECKPOINT`].
    pub fn load(&self) -> String {
        if !self.path.exists() {
            log_info!(
                "no checkpoint at {}, starting from {}",
                self.path.display(),
                EPOCH_CHECKPOINT
            );
            return EPOCH_CHECKPOINT.to_string();
        }

        match self.read() {
            Ok(value) => value,
            Err(err) => {
                log_warn!(
                    "checkpoint {} is unusable ({err:#}); falling back to {}",
                    self.path.display(),
                    EPOCH_CHECKPOINT
                );
                EPOCH_CHECKPOINT.to_string()
            }
        }
    }

    fn read(&self) -> Result<String> {
        let contents = fs::read_to_string(&self.path).context("failed to read checkpoint")?;
        let file: CheckpointFile =
            serde_json::from_str(&contents).context("failed to parse checkpoint")?;
        let parsed = parse_naive_timestamp(&file.last_uploaded_ts, "last_uploaded_ts")?;
        Ok(format_raw_timestamp(&parsed))
    }

    /// Move the checkpoint from `current` to `next`. Refuses to move it
    /// backwards or leave it in place. The file is replaced atomically.
    pub fn advance(&self, current: &str, next: &str) -> Result<String> {
        let next = format_raw_timestamp(&parse_naive_timestamp(next, "checkpoint")?);
        if next.as_str() <= current {
            bail!("refusing to move checkpoint from {current} to {next}");
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create checkpoint directory {}", parent.display())
                })?;
            }
        }

        let serialized = serde_json::to_string_pretty(&CheckpointFile {
            last_uploaded_ts: next.clone(),
        })?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized)
            .with_context(|| format!("failed to write checkpoint to {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace checkpoint {}", self.path.display()))?;

        Ok(next)
    }
}
