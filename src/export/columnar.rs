//! Parquet serialization of an export batch.

use std::{fs, fs::File, path::Path, sync::Arc};

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::db::TrafficReading;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub fn traffic_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("location", DataType::Int64, false),
        Field::new("location_name", DataType::Utf8, true),
        Field::new("current_speed_kmh", DataType::Float64, true),
        Field::new("free_flow_speed_kmh", DataType::Float64, true),
        Field::new("speed_ratio", DataType::Float64, true),
        Field::new("traffic_level", DataType::Utf8, true),
        Field::new("confidence", DataType::Float64, true),
    ]))
}

fn readings_to_batch(readings: &[TrafficReading]) -> Result<RecordBatch> {
    let id: Int64Array = readings.iter().map(|r| Some(r.id)).collect();
    let timestamp: StringArray = readings.iter().map(|r| Some(r.timestamp.as_str())).collect();
    let location: Int64Array = readings.iter().map(|r| Some(r.location_id)).collect();
    let location_name: StringArray = readings.iter().map(|r| r.location_name.as_deref()).collect();
    let current: Float64Array = readings.iter().map(|r| r.current_speed_kmh).collect();
    let free_flow: Float64Array = readings.iter().map(|r| r.free_flow_speed_kmh).collect();
    let ratio: Float64Array = readings.iter().map(|r| r.speed_ratio).collect();
    let level: StringArray = readings.iter().map(|r| r.traffic_level.as_deref()).collect();
    let confidence: Float64Array = readings.iter().map(|r| r.confidence).collect();

    RecordBatch::try_new(
        traffic_schema(),
        vec![
            Arc::new(id),
            Arc::new(timestamp),
            Arc::new(location),
            Arc::new(location_name),
            Arc::new(current),
            Arc::new(free_flow),
            Arc::new(ratio),
            Arc::new(level),
            Arc::new(confidence),
        ],
    )
    .context("failed to build record batch")
}

/// Write `readings` as one ZSTD-compressed Parquet file. The data goes to a
/// `.tmp` sibling first and is renamed into place once the footer is written.
/// Returns the final file size in bytes.
pub fn write_readings(path: &Path, readings: &[TrafficReading]) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create export directory {}", parent.display()))?;
    }

    let batch = readings_to_batch(readings)?;
    write_via_temp(path, |temp_path| write_batch(temp_path, &batch))?;

    Ok(fs::metadata(path)?.len())
}

/// Run `write` against a `.tmp` sibling of `path` and rename it into place.
/// A failed write removes the partial temp file.
fn write_via_temp<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let temp_path = path.with_extension("parquet.tmp");

    if let Err(err) = write(&temp_path) {
        match fs::remove_file(&temp_path) {
            Ok(()) => {}
            Err(remove_err) if remove_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(remove_err) => {
                log_warn!("failed to remove {}: {remove_err}", temp_path.display())
            }
        }
        return Err(err);
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("failed to move {} into place", temp_path.display()))
}

fn write_batch(temp_path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(temp_path)
        .with_context(|| format!("failed to create {}", temp_path.display()))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("failed to create Parquet writer")?;
    writer.write(batch).context("failed to write batch")?;
    writer.close().context("failed to close Parquet writer")?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn read_readings(path: &Path) -> Result<Vec<RecordBatch>> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    Ok(reader.collect::<std::result::Result<Vec<_>, _>>()?)
}
