pub mod checkpoint;
pub mod columnar;
pub mod exporter;

pub use checkpoint::{CheckpointStore, EPOCH_CHECKPOINT};
pub use exporter::{
    export_file_name, object_key, ExportError, ExportOutcome, ExportSettings, Exporter,
};
