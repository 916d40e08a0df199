pub mod config;
pub mod transform;

pub use config::CleanThresholds;
pub use transform::{clean_row, run_cleaning, CleanMode, CleaningReport, RowVerdict};
