pub mod cleaning;
pub mod combine;
pub mod config;
pub mod diagnostics;
pub mod error;
mod frame;
pub mod ingestion;
pub mod outcome;
pub mod outputs;
pub mod pipeline;
pub mod schema;
pub mod transform;
pub mod workbook;

pub use cleaning::{clean_performance_data, CleaningReport};
pub use config::PipelineConfig;
pub use diagnostics::{RecordingReporter, Reporter, TracingReporter};
pub use error::{PipelineError, Result};
pub use pipeline::{process_tables, run_pipeline, PipelineRun, RunSummary};
pub use transform::{transform_data, TransformReport};
