// crates/serverperf-core/src/error.rs

use thiserror::Error;

use crate::cleaning::CleaningError;
use crate::config::ConfigError;
use crate::ingestion::LoadError;
use crate::outputs::SinkError;
use crate::transform::TransformError;
use crate::workbook::WorkbookError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Workbook error: {0}")]
    Workbook(#[from] WorkbookError),

    #[error("Source read failure: {0}")]
    Load(#[from] LoadError),

    #[error("Cleaning failure: {0}")]
    Cleaning(#[from] CleaningError),

    #[error("Transformation failure: {0}")]
    Transform(#[from] TransformError),

    #[error("Sink write failure: {0}")]
    Sink(#[from] SinkError),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
