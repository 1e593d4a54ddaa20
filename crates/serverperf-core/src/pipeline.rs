use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use serde::Serialize;

use crate::cleaning::{clean_performance_data, CleaningReport};
use crate::combine::{concat_stations, StationTable};
use crate::config::PipelineConfig;
use crate::diagnostics::{Reporter, Stage};
use crate::error::Result;
use crate::ingestion::{load_workbook, SourceTables};
use crate::outputs::write_delimited;
use crate::transform::{transform_data, TransformReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed { reason: String },
}

impl StageStatus {
    fn from_error<E: std::fmt::Display>(error: Option<E>) -> Self {
        match error {
            None => StageStatus::Completed,
            Some(error) => StageStatus::Failed {
                reason: error.to_string(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageStatus::Completed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StationSummary {
    pub sheet: String,
    pub status: StageStatus,
    pub cleaning: CleaningReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputSummary {
    pub path: PathBuf,
    pub status: StageStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stations: Vec<StationSummary>,
    pub combined_rows: usize,
    pub transform_status: StageStatus,
    pub transform: TransformReport,
    pub rows: usize,
    pub columns: usize,
    pub output: Option<OutputSummary>,
}

impl RunSummary {
    /// True when every stage, including the sink, finished without falling back.
    pub fn is_clean_run(&self) -> bool {
        self.stations.iter().all(|station| station.status.is_completed())
            && self.transform_status.is_completed()
            && self
                .output
                .as_ref()
                .is_none_or(|output| output.status.is_completed())
    }
}

#[derive(Debug)]
pub struct PipelineRun {
    pub table: DataFrame,
    pub summary: RunSummary,
}

/// Cleans every station, stacks the results and transforms them against the metadata.
///
/// Stage failures do not abort the run: the best-effort table moves on to the next stage and
/// the failure is recorded in the summary.
pub fn process_tables(
    tables: SourceTables,
    config: &PipelineConfig,
    reporter: &dyn Reporter,
) -> Result<PipelineRun> {
    let SourceTables { metadata, stations } = tables;

    let mut cleaned = Vec::with_capacity(stations.len());
    let mut station_summaries = Vec::with_capacity(stations.len());
    for station in stations {
        reporter.info(Stage::Clean, &format!("Cleaning {}", station.sheet));
        let (table, report, error) =
            clean_performance_data(station.table, &config.schema, reporter).into_parts();
        station_summaries.push(StationSummary {
            sheet: station.sheet.clone(),
            status: StageStatus::from_error(error),
            cleaning: report,
        });
        cleaned.push(StationTable {
            sheet: station.sheet,
            table,
        });
    }

    let station_column = config
        .output
        .tag_station_column
        .then_some(config.output.station_column.as_str());
    let combined = concat_stations(&cleaned, station_column, reporter)?;
    let combined_rows = combined.height();

    let (table, transform, error) = transform_data(
        combined,
        &metadata,
        &config.schema,
        &config.transform,
        reporter,
    )
    .into_parts();

    let summary = RunSummary {
        stations: station_summaries,
        combined_rows,
        transform_status: StageStatus::from_error(error),
        transform,
        rows: table.height(),
        columns: table.width(),
        output: None,
    };

    Ok(PipelineRun { table, summary })
}

/// Full run: load the workbook, process it and write the delimited output.
///
/// Only a load failure (or a failure stacking station tables) is returned as an error; a sink
/// failure is reported and recorded in the summary.
pub fn run_pipeline(
    workbook: &Path,
    config: &PipelineConfig,
    reporter: &dyn Reporter,
) -> Result<PipelineRun> {
    let tables = load_workbook(workbook, &config.workbook, &config.schema, reporter)?;
    let mut run = process_tables(tables, config, reporter)?;

    let path = config.output.path.clone();
    let status = match write_delimited(&run.table, &path, config.output.delimiter_byte()) {
        Ok(()) => {
            reporter.info(
                Stage::Output,
                &format!("Output saved successfully: {}", path.display()),
            );
            StageStatus::Completed
        }
        Err(err) => {
            reporter.error(Stage::Output, &format!("Error saving output: {err}"));
            StageStatus::Failed {
                reason: err.to_string(),
            }
        }
    };
    run.summary.output = Some(OutputSummary { path, status });

    Ok(run)
}
