use std::path::Path;

use polars::prelude::DataFrame;
use thiserror::Error;

use crate::combine::StationTable;
use crate::config::WorkbookConfig;
use crate::diagnostics::{Reporter, Stage};
use crate::frame::has_column;
use crate::schema::ColumnSchema;
use crate::workbook::{open_workbook, SheetSource, WorkbookError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not open workbook: {0}")]
    Open(#[source] WorkbookError),
    #[error("could not read sheet {sheet}: {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: WorkbookError,
    },
}

/// The three tables a pipeline run starts from.
#[derive(Debug, Clone)]
pub struct SourceTables {
    pub metadata: DataFrame,
    pub stations: Vec<StationTable>,
}

pub fn load_workbook(
    path: &Path,
    workbook: &WorkbookConfig,
    schema: &ColumnSchema,
    reporter: &dyn Reporter,
) -> Result<SourceTables, LoadError> {
    let mut source = match open_workbook(path) {
        Ok(source) => source,
        Err(err) => {
            let err = LoadError::Open(err);
            report_failure(reporter, &err);
            return Err(err);
        }
    };
    load_sheets(&mut *source, workbook, schema, reporter)
}

/// Reads the metadata sheet and every station sheet. Any missing or malformed sheet fails the
/// whole load; no subset of tables is returned.
pub fn load_sheets(
    source: &mut dyn SheetSource,
    workbook: &WorkbookConfig,
    schema: &ColumnSchema,
    reporter: &dyn Reporter,
) -> Result<SourceTables, LoadError> {
    let result = read_all(source, workbook);
    let tables = match result {
        Ok(tables) => tables,
        Err(err) => {
            report_failure(reporter, &err);
            return Err(err);
        }
    };

    reporter.info(
        Stage::Load,
        &format!("Loaded successfully from {}:", source.describe()),
    );
    reporter.info(
        Stage::Load,
        &format!(" - Metadata shape: {:?}", tables.metadata.shape()),
    );
    for station in &tables.stations {
        reporter.info(
            Stage::Load,
            &format!(" - {} shape: {:?}", station.sheet, station.table.shape()),
        );
    }

    if !has_column(&tables.metadata, &schema.server_id) {
        reporter.warn(
            Stage::Load,
            &format!(
                "{} has no {} column; metadata cannot be merged.",
                workbook.metadata_sheet, schema.server_id
            ),
        );
    }
    for station in &tables.stations {
        let coverage = schema.coverage(&station.table);
        if !coverage.missing.is_empty() {
            reporter.warn(
                Stage::Load,
                &format!(
                    "{} lacks recognized columns: {}",
                    station.sheet,
                    coverage.missing.join(", ")
                ),
            );
        }
    }

    Ok(tables)
}

fn read_all(
    source: &mut dyn SheetSource,
    workbook: &WorkbookConfig,
) -> Result<SourceTables, LoadError> {
    let metadata = read_sheet(source, &workbook.metadata_sheet)?;
    let mut stations = Vec::with_capacity(workbook.station_sheets.len());
    for sheet in &workbook.station_sheets {
        stations.push(StationTable {
            sheet: sheet.clone(),
            table: read_sheet(source, sheet)?,
        });
    }
    Ok(SourceTables { metadata, stations })
}

fn read_sheet(source: &mut dyn SheetSource, sheet: &str) -> Result<DataFrame, LoadError> {
    source.read_sheet(sheet).map_err(|err| LoadError::Sheet {
        sheet: sheet.to_string(),
        source: err,
    })
}

fn report_failure(reporter: &dyn Reporter, err: &LoadError) {
    reporter.error(Stage::Load, "Error reading workbook.");
    reporter.error(Stage::Load, &format!("Reason: {err}"));
}
