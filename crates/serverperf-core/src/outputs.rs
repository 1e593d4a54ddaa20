use std::fs;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use polars::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to prepare output directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write delimited output: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to render column for output: {0}")]
    Polars(#[from] PolarsError),
}

/// Writes `df` as a delimited file with a header row and no index column.
/// Null cells are written empty.
pub fn write_delimited(df: &DataFrame, path: &Path, delimiter: u8) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SinkError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let rendered = df
        .get_columns()
        .iter()
        .map(render_column)
        .collect::<Result<Vec<_>, _>>()?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;
    writer.write_record(df.get_column_names().iter().map(|name| name.as_str()))?;
    for row in 0..df.height() {
        writer.write_record(rendered.iter().map(|column| column[row].as_str()))?;
    }
    writer.flush().map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn render_column(column: &Column) -> Result<Vec<String>, SinkError> {
    match column.dtype() {
        DataType::Float64 | DataType::Float32 => {
            let values = column.cast(&DataType::Float64)?;
            Ok(values
                .f64()?
                .into_iter()
                .map(|value| value.map(|v| format!("{v:?}")).unwrap_or_default())
                .collect())
        }
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let physical = column.as_materialized_series().to_physical_repr();
            Ok(physical
                .i64()?
                .into_iter()
                .map(|value| {
                    value
                        .and_then(|v| format_datetime(v, unit))
                        .unwrap_or_default()
                })
                .collect())
        }
        _ => {
            let text = column.cast(&DataType::String)?;
            Ok(text
                .str()?
                .into_iter()
                .map(|value| value.unwrap_or_default().to_string())
                .collect())
        }
    }
}

fn format_datetime(value: i64, unit: TimeUnit) -> Option<String> {
    let micros = match unit {
        TimeUnit::Nanoseconds => value.div_euclid(1_000),
        TimeUnit::Microseconds => value,
        TimeUnit::Milliseconds => value.checked_mul(1_000)?,
    };
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
}
