use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::diagnostics::{Reporter, Stage};
use crate::frame::{column_names, has_column};
use crate::outcome::StageOutcome;
use crate::schema::ColumnSchema;

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

#[derive(Debug, Error)]
pub enum CleaningError {
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
    #[error("metric column {column} holds non-numeric values: {source}")]
    NonNumericMetric {
        column: String,
        #[source]
        source: PolarsError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCount {
    pub column: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimestampStatus {
    #[default]
    Absent,
    Parsed {
        invalid: usize,
    },
}

/// Counts of every corrective action the cleaner took on one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub dropped_columns: Vec<String>,
    pub filled_nulls: Vec<ColumnCount>,
    pub timestamp: TimestampStatus,
    /// Rows in which at least one metric was negative.
    pub negative_metrics: usize,
    pub negative_cells: Vec<ColumnCount>,
    pub duplicates: usize,
    pub renamed_columns: Vec<String>,
    pub rows: usize,
    pub columns: usize,
}

impl CleaningReport {
    pub fn total_filled(&self) -> usize {
        self.filled_nulls.iter().map(|entry| entry.count).sum()
    }

    /// Nonzero anomaly counts, in reporting order.
    pub fn anomalies(&self) -> Vec<(&'static str, usize)> {
        let mut anomalies = Vec::new();
        if self.negative_metrics > 0 {
            anomalies.push(("negative_metrics", self.negative_metrics));
        }
        if self.duplicates > 0 {
            anomalies.push(("duplicates", self.duplicates));
        }
        anomalies
    }

    pub fn has_anomalies(&self) -> bool {
        !self.anomalies().is_empty()
    }
}

pub type CleaningOutcome = StageOutcome<CleaningReport, CleaningError>;

/// Normalizes one station's performance table.
///
/// Steps run in a fixed order: drop irrelevant columns, zero-fill missing metrics, parse the
/// timestamp, correct negative rows, drop exact duplicates, then trim and sort column names.
/// On failure the table is returned as it stood when the failing step began.
pub fn clean_performance_data(
    mut df: DataFrame,
    schema: &ColumnSchema,
    reporter: &dyn Reporter,
) -> CleaningOutcome {
    let mut report = CleaningReport {
        input_rows: df.height(),
        ..CleaningReport::default()
    };

    match run_steps(&mut df, schema, reporter, &mut report) {
        Ok(()) => {
            report.rows = df.height();
            report.columns = df.width();
            reporter.info(
                Stage::Clean,
                &format!(
                    "Final cleaned data: {} rows, {} columns",
                    report.rows, report.columns
                ),
            );
            let anomalies = report.anomalies();
            if anomalies.is_empty() {
                reporter.info(Stage::Clean, "No major anomalies detected.");
            } else {
                reporter.warn(Stage::Clean, "Anomaly Summary:");
                for (name, count) in anomalies {
                    reporter.warn(Stage::Clean, &format!("   - {name}: {count}"));
                }
            }
            StageOutcome::Completed { table: df, report }
        }
        Err(error) => {
            report.rows = df.height();
            report.columns = df.width();
            reporter.error(Stage::Clean, "Error cleaning performance data.");
            reporter.error(Stage::Clean, &format!("Reason: {error}"));
            StageOutcome::Failed {
                table: df,
                report,
                error,
            }
        }
    }
}

fn run_steps(
    df: &mut DataFrame,
    schema: &ColumnSchema,
    reporter: &dyn Reporter,
    report: &mut CleaningReport,
) -> Result<(), CleaningError> {
    drop_irrelevant_columns(df, schema, report)?;
    reporter.info(Stage::Clean, "Dropped irrelevant columns (if any).");

    fill_missing_metrics(df, schema, reporter, report)?;
    standardize_timestamp(df, schema, reporter, report)?;

    correct_negative_rows(df, schema, report)?;
    if report.negative_metrics > 0 {
        reporter.warn(
            Stage::Clean,
            &format!(
                "Found and corrected {} negative metric values.",
                report.negative_metrics
            ),
        );
    }

    drop_duplicate_rows(df, report)?;
    if report.duplicates > 0 {
        reporter.warn(
            Stage::Clean,
            &format!("Dropped {} duplicate records.", report.duplicates),
        );
    }

    unify_schema(df, report)?;
    reporter.info(Stage::Clean, "Unified schema and sorted columns.");
    Ok(())
}

fn drop_irrelevant_columns(
    df: &mut DataFrame,
    schema: &ColumnSchema,
    report: &mut CleaningReport,
) -> Result<(), CleaningError> {
    for name in &schema.dropped {
        if has_column(df, name) {
            *df = df.drop(name)?;
            report.dropped_columns.push(name.clone());
        }
    }
    Ok(())
}

fn fill_missing_metrics(
    df: &mut DataFrame,
    schema: &ColumnSchema,
    reporter: &dyn Reporter,
    report: &mut CleaningReport,
) -> Result<(), CleaningError> {
    for name in schema.metric_columns() {
        if !has_column(df, name) {
            continue;
        }

        let numeric = df
            .column(name)?
            .as_materialized_series()
            .strict_cast(&DataType::Float64)
            .map_err(|source| CleaningError::NonNumericMetric {
                column: name.to_string(),
                source,
            })?;

        let mut missing = 0usize;
        let filled: Vec<f64> = numeric
            .f64()?
            .into_iter()
            .map(|value| match value {
                Some(v) if !v.is_nan() => v,
                _ => {
                    missing += 1;
                    0.0
                }
            })
            .collect();

        df.with_column(Series::new(name.into(), filled))?;

        if missing > 0 {
            reporter.info(
                Stage::Clean,
                &format!("Filled {missing} missing values in {name} with 0."),
            );
            report.filled_nulls.push(ColumnCount {
                column: name.to_string(),
                count: missing,
            });
        }
    }
    Ok(())
}

fn standardize_timestamp(
    df: &mut DataFrame,
    schema: &ColumnSchema,
    reporter: &dyn Reporter,
    report: &mut CleaningReport,
) -> Result<(), CleaningError> {
    let canonical = schema.timestamp.as_str();

    if has_column(df, &schema.source_timestamp) {
        df.rename(&schema.source_timestamp, canonical.into())?;
    } else if !has_column(df, canonical) {
        reporter.warn(Stage::Clean, "No Timestamp column found.");
        report.timestamp = TimestampStatus::Absent;
        return Ok(());
    }

    let parsed = parse_timestamps(df.column(canonical)?)?;
    let invalid = parsed.null_count();
    df.with_column(parsed)?;

    if invalid > 0 {
        reporter.warn(
            Stage::Clean,
            &format!("Found {invalid} invalid/missing timestamps."),
        );
    }
    report.timestamp = TimestampStatus::Parsed { invalid };
    Ok(())
}

/// Converts a timestamp column to a naive microsecond datetime; unparseable values become null.
pub fn parse_timestamps(column: &Column) -> PolarsResult<Series> {
    let name = column.name().clone();
    let target = DataType::Datetime(TimeUnit::Microseconds, None);

    match column.dtype() {
        DataType::Datetime(_, _) | DataType::Date => column.as_materialized_series().cast(&target),
        _ => {
            let text = column.cast(&DataType::String)?;
            let micros: Vec<Option<i64>> = text
                .str()?
                .into_iter()
                .map(|value| value.and_then(parse_datetime_micros))
                .collect();
            Series::new(name, micros).cast(&target)
        }
    }
}

fn parse_datetime_micros(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc().and_utc().timestamp_micros());
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.naive_utc().and_utc().timestamp_micros());
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().timestamp_micros());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_micros());
        }
    }
    None
}

/// Whole-row correction: when any metric in a row is negative, every metric in that row is
/// replaced by its absolute value.
fn correct_negative_rows(
    df: &mut DataFrame,
    schema: &ColumnSchema,
    report: &mut CleaningReport,
) -> Result<(), CleaningError> {
    let present: Vec<&str> = schema
        .metric_columns()
        .into_iter()
        .filter(|name| has_column(df, name))
        .collect();
    if present.is_empty() {
        return Ok(());
    }

    let mut metrics: Vec<Vec<Option<f64>>> = Vec::with_capacity(present.len());
    for name in &present {
        let values = df
            .column(name)?
            .as_materialized_series()
            .strict_cast(&DataType::Float64)
            .map_err(|source| CleaningError::NonNumericMetric {
                column: name.to_string(),
                source,
            })?;
        metrics.push(values.f64()?.into_iter().collect());
    }

    let height = df.height();
    let flagged: Vec<bool> = (0..height)
        .map(|row| {
            metrics
                .iter()
                .any(|values| values[row].is_some_and(|v| v < 0.0))
        })
        .collect();
    let flagged_rows = flagged.iter().filter(|flag| **flag).count();
    if flagged_rows == 0 {
        return Ok(());
    }

    for (name, values) in present.iter().zip(metrics.iter_mut()) {
        let negatives = values.iter().flatten().filter(|v| **v < 0.0).count();
        if negatives > 0 {
            report.negative_cells.push(ColumnCount {
                column: name.to_string(),
                count: negatives,
            });
        }
        for (value, flag) in values.iter_mut().zip(&flagged) {
            if *flag {
                *value = value.map(f64::abs);
            }
        }
    }

    for (name, values) in present.iter().zip(metrics) {
        df.with_column(Series::new((*name).into(), values))?;
    }
    report.negative_metrics = flagged_rows;
    Ok(())
}

/// Drops exact full-row duplicates, keeping the first occurrence in input order.
fn drop_duplicate_rows(
    df: &mut DataFrame,
    report: &mut CleaningReport,
) -> Result<(), CleaningError> {
    if df.height() < 2 || df.width() == 0 {
        return Ok(());
    }

    let before = df.height();
    let deduped = df.unique_stable(None, UniqueKeepStrategy::First, None)?;
    report.duplicates = before - deduped.height();
    if report.duplicates > 0 {
        *df = deduped;
    }
    Ok(())
}

fn unify_schema(df: &mut DataFrame, report: &mut CleaningReport) -> Result<(), CleaningError> {
    for name in column_names(df) {
        let trimmed = name.trim();
        if trimmed != name {
            df.rename(&name, trimmed.into())?;
            report.renamed_columns.push(trimmed.to_string());
        }
    }

    let mut ordered = column_names(df);
    ordered.sort();
    *df = df.select(ordered)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_timestamp_layouts() {
        let base = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(14, 5, 0))
            .map(|dt| dt.and_utc().timestamp_micros());

        assert_eq!(parse_datetime_micros("2024-03-01 14:05:00"), base);
        assert_eq!(parse_datetime_micros("2024-03-01T14:05:00"), base);
        assert_eq!(parse_datetime_micros("2024-03-01 14:05"), base);
        assert_eq!(parse_datetime_micros("03/01/2024 14:05"), base);
        assert_eq!(parse_datetime_micros("2024-03-01T15:05:00+01:00"), base);
        assert_eq!(
            parse_datetime_micros("2024-03-01 14:05:00.250"),
            base.map(|v| v + 250_000)
        );
        assert!(parse_datetime_micros("2024-03-01").is_some());
        assert_eq!(parse_datetime_micros("not a date"), None);
        assert_eq!(parse_datetime_micros("2024-13-45 10:00:00"), None);
    }

    #[test]
    fn anomalies_only_lists_nonzero_counts() {
        let report = CleaningReport {
            duplicates: 2,
            ..CleaningReport::default()
        };
        assert_eq!(report.anomalies(), vec![("duplicates", 2)]);
        assert!(report.has_anomalies());
        assert!(!CleaningReport::default().has_anomalies());
    }
}
