use std::collections::HashMap;

use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::config::TransformConfig;
use crate::diagnostics::{Reporter, Stage};
use crate::frame::{column_names, float_values, has_column, zero_column};
use crate::outcome::StageOutcome;
use crate::schema::ColumnSchema;

pub const HIGH_LOAD: &str = "High Load";
pub const NORMAL: &str = "Normal";
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
    #[error("column {column} holds non-numeric values: {source}")]
    NonNumeric {
        column: String,
        #[source]
        source: PolarsError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MergeStatus {
    #[default]
    NotAttempted,
    Merged {
        matched_rows: usize,
        unmatched_rows: usize,
        metadata_columns: usize,
    },
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlagCounts {
    pub high_load: usize,
    pub normal: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    pub input_rows: usize,
    /// Canonical metric columns that had no source column and were zero-filled.
    pub substituted_metrics: Vec<String>,
    pub throughput_computed: bool,
    pub merge: MergeStatus,
    pub flags: FlagCounts,
    pub rows: usize,
    pub columns: usize,
}

pub type TransformOutcome = StageOutcome<TransformReport, TransformError>;

/// Derives the analytic columns, merges server metadata and attaches the load flag.
///
/// On failure the performance table is handed back exactly as it was received.
pub fn transform_data(
    performance: DataFrame,
    metadata: &DataFrame,
    schema: &ColumnSchema,
    config: &TransformConfig,
    reporter: &dyn Reporter,
) -> TransformOutcome {
    let original = performance.clone();
    let mut report = TransformReport {
        input_rows: performance.height(),
        ..TransformReport::default()
    };

    reporter.info(Stage::Transform, "Starting transformation...");
    match run_steps(performance, metadata, schema, config, reporter, &mut report) {
        Ok(table) => {
            report.rows = table.height();
            report.columns = table.width();
            reporter.info(
                Stage::Transform,
                &format!(
                    "Transformation complete: rows = {} columns = {}",
                    report.rows, report.columns
                ),
            );
            StageOutcome::Completed { table, report }
        }
        Err(error) => {
            report.rows = original.height();
            report.columns = original.width();
            reporter.error(Stage::Transform, "Error transforming data.");
            reporter.error(Stage::Transform, &format!("Reason: {error}"));
            StageOutcome::Failed {
                table: original,
                report,
                error,
            }
        }
    }
}

fn run_steps(
    mut df: DataFrame,
    metadata: &DataFrame,
    schema: &ColumnSchema,
    config: &TransformConfig,
    reporter: &dyn Reporter,
    report: &mut TransformReport,
) -> Result<DataFrame, TransformError> {
    rename_core_metrics(&mut df, schema, reporter, report)?;
    derive_network_throughput(&mut df, schema, reporter, report)?;

    let mut merged = if has_column(&df, &schema.server_id) && has_column(metadata, &schema.server_id)
    {
        let (merged, status) = left_join(&df, metadata, &schema.server_id)?;
        reporter.info(
            Stage::Transform,
            &format!(
                "Merged performance data with metadata on {}.",
                schema.server_id
            ),
        );
        if let MergeStatus::Merged { unmatched_rows, .. } = &status {
            if *unmatched_rows > 0 {
                reporter.warn(
                    Stage::Transform,
                    &format!("{unmatched_rows} rows had no matching metadata."),
                );
            }
        }
        report.merge = status;
        merged
    } else {
        reporter.warn(
            Stage::Transform,
            &format!(
                "{} missing in one of the tables; skipped merge.",
                schema.server_id
            ),
        );
        report.merge = MergeStatus::Skipped;
        df
    };

    flag_anomalies(&mut merged, schema, config, reporter, report)?;
    Ok(merged)
}

fn rename_core_metrics(
    df: &mut DataFrame,
    schema: &ColumnSchema,
    reporter: &dyn Reporter,
    report: &mut TransformReport,
) -> Result<(), TransformError> {
    for (label, metric) in schema.renamed_metrics() {
        if has_column(df, &metric.source) {
            df.rename(&metric.source, metric.canonical.as_str().into())?;
            reporter.info(Stage::Transform, &format!("{label} column ready."));
        } else if has_column(df, &metric.canonical) {
            reporter.info(Stage::Transform, &format!("{label} column ready."));
        } else {
            df.with_column(zero_column(&metric.canonical, df.height()))?;
            reporter.warn(
                Stage::Transform,
                &format!("{label} column missing; filled with 0."),
            );
            report.substituted_metrics.push(metric.canonical.clone());
        }
    }
    Ok(())
}

fn derive_network_throughput(
    df: &mut DataFrame,
    schema: &ColumnSchema,
    reporter: &dyn Reporter,
    report: &mut TransformReport,
) -> Result<(), TransformError> {
    if has_column(df, &schema.network_in) && has_column(df, &schema.network_out) {
        let inbound = numeric(df, &schema.network_in)?;
        let outbound = numeric(df, &schema.network_out)?;
        let throughput: Vec<Option<f64>> = inbound
            .iter()
            .zip(&outbound)
            .map(|(i, o)| match (i, o) {
                (Some(i), Some(o)) => Some((i + o) / 2.0),
                _ => None,
            })
            .collect();
        df.with_column(Series::new(schema.throughput.as_str().into(), throughput))?;
        reporter.info(
            Stage::Transform,
            "Calculated Network Throughput (average of In/Out).",
        );
        report.throughput_computed = true;
    } else {
        df.with_column(zero_column(&schema.throughput, df.height()))?;
        reporter.warn(
            Stage::Transform,
            "Network columns missing; throughput set to 0.",
        );
        report.throughput_computed = false;
    }
    Ok(())
}

fn numeric(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, TransformError> {
    float_values(df, name).map_err(|source| TransformError::NonNumeric {
        column: name.to_string(),
        source,
    })
}

/// Left join on `key`: every performance row is kept, metadata cells are null where no
/// metadata row matches, and a performance row is repeated once per matching metadata row.
/// Keys are compared by their text rendering so integer and string identifiers line up.
/// Non-key columns present on both sides get `_x` / `_y` suffixes.
pub fn left_join(
    performance: &DataFrame,
    metadata: &DataFrame,
    key: &str,
) -> PolarsResult<(DataFrame, MergeStatus)> {
    let left_keys = performance.column(key)?.cast(&DataType::String)?;
    let left_keys = left_keys.str()?;
    let right_keys = metadata.column(key)?.cast(&DataType::String)?;
    let right_keys = right_keys.str()?;

    let mut lookup: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, value) in right_keys.into_iter().enumerate() {
        if let Some(value) = value {
            lookup.entry(value).or_default().push(idx);
        }
    }

    let mut left_rows: Vec<IdxSize> = Vec::with_capacity(performance.height());
    let mut right_rows: Vec<Option<usize>> = Vec::with_capacity(performance.height());
    let mut matched_rows = 0usize;
    let mut unmatched_rows = 0usize;

    for (idx, value) in left_keys.into_iter().enumerate() {
        match value.and_then(|value| lookup.get(value)) {
            Some(matches) => {
                matched_rows += 1;
                for right in matches {
                    left_rows.push(idx as IdxSize);
                    right_rows.push(Some(*right));
                }
            }
            None => {
                unmatched_rows += 1;
                left_rows.push(idx as IdxSize);
                right_rows.push(None);
            }
        }
    }

    let mut joined = if left_rows.len() == performance.height() {
        performance.clone()
    } else {
        performance.take(&IdxCa::from_vec("row_index".into(), left_rows))?
    };

    let left_names = column_names(performance);
    let mut metadata_columns = 0usize;
    for column in metadata.get_columns() {
        let name = column.name().as_str();
        if name == key {
            continue;
        }

        let output_name = if left_names.iter().any(|left| left == name) {
            joined.rename(name, format!("{name}_x").into())?;
            format!("{name}_y")
        } else {
            name.to_string()
        };

        let source = column.as_materialized_series();
        let values = right_rows
            .iter()
            .map(|row| match row {
                Some(row) => source.get(*row),
                None => Ok(AnyValue::Null),
            })
            .collect::<PolarsResult<Vec<AnyValue>>>()?;
        let gathered =
            Series::from_any_values_and_dtype(output_name.into(), &values, source.dtype(), false)?;
        joined.with_column(gathered)?;
        metadata_columns += 1;
    }

    Ok((
        joined,
        MergeStatus::Merged {
            matched_rows,
            unmatched_rows,
            metadata_columns,
        },
    ))
}

fn flag_anomalies(
    df: &mut DataFrame,
    schema: &ColumnSchema,
    config: &TransformConfig,
    reporter: &dyn Reporter,
    report: &mut TransformReport,
) -> Result<(), TransformError> {
    let cpu = schema.cpu.canonical.as_str();
    let threshold = config.high_load_threshold;

    let flags: Vec<&str> = if has_column(df, cpu) {
        let values = numeric(df, cpu)?;
        reporter.info(
            Stage::Transform,
            &format!("Added {} based on CPU Utilization > {threshold}%.", schema.anomaly_flag),
        );
        values
            .into_iter()
            .map(|value| classify_load(value, threshold))
            .collect()
    } else {
        reporter.warn(
            Stage::Transform,
            &format!("No {cpu} column; anomaly flag set to '{UNKNOWN}'."),
        );
        vec![UNKNOWN; df.height()]
    };

    report.flags = FlagCounts {
        high_load: flags.iter().filter(|flag| **flag == HIGH_LOAD).count(),
        normal: flags.iter().filter(|flag| **flag == NORMAL).count(),
        unknown: flags.iter().filter(|flag| **flag == UNKNOWN).count(),
    };
    df.with_column(Series::new(schema.anomaly_flag.as_str().into(), flags))?;
    Ok(())
}

/// `High Load` strictly above the threshold; a value equal to it is `Normal`.
pub fn classify_load(cpu: Option<f64>, threshold: f64) -> &'static str {
    match cpu {
        Some(value) if value > threshold => HIGH_LOAD,
        _ => NORMAL,
    }
}
