use polars::prelude::*;

use serverperf_core::config::TransformConfig;
use serverperf_core::diagnostics::{RecordingReporter, Stage};
use serverperf_core::schema::ColumnSchema;
use serverperf_core::transform::{transform_data, MergeStatus, TransformError};

const CPU: &str = "CPU_Utilization (%)";
const MEMORY: &str = "Memory_Usage (%)";
const DISK: &str = "Disk_IO (%)";
const NET_IN: &str = "Network_Traffic_In (MB/s)";
const NET_OUT: &str = "Network_Traffic_Out (MB/s)";

fn cleaned_frame() -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(CPU.into(), &[85.0f64, 85.0001, 10.0]).into(),
        Series::new(DISK.into(), &[20.0f64, 0.0, 5.0]).into(),
        Series::new(MEMORY.into(), &[40.0f64, 60.0, 30.0]).into(),
        Series::new(NET_IN.into(), &[100.0f64, 80.0, 20.0]).into(),
        Series::new(NET_OUT.into(), &[50.0f64, 40.0, 0.0]).into(),
        Series::new("Server_ID".into(), &["S1", "S2", "S9"]).into(),
    ])
}

fn metadata_frame() -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new("Server_ID".into(), &["S1", "S2"]).into(),
        Series::new("Location".into(), &["DC-East", "DC-West"]).into(),
    ])
}

fn flags(df: &DataFrame) -> PolarsResult<Vec<Option<String>>> {
    Ok(df
        .column("Anomaly_Flag")?
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

fn floats(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    Ok(df.column(name)?.f64()?.into_iter().collect())
}

#[test]
fn derives_columns_merges_and_flags() -> PolarsResult<()> {
    let reporter = RecordingReporter::new();
    let outcome = transform_data(
        cleaned_frame()?,
        &metadata_frame()?,
        &ColumnSchema::default(),
        &TransformConfig::default(),
        &reporter,
    );
    assert!(outcome.is_completed());
    let (table, report, _) = outcome.into_parts();

    assert_eq!(table.height(), 3);
    for name in [
        "CPU_Utilization",
        "Memory_Utilization",
        "Disk_IO_Rate",
        "Network_Throughput_MBps",
        "Location",
        "Anomaly_Flag",
    ] {
        assert!(table.get_column_index(name).is_some(), "missing {name}");
    }
    assert!(table.get_column_index(CPU).is_none());

    assert_eq!(
        floats(&table, "Network_Throughput_MBps")?,
        vec![Some(75.0), Some(60.0), Some(10.0)]
    );
    assert_eq!(
        flags(&table)?,
        vec![
            Some("Normal".to_string()),
            Some("High Load".to_string()),
            Some("Normal".to_string()),
        ]
    );

    let location: Vec<Option<&str>> = table.column("Location")?.str()?.into_iter().collect();
    assert_eq!(location, vec![Some("DC-East"), Some("DC-West"), None]);

    assert_eq!(
        report.merge,
        MergeStatus::Merged {
            matched_rows: 2,
            unmatched_rows: 1,
            metadata_columns: 1,
        }
    );
    assert!(report.throughput_computed);
    assert!(report.substituted_metrics.is_empty());
    assert_eq!(report.flags.high_load, 1);
    assert_eq!(report.flags.normal, 2);
    assert!(reporter.contains(Stage::Transform, "1 rows had no matching metadata."));
    assert!(reporter.contains(Stage::Transform, "Transformation complete: rows = 3 columns = 9"));
    Ok(())
}

#[test]
fn missing_network_column_zeroes_throughput() -> PolarsResult<()> {
    let df = cleaned_frame()?.drop(NET_OUT)?;
    let reporter = RecordingReporter::new();
    let outcome = transform_data(
        df,
        &metadata_frame()?,
        &ColumnSchema::default(),
        &TransformConfig::default(),
        &reporter,
    );

    assert!(outcome.is_completed());
    assert!(!outcome.report().throughput_computed);
    assert_eq!(
        floats(outcome.table(), "Network_Throughput_MBps")?,
        vec![Some(0.0), Some(0.0), Some(0.0)]
    );
    assert!(reporter.contains(Stage::Transform, "Network columns missing; throughput set to 0."));
    Ok(())
}

#[test]
fn missing_metric_source_is_zero_filled() -> PolarsResult<()> {
    let df = cleaned_frame()?.drop(CPU)?.drop(DISK)?;
    let outcome = transform_data(
        df,
        &metadata_frame()?,
        &ColumnSchema::default(),
        &TransformConfig::default(),
        &RecordingReporter::new(),
    );

    let report = outcome.report().clone();
    let table = outcome.into_table();
    assert_eq!(
        report.substituted_metrics,
        vec!["CPU_Utilization".to_string(), "Disk_IO_Rate".to_string()]
    );
    assert_eq!(
        floats(&table, "CPU_Utilization")?,
        vec![Some(0.0), Some(0.0), Some(0.0)]
    );
    assert_eq!(report.flags.normal, 3);
    Ok(())
}

#[test]
fn threshold_comes_from_config() -> PolarsResult<()> {
    let config = TransformConfig {
        high_load_threshold: 50.0,
    };
    let outcome = transform_data(
        cleaned_frame()?,
        &metadata_frame()?,
        &ColumnSchema::default(),
        &config,
        &RecordingReporter::new(),
    );
    assert_eq!(outcome.report().flags.high_load, 2);
    Ok(())
}

#[test]
fn metadata_without_server_id_skips_merge() -> PolarsResult<()> {
    let metadata = DataFrame::new(vec![
        Series::new("Host".into(), &["S1"]).into(),
        Series::new("Location".into(), &["DC-East"]).into(),
    ])?;
    let reporter = RecordingReporter::new();
    let outcome = transform_data(
        cleaned_frame()?,
        &metadata,
        &ColumnSchema::default(),
        &TransformConfig::default(),
        &reporter,
    );

    assert!(outcome.is_completed());
    assert_eq!(outcome.report().merge, MergeStatus::Skipped);
    let table = outcome.table();
    assert_eq!(table.height(), 3);
    assert!(table.get_column_index("Location").is_none());
    assert!(table.get_column_index("Host").is_none());
    assert!(reporter.contains(Stage::Transform, "skipped merge"));
    Ok(())
}

#[test]
fn duplicate_metadata_keys_repeat_rows() -> PolarsResult<()> {
    let metadata = DataFrame::new(vec![
        Series::new("Server_ID".into(), &["S1", "S1"]).into(),
        Series::new("Location".into(), &["DC-East", "DC-North"]).into(),
    ])?;
    let outcome = transform_data(
        cleaned_frame()?,
        &metadata,
        &ColumnSchema::default(),
        &TransformConfig::default(),
        &RecordingReporter::new(),
    );

    let table = outcome.table();
    assert_eq!(table.height(), 4);
    let ids: Vec<Option<&str>> = table.column("Server_ID")?.str()?.into_iter().collect();
    assert_eq!(ids, vec![Some("S1"), Some("S1"), Some("S2"), Some("S9")]);
    Ok(())
}

#[test]
fn failure_returns_the_input_table_unchanged() -> PolarsResult<()> {
    let input = DataFrame::new(vec![
        Series::new(CPU.into(), &[12.0f64]).into(),
        Series::new(NET_IN.into(), &["fast"]).into(),
        Series::new(NET_OUT.into(), &[3.0f64]).into(),
        Series::new("Server_ID".into(), &["S1"]).into(),
    ])?;
    let reporter = RecordingReporter::new();
    let outcome = transform_data(
        input.clone(),
        &metadata_frame()?,
        &ColumnSchema::default(),
        &TransformConfig::default(),
        &reporter,
    );

    assert!(!outcome.is_completed());
    assert!(matches!(
        outcome.error(),
        Some(TransformError::NonNumeric { column, .. }) if column == NET_IN
    ));
    assert!(outcome.table().equals_missing(&input));
    assert!(reporter.contains(Stage::Transform, "Error transforming data."));
    Ok(())
}

#[test]
fn metadata_cpu_column_leaves_flags_unknown() -> PolarsResult<()> {
    let metadata = DataFrame::new(vec![
        Series::new("Server_ID".into(), &["S1"]).into(),
        Series::new("CPU_Utilization".into(), &[1.0f64]).into(),
    ])?;
    let reporter = RecordingReporter::new();
    let outcome = transform_data(
        cleaned_frame()?,
        &metadata,
        &ColumnSchema::default(),
        &TransformConfig::default(),
        &reporter,
    );

    assert!(outcome.is_completed());
    let (table, report, _) = outcome.into_parts();
    assert!(table.get_column_index("CPU_Utilization").is_none());
    assert!(table.get_column_index("CPU_Utilization_x").is_some());
    assert!(table.get_column_index("CPU_Utilization_y").is_some());

    assert_eq!(flags(&table)?, vec![Some("Unknown".to_string()); table.height()]);
    assert_eq!(report.flags.unknown, table.height());
    assert_eq!(report.flags.high_load + report.flags.normal, 0);
    assert!(reporter.contains(Stage::Transform, "anomaly flag set to 'Unknown'"));
    Ok(())
}
