use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use polars::prelude::*;

use serverperf_core::combine::StationTable;
use serverperf_core::diagnostics::{RecordingReporter, Severity, Stage};
use serverperf_core::ingestion::SourceTables;
use serverperf_core::pipeline::StageStatus;
use serverperf_core::transform::MergeStatus;
use serverperf_core::{process_tables, run_pipeline, PipelineConfig, PipelineError};

fn fixture_workbook() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/workbook")
}

fn config_writing_to(path: PathBuf) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.output.path = path;
    config
}

#[test]
fn fixture_workbook_runs_end_to_end() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("output/final_output.csv");
    let config = config_writing_to(output.clone());

    let reporter = RecordingReporter::new();
    let run = run_pipeline(&fixture_workbook(), &config, &reporter)?;
    let summary = &run.summary;

    assert!(summary.is_clean_run());
    assert_eq!(summary.stations.len(), 2);
    assert_eq!(summary.stations[0].cleaning.duplicates, 1);
    assert_eq!(summary.stations[0].cleaning.negative_metrics, 1);
    assert_eq!(summary.stations[1].cleaning.negative_metrics, 1);
    assert_eq!(summary.combined_rows, 5);
    assert_eq!(
        summary.transform.merge,
        MergeStatus::Merged {
            matched_rows: 4,
            unmatched_rows: 1,
            metadata_columns: 2,
        }
    );
    assert_eq!(summary.transform.flags.high_load, 2);
    assert_eq!(summary.transform.flags.normal, 3);
    assert_eq!((summary.rows, summary.columns), (5, 11));

    let table = &run.table;
    assert_eq!(
        table.get_column_names(),
        vec![
            "CPU_Utilization",
            "Disk_IO_Rate",
            "Memory_Utilization",
            "Network_Traffic_In (MB/s)",
            "Network_Traffic_Out (MB/s)",
            "Server_ID",
            "Timestamp",
            "Network_Throughput_MBps",
            "Location",
            "Owner_Team",
            "Anomaly_Flag",
        ]
    );

    let written = fs::read_to_string(&output)?;
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(
        lines[1],
        "10.0,20.0,40.0,100.0,50.0,S1,2024-01-01 10:00:00,75.0,DC-East,Platform,Normal"
    );
    assert_eq!(lines[3], "85.0,10.0,30.0,20.0,10.0,S3,,15.0,,,Normal");
    assert_eq!(
        lines[5],
        "20.0,5.0,5.0,10.0,0.0,S4,2024-01-01 11:05:00,5.0,DC-East,Storage,Normal"
    );

    assert!(reporter.contains(Stage::Output, "Output saved successfully"));
    Ok(())
}

#[test]
fn summary_serializes_stage_statuses() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config_writing_to(dir.path().join("final_output.csv"));
    let run = run_pipeline(&fixture_workbook(), &config, &RecordingReporter::new())?;

    let value = serde_json::to_value(&run.summary)?;
    assert_eq!(value["transform_status"]["status"], "completed");
    assert_eq!(value["stations"][0]["sheet"], "Server_Performance_Station1");
    assert_eq!(value["transform"]["merge"]["status"], "merged");
    assert_eq!(value["output"]["status"]["status"], "completed");
    Ok(())
}

#[test]
fn sink_failure_is_reported_but_not_fatal() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // The output path is an existing directory, so the file cannot be created.
    let config = config_writing_to(dir.path().to_path_buf());

    let reporter = RecordingReporter::new();
    let run = run_pipeline(&fixture_workbook(), &config, &reporter)?;

    let output = run.summary.output.as_ref().expect("output summary");
    assert!(matches!(output.status, StageStatus::Failed { .. }));
    assert!(!run.summary.is_clean_run());
    assert_eq!(run.table.height(), 5);
    assert!(reporter.contains(Stage::Output, "Error saving output"));
    Ok(())
}

#[test]
fn missing_sheet_aborts_the_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = config_writing_to(dir.path().join("final_output.csv"));
    config.workbook.station_sheets.push("Server_Performance_Station3".into());

    let result = run_pipeline(&fixture_workbook(), &config, &RecordingReporter::new());
    assert!(matches!(result, Err(PipelineError::Load(_))));
    assert!(!dir.path().join("final_output.csv").exists());
    Ok(())
}

#[test]
fn failed_station_still_flows_downstream() -> Result<()> {
    let metadata = DataFrame::new(vec![
        Series::new("Server_ID".into(), &["S1"]).into(),
        Series::new("Location".into(), &["DC-East"]).into(),
    ])?;
    let good = DataFrame::new(vec![
        Series::new("Server_ID".into(), &["S1"]).into(),
        Series::new("CPU_Utilization (%)".into(), &[40.0f64]).into(),
    ])?;
    let broken = DataFrame::new(vec![
        Series::new("Server_ID".into(), &["S2"]).into(),
        Series::new("Memory_Usage (%)".into(), &["high"]).into(),
    ])?;
    let tables = SourceTables {
        metadata,
        stations: vec![
            StationTable {
                sheet: "Good".into(),
                table: good,
            },
            StationTable {
                sheet: "Broken".into(),
                table: broken,
            },
        ],
    };

    let reporter = RecordingReporter::new();
    let run = process_tables(tables, &PipelineConfig::default(), &reporter)?;

    assert!(run.summary.stations[0].status.is_completed());
    assert!(matches!(
        run.summary.stations[1].status,
        StageStatus::Failed { .. }
    ));
    assert_eq!(run.summary.combined_rows, 2);
    assert!(reporter.count(Severity::Error) >= 2);
    assert!(run.summary.output.is_none());
    Ok(())
}

#[test]
fn station_tagging_adds_source_column() -> Result<()> {
    let metadata = DataFrame::new(vec![Series::new("Server_ID".into(), &["S1"]).into()])?;
    let first = DataFrame::new(vec![
        Series::new("Server_ID".into(), &["S1"]).into(),
        Series::new("CPU_Utilization (%)".into(), &[90.0f64]).into(),
    ])?;
    let second = first.clone();
    let tables = SourceTables {
        metadata,
        stations: vec![
            StationTable {
                sheet: "North".into(),
                table: first,
            },
            StationTable {
                sheet: "South".into(),
                table: second,
            },
        ],
    };

    let mut config = PipelineConfig::default();
    config.output.tag_station_column = true;
    let run = process_tables(tables, &config, &RecordingReporter::new())?;

    let stations: Vec<Option<&str>> = run.table.column("Station")?.str()?.into_iter().collect();
    assert_eq!(stations, vec![Some("North"), Some("South")]);
    assert_eq!(run.summary.transform.flags.high_load, 2);
    Ok(())
}
