use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serverperf_core::cleaning::TimestampStatus;
use serverperf_core::diagnostics::Severity;
use serverperf_core::pipeline::{RunSummary, StageStatus};
use serverperf_core::transform::MergeStatus;
use serverperf_core::workbook::open_workbook;
use serverperf_core::{run_pipeline, PipelineConfig, RecordingReporter};
use tracing::info;

mod telemetry;

use telemetry::LogFormat;

#[derive(Parser, Debug)]
#[command(author, version, about = "Server performance workbook pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load, clean, transform and write a workbook
    Run(RunArgs),
    /// Show sheet shapes and recognized column coverage without processing
    Inspect(InspectArgs),
    /// Validate a configuration file
    CheckConfig(CheckConfigArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory of `<sheet>.csv` files or a `.zip` archive of them
    workbook: PathBuf,
    /// Pipeline configuration (TOML); falls back to SERVERPERF_CONFIG, then defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the output file path
    #[arg(long)]
    output: Option<PathBuf>,
    /// Override the log file path
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    /// Print the run summary as JSON instead of a table
    #[arg(long)]
    summary_json: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    workbook: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckConfigArgs {
    file: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Inspect(args) => handle_inspect(args),
        Command::CheckConfig(args) => handle_check_config(args),
    }
}

fn resolve_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os("SERVERPERF_CONFIG").map(PathBuf::from));
    match path {
        Some(path) => PipelineConfig::from_path(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn handle_run(args: RunArgs) -> Result<()> {
    let mut config = resolve_config(args.config.as_deref())?;
    if let Some(output) = args.output {
        config.output.path = output;
    }
    if let Some(log_file) = args.log_file {
        config.logging.file = log_file;
    }

    telemetry::init(&config.logging.level, &config.logging.file, args.log_format)?;
    info!(workbook = %args.workbook.display(), "starting pipeline run");

    let reporter = RecordingReporter::new();
    let run = run_pipeline(&args.workbook, &config, &reporter)
        .with_context(|| format!("pipeline failed for {}", args.workbook.display()))?;

    if args.summary_json {
        println!("{}", serde_json::to_string_pretty(&run.summary)?);
    } else {
        print_summary(&run.summary);
        println!(
            "{} warnings, {} errors reported.",
            reporter.count(Severity::Warning),
            reporter.count(Severity::Error)
        );
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let mut stations = Table::new();
    stations
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Station",
            "Status",
            "Rows in",
            "Rows out",
            "Filled",
            "Bad timestamps",
            "Negative rows",
            "Duplicates",
        ]);
    for station in &summary.stations {
        let report = &station.cleaning;
        let bad_timestamps = match report.timestamp {
            TimestampStatus::Absent => "absent".to_string(),
            TimestampStatus::Parsed { invalid } => invalid.to_string(),
        };
        stations.add_row(vec![
            station.sheet.clone(),
            status_label(&station.status),
            report.input_rows.to_string(),
            report.rows.to_string(),
            report.total_filled().to_string(),
            bad_timestamps,
            report.negative_metrics.to_string(),
            report.duplicates.to_string(),
        ]);
    }
    println!("{stations}");

    let transform = &summary.transform;
    let merge = match &transform.merge {
        MergeStatus::NotAttempted => "not attempted".to_string(),
        MergeStatus::Skipped => "skipped (no Server_ID)".to_string(),
        MergeStatus::Merged {
            matched_rows,
            unmatched_rows,
            metadata_columns,
        } => format!(
            "{matched_rows} matched, {unmatched_rows} unmatched, {metadata_columns} columns added"
        ),
    };
    let output = match &summary.output {
        Some(output) => format!("{} ({})", output.path.display(), status_label(&output.status)),
        None => "not written".to_string(),
    };

    let mut totals = Table::new();
    totals
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Step", "Result"]);
    totals.add_row(vec!["Combined rows".to_string(), summary.combined_rows.to_string()]);
    totals.add_row(vec!["Transform".to_string(), status_label(&summary.transform_status)]);
    totals.add_row(vec![
        "Zero-filled metrics".to_string(),
        if transform.substituted_metrics.is_empty() {
            "none".to_string()
        } else {
            transform.substituted_metrics.join(", ")
        },
    ]);
    totals.add_row(vec!["Metadata merge".to_string(), merge]);
    totals.add_row(vec![
        "Anomaly flags".to_string(),
        format!(
            "{} high load, {} normal, {} unknown",
            transform.flags.high_load, transform.flags.normal, transform.flags.unknown
        ),
    ]);
    totals.add_row(vec![
        "Final shape".to_string(),
        format!("{} rows x {} columns", summary.rows, summary.columns),
    ]);
    totals.add_row(vec!["Output".to_string(), output]);
    println!("{totals}");
}

fn status_label(status: &StageStatus) -> String {
    match status {
        StageStatus::Completed => "completed".to_string(),
        StageStatus::Failed { reason } => format!("failed: {reason}"),
    }
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    let mut source = open_workbook(&args.workbook)
        .with_context(|| format!("failed to open workbook {}", args.workbook.display()))?;

    let available = source.sheet_names()?;
    println!("Workbook: {}", source.describe());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Sheet", "Role", "Rows", "Columns", "Missing recognized columns"]);

    let workbook = &config.workbook;
    let mut wanted = vec![(workbook.metadata_sheet.as_str(), "metadata")];
    wanted.extend(workbook.station_sheets.iter().map(|sheet| (sheet.as_str(), "station")));
    for sheet in &available {
        if !wanted.iter().any(|(name, _)| name == sheet) {
            wanted.push((sheet.as_str(), "unused"));
        }
    }

    for (sheet, role) in wanted {
        if !available.iter().any(|name| name == sheet) {
            table.add_row(vec![
                sheet.to_string(),
                role.to_string(),
                "-".to_string(),
                "-".to_string(),
                "sheet not found".to_string(),
            ]);
            continue;
        }
        let df = source
            .read_sheet(sheet)
            .with_context(|| format!("failed to read sheet {sheet}"))?;
        let missing = match role {
            "station" => config.schema.coverage(&df).missing.join(", "),
            "metadata" if df.get_column_index(&config.schema.server_id).is_none() => {
                config.schema.server_id.clone()
            }
            _ => String::new(),
        };
        table.add_row(vec![
            sheet.to_string(),
            role.to_string(),
            df.height().to_string(),
            df.width().to_string(),
            missing,
        ]);
    }
    println!("{table}");
    Ok(())
}

fn handle_check_config(args: CheckConfigArgs) -> Result<()> {
    let config = PipelineConfig::from_path(&args.file)
        .with_context(|| format!("invalid configuration {}", args.file.display()))?;
    println!("Configuration OK: {}", args.file.display());
    println!("  metadata sheet: {}", config.workbook.metadata_sheet);
    println!("  station sheets: {}", config.workbook.station_sheets.join(", "));
    println!(
        "  high load threshold: {}",
        config.transform.high_load_threshold
    );
    println!("  output: {}", config.output.path.display());
    Ok(())
}
