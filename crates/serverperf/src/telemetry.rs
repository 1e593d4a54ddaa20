use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Installs the global subscriber: stderr plus an append-only log file, both in `format`.
/// `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str, log_file: &Path, format: LogFormat) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level `{level}`"))?,
    };

    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    let file = Mutex::new(file);

    let (console_text, console_json, file_text, file_json) = match format {
        LogFormat::Text => (
            Some(fmt::layer().with_writer(std::io::stderr)),
            None,
            Some(fmt::layer().with_ansi(false).with_writer(file)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
            None,
            Some(fmt::layer().json().with_ansi(false).with_writer(file)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_text)
        .with(console_json)
        .with(file_text)
        .with(file_json)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}
