use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Clean,
    Combine,
    Transform,
    Output,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Clean => "clean",
            Stage::Combine => "combine",
            Stage::Transform => "transform",
            Stage::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
}

/// Sink for the progress and anomaly lines every stage emits. Stages receive a
/// reporter explicitly instead of writing to process-wide logging state.
pub trait Reporter: Send + Sync {
    fn report(&self, stage: Stage, severity: Severity, message: &str);

    fn info(&self, stage: Stage, message: &str) {
        self.report(stage, Severity::Info, message);
    }

    fn warn(&self, stage: Stage, message: &str) {
        self.report(stage, Severity::Warning, message);
    }

    fn error(&self, stage: Stage, message: &str) {
        self.report(stage, Severity::Error, message);
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, stage: Stage, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!(stage = stage.as_str(), "{message}"),
            Severity::Warning => tracing::warn!(stage = stage.as_str(), "{message}"),
            Severity::Error => tracing::error!(stage = stage.as_str(), "{message}"),
        }
    }
}

/// Keeps every diagnostic in memory and also forwards it to `tracing`.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    entries: Mutex<Vec<Diagnostic>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|entry| entry.severity == severity)
            .count()
    }

    pub fn messages(&self, stage: Stage) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|entry| entry.stage == stage)
            .map(|entry| entry.message.clone())
            .collect()
    }

    pub fn contains(&self, stage: Stage, needle: &str) -> bool {
        self.messages(stage)
            .iter()
            .any(|message| message.contains(needle))
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, stage: Stage, severity: Severity, message: &str) {
        TracingReporter.report(stage, severity, message);
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Diagnostic {
                stage,
                severity,
                message: message.to_string(),
            });
    }
}
