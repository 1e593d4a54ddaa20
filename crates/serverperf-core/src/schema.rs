use std::collections::HashSet;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("column name for `{field}` is empty")]
    EmptyName { field: &'static str },
    #[error("canonical column name for `{field}` has surrounding whitespace: {name:?}")]
    UntrimmedName { field: &'static str, name: String },
    #[error("input column {0:?} is recognized more than once")]
    DuplicateSource(String),
    #[error("canonical column {0:?} is produced more than once")]
    DuplicateCanonical(String),
}

/// A metric whose recognized input label is replaced by a canonical analytic name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenamedMetric {
    pub source: String,
    pub canonical: String,
}

impl RenamedMetric {
    fn new(source: &str, canonical: &str) -> Self {
        Self {
            source: source.to_string(),
            canonical: canonical.to_string(),
        }
    }
}

/// Declared mapping between the labels found in station sheets and the names the
/// pipeline produces. Every stage looks columns up through this table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnSchema {
    pub server_id: String,
    pub source_timestamp: String,
    pub timestamp: String,
    pub dropped: Vec<String>,
    pub cpu: RenamedMetric,
    pub memory: RenamedMetric,
    pub disk: RenamedMetric,
    pub network_in: String,
    pub network_out: String,
    pub throughput: String,
    pub anomaly_flag: String,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            server_id: "Server_ID".into(),
            source_timestamp: "Log_Timestamp".into(),
            timestamp: "Timestamp".into(),
            dropped: vec![
                "Config_Version".into(),
                "Last_Patch_Date".into(),
                "Deployment_Token".into(),
            ],
            cpu: RenamedMetric::new("CPU_Utilization (%)", "CPU_Utilization"),
            memory: RenamedMetric::new("Memory_Usage (%)", "Memory_Utilization"),
            disk: RenamedMetric::new("Disk_IO (%)", "Disk_IO_Rate"),
            network_in: "Network_Traffic_In (MB/s)".into(),
            network_out: "Network_Traffic_Out (MB/s)".into(),
            throughput: "Network_Throughput_MBps".into(),
            anomaly_flag: "Anomaly_Flag".into(),
        }
    }
}

/// Which recognized columns a sheet actually carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaCoverage {
    pub present: Vec<String>,
    pub missing: Vec<String>,
}

impl ColumnSchema {
    /// The five raw metric labels subject to null filling and negative correction.
    pub fn metric_columns(&self) -> [&str; 5] {
        [
            self.cpu.source.as_str(),
            self.memory.source.as_str(),
            self.disk.source.as_str(),
            self.network_in.as_str(),
            self.network_out.as_str(),
        ]
    }

    /// Metrics renamed by the transformer, paired with a human-readable label.
    pub fn renamed_metrics(&self) -> [(&'static str, &RenamedMetric); 3] {
        [
            ("CPU Utilization", &self.cpu),
            ("Memory Utilization", &self.memory),
            ("Disk I/O Rate", &self.disk),
        ]
    }

    /// Labels a station sheet is expected to expose (dropped columns excluded).
    pub fn expected_station_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.server_id.as_str(), self.source_timestamp.as_str()];
        columns.extend(self.metric_columns());
        columns
    }

    pub fn coverage(&self, df: &DataFrame) -> SchemaCoverage {
        let mut coverage = SchemaCoverage::default();
        for name in self.expected_station_columns() {
            if df.get_column_index(name).is_some() {
                coverage.present.push(name.to_string());
            } else {
                coverage.missing.push(name.to_string());
            }
        }
        coverage
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let sources: Vec<(&'static str, &str)> = vec![
            ("server_id", self.server_id.as_str()),
            ("source_timestamp", self.source_timestamp.as_str()),
            ("cpu.source", self.cpu.source.as_str()),
            ("memory.source", self.memory.source.as_str()),
            ("disk.source", self.disk.source.as_str()),
            ("network_in", self.network_in.as_str()),
            ("network_out", self.network_out.as_str()),
        ];
        let canonical: Vec<(&'static str, &str)> = vec![
            ("server_id", self.server_id.as_str()),
            ("timestamp", self.timestamp.as_str()),
            ("cpu.canonical", self.cpu.canonical.as_str()),
            ("memory.canonical", self.memory.canonical.as_str()),
            ("disk.canonical", self.disk.canonical.as_str()),
            ("network_in", self.network_in.as_str()),
            ("network_out", self.network_out.as_str()),
            ("throughput", self.throughput.as_str()),
            ("anomaly_flag", self.anomaly_flag.as_str()),
        ];

        for &(field, name) in sources.iter().chain(canonical.iter()) {
            if name.trim().is_empty() {
                return Err(SchemaError::EmptyName { field });
            }
        }
        for dropped in &self.dropped {
            if dropped.trim().is_empty() {
                return Err(SchemaError::EmptyName { field: "dropped" });
            }
        }
        for &(field, name) in &canonical {
            if name.trim() != name {
                return Err(SchemaError::UntrimmedName {
                    field,
                    name: name.to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        for name in sources
            .iter()
            .map(|(_, name)| *name)
            .chain(self.dropped.iter().map(String::as_str))
        {
            if !seen.insert(name) {
                return Err(SchemaError::DuplicateSource(name.to_string()));
            }
        }

        let mut seen = HashSet::new();
        for (_, name) in &canonical {
            if !seen.insert(*name) {
                return Err(SchemaError::DuplicateCanonical(name.to_string()));
            }
        }

        Ok(())
    }
}
