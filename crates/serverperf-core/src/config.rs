use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{ColumnSchema, SchemaError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid column schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("invalid config value for `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkbookConfig {
    pub metadata_sheet: String,
    pub station_sheets: Vec<String>,
}

impl Default for WorkbookConfig {
    fn default() -> Self {
        Self {
            metadata_sheet: "Server_Metadata".into(),
            station_sheets: vec![
                "Server_Performance_Station1".into(),
                "Server_Performance_Station2".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// CPU utilization strictly above this value is flagged as high load.
    pub high_load_threshold: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            high_load_threshold: 85.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub delimiter: char,
    pub tag_station_column: bool,
    pub station_column: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output/final_output.csv"),
            delimiter: ',',
            tag_station_column: false,
            station_column: "Station".into(),
        }
    }
}

impl OutputConfig {
    /// Field delimiter as a byte. A non-ASCII delimiter that bypassed `validate`
    /// falls back to the default comma instead of being truncated.
    pub fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .unwrap_or(b',')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub file: PathBuf,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("logs/pipeline.log"),
            level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub workbook: WorkbookConfig,
    pub schema: ColumnSchema,
    pub transform: TransformConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schema.validate()?;

        if self.workbook.metadata_sheet.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "workbook.metadata_sheet",
                message: "sheet name is empty".into(),
            });
        }
        if self.workbook.station_sheets.is_empty() {
            return Err(ConfigError::Invalid {
                field: "workbook.station_sheets",
                message: "at least one station sheet is required".into(),
            });
        }
        let mut sheets = HashSet::new();
        sheets.insert(self.workbook.metadata_sheet.as_str());
        for sheet in &self.workbook.station_sheets {
            if sheet.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "workbook.station_sheets",
                    message: "sheet name is empty".into(),
                });
            }
            if !sheets.insert(sheet.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "workbook.station_sheets",
                    message: format!("sheet {sheet:?} is listed more than once"),
                });
            }
        }

        if !self.transform.high_load_threshold.is_finite() {
            return Err(ConfigError::Invalid {
                field: "transform.high_load_threshold",
                message: format!("{} is not a finite number", self.transform.high_load_threshold),
            });
        }

        let delimiter = self.output.delimiter;
        if !delimiter.is_ascii() || delimiter == '"' || delimiter == '\n' || delimiter == '\r' {
            return Err(ConfigError::Invalid {
                field: "output.delimiter",
                message: format!("{delimiter:?} cannot be used as a field delimiter"),
            });
        }
        if self.output.tag_station_column && self.output.station_column.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "output.station_column",
                message: "column name is empty".into(),
            });
        }

        Ok(())
    }
}
