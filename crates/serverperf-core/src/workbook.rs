use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use thiserror::Error;
use ::zip::ZipArchive;

/// Cell texts read as missing values, in addition to empty cells.
const NULL_MARKERS: [&str; 7] = ["NaN", "nan", "NA", "N/A", "null", "NULL", "None"];

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("workbook {0} does not exist")]
    NotFound(PathBuf),
    #[error("workbook {0} is neither a sheet directory nor a .zip archive")]
    UnsupportedFormat(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("zip archive error: {0}")]
    Zip(#[from] ::zip::result::ZipError),
    #[error("sheet {sheet} not found (available: {})", available.join(", "))]
    SheetNotFound {
        sheet: String,
        available: Vec<String>,
    },
    #[error("sheet {sheet} is not valid CSV: {source}")]
    Csv {
        sheet: String,
        #[source]
        source: csv::Error,
    },
    #[error("sheet {sheet} has no header row")]
    MissingHeader { sheet: String },
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// A named-sheet container the loader reads tables from.
pub trait SheetSource {
    fn describe(&self) -> String;
    fn sheet_names(&mut self) -> Result<Vec<String>, WorkbookError>;
    fn read_sheet(&mut self, sheet: &str) -> Result<DataFrame, WorkbookError>;
}

/// Opens a workbook: a directory of `<sheet>.csv` files or a `.zip` archive holding them.
pub fn open_workbook(path: &Path) -> Result<Box<dyn SheetSource>, WorkbookError> {
    if !path.exists() {
        return Err(WorkbookError::NotFound(path.to_path_buf()));
    }
    if path.is_dir() {
        return Ok(Box::new(DirectoryWorkbook::new(path)));
    }
    let is_zip = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if is_zip {
        return Ok(Box::new(ZipWorkbook::open(path)?));
    }
    Err(WorkbookError::UnsupportedFormat(path.to_path_buf()))
}

#[derive(Debug, Clone)]
pub struct DirectoryWorkbook {
    root: PathBuf,
}

impl DirectoryWorkbook {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SheetSource for DirectoryWorkbook {
    fn describe(&self) -> String {
        format!("sheet directory {}", self.root.display())
    }

    fn sheet_names(&mut self) -> Result<Vec<String>, WorkbookError> {
        let entries = fs::read_dir(&self.root).map_err(|source| WorkbookError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| WorkbookError::Io {
                path: self.root.clone(),
                source,
            })?;
            if let Some(name) = sheet_name_from_file(&entry.file_name().to_string_lossy()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_sheet(&mut self, sheet: &str) -> Result<DataFrame, WorkbookError> {
        let path = self.root.join(format!("{sheet}.csv"));
        if !path.is_file() {
            return Err(WorkbookError::SheetNotFound {
                sheet: sheet.to_string(),
                available: self.sheet_names()?,
            });
        }
        let bytes = fs::read(&path).map_err(|source| WorkbookError::Io { path, source })?;
        parse_sheet(sheet, &bytes)
    }
}

pub struct ZipWorkbook {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl ZipWorkbook {
    pub fn open(path: &Path) -> Result<Self, WorkbookError> {
        let file = File::open(path).map_err(|source| WorkbookError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let archive = ZipArchive::new(file)?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    fn entries(&self) -> Vec<(String, String)> {
        self.archive
            .file_names()
            .filter(|name| !name.ends_with('/') && !name.starts_with("__MACOSX"))
            .filter_map(|name| {
                let file_name = name.rsplit('/').next().unwrap_or(name);
                sheet_name_from_file(file_name).map(|sheet| (sheet.to_string(), name.to_string()))
            })
            .collect()
    }
}

impl SheetSource for ZipWorkbook {
    fn describe(&self) -> String {
        format!("zip workbook {}", self.path.display())
    }

    fn sheet_names(&mut self) -> Result<Vec<String>, WorkbookError> {
        let mut names: Vec<String> = self.entries().into_iter().map(|(sheet, _)| sheet).collect();
        names.sort();
        Ok(names)
    }

    fn read_sheet(&mut self, sheet: &str) -> Result<DataFrame, WorkbookError> {
        let Some((_, entry_name)) = self.entries().into_iter().find(|(name, _)| name == sheet)
        else {
            return Err(WorkbookError::SheetNotFound {
                sheet: sheet.to_string(),
                available: self.sheet_names()?,
            });
        };

        let mut entry = self.archive.by_name(&entry_name)?;
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|source| WorkbookError::Io {
                path: self.path.join(&entry_name),
                source,
            })?;
        parse_sheet(sheet, &bytes)
    }
}

fn sheet_name_from_file(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if ext.eq_ignore_ascii_case("csv") && !stem.is_empty() {
        Some(stem)
    } else {
        None
    }
}

/// Parses one CSV sheet into a DataFrame, inferring a dtype per column from its non-empty cells.
pub fn parse_sheet(sheet: &str, bytes: &[u8]) -> Result<DataFrame, WorkbookError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let csv_error = |source: csv::Error| WorkbookError::Csv {
        sheet: sheet.to_string(),
        source,
    };

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() || headers.iter().all(|header| header.is_empty()) {
        return Err(WorkbookError::MissingHeader {
            sheet: sheet.to_string(),
        });
    }

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        for (column, value) in cells.iter_mut().zip(record.iter()) {
            column.push(normalize_cell(value));
        }
    }

    let columns = headers
        .iter()
        .zip(cells)
        .map(|(name, values)| infer_column(name, values))
        .collect::<Vec<_>>();

    Ok(DataFrame::new(columns)?)
}

/// Null markers are matched on the trimmed cell; any other text is kept verbatim.
fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NULL_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(raw.to_string())
    }
}

fn infer_column(name: &str, values: Vec<Option<String>>) -> Column {
    let present = || values.iter().flatten();
    let has_values = present().next().is_some();

    if has_values && present().all(|v| v.trim().parse::<i64>().is_ok()) {
        let parsed: Vec<Option<i64>> = values
            .iter()
            .map(|v| v.as_deref().and_then(|v| v.trim().parse().ok()))
            .collect();
        return Series::new(name.into(), parsed).into();
    }

    if has_values && present().all(|v| v.trim().parse::<f64>().is_ok()) {
        let parsed: Vec<Option<f64>> = values
            .iter()
            .map(|v| v.as_deref().and_then(|v| v.trim().parse().ok()))
            .collect();
        return Series::new(name.into(), parsed).into();
    }

    if has_values && present().all(|v| parse_bool(v.trim()).is_some()) {
        let parsed: Vec<Option<bool>> = values
            .iter()
            .map(|v| v.as_deref().and_then(|v| parse_bool(v.trim())))
            .collect();
        return Series::new(name.into(), parsed).into();
    }

    Series::new(name.into(), values).into()
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
