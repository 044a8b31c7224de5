//! # Dataset Loading
//!
//! The exclusive entry point for raw and processed patient files. Every `.csv`
//! file in a directory is parsed with the `polars` CSV reader and converted
//! into a [`ClinicalTable`]: numeric dtypes become numeric columns, everything
//! else becomes text. Empty fields and `NaN` are missing cells.
//!
//! Files are visited in natural filename order so that concatenation is
//! reproducible from run to run.

use crate::prepare::table::{ClinicalTable, Column, ColumnData, TableError};
use log::{debug, info, warn};
use natord::compare;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A comprehensive error type for failures to reach or parse input data.
#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("The input directory '{0}' does not exist or is not a directory.")]
    MissingDirectory(PathBuf),
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse '{path}' as CSV: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
    #[error("The file '{path}' does not form a valid table: {source}")]
    Table {
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error("No parseable .csv files were found in '{0}'.")]
    NoParseableFiles(PathBuf),
}

/// One parsed input file.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub table: ClinicalTable,
}

impl LoadedFile {
    /// The file name without directories, used to name derived outputs.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data.csv".to_string())
    }
}

/// Lists the `.csv` files directly inside `dir`, in natural filename order.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>, DataAccessError> {
    if !dir.is_dir() {
        return Err(DataAccessError::MissingDirectory(dir.to_path_buf()));
    }
    let entries = fs::read_dir(dir).map_err(|source| DataAccessError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DataAccessError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| {
        compare(
            &a.file_name().unwrap_or_default().to_string_lossy(),
            &b.file_name().unwrap_or_default().to_string_lossy(),
        )
    });
    Ok(files)
}

/// Parses a single CSV file into a table.
pub fn load_file(path: &Path) -> Result<ClinicalTable, DataAccessError> {
    let file = File::open(path).map_err(|source| DataAccessError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let df = CsvReader::new(file)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(None),
        )
        .finish()
        .map_err(|source| DataAccessError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    internal::table_from_frame(&df, path)
}

/// Parses every CSV file in `dir`, one table per file. Files that fail to
/// parse are skipped with a warning; a directory with nothing parseable is an
/// error.
pub fn load_files(dir: &Path) -> Result<Vec<LoadedFile>, DataAccessError> {
    let paths = list_csv_files(dir)?;
    debug!("Found {} candidate file(s) in '{}'", paths.len(), dir.display());

    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        match load_file(&path) {
            Ok(table) => {
                info!(
                    "Loaded '{}' ({} rows, {} columns)",
                    path.display(),
                    table.height(),
                    table.width()
                );
                loaded.push(LoadedFile { path, table });
            }
            Err(err) => warn!("Skipping unreadable file: {err}"),
        }
    }

    if loaded.is_empty() {
        return Err(DataAccessError::NoParseableFiles(dir.to_path_buf()));
    }
    Ok(loaded)
}

/// Reads every CSV file in `dir` and concatenates them into one table,
/// preserving row order within each file.
pub fn load_directory(dir: &Path) -> Result<ClinicalTable, DataAccessError> {
    let files = load_files(dir)?;
    let count = files.len();
    let table = ClinicalTable::vstack(files.into_iter().map(|f| f.table).collect());
    info!(
        "Assembled dataset from {count} file(s): {} rows, {} columns",
        table.height(),
        table.width()
    );
    Ok(table)
}

mod internal {
    use super::*;

    fn is_numeric_dtype(dtype: &DataType) -> bool {
        matches!(
            dtype,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float32
                | DataType::Float64
                | DataType::Boolean
        )
    }

    pub(super) fn table_from_frame(
        df: &DataFrame,
        path: &Path,
    ) -> Result<ClinicalTable, DataAccessError> {
        let parse_error = |source: PolarsError| DataAccessError::Parse {
            path: path.to_path_buf(),
            source,
        };

        let mut columns = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            let name = column.name().to_string();
            let data = if is_numeric_dtype(column.dtype()) {
                let casted = column.cast(&DataType::Float64).map_err(parse_error)?;
                let values = casted.f64().map_err(parse_error)?;
                ColumnData::Numeric(
                    values
                        .into_iter()
                        .map(|cell| cell.filter(|v| !v.is_nan()))
                        .collect(),
                )
            } else {
                let casted = column.cast(&DataType::String).map_err(parse_error)?;
                let values = casted.str().map_err(parse_error)?;
                ColumnData::Text(
                    values
                        .into_iter()
                        .map(|cell| {
                            cell.map(str::trim)
                                .filter(|text| !text.is_empty())
                                .map(str::to_string)
                        })
                        .collect(),
                )
            };
            columns.push(Column { name, data });
        }

        ClinicalTable::from_columns(columns).map_err(|source| DataAccessError::Table {
            path: path.to_path_buf(),
            source,
        })
    }
}
