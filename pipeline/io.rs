//! CSV writers for every file the pipeline produces. Parent directories are
//! created as needed and existing files are overwritten.

use crate::learn::metrics::EvaluationReport;
use crate::prepare::missing::MissingShare;
use crate::prepare::select::{FEATURE_COLUMNS, LABEL_COLUMN, LabeledData};
use crate::prepare::table::{ClinicalTable, format_number};
use csv::{Writer, WriterBuilder};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to create '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write CSV to '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

struct CsvFile {
    path: PathBuf,
    writer: Writer<BufWriter<File>>,
}

impl CsvFile {
    fn create(path: &Path) -> Result<Self, OutputError> {
        let io_error = |source: std::io::Error| OutputError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let file = File::create(path).map_err(io_error)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: WriterBuilder::new().from_writer(BufWriter::new(file)),
        })
    }

    fn record<I, T>(&mut self, fields: I) -> Result<(), OutputError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(fields)
            .map_err(|source| OutputError::Csv {
                path: self.path.clone(),
                source,
            })
    }

    fn finish(mut self) -> Result<(), OutputError> {
        self.writer.flush().map_err(|source| OutputError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Writes a table with its header. Missing cells are empty fields.
pub fn write_table(table: &ClinicalTable, path: &Path) -> Result<(), OutputError> {
    let mut out = CsvFile::create(path)?;
    out.record(table.column_names())?;
    for row in 0..table.height() {
        out.record(
            table
                .columns()
                .iter()
                .map(|c| c.data.cell_text(row).unwrap_or_default()),
        )?;
    }
    out.finish()
}

pub fn write_features(data: &LabeledData, path: &Path) -> Result<(), OutputError> {
    let mut out = CsvFile::create(path)?;
    out.record(FEATURE_COLUMNS)?;
    for row in data.features.rows() {
        out.record(row.iter().map(|&v| format_number(v)))?;
    }
    out.finish()
}

pub fn write_labels(data: &LabeledData, path: &Path) -> Result<(), OutputError> {
    let mut out = CsvFile::create(path)?;
    out.record([LABEL_COLUMN])?;
    for label in &data.labels {
        out.record([label.to_string()])?;
    }
    out.finish()
}

/// `Metric,Value` rows for accuracy, F1 and ROC-AUC.
pub fn write_metrics(report: &EvaluationReport, path: &Path) -> Result<(), OutputError> {
    let mut out = CsvFile::create(path)?;
    out.record(["Metric", "Value"])?;
    for (name, value) in report.summary() {
        out.record([name.to_string(), format_number(value)])?;
    }
    out.finish()
}

pub fn write_classification_report(report: &EvaluationReport, path: &Path) -> Result<(), OutputError> {
    let mut out = CsvFile::create(path)?;
    out.record(["label", "precision", "recall", "f1-score", "support"])?;
    for row in report.report.rows() {
        out.record([
            row.label,
            format_number(row.precision),
            format_number(row.recall),
            format_number(row.f1),
            row.support.to_string(),
        ])?;
    }
    out.finish()
}

pub fn write_missing_summary(shares: &[MissingShare], path: &Path) -> Result<(), OutputError> {
    let mut out = CsvFile::create(path)?;
    out.record(["column", "missing_percent"])?;
    for share in shares {
        out.record([share.column.clone(), format_number(share.percent)])?;
    }
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::table::{Column, ColumnData};
    use ndarray::{Array1, array};
    use tempfile::tempdir;

    #[test]
    fn tables_round_trip_through_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("processed_a.csv");
        let table = ClinicalTable::from_columns(vec![
            Column {
                name: "Tumor Size".to_string(),
                data: ColumnData::Numeric(vec![Some(22.0), None]),
            },
            Column {
                name: "Cellularity".to_string(),
                data: ColumnData::Text(vec![Some("High, focal".to_string()), Some("Low".to_string())]),
            },
        ])
        .unwrap();

        write_table(&table, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Tumor Size,Cellularity\n22,\"High, focal\"\n,Low\n");
    }

    #[test]
    fn features_and_labels_carry_contract_headers() {
        let dir = tempdir().unwrap();
        let data = LabeledData {
            features: array![[1.5, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 1.0, 2.0]],
            labels: Array1::from(vec![1u8]),
        };
        write_features(&data, &dir.path().join("f.csv")).unwrap();
        write_labels(&data, &dir.path().join("l.csv")).unwrap();

        let features = fs::read_to_string(dir.path().join("f.csv")).unwrap();
        let mut lines = features.lines();
        assert_eq!(lines.next().unwrap(), FEATURE_COLUMNS.join(","));
        assert_eq!(lines.next().unwrap(), "1.5,2,3,4,5,6,7,1,2");

        let labels = fs::read_to_string(dir.path().join("l.csv")).unwrap();
        assert_eq!(labels, format!("{LABEL_COLUMN}\n1\n"));
    }

    #[test]
    fn missing_summary_lists_shares() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing_values.csv");
        let shares = vec![MissingShare {
            column: "Tumor Stage".to_string(),
            percent: 25.0,
        }];
        write_missing_summary(&shares, &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "column,missing_percent\nTumor Stage,25\n"
        );
    }
}
