//! Projection of a prepared table onto the model's feature contract.
//!
//! The nine feature columns are fixed and ordered; every artifact stores this
//! order and the prediction service expects vectors in it.

use crate::prepare::columns::*;
use crate::prepare::table::ClinicalTable;
use log::{info, warn};
use ndarray::{Array1, Array2, Axis};
use thiserror::Error;

/// The model inputs, in the order the classifier consumes them.
pub const FEATURE_COLUMNS: [&str; 9] = [
    RELAPSE_FREE_MONTHS,
    AGE_AT_DIAGNOSIS,
    TUMOR_SIZE,
    MUTATION_COUNT,
    AGGRESSIVE_TREATMENT_SCORE,
    NOTTINGHAM_INDEX,
    LYMPH_NODES_POSITIVE,
    SURGERY_TYPE,
    TUMOR_STAGE,
];

pub const LABEL_COLUMN: &str = OVERALL_SURVIVAL_STATUS;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Required column '{0}' is not present in the dataset.")]
    ColumnNotFound(String),
    #[error("Feature column '{column}' contains the non-numeric value '{value}'.")]
    NonNumericColumn { column: String, value: String },
    #[error("Row {row} has the label {value}, but labels must be 0 or 1.")]
    InvalidLabel { row: usize, value: f64 },
    #[error("No row has every feature and the label present.")]
    NoUsableRows,
}

/// Rows kept and dropped by [`select_features`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
    pub rows_in: usize,
    pub rows_kept: usize,
    pub missing_feature_rows: usize,
    pub missing_label_rows: usize,
}

/// A numeric feature matrix with one binary label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledData {
    pub features: Array2<f64>,
    pub labels: Array1<u8>,
}

impl LabeledData {
    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// The given rows, in the given order.
    pub fn take(&self, indices: &[usize]) -> LabeledData {
        LabeledData {
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        }
    }

    /// Number of rows per label, `[deceased, living]`.
    pub fn class_counts(&self) -> [usize; 2] {
        let living = self.labels.iter().filter(|&&l| l == 1).count();
        [self.n_rows() - living, living]
    }
}

/// Keeps only the feature columns and the label, in contract order.
pub fn project(table: &mut ClinicalTable) -> Result<(), SchemaError> {
    let mut required: Vec<&str> = FEATURE_COLUMNS.to_vec();
    required.push(LABEL_COLUMN);
    table
        .retain_ordered(&required)
        .map_err(SchemaError::ColumnNotFound)
}

fn numeric_column(table: &ClinicalTable, name: &str) -> Result<Vec<Option<f64>>, SchemaError> {
    let column = table
        .column(name)
        .ok_or_else(|| SchemaError::ColumnNotFound(name.to_string()))?;
    column.to_numeric().map_err(|value| SchemaError::NonNumericColumn {
        column: name.to_string(),
        value,
    })
}

/// Builds the feature matrix and label vector, excluding rows where a feature
/// or the label is missing. The table is read, not modified.
pub fn to_labeled_data(table: &ClinicalTable) -> Result<(LabeledData, SelectionReport), SchemaError> {
    let features = FEATURE_COLUMNS
        .iter()
        .map(|name| numeric_column(table, name))
        .collect::<Result<Vec<_>, _>>()?;
    let labels = numeric_column(table, LABEL_COLUMN)?;

    let mut report = SelectionReport {
        rows_in: table.height(),
        ..Default::default()
    };
    let mut values = Vec::with_capacity(table.height() * FEATURE_COLUMNS.len());
    let mut kept_labels = Vec::with_capacity(table.height());

    for row in 0..table.height() {
        if features.iter().any(|column| column[row].is_none()) {
            report.missing_feature_rows += 1;
            continue;
        }
        let label = match labels[row] {
            None => {
                report.missing_label_rows += 1;
                continue;
            }
            Some(value) if value == 0.0 => 0u8,
            Some(value) if value == 1.0 => 1u8,
            Some(value) => return Err(SchemaError::InvalidLabel { row, value }),
        };
        values.extend(features.iter().filter_map(|column| column[row]));
        kept_labels.push(label);
    }

    report.rows_kept = kept_labels.len();
    if report.rows_kept == 0 {
        return Err(SchemaError::NoUsableRows);
    }

    let features = Array2::from_shape_vec((report.rows_kept, FEATURE_COLUMNS.len()), values)
        .map_err(|_| SchemaError::NoUsableRows)?;
    Ok((
        LabeledData {
            features,
            labels: Array1::from(kept_labels),
        },
        report,
    ))
}

/// Projects `table` onto the feature contract and converts it to labeled data.
pub fn select_features(table: &mut ClinicalTable) -> Result<(LabeledData, SelectionReport), SchemaError> {
    project(table)?;
    let (data, report) = to_labeled_data(table)?;

    let dropped = report.rows_in - report.rows_kept;
    if dropped > 0 {
        warn!(
            "Excluded {dropped} of {} row(s): {} with a missing feature, {} with a missing label",
            report.rows_in, report.missing_feature_rows, report.missing_label_rows
        );
    }
    let [deceased, living] = data.class_counts();
    info!(
        "Selected {} row(s) x {} feature(s) ({living} living, {deceased} deceased)",
        data.n_rows(),
        data.n_features()
    );
    Ok((data, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::table::{Column, ColumnData};

    fn complete_table(rows: &[[Option<f64>; 10]]) -> ClinicalTable {
        let mut columns: Vec<Column> = FEATURE_COLUMNS
            .iter()
            .chain(std::iter::once(&LABEL_COLUMN))
            .enumerate()
            .map(|(j, name)| Column {
                name: name.to_string(),
                data: ColumnData::Numeric(rows.iter().map(|r| r[j]).collect()),
            })
            .collect();
        columns.insert(
            3,
            Column {
                name: CELLULARITY.to_string(),
                data: ColumnData::Text(vec![Some("High".to_string()); rows.len()]),
            },
        );
        ClinicalTable::from_columns(columns).unwrap()
    }

    fn row(seed: f64, label: Option<f64>) -> [Option<f64>; 10] {
        let mut values = [Some(seed); 10];
        values[9] = label;
        values
    }

    #[test]
    fn projects_in_contract_order_and_drops_incomplete_rows() {
        let mut incomplete = row(3.0, Some(1.0));
        incomplete[2] = None;
        let mut table = complete_table(&[
            row(1.0, Some(0.0)),
            incomplete,
            row(2.0, None),
            row(4.0, Some(1.0)),
        ]);

        let (data, report) = select_features(&mut table).unwrap();

        let mut expected: Vec<&str> = FEATURE_COLUMNS.to_vec();
        expected.push(LABEL_COLUMN);
        assert_eq!(table.column_names(), expected);
        assert_eq!(
            report,
            SelectionReport {
                rows_in: 4,
                rows_kept: 2,
                missing_feature_rows: 1,
                missing_label_rows: 1,
            }
        );
        assert_eq!(data.features.dim(), (2, 9));
        assert_eq!(data.features[[0, 0]], 1.0);
        assert_eq!(data.features[[1, 8]], 4.0);
        assert_eq!(data.labels.to_vec(), vec![0, 1]);
        assert_eq!(data.class_counts(), [1, 1]);
    }

    #[test]
    fn absent_column_is_a_schema_error() {
        let mut table = complete_table(&[row(1.0, Some(1.0))]);
        table.drop_column(TUMOR_STAGE);
        let err = select_features(&mut table).unwrap_err();
        assert_eq!(err, SchemaError::ColumnNotFound(TUMOR_STAGE.to_string()));
    }

    #[test]
    fn text_feature_and_bad_labels_are_rejected() {
        let mut table = complete_table(&[row(1.0, Some(1.0))]);
        table
            .set_column(TUMOR_SIZE, ColumnData::Text(vec![Some("large".to_string())]))
            .unwrap();
        match to_labeled_data(&table) {
            Err(SchemaError::NonNumericColumn { column, value }) => {
                assert_eq!(column, TUMOR_SIZE);
                assert_eq!(value, "large");
            }
            other => panic!("Expected NonNumericColumn, got {other:?}"),
        }

        let table = complete_table(&[row(1.0, Some(2.0))]);
        assert_eq!(
            to_labeled_data(&table).unwrap_err(),
            SchemaError::InvalidLabel { row: 0, value: 2.0 }
        );

        let table = complete_table(&[row(1.0, None)]);
        assert_eq!(to_labeled_data(&table).unwrap_err(), SchemaError::NoUsableRows);
    }

    #[test]
    fn take_selects_rows_in_order() {
        let table = complete_table(&[row(1.0, Some(0.0)), row(2.0, Some(1.0)), row(3.0, Some(1.0))]);
        let (data, _) = to_labeled_data(&table).unwrap();
        let taken = data.take(&[2, 0]);
        assert_eq!(taken.features.column(0).to_vec(), vec![3.0, 1.0]);
        assert_eq!(taken.labels.to_vec(), vec![1, 0]);
    }
}
