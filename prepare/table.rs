//! # Clinical Table
//!
//! A small column store for the patient records between loading and feature
//! selection. Each column is either numeric or text, and any cell may be
//! missing. Tables from several files are stacked with [`ClinicalTable::vstack`]
//! and sliced back apart with [`ClinicalTable::take_rows`].

use std::collections::HashSet;
use thiserror::Error;

/// The values of one column. A `None` cell is a missing observation.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnData::Numeric(_))
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.iter().filter(|v| v.is_none()).count(),
            ColumnData::Text(values) => values.iter().filter(|v| v.is_none()).count(),
        }
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(values) => values[row].is_none(),
            ColumnData::Text(values) => values[row].is_none(),
        }
    }

    /// The cell rendered as text, the form used for grouping keys and CSV output.
    pub fn cell_text(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Numeric(values) => values[row].map(format_number),
            ColumnData::Text(values) => values[row].clone(),
        }
    }

    /// Converts a numeric column into text, leaving text columns untouched.
    pub fn into_text(self) -> ColumnData {
        ColumnData::Text(self.into_text_values())
    }

    fn into_text_values(self) -> Vec<Option<String>> {
        match self {
            ColumnData::Numeric(values) => values.into_iter().map(|v| v.map(format_number)).collect(),
            ColumnData::Text(values) => values,
        }
    }

    /// Reads the column as numbers. Text cells are parsed after trimming; the
    /// first cell that is not a number is returned as the error.
    pub fn to_numeric(&self) -> Result<Vec<Option<f64>>, String> {
        match self {
            ColumnData::Numeric(values) => Ok(values.clone()),
            ColumnData::Text(values) => values
                .iter()
                .map(|cell| match cell {
                    None => Ok(None),
                    Some(text) => text
                        .trim()
                        .parse::<f64>()
                        .map(Some)
                        .map_err(|_| text.clone()),
                })
                .collect(),
        }
    }

    fn missing_like(&self, len: usize) -> ColumnData {
        match self {
            ColumnData::Numeric(_) => ColumnData::Numeric(vec![None; len]),
            ColumnData::Text(_) => ColumnData::Text(vec![None; len]),
        }
    }

    fn take(&self, indices: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(values) => {
                ColumnData::Numeric(indices.iter().map(|&i| values[i]).collect())
            }
            ColumnData::Text(values) => {
                ColumnData::Text(indices.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }

    fn append(self, other: ColumnData) -> ColumnData {
        match (self, other) {
            (ColumnData::Numeric(mut left), ColumnData::Numeric(right)) => {
                left.extend(right);
                ColumnData::Numeric(left)
            }
            (left, right) => {
                let mut values = left.into_text_values();
                values.extend(right.into_text_values());
                ColumnData::Text(values)
            }
        }
    }
}

/// Formats a number the way it is written back to CSV: integral values
/// without a trailing `.0`.
pub fn format_number(value: f64) -> String {
    format!("{value}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("Column '{name}' has {found} rows, but the table has {expected}.")]
    LengthMismatch {
        name: String,
        found: usize,
        expected: usize,
    },
    #[error("Column '{0}' appears more than once in the table.")]
    DuplicateColumn(String),
}

/// An ordered, column-oriented table of patient records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicalTable {
    columns: Vec<Column>,
    height: usize,
}

impl ClinicalTable {
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        let height = columns.first().map_or(0, |c| c.data.len());
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            if column.data.len() != height {
                return Err(TableError::LengthMismatch {
                    name: column.name.clone(),
                    found: column.data.len(),
                    expected: height,
                });
            }
        }
        Ok(Self { columns, height })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnData> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .map(|c| &mut c.data)
    }

    /// Removes a column. Returns whether it was present.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c.name != name);
        before != self.columns.len()
    }

    /// Inserts a column at the end, or replaces the data of an existing column
    /// in place so column order is stable.
    pub fn set_column(&mut self, name: &str, data: ColumnData) -> Result<(), TableError> {
        if !self.columns.is_empty() && data.len() != self.height {
            return Err(TableError::LengthMismatch {
                name: name.to_string(),
                found: data.len(),
                expected: self.height,
            });
        }
        if self.columns.is_empty() {
            self.height = data.len();
        }
        match self.column_mut(name) {
            Some(existing) => *existing = data,
            None => self.columns.push(Column {
                name: name.to_string(),
                data,
            }),
        }
        Ok(())
    }

    /// Keeps only `names`, in that order. Returns the first name not present.
    pub fn retain_ordered(&mut self, names: &[&str]) -> Result<(), String> {
        if let Some(absent) = names.iter().find(|name| !self.contains(name)) {
            return Err(absent.to_string());
        }
        let mut kept = Vec::with_capacity(names.len());
        for name in names {
            if let Some(position) = self.columns.iter().position(|c| c.name == *name) {
                kept.push(self.columns.swap_remove(position));
            }
        }
        self.columns = kept;
        Ok(())
    }

    /// A table holding the given rows, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> ClinicalTable {
        ClinicalTable {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(indices),
                })
                .collect(),
            height: indices.len(),
        }
    }

    /// Concatenates tables row-wise. The result has the union of all columns
    /// in first-seen order; rows from a table lacking a column are missing
    /// there. A column that is numeric in one table and text in another
    /// becomes text.
    pub fn vstack(tables: Vec<ClinicalTable>) -> ClinicalTable {
        let mut names: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !names.contains(&column.name) {
                    names.push(column.name.clone());
                }
            }
        }

        let height = tables.iter().map(|t| t.height).sum();
        let mut stacked: Vec<Option<ColumnData>> = vec![None; names.len()];
        for table in tables {
            let rows = table.height;
            let mut by_name: Vec<Option<ColumnData>> = vec![None; names.len()];
            for column in table.columns {
                if let Some(slot) = names.iter().position(|n| *n == column.name) {
                    by_name[slot] = Some(column.data);
                }
            }
            for (slot, piece) in by_name.into_iter().enumerate() {
                let accumulated = stacked[slot].take();
                stacked[slot] = Some(match (accumulated, piece) {
                    (None, Some(piece)) => piece,
                    (None, None) => ColumnData::Numeric(vec![None; rows]),
                    (Some(acc), Some(piece)) => acc.append(piece),
                    (Some(acc), None) => {
                        let filler = acc.missing_like(rows);
                        acc.append(filler)
                    }
                });
            }
        }

        // Padding for a column absent from earlier tables starts out numeric
        // and is promoted to text by `append` if text rows follow.
        let columns = names
            .into_iter()
            .zip(stacked)
            .map(|(name, data)| Column {
                name,
                data: data.unwrap_or(ColumnData::Numeric(Vec::new())),
            })
            .collect();
        ClinicalTable { columns, height }
    }
}
