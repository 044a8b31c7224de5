//! # Rule-Based Imputation
//!
//! Three independent passes, run in a fixed order because later passes read
//! columns that earlier passes have completed:
//!
//! 1. Median imputation of the count-like numeric columns, with the median
//!    taken once over the whole table.
//! 2. Tumor-stage imputation from tumor size via a fixed decision rule.
//! 3. Mode imputation of the categorical columns within each cancer-subtype
//!    group, falling back to the literal [`UNKNOWN_CATEGORY`] for groups that
//!    never observe a value.
//!
//! Fatal problems are returned as [`ImputationError`]. The one recoverable
//! case, a numeric categorical column that must hold `"Unknown"`, is logged
//! and recorded in the [`ImputationReport`] as a degradation.

use crate::prepare::columns::*;
use crate::prepare::table::{ClinicalTable, ColumnData, format_number};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

/// Numeric columns filled with their global median.
pub const MEDIAN_COLUMNS: [&str; 3] = [LYMPH_NODES_POSITIVE, NOTTINGHAM_INDEX, MUTATION_COUNT];

/// Categorical columns filled with their per-subtype mode.
pub const GROUPED_MODE_COLUMNS: [&str; 8] = [
    SURGERY_TYPE,
    CELLULARITY,
    CHEMOTHERAPY,
    HORMONE_THERAPY,
    RADIO_THERAPY,
    HER2_STATUS,
    PR_STATUS,
    ER_STATUS,
];

/// The grouping key for mode imputation.
pub const GROUP_KEY: &str = CANCER_TYPE_DETAILED;

/// Placeholder written when a subtype group has no observed value.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Upper tumor-size bound (inclusive) for stage 1.
pub const STAGE_ONE_MAX_SIZE: f64 = 20.0;
/// Upper tumor-size bound (inclusive) for stage 2.
pub const STAGE_TWO_MAX_SIZE: f64 = 50.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImputationError {
    #[error("Column '{0}' has no observed values, so its median is undefined.")]
    NoObservedValues(String),
    #[error("Column '{column}' contains the non-numeric value '{value}' and cannot be imputed numerically.")]
    NonNumericValue { column: String, value: String },
    #[error("Column '{missing}' is required to impute '{target}' but is absent from the table.")]
    MissingInputColumn { missing: String, target: String },
    #[error(
        "Column '{column}' is numeric, but {groups} subtype group(s) had no observed value. \
         The column was converted to text so it could hold '{placeholder}'."
    )]
    UnknownInNumericColumn {
        column: String,
        groups: usize,
        placeholder: &'static str,
    },
}

/// How many cells one pass filled in one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFill {
    pub column: String,
    pub filled: usize,
    /// The global fill value, for passes that have one.
    pub value: Option<f64>,
}

/// A record of what imputation changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImputationReport {
    pub median_fills: Vec<ColumnFill>,
    pub stage_fills: usize,
    pub mode_fills: Vec<ColumnFill>,
    /// Cells that received the `"Unknown"` placeholder.
    pub unknown_fills: usize,
    /// Recoverable problems, already logged.
    pub degradations: Vec<ImputationError>,
}

/// Runs all three passes in order.
pub fn impute(table: &mut ClinicalTable) -> Result<ImputationReport, ImputationError> {
    let mut report = ImputationReport {
        median_fills: impute_numeric_medians(table)?,
        ..ImputationReport::default()
    };
    report.stage_fills = impute_tumor_stage(table)?;
    impute_grouped_modes(table, &mut report)?;

    info!(
        "Imputation complete: {} median, {} stage, {} mode fills ({} placeholders, {} degradations)",
        report.median_fills.iter().map(|f| f.filled).sum::<usize>(),
        report.stage_fills,
        report.mode_fills.iter().map(|f| f.filled).sum::<usize>(),
        report.unknown_fills,
        report.degradations.len()
    );
    Ok(report)
}

/// The median of `values`, or `None` for an empty slice. An even
/// count averages the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 0 {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    } else {
        Some(sorted[n / 2])
    }
}

/// Pass 1: fills [`MEDIAN_COLUMNS`] with the median of their observed values.
pub fn impute_numeric_medians(
    table: &mut ClinicalTable,
) -> Result<Vec<ColumnFill>, ImputationError> {
    let mut fills = Vec::with_capacity(MEDIAN_COLUMNS.len());
    for name in MEDIAN_COLUMNS {
        let Some(column) = table.column_mut(name) else {
            debug!("Median imputation: column '{name}' absent, skipping");
            continue;
        };

        let mut values = column
            .to_numeric()
            .map_err(|value| ImputationError::NonNumericValue {
                column: name.to_string(),
                value,
            })?;
        let observed: Vec<f64> = values.iter().flatten().copied().collect();
        let fill = median(&observed)
            .ok_or_else(|| ImputationError::NoObservedValues(name.to_string()))?;

        let mut filled = 0;
        for cell in values.iter_mut().filter(|cell| cell.is_none()) {
            *cell = Some(fill);
            filled += 1;
        }
        *column = ColumnData::Numeric(values);

        debug!("Median imputation: '{name}' filled {filled} cell(s) with {fill}");
        fills.push(ColumnFill {
            column: name.to_string(),
            filled,
            value: Some(fill),
        });
    }
    Ok(fills)
}

/// The stage implied by a tumor size. A missing size compares false against
/// both bounds and therefore lands in stage 3.
pub fn stage_for_size(size: Option<f64>) -> f64 {
    match size {
        Some(s) if s <= STAGE_ONE_MAX_SIZE => 1.0,
        Some(s) if s <= STAGE_TWO_MAX_SIZE => 2.0,
        _ => 3.0,
    }
}

/// Pass 2: fills missing tumor stages from tumor size. Present stages are
/// left untouched. Returns the number of cells filled.
pub fn impute_tumor_stage(table: &mut ClinicalTable) -> Result<usize, ImputationError> {
    let Some(stage_column) = table.column(TUMOR_STAGE) else {
        debug!("Stage imputation: column '{TUMOR_STAGE}' absent, skipping");
        return Ok(0);
    };
    let mut stages = stage_column
        .to_numeric()
        .map_err(|value| ImputationError::NonNumericValue {
            column: TUMOR_STAGE.to_string(),
            value,
        })?;
    if stages.iter().all(Option::is_some) {
        return Ok(0);
    }

    let sizes = table
        .column(TUMOR_SIZE)
        .ok_or_else(|| ImputationError::MissingInputColumn {
            missing: TUMOR_SIZE.to_string(),
            target: TUMOR_STAGE.to_string(),
        })?
        .to_numeric()
        .map_err(|value| ImputationError::NonNumericValue {
            column: TUMOR_SIZE.to_string(),
            value,
        })?;

    let mut filled = 0;
    for (stage, size) in stages.iter_mut().zip(&sizes) {
        if stage.is_none() {
            *stage = Some(stage_for_size(*size));
            filled += 1;
        }
    }

    if let Some(column) = table.column_mut(TUMOR_STAGE) {
        *column = ColumnData::Numeric(stages);
    }
    debug!("Stage imputation: filled {filled} cell(s) from tumor size");
    Ok(filled)
}

/// Dense group ids for each row, assigned in order of first appearance. A
/// missing key forms a group of its own.
fn group_ids(table: &ClinicalTable) -> Result<(Vec<usize>, usize), ImputationError> {
    let key_column = table
        .column(GROUP_KEY)
        .ok_or_else(|| ImputationError::MissingInputColumn {
            missing: GROUP_KEY.to_string(),
            target: "categorical columns".to_string(),
        })?;

    let mut ids: HashMap<Option<String>, usize> = HashMap::new();
    let rows = (0..table.height())
        .map(|row| {
            let next = ids.len();
            *ids.entry(key_column.cell_text(row)).or_insert(next)
        })
        .collect();
    Ok((rows, ids.len()))
}

/// The most frequent observed value in each group. Ties go to the value that
/// appears first in row order; groups with nothing observed get `None`.
pub fn group_modes<T: Clone + Eq + Hash>(
    values: &[Option<T>],
    groups: &[usize],
    group_count: usize,
) -> Vec<Option<T>> {
    // value -> (count, first row)
    let mut tallies: Vec<HashMap<T, (usize, usize)>> = vec![HashMap::new(); group_count];
    for (row, (value, &group)) in values.iter().zip(groups).enumerate() {
        if let Some(value) = value {
            let entry = tallies[group].entry(value.clone()).or_insert((0, row));
            entry.0 += 1;
        }
    }

    tallies
        .into_iter()
        .map(|tally| {
            tally
                .into_iter()
                .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                    count_a.cmp(count_b).then(first_b.cmp(first_a))
                })
                .map(|(value, _)| value)
        })
        .collect()
}

/// Pass 3: fills [`GROUPED_MODE_COLUMNS`] with the mode of their subtype group.
pub fn impute_grouped_modes(
    table: &mut ClinicalTable,
    report: &mut ImputationReport,
) -> Result<(), ImputationError> {
    let present: Vec<&str> = GROUPED_MODE_COLUMNS
        .into_iter()
        .filter(|name| table.contains(name))
        .collect();
    if present.is_empty() {
        debug!("Mode imputation: no categorical columns present, skipping");
        return Ok(());
    }

    let (groups, group_count) = group_ids(table)?;
    debug!("Mode imputation: {group_count} subtype group(s) found");

    for name in present {
        let Some(column) = table.column_mut(name) else {
            continue;
        };
        if column.null_count() == 0 {
            continue;
        }

        let taken = std::mem::replace(column, ColumnData::Text(Vec::new()));
        let (filled_column, fill) = match taken {
            ColumnData::Numeric(values) => {
                fill_numeric_modes(name, values, &groups, group_count, report)
            }
            ColumnData::Text(values) => {
                let (values, filled) = fill_text_modes(values, &groups, group_count, report);
                let fill = ColumnFill {
                    column: name.to_string(),
                    filled,
                    value: None,
                };
                (ColumnData::Text(values), fill)
            }
        };
        debug!("Mode imputation: '{name}' filled {} cell(s)", fill.filled);
        *column = filled_column;
        report.mode_fills.push(fill);
    }
    Ok(())
}

fn fill_text_modes(
    mut values: Vec<Option<String>>,
    groups: &[usize],
    group_count: usize,
    report: &mut ImputationReport,
) -> (Vec<Option<String>>, usize) {
    let modes = group_modes(&values, groups, group_count);
    let mut filled = 0;
    for (cell, &group) in values.iter_mut().zip(groups) {
        if cell.is_none() {
            *cell = Some(match &modes[group] {
                Some(mode) => mode.clone(),
                None => {
                    report.unknown_fills += 1;
                    UNKNOWN_CATEGORY.to_string()
                }
            });
            filled += 1;
        }
    }
    (values, filled)
}

fn fill_numeric_modes(
    name: &str,
    values: Vec<Option<f64>>,
    groups: &[usize],
    group_count: usize,
    report: &mut ImputationReport,
) -> (ColumnData, ColumnFill) {
    let bits: Vec<Option<u64>> = values.iter().map(|v| v.map(f64::to_bits)).collect();
    let modes = group_modes(&bits, groups, group_count);

    let empty_groups_hit: Vec<usize> = (0..group_count)
        .filter(|&g| modes[g].is_none())
        .filter(|&g| {
            values
                .iter()
                .zip(groups)
                .any(|(cell, &group)| group == g && cell.is_none())
        })
        .collect();

    if empty_groups_hit.is_empty() {
        let mut values = values;
        let mut filled = 0;
        for (cell, &group) in values.iter_mut().zip(groups) {
            if cell.is_none() {
                *cell = modes[group].map(f64::from_bits);
                filled += 1;
            }
        }
        return (
            ColumnData::Numeric(values),
            ColumnFill {
                column: name.to_string(),
                filled,
                value: None,
            },
        );
    }

    let degradation = ImputationError::UnknownInNumericColumn {
        column: name.to_string(),
        groups: empty_groups_hit.len(),
        placeholder: UNKNOWN_CATEGORY,
    };
    warn!("{degradation}");
    report.degradations.push(degradation);

    let text: Vec<Option<String>> = values.into_iter().map(|v| v.map(format_number)).collect();
    let (text, filled) = fill_text_modes(text, groups, group_count, report);
    (
        ColumnData::Text(text),
        ColumnFill {
            column: name.to_string(),
            filled,
            value: None,
        },
    )
}
