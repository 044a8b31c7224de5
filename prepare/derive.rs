//! Encodes imputed clinical columns into the numeric fields the model reads:
//! binary surgery type, the aggressive-treatment score, and the survival label.
//!
//! Values that cannot be encoded become missing cells. They are counted in the
//! [`DerivationReport`] and logged; the selector later excludes those rows.

use crate::prepare::columns::*;
use crate::prepare::table::{ClinicalTable, ColumnData, TableError};
use log::{debug, warn};

/// Label value for a patient alive at last follow-up.
pub const LIVING: u8 = 1;
/// Label value for a deceased patient.
pub const DECEASED: u8 = 0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivationReport {
    /// Surgery cells that were neither mastectomy nor breast conserving.
    pub unrecognized_surgery: usize,
    /// Whether the treatment score was computed here rather than read from the input.
    pub derived_treatment_score: bool,
    /// Rows whose treatment score could not be computed.
    pub unscored_rows: usize,
    /// Survival status cells that were neither living nor deceased.
    pub unrecognized_labels: usize,
}

/// `Mastectomy` is 1, `Breast Conserving` is 0. Already-encoded 0/1 values pass through.
pub fn encode_surgery(value: &str) -> Option<f64> {
    match value.trim().to_ascii_lowercase().as_str() {
        "mastectomy" | "1" => Some(1.0),
        "breast conserving" | "0" => Some(0.0),
        _ => None,
    }
}

/// Reads a yes/no therapy flag.
pub fn encode_flag(value: &str) -> Option<f64> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Some(1.0),
        "no" | "false" | "0" => Some(0.0),
        _ => None,
    }
}

/// Living is [`LIVING`], any form of death is [`DECEASED`]. Accepts the plain
/// labels, the `0:LIVING` / `1:DECEASED` export form, and encoded 0/1 values.
pub fn encode_survival_status(value: &str) -> Option<f64> {
    let lowered = value.trim().to_ascii_lowercase();
    if lowered == "1" || lowered.contains("living") {
        Some(f64::from(LIVING))
    } else if lowered == "0" || lowered.contains("deceased") || lowered.starts_with("died") {
        Some(f64::from(DECEASED))
    } else {
        None
    }
}

/// Applies `encode` to every present cell. Returns the encoded values and the
/// number of present cells `encode` rejected.
fn encode_column(column: &ColumnData, encode: fn(&str) -> Option<f64>) -> (Vec<Option<f64>>, usize) {
    let mut rejected = 0;
    let values = (0..column.len())
        .map(|row| {
            let text = column.cell_text(row)?;
            let encoded = encode(&text);
            if encoded.is_none() {
                rejected += 1;
            }
            encoded
        })
        .collect();
    (values, rejected)
}

fn encode_in_place(
    table: &mut ClinicalTable,
    name: &str,
    encode: fn(&str) -> Option<f64>,
) -> Result<Option<usize>, TableError> {
    let Some(column) = table.column(name) else {
        return Ok(None);
    };
    let (values, rejected) = encode_column(column, encode);
    table.set_column(name, ColumnData::Numeric(values))?;
    Ok(Some(rejected))
}

/// Encodes surgery type and survival status, and computes the aggressive
/// treatment score when the input does not already carry one.
pub fn derive_features(table: &mut ClinicalTable) -> Result<DerivationReport, TableError> {
    let mut report = DerivationReport::default();

    if let Some(rejected) = encode_in_place(table, SURGERY_TYPE, encode_surgery)? {
        report.unrecognized_surgery = rejected;
        if rejected > 0 {
            warn!("{rejected} '{SURGERY_TYPE}' value(s) could not be encoded as binary and are treated as missing");
        }
    }

    if let Some(rejected) = encode_in_place(table, OVERALL_SURVIVAL_STATUS, encode_survival_status)? {
        report.unrecognized_labels = rejected;
        if rejected > 0 {
            warn!("{rejected} '{OVERALL_SURVIVAL_STATUS}' value(s) are neither living nor deceased and are treated as missing");
        }
    }

    if !table.contains(AGGRESSIVE_TREATMENT_SCORE) {
        if let Some(scores) = treatment_scores(table) {
            report.unscored_rows = scores.iter().filter(|s| s.is_none()).count();
            report.derived_treatment_score = true;
            table.set_column(AGGRESSIVE_TREATMENT_SCORE, ColumnData::Numeric(scores))?;
            if report.unscored_rows > 0 {
                warn!(
                    "{} row(s) lack a usable therapy flag; their '{AGGRESSIVE_TREATMENT_SCORE}' is missing",
                    report.unscored_rows
                );
            }
        } else {
            debug!("Therapy columns absent; '{AGGRESSIVE_TREATMENT_SCORE}' not derived");
        }
    }

    Ok(report)
}

/// One point each for chemotherapy, hormone therapy, radio therapy and
/// mastectomy. `None` when any input column is absent.
fn treatment_scores(table: &ClinicalTable) -> Option<Vec<Option<f64>>> {
    let surgery = table.column(SURGERY_TYPE)?;
    let flags = [
        table.column(CHEMOTHERAPY)?,
        table.column(HORMONE_THERAPY)?,
        table.column(RADIO_THERAPY)?,
    ];

    let (surgery, _) = encode_column(surgery, encode_surgery);
    let flags: Vec<Vec<Option<f64>>> = flags
        .iter()
        .map(|column| encode_column(column, encode_flag).0)
        .collect();

    let scores = (0..table.height())
        .map(|row| {
            flags
                .iter()
                .map(|flag| flag[row])
                .chain(std::iter::once(surgery[row]))
                .sum::<Option<f64>>()
        })
        .collect();
    Some(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::table::Column;

    fn text(name: &str, values: &[Option<&str>]) -> Column {
        Column {
            name: name.to_string(),
            data: ColumnData::Text(values.iter().map(|v| v.map(str::to_string)).collect()),
        }
    }

    #[test]
    fn encoders_accept_known_spellings() {
        assert_eq!(encode_surgery("MASTECTOMY"), Some(1.0));
        assert_eq!(encode_surgery("Breast Conserving"), Some(0.0));
        assert_eq!(encode_surgery("Unknown"), None);

        assert_eq!(encode_flag("Yes"), Some(1.0));
        assert_eq!(encode_flag("0"), Some(0.0));
        assert_eq!(encode_flag("maybe"), None);

        assert_eq!(encode_survival_status("Living"), Some(1.0));
        assert_eq!(encode_survival_status("0:LIVING"), Some(1.0));
        assert_eq!(encode_survival_status("1:DECEASED"), Some(0.0));
        assert_eq!(encode_survival_status("Died of Disease"), Some(0.0));
        assert_eq!(encode_survival_status("Lost"), None);
    }

    #[test]
    fn derives_score_and_encodes_columns() {
        let mut table = ClinicalTable::from_columns(vec![
            text(SURGERY_TYPE, &[Some("Mastectomy"), Some("Breast Conserving"), Some("Unknown")]),
            text(CHEMOTHERAPY, &[Some("Yes"), Some("No"), Some("No")]),
            text(HORMONE_THERAPY, &[Some("Yes"), Some("Yes"), Some("No")]),
            text(RADIO_THERAPY, &[Some("Yes"), Some("No"), Some("Yes")]),
            text(OVERALL_SURVIVAL_STATUS, &[Some("Deceased"), Some("Living"), None]),
        ])
        .unwrap();

        let report = derive_features(&mut table).unwrap();

        assert_eq!(
            table.column(SURGERY_TYPE),
            Some(&ColumnData::Numeric(vec![Some(1.0), Some(0.0), None]))
        );
        assert_eq!(
            table.column(AGGRESSIVE_TREATMENT_SCORE),
            Some(&ColumnData::Numeric(vec![Some(4.0), Some(1.0), None]))
        );
        assert_eq!(
            table.column(OVERALL_SURVIVAL_STATUS),
            Some(&ColumnData::Numeric(vec![Some(0.0), Some(1.0), None]))
        );
        assert_eq!(
            report,
            DerivationReport {
                unrecognized_surgery: 1,
                derived_treatment_score: true,
                unscored_rows: 1,
                unrecognized_labels: 0,
            }
        );
    }

    #[test]
    fn existing_score_is_kept_and_derivation_is_idempotent() {
        let mut table = ClinicalTable::from_columns(vec![
            text(SURGERY_TYPE, &[Some("Mastectomy")]),
            Column {
                name: AGGRESSIVE_TREATMENT_SCORE.to_string(),
                data: ColumnData::Numeric(vec![Some(2.0)]),
            },
        ])
        .unwrap();

        derive_features(&mut table).unwrap();
        let once = table.clone();
        let report = derive_features(&mut table).unwrap();

        assert_eq!(table, once);
        assert!(!report.derived_treatment_score);
        assert_eq!(
            table.column(AGGRESSIVE_TREATMENT_SCORE),
            Some(&ColumnData::Numeric(vec![Some(2.0)]))
        );
    }
}
