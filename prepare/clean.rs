use crate::prepare::columns::{COHORT, PATIENT_ID, SEX};
use crate::prepare::table::ClinicalTable;
use log::debug;

/// Administrative columns that carry no predictive signal.
pub const DROPPED_COLUMNS: [&str; 3] = [PATIENT_ID, SEX, COHORT];

/// Removes the administrative columns that are present and returns their
/// names. Absent columns are ignored, so cleaning twice is a no-op.
pub fn clean_dataset(table: &mut ClinicalTable) -> Vec<&'static str> {
    let dropped: Vec<&'static str> = DROPPED_COLUMNS
        .into_iter()
        .filter(|name| table.drop_column(name))
        .collect();
    debug!("Dropped administrative columns: {dropped:?}");
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::table::{Column, ColumnData};

    fn column(name: &str) -> Column {
        Column {
            name: name.to_string(),
            data: ColumnData::Numeric(vec![Some(1.0)]),
        }
    }

    #[test]
    fn drops_present_columns_and_is_idempotent() {
        let mut table = ClinicalTable::from_columns(vec![
            column(PATIENT_ID),
            column("Tumor Size"),
            column(COHORT),
        ])
        .unwrap();

        assert_eq!(clean_dataset(&mut table), vec![PATIENT_ID, COHORT]);
        assert_eq!(table.column_names(), vec!["Tumor Size"]);

        assert!(clean_dataset(&mut table).is_empty());
        assert_eq!(table.column_names(), vec!["Tumor Size"]);
    }
}
