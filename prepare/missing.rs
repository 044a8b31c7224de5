use crate::prepare::table::ClinicalTable;

/// The share of missing cells in one column, in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingShare {
    pub column: String,
    pub percent: f64,
}

/// Per-column missingness for columns with at least one missing cell,
/// highest share first and ties by column name.
pub fn summarize(table: &ClinicalTable) -> Vec<MissingShare> {
    if table.height() == 0 {
        return Vec::new();
    }
    let rows = table.height() as f64;
    let mut shares: Vec<MissingShare> = table
        .columns()
        .iter()
        .filter_map(|column| {
            let missing = column.data.null_count();
            (missing > 0).then(|| MissingShare {
                column: column.name.clone(),
                percent: 100.0 * missing as f64 / rows,
            })
        })
        .collect();
    shares.sort_by(|a, b| {
        b.percent
            .total_cmp(&a.percent)
            .then_with(|| a.column.cmp(&b.column))
    });
    shares
}
