//! Percentage normalization of union tables

use crate::aggregate::UnionRow;
use crate::error::QueryError;

/// Rewrite each cell as a percentage of its X tag's total
///
/// `totals[i]` is the filter-adjusted single-axis count of the i-th X tag
/// (the Y tag plays no part in the denominator). A zero total yields 0.
pub fn percent_of_column(rows: &[UnionRow<u64>], totals: &[u64]) -> Vec<UnionRow<f64>> {
    rows.iter()
        .map(|row| UnionRow {
            label: row.label.clone(),
            cells: row
                .cells
                .iter()
                .enumerate()
                .map(|(i, (label, value))| {
                    let total = totals.get(i).copied().unwrap_or(0);
                    (label.clone(), ratio_percent(*value, total))
                })
                .collect(),
        })
        .collect()
}

/// Rewrite each cell as a percentage of its row's total
///
/// Rows with a zero total cannot be normalized and fail the whole table.
pub fn percent_of_row(rows: &[UnionRow<u64>]) -> Result<Vec<UnionRow<f64>>, QueryError> {
    rows.iter()
        .map(|row| {
            let total: u64 = row.values().sum();
            if total == 0 {
                return Err(QueryError::Normalization(row.label.clone()));
            }
            Ok(UnionRow {
                label: row.label.clone(),
                cells: row
                    .cells
                    .iter()
                    .map(|(label, value)| (label.clone(), ratio_percent(*value, total)))
                    .collect(),
            })
        })
        .collect()
}

fn ratio_percent(value: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        value as f64 / total as f64 * 100.0
    }
}
