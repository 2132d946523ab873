//! Tabular reshaping of aggregation results for rendering

use serde::Serialize;
use std::cmp::Ordering;

use crate::aggregate::{DataTable, UnionRow};
use crate::params::QueryParams;
use crate::tags::display_label;

/// Row labels are wrapped to this many characters
pub const LABEL_WRAP_WIDTH: usize = 16;

/// Column label of count-shaped tables
pub const COUNT_COLUMN: &str = "count";

/// Labeled matrix: `data[row][column]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledTable {
    pub index: Vec<String>,
    pub columns: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

impl LabeledTable {
    pub fn value(&self, row: usize, column: usize) -> Option<f64> {
        self.data.get(row).and_then(|r| r.get(column)).copied()
    }

    /// Swap rows and columns
    pub fn transpose(&self) -> Self {
        let data = (0..self.columns.len())
            .map(|c| self.data.iter().map(|row| row[c]).collect())
            .collect();
        Self {
            index: self.columns.clone(),
            columns: self.index.clone(),
            data,
        }
    }

    /// Stable ascending sort of rows by their full value tuple
    fn sort_rows(&mut self) {
        let mut rows: Vec<(String, Vec<f64>)> = self
            .index
            .drain(..)
            .zip(self.data.drain(..))
            .collect();
        rows.sort_by(|(_, a), (_, b)| compare_tuples(a, b));
        let (index, data) = rows.into_iter().unzip();
        self.index = index;
        self.data = data;
    }

    /// Reorder columns to `order`, matching repeated labels in sequence
    ///
    /// Columns whose label does not appear in `order` are dropped.
    fn reorder_columns(&mut self, order: &[String]) {
        let mut used = vec![false; self.columns.len()];
        let mut positions = Vec::with_capacity(order.len());
        for label in order {
            let found = self
                .columns
                .iter()
                .enumerate()
                .position(|(i, c)| !used[i] && c == label);
            if let Some(i) = found {
                used[i] = true;
                positions.push(i);
            }
        }

        self.columns = positions.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.data {
            *row = positions.iter().map(|&i| row[i]).collect();
        }
    }
}

fn compare_tuples(a: &[f64], b: &[f64]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Wrap a label at whitespace to `LABEL_WRAP_WIDTH`, lines joined by `\n`
pub fn wrap_label(label: &str) -> String {
    textwrap::wrap(label, LABEL_WRAP_WIDTH).join("\n")
}

pub struct TableBuilder;

impl TableBuilder {
    /// Build the display matrix for `data`
    ///
    /// With `sort`, rows are ordered by value; without it, union columns
    /// are put back in X-axis input order. `transpose` is applied last.
    pub fn build(data: &DataTable, params: &QueryParams) -> LabeledTable {
        let mut table = match data {
            DataTable::Counts(rows) => LabeledTable {
                index: rows.iter().map(|r| wrap_label(&r.label)).collect(),
                columns: vec![COUNT_COLUMN.to_string()],
                data: rows.iter().map(|r| vec![r.count as f64]).collect(),
            },
            DataTable::Union(rows) => from_union(rows, |v| *v as f64),
            DataTable::Percent(rows) => from_union(rows, |v| *v),
        };

        if params.sort {
            table.sort_rows();
        } else if !data.is_count() {
            let order: Vec<String> = params.tags_x.iter().map(|x| display_label(x)).collect();
            table.reorder_columns(&order);
        }

        if params.transpose {
            table = table.transpose();
        }

        table
    }
}

fn from_union<T>(rows: &[UnionRow<T>], to_f64: impl Fn(&T) -> f64) -> LabeledTable {
    let columns = rows
        .first()
        .map(|r| r.cells.iter().map(|(label, _)| label.clone()).collect())
        .unwrap_or_default();

    LabeledTable {
        index: rows.iter().map(|r| wrap_label(&r.label)).collect(),
        columns,
        data: rows
            .iter()
            .map(|r| r.values().map(&to_f64).collect())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CountRow;

    fn union_rows(rows: &[(&str, &[(&str, u64)])]) -> DataTable {
        DataTable::Union(
            rows.iter()
                .map(|(label, cells)| UnionRow {
                    label: label.to_string(),
                    cells: cells.iter().map(|(l, v)| (l.to_string(), *v)).collect(),
                })
                .collect(),
        )
    }

    fn params(tags_x: &[&str], sort: bool, transpose: bool) -> QueryParams {
        QueryParams {
            tags_x: tags_x.iter().map(|t| t.to_string()).collect(),
            sort,
            transpose,
            ..Default::default()
        }
    }

    #[test]
    fn test_wrap_label() {
        assert_eq!(wrap_label("short"), "short");
        assert_eq!(
            wrap_label("qualitative research methods"),
            "qualitative\nresearch methods"
        );
        assert_eq!(wrap_label("abcdefghijklmnopqrst"), "abcdefghijklmnop\nqrst");
    }

    #[test]
    fn test_count_table() {
        let data = DataTable::Counts(vec![
            CountRow {
                label: "a".to_string(),
                count: 5,
            },
            CountRow {
                label: "b".to_string(),
                count: 3,
            },
        ]);
        let table = TableBuilder::build(&data, &params(&["a", "b"], false, false));

        assert_eq!(table.index, vec!["a", "b"]);
        assert_eq!(table.columns, vec!["count"]);
        assert_eq!(table.data, vec![vec![5.0], vec![3.0]]);
    }

    #[test]
    fn test_sort_orders_rows_by_value_tuple() {
        let data = union_rows(&[
            ("y1", &[("a", 3), ("b", 1)]),
            ("y2", &[("a", 1), ("b", 9)]),
            ("y3", &[("a", 3), ("b", 0)]),
        ]);
        let table = TableBuilder::build(&data, &params(&["a", "b"], true, false));

        assert_eq!(table.index, vec!["y2", "y3", "y1"]);
        assert_eq!(table.data[0], vec![1.0, 9.0]);
        assert_eq!(table.columns, vec!["a", "b"]);
    }

    #[test]
    fn test_unsorted_columns_follow_input_order() {
        // Cells deliberately out of X order
        let data = union_rows(&[("y1", &[("b", 2), ("a", 1)])]);
        let table = TableBuilder::build(&data, &params(&["!a!", "b"], false, false));

        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.data, vec![vec![1.0, 2.0]]);
        assert_eq!(table.index, vec!["y1"]);
    }

    #[test]
    fn test_unsorted_keeps_row_order() {
        let data = union_rows(&[("y2", &[("a", 9)]), ("y1", &[("a", 1)])]);
        let table = TableBuilder::build(&data, &params(&["a"], false, false));
        assert_eq!(table.index, vec!["y2", "y1"]);
    }

    #[test]
    fn test_transpose() {
        let data = union_rows(&[("c", &[("a", 1), ("b", 2)]), ("d", &[("a", 3), ("b", 4)])]);
        let table = TableBuilder::build(&data, &params(&["a", "b"], false, true));

        assert_eq!(table.index, vec!["a", "b"]);
        assert_eq!(table.columns, vec!["c", "d"]);
        assert_eq!(table.data, vec![vec![1.0, 3.0], vec![2.0, 4.0]]);
        assert_eq!(table.value(1, 0), Some(2.0));
    }

    #[test]
    fn test_duplicate_x_labels_keep_both_columns() {
        let data = union_rows(&[("c", &[("a", 1), ("a", 2)])]);
        let table = TableBuilder::build(&data, &params(&["a", "a"], false, false));
        assert_eq!(table.columns, vec!["a", "a"]);
        assert_eq!(table.data, vec![vec![1.0, 2.0]]);
    }
}
