//! Data rows of a dump file and the row ordering used by the sorter.
//!
//! [`promote_numeric_columns()`] decides once per file which sort columns
//! behave as numbers; [`sort_rows()`] then builds every row's key from the
//! resulting spec and orders the rows.

use std::{cmp::Ordering, ops::Range};

use crate::{
    data::{SortKeyValue, is_numeric_text},
    sort_order::{SortColumn, SortSpec},
};

pub const FIELD_DELIMITER: u8 = b'\t';

/// One data line of a dump. Rows are kept as bytes, so dumps in any
/// client encoding sort without being decoded.
#[derive(Debug, Clone)]
pub struct DataRow {
    /// Line bytes without the terminator; written back verbatim.
    pub raw: Vec<u8>,
    /// Byte ranges of the tab-separated fields within `raw`.
    fields: Vec<Range<usize>>,
    pub keys: Vec<SortKeyValue>,
}

impl DataRow {
    pub fn parse(raw: impl Into<Vec<u8>>) -> Self {
        let raw = raw.into();
        let mut fields = Vec::new();
        let mut start = 0;
        for (position, &byte) in raw.iter().enumerate() {
            if byte == FIELD_DELIMITER {
                fields.push(start..position);
                start = position + 1;
            }
        }
        fields.push(start..raw.len());
        Self {
            raw,
            fields,
            keys: Vec::new(),
        }
    }

    /// Field at a 1-based position.
    pub fn field(&self, index: usize) -> Option<&[u8]> {
        index
            .checked_sub(1)
            .and_then(|position| self.fields.get(position))
            .map(|range| &self.raw[range.clone()])
    }

    /// Rebuilds `keys` from `spec`. Columns past the end of this row are
    /// left out rather than padded.
    pub fn build_keys(&mut self, spec: &SortSpec) {
        let keys = spec
            .iter()
            .filter_map(|column| {
                self.field(column.index)
                    .map(|text| SortKeyValue::new(text, column.numeric))
            })
            .collect();
        self.keys = keys;
    }

    /// Compares built keys position by position; when one key runs out
    /// first, the row with more components is greater.
    pub fn compare(&self, other: &Self) -> Ordering {
        for (left, right) in self.keys.iter().zip(&other.keys) {
            match left.cmp(right) {
                Ordering::Equal => continue,
                decided => return decided,
            }
        }
        self.keys.len().cmp(&other.keys.len())
    }
}

/// Returns `spec` with every text column promoted to numeric when all rows
/// that reach that column hold a blank or a number there. Columns already
/// numeric stay numeric.
pub fn promote_numeric_columns(spec: &SortSpec, rows: &[DataRow]) -> SortSpec {
    let columns = spec
        .iter()
        .map(|column| {
            let numeric = column.numeric
                || rows
                    .iter()
                    .filter_map(|row| row.field(column.index))
                    .all(is_numeric_text);
            SortColumn {
                index: column.index,
                numeric,
            }
        })
        .collect();
    SortSpec::new(columns)
}

/// Builds keys and sorts `rows` in place. Equal rows keep their input order.
pub fn sort_rows(rows: &mut [DataRow], spec: &SortSpec) {
    for row in rows.iter_mut() {
        row.build_keys(spec);
    }
    rows.sort_by(DataRow::compare);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(columns: &[(usize, bool)]) -> SortSpec {
        SortSpec::new(
            columns
                .iter()
                .map(|&(index, numeric)| SortColumn { index, numeric })
                .collect(),
        )
    }

    fn raws(rows: &[DataRow]) -> Vec<&str> {
        rows.iter()
            .map(|row| std::str::from_utf8(&row.raw).unwrap())
            .collect()
    }

    #[test]
    fn blank_and_numbers_promote_and_sort_numerically() {
        let mut rows = vec![
            DataRow::parse("42.5\tc"),
            DataRow::parse("1\ta"),
            DataRow::parse("\tb"),
        ];
        let promoted = promote_numeric_columns(&spec(&[(1, false)]), &rows);
        assert!(promoted.columns[0].numeric);
        sort_rows(&mut rows, &promoted);
        assert_eq!(raws(&rows), vec!["\tb", "1\ta", "42.5\tc"]);
    }

    #[test]
    fn mixed_column_is_not_promoted() {
        let mut rows = vec![DataRow::parse("abc"), DataRow::parse("10"), DataRow::parse("9")];
        let promoted = promote_numeric_columns(&spec(&[(1, false)]), &rows);
        assert!(!promoted.columns[0].numeric);
        sort_rows(&mut rows, &promoted);
        assert_eq!(raws(&rows), vec!["10", "9", "abc"]);
    }

    #[test]
    fn configured_numeric_column_is_never_demoted() {
        let rows = vec![DataRow::parse("abc")];
        let promoted = promote_numeric_columns(&spec(&[(1, true)]), &rows);
        assert!(promoted.columns[0].numeric);
    }

    #[test]
    fn short_rows_are_ignored_by_promotion() {
        let rows = vec![DataRow::parse("x\t5"), DataRow::parse("y")];
        let promoted = promote_numeric_columns(&spec(&[(2, false)]), &rows);
        assert!(promoted.columns[0].numeric);
    }

    #[test]
    fn row_with_more_key_components_sorts_greater() {
        let mut rows = vec![DataRow::parse("a\tz"), DataRow::parse("a")];
        sort_rows(&mut rows, &spec(&[(1, false), (2, false)]));
        assert_eq!(rows[0].keys.len(), 1);
        assert_eq!(raws(&rows), vec!["a", "a\tz"]);
    }

    #[test]
    fn fields_split_on_tabs_including_empty_ones() {
        let row = DataRow::parse(b"8\t\t\\N\tcaf\xe9".as_slice());
        assert_eq!(row.field(2), Some(b"".as_slice()));
        assert_eq!(row.field(3), Some(b"\\N".as_slice()));
        assert_eq!(row.field(4), Some(b"caf\xe9".as_slice()));
        assert_eq!(row.field(0), None);
        assert_eq!(row.field(5), None);
    }

    #[test]
    fn non_utf8_column_is_not_promoted_and_sorts_by_bytes() {
        let mut rows = vec![
            DataRow::parse(b"caf\xe9".as_slice()),
            DataRow::parse("10"),
            DataRow::parse("cafe"),
        ];
        let promoted = promote_numeric_columns(&spec(&[(1, false)]), &rows);
        assert!(!promoted.columns[0].numeric);
        sort_rows(&mut rows, &promoted);
        let order = rows.iter().map(|row| row.raw.clone()).collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![b"10".to_vec(), b"cafe".to_vec(), b"caf\xe9".to_vec()]
        );
    }

    #[test]
    fn equal_rows_keep_input_order() {
        let mut rows = vec![
            DataRow::parse("1\tfirst"),
            DataRow::parse("0\tonly"),
            DataRow::parse("1\tsecond"),
        ];
        sort_rows(&mut rows, &spec(&[(1, true)]));
        assert_eq!(raws(&rows), vec!["0\tonly", "1\tfirst", "1\tsecond"]);
    }
}
