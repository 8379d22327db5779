use crate::error::RosterError;
use crate::table::Table;
use crate::table::Value;
use log::info;

/// Per-row highlight decisions, aligned with the table's records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Highlight {
    pub flags: Vec<bool>,
    pub count: usize,
}

/// Flags records whose cells in an inclusive, positional column range all read "completed".
#[derive(Clone, Debug)]
pub struct RangeHighlighter {
    start: String,
    end: String,
}

impl RangeHighlighter {
    /// Creates a highlighter over the columns from `start` to `end`, in schema order.
    pub fn new(start: &str, end: &str) -> RangeHighlighter {
        RangeHighlighter {
            start: start.to_owned(),
            end: end.to_owned(),
        }
    }

    /// Resolves the range to zero-based positions.
    ///
    /// # Returns
    /// `(start, end)` with `start <= end`; a start after the end is rejected
    /// instead of flagging every row.
    pub fn positions(&self, table: &Table) -> Result<(usize, usize), RosterError> {
        let start = table.require(&self.start)?;
        let end = table.require(&self.end)?;
        if start > end {
            Err(RosterError::EmptyRange {
                start: self.start.to_owned(),
                end: self.end.to_owned(),
            })?
        }
        Ok((start, end))
    }

    /// Evaluates every record. The table is not modified.
    pub fn evaluate(&self, table: &Table) -> Result<Highlight, RosterError> {
        let (start, end) = self.positions(table)?;
        let flags: Vec<bool> = table
            .rows()
            .iter()
            .map(|record| record[start..=end].iter().all(Value::is_completed))
            .collect();
        let count = flags.iter().filter(|flag| **flag).count();
        info!(
            "{}: {} of {} records complete from '{}' to '{}'",
            table.name, count, flags.len(), self.start, self.end
        );
        Ok(Highlight { flags, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const COLUMNS: [&str; 5] = ["First", "Last", "A", "B", "C"];

    fn table(rows: &[&[&str]]) -> Table {
        Table::new(
            "master",
            COLUMNS.iter().map(|column| column.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| Value::from(*cell)).collect())
                .collect(),
        )
    }

    #[test]
    fn all_columns_in_range_must_be_completed() {
        let table = table(&[
            &["Ana", "Lee", "Completed", " completed", "COMPLETED"],
            &["Bo", "Wu", "Completed", "", "Completed"],
            &["Cy", "Ng", "Completed", "Completed", "Pending"],
        ]);
        let highlight = RangeHighlighter::new("A", "C").evaluate(&table).unwrap();
        assert_eq!(highlight.flags, vec![true, false, false]);
        assert_eq!(highlight.count, 1);

        let highlight = RangeHighlighter::new("A", "B").evaluate(&table).unwrap();
        assert_eq!(highlight.flags, vec![true, false, true]);
        assert_eq!(highlight.count, 2);
    }

    #[test]
    fn single_column_range() {
        let table = table(&[&["Ana", "Lee", "", "Completed", ""], &["Bo", "Wu", "", "Done", ""]]);
        let highlight = RangeHighlighter::new("B", "B").evaluate(&table).unwrap();
        assert_eq!(highlight.flags, vec![true, false]);
    }

    #[test]
    fn start_after_end_is_rejected() {
        let table = table(&[&["Ana", "Lee", "Completed", "Completed", "Completed"]]);
        let error = RangeHighlighter::new("C", "A").evaluate(&table).unwrap_err();
        assert!(matches!(error, RosterError::EmptyRange { ref start, ref end } if start == "C" && end == "A"));
    }

    #[test]
    fn unknown_column() {
        let table = table(&[]);
        let error = RangeHighlighter::new("A", "Z").evaluate(&table).unwrap_err();
        assert!(matches!(error, RosterError::ColumnNotFound { ref column, .. } if column == "Z"));
    }

    #[test]
    fn empty_table() {
        let highlight = RangeHighlighter::new("A", "C").evaluate(&table(&[])).unwrap();
        assert_eq!(highlight, Highlight::default());
    }

    #[test]
    fn non_text_values_are_not_completed() {
        let table = Table::new(
            "master",
            vec!["A".into(), "B".into()],
            vec![vec![Value::Boolean(true), Value::Number(1.0)]],
        );
        let highlight = RangeHighlighter::new("A", "B").evaluate(&table).unwrap();
        assert_eq!(highlight.flags, vec![false]);
    }

    fn state() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec!["Completed", " completed ", "Pending", ""])
    }

    proptest! {
        #[test]
        fn flag_matches_every_cell_in_range(
            records in prop::collection::vec(prop::collection::vec(state(), 5), 0..10),
            start in 0..5usize,
            length in 0..5usize,
        ) {
            let end = (start + length).min(4);
            let rows: Vec<&[&str]> = records.iter().map(|record| record.as_slice()).collect();
            let table = table(&rows);
            let highlight = RangeHighlighter::new(COLUMNS[start], COLUMNS[end]).evaluate(&table).unwrap();
            prop_assert_eq!(highlight.flags.len(), records.len());
            for (record, flag) in records.iter().zip(&highlight.flags) {
                let expected = record[start..=end].iter().all(|cell| cell.trim().eq_ignore_ascii_case("completed"));
                prop_assert_eq!(*flag, expected);
            }
            prop_assert_eq!(highlight.count, highlight.flags.iter().filter(|flag| **flag).count());
        }
    }
}
