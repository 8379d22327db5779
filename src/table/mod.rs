//! # Table Model
//!
//! In-memory rectangular tables read from spreadsheets: an ordered, unique
//! column header plus records of typed cell values aligned with it.
use crate::error::RosterError;
use crate::helpers::string::is_completed;
use crate::helpers::string::normalize;
use log::warn;
use std::collections::HashMap;
use std::fmt::Display;

pub mod guess;

/// A single cell value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Boolean(bool),
}

impl Value {
    /// Creates a text value.
    pub fn text(text: &str) -> Value {
        Value::Text(text.to_owned())
    }

    /// Returns true if the cell holds nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Trimmed, lowercased text rendering used for every comparison.
    pub fn normalized(&self) -> String {
        normalize(&self.to_string())
    }

    /// True when the cell reads "completed" under the shared normalization.
    pub fn is_completed(&self) -> bool {
        is_completed(&self.to_string())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Text(text) => write!(f, "{}", text),
            Value::Number(number) => write!(f, "{}", number),
            Value::Boolean(boolean) => write!(f, "{}", boolean),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        if text.is_empty() {
            Value::Empty
        } else {
            Value::text(text)
        }
    }
}

/// A rectangular table: header names plus records aligned by position.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    /// Label used in error messages (file and sheet, or a role such as "master")
    pub name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Creates a table from already-unique column names.
    /// Records are padded with empty cells or truncated to the header width.
    pub fn new(name: &str, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Table {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Empty);
                row
            })
            .collect();
        Table {
            name: name.to_owned(),
            columns,
            rows,
        }
    }

    /// Creates a table from a raw header row.
    ///
    /// Blank header cells become `Unnamed: <index>` and repeated names get a
    /// `.<n>` suffix, so every column can be addressed by name.
    pub fn with_header(name: &str, header: Vec<Value>, rows: Vec<Vec<Value>>) -> Table {
        let mut seen = HashMap::<String, usize>::new();
        let mut columns = Vec::<String>::with_capacity(header.len());
        for (index, cell) in header.iter().enumerate() {
            let base = match cell.to_string().trim() {
                "" => format!("Unnamed: {index}"),
                text => text.to_owned(),
            };
            let mut column = base.clone();
            while let Some(count) = seen.get_mut(&column) {
                *count += 1;
                column = format!("{base}.{count}");
            }
            if column != base {
                warn!("{}: duplicate column '{}' renamed to '{}'", name, base, column);
            }
            seen.insert(column.clone(), 0);
            columns.push(column);
        }
        Table::new(name, columns, rows)
    }

    /// Column names in schema order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records in table order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of records (the header is not a record).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no records.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Zero-based schema position of a column.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    /// Schema position of a column, failing with `ColumnNotFound`.
    pub fn require(&self, column: &str) -> Result<usize, RosterError> {
        self.position(column).ok_or_else(|| RosterError::ColumnNotFound {
            table: self.name.to_owned(),
            column: column.to_owned(),
        })
    }

    /// Cell at (row, col); out-of-range positions read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &Value {
        const EMPTY: &Value = &Value::Empty;
        self.rows
            .get(row)
            .and_then(|record| record.get(col))
            .unwrap_or(EMPTY)
    }

    /// Overwrites the cell at (row, col), returning the previous value.
    pub(crate) fn replace(&mut self, row: usize, col: usize, value: Value) -> Option<Value> {
        self.rows
            .get_mut(row)
            .and_then(|record| record.get_mut(col))
            .map(|cell| std::mem::replace(cell, value))
    }

    /// Renders the header and the first `limit` records as an aligned text grid.
    pub fn preview(&self, limit: usize) -> String {
        let rows: Vec<Vec<String>> = self.rows
            .iter()
            .take(limit)
            .map(|record| record.iter().map(|cell| cell.to_string()).collect())
            .collect();
        let widths: Vec<usize> = self.columns
            .iter()
            .enumerate()
            .map(|(col, name)| {
                rows.iter()
                    .map(|record| record[col].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let line = |cells: &mut dyn Iterator<Item = &String>| -> String {
            cells
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_owned()
        };
        let mut lines = vec![line(&mut self.columns.iter())];
        lines.push(widths.iter().map(|width| "-".repeat(*width)).collect::<Vec<_>>().join("-+-"));
        for record in &rows {
            lines.push(line(&mut record.iter()));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Table {
        Table::new(
            "master",
            vec!["First".into(), "Last".into(), "Training".into()],
            vec![
                vec!["Ana".into(), "Lee".into(), "Completed".into()],
                vec!["Bo".into(), "Wu".into()],
            ],
        )
    }

    #[test]
    fn rows_are_padded_to_header_width() {
        let table = roster();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].len(), 3);
        assert_eq!(table.cell(1, 2), &Value::Empty);
        assert_eq!(table.cell(9, 9), &Value::Empty);
    }

    #[test]
    fn require_reports_missing_column() {
        let table = roster();
        assert_eq!(table.require("Last").unwrap(), 1);
        let error = table.require("Email").unwrap_err();
        assert!(matches!(error, RosterError::ColumnNotFound { ref table, ref column } if table == "master" && column == "Email"));
    }

    #[test]
    fn header_names_are_made_unique() {
        let table = Table::with_header(
            "sheet",
            vec!["Name".into(), Value::Empty, "Name".into(), "Name".into(), Value::Number(2019.0)],
            Vec::new(),
        );
        assert_eq!(table.columns(), &["Name", "Unnamed: 1", "Name.1", "Name.2", "2019"]);
    }

    #[test]
    fn normalized_values() {
        assert_eq!(Value::text(" Completed ").normalized(), "completed");
        assert_eq!(Value::Number(1.0).normalized(), "1");
        assert_eq!(Value::Number(2.5).normalized(), "2.5");
        assert_eq!(Value::Boolean(true).normalized(), "true");
        assert_eq!(Value::Empty.normalized(), "");
    }

    #[test]
    fn completed_values() {
        assert!(Value::text(" COMPLETED\t").is_completed());
        assert!(!Value::text("Complete").is_completed());
        assert!(!Value::Boolean(true).is_completed());
        assert!(!Value::Empty.is_completed());
    }

    #[test]
    fn replace_returns_previous_value() {
        let mut table = roster();
        let previous = table.replace(1, 2, Value::text("Completed"));
        assert_eq!(previous, Some(Value::Empty));
        assert_eq!(table.cell(1, 2), &Value::text("Completed"));
        assert_eq!(table.replace(5, 0, Value::Empty), None);
    }

    #[test]
    fn preview_aligns_columns() {
        let preview = roster().preview(1);
        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "First | Last | Training");
        assert_eq!(lines[2], "Ana   | Lee  | Completed");
    }
}
