use crate::error::RosterError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Table;
use crate::table::Value;

/// Upper bound on the cells materialised for one sheet
const MAX_GRID_CELLS: usize = 1 << 24;

/// Raw cells collected from one sheet, in reading order, with the occupied bounds.
pub(crate) struct Sheet {
    /// Source file name
    pub(crate) file_name: String,
    /// Sheet name
    pub(crate) name: String,
    /// All non-empty cells in the sheet
    pub(crate) cells: Vec<Cell>,
    /// Occupied data range (determined from cell data)
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    /// Creates an empty sheet.
    pub(super) fn new(file_name: &str, name: &str) -> Self {
        Self {
            file_name: file_name.to_owned(),
            name: name.to_owned(),
            cells: Vec::new(),
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    /// Returns true if the sheet contains no cells.
    pub(super) fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Adds a cell to the sheet, widening the occupied bounds.
    pub(super) fn push(&mut self, cell: Cell) {
        self.update_bound(cell.row, cell.col);
        self.cells.push(cell);
    }

    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|row_lower_bound| row < row_lower_bound).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|row_upper_bound| row_upper_bound < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|col_lower_bound| col < col_lower_bound).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|col_upper_bound| col_upper_bound < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Label used for the resulting table: "<file> [<sheet>]".
    pub(crate) fn label(&self) -> String {
        format!("{} [{}]", self.file_name, self.name)
    }

    /// Builds a table using the first occupied row as the header.
    ///
    /// Columns span the occupied column range; rows between the header and the
    /// last occupied row are all kept, including fully empty ones.
    pub(crate) fn into_table(self, shared_strings: &[String]) -> Result<Table, RosterError> {
        let label = self.label();
        let (row_lower, row_upper, col_lower, col_upper) = match (
            self.row_lower_bound,
            self.row_upper_bound,
            self.col_lower_bound,
            self.col_upper_bound,
        ) {
            (Some(row_lower), Some(row_upper), Some(col_lower), Some(col_upper)) => (row_lower, row_upper, col_lower, col_upper),
            _ => return Ok(Table::new(&label, Vec::new(), Vec::new())),
        };
        let width = col_upper - col_lower + 1;
        let height = row_upper - row_lower + 1;
        if width.checked_mul(height).map(|cells| cells > MAX_GRID_CELLS).unwrap_or(true) {
            return Err(SpreadsheetError::SheetTooLargeError(label, height, width).into());
        }
        let mut grid = vec![vec![Value::Empty; width]; height];
        for cell in &self.cells {
            grid[cell.row - row_lower][cell.col - col_lower] = cell.to_value(shared_strings)?;
        }
        let mut rows = grid.into_iter();
        let header = rows.next().unwrap_or_default();
        Ok(Table::with_header(&label, header, rows.collect()))
    }
}

#[cfg(test)]
mod tests {
    use crate::spreadsheet::cell::CellType;
    use crate::spreadsheet::*;
    use crate::table::Value;

    fn push(sheet: &mut Sheet, row: usize, col: usize, value: &str) {
        sheet.push(Cell {
            row,
            col,
            kind: CellType::InlineString,
            value: value.to_owned(),
        });
    }

    #[test]
    fn sheet_initial() {
        let sheet = Sheet::new("", "");

        assert!(sheet.is_empty());
        assert_eq!(sheet.row_lower_bound, None);
        assert_eq!(sheet.row_upper_bound, None);
        assert_eq!(sheet.col_lower_bound, None);
        assert_eq!(sheet.col_upper_bound, None);
    }

    #[test]
    fn sheet_update() {
        let mut sheet = Sheet::new("", "");
        push(&mut sheet, 1, 1, "a");
        push(&mut sheet, 1, 3, "b");
        push(&mut sheet, 3, 1, "c");
        push(&mut sheet, 3, 3, "d");

        assert_eq!(sheet.cells.len(), 4);
        assert_eq!(sheet.row_lower_bound, Some(1));
        assert_eq!(sheet.row_upper_bound, Some(3));
        assert_eq!(sheet.col_lower_bound, Some(1));
        assert_eq!(sheet.col_upper_bound, Some(3));
    }

    #[test]
    fn sheet_into_table() {
        let mut sheet = Sheet::new("roster.xlsx", "Staff");
        push(&mut sheet, 1, 1, "First");
        push(&mut sheet, 1, 2, "Last");
        push(&mut sheet, 2, 1, "Ana");
        push(&mut sheet, 2, 2, "Lee");
        push(&mut sheet, 4, 2, "Wu");

        let table = sheet.into_table(&[]).unwrap();
        assert_eq!(table.name, "roster.xlsx [Staff]");
        assert_eq!(table.columns(), &["First", "Last"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[0], vec![Value::text("Ana"), Value::text("Lee")]);
        assert_eq!(table.rows()[1], vec![Value::Empty, Value::Empty]);
        assert_eq!(table.rows()[2], vec![Value::Empty, Value::text("Wu")]);
    }

    #[test]
    fn stray_far_cell_is_rejected() {
        let mut sheet = Sheet::new("roster.xlsx", "Staff");
        push(&mut sheet, 0, 0, "First");
        push(&mut sheet, 1_048_575, 16_383, "x");

        let error = sheet.into_table(&[]).err().unwrap();
        assert!(error.to_string().contains("1048576 rows x 16384 columns"));
        assert!(matches!(
            error.into_malformed("roster.xlsx"),
            crate::error::RosterError::MalformedInput(..)
        ));
    }

    #[test]
    fn empty_sheet_into_table() {
        let table = Sheet::new("a.xlsx", "Sheet1").into_table(&[]).unwrap();
        assert!(table.columns().is_empty());
        assert!(table.is_empty());
    }
}
