//! # XLSX Writer
//!
//! Serializes a [`Table`] into a single-sheet Office Open XML workbook. The
//! header row is bold; every cell of a flagged record gets a solid fill.
use crate::error::RosterError;
use crate::table::Table;
use crate::table::Value;
use log::debug;
use regex::Regex;
use rust_xlsxwriter::Color;
use rust_xlsxwriter::ColNum;
use rust_xlsxwriter::Format;
use rust_xlsxwriter::RowNum;
use rust_xlsxwriter::Workbook;
use rust_xlsxwriter::Worksheet;
use rust_xlsxwriter::XlsxError;
use std::fmt::Display;
use std::io::Cursor;
use std::io::Seek;
use std::io::Write;
use std::str::FromStr;

/// Solid background color as a 24-bit RGB value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fill(u32);

impl Default for Fill {
    fn default() -> Self {
        Fill(0xFFFF00)
    }
}

impl Display for Fill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

impl FromStr for Fill {
    type Err = RosterError;

    /// Accepts `RRGGBB` with an optional leading `#`, in either case.
    fn from_str(color: &str) -> Result<Self, Self::Err> {
        let pattern = Regex::new(r"^#?([0-9A-Fa-f]{6})$").expect("Hardcode regex pattern");
        pattern
            .captures(color.trim())
            .and_then(|captures| captures.get(1))
            .and_then(|rgb| u32::from_str_radix(rgb.as_str(), 16).ok())
            .map(Fill)
            .ok_or_else(|| RosterError::InvalidOption {
                name: "fill".to_owned(),
                message: format!("'{color}' is not a 6-digit hex RGB color"),
            })
    }
}

/// Writes reconciled tables as .xlsx workbooks.
#[derive(Clone, Debug, Default)]
pub struct XlsxWriter {
    fill: Fill,
}

impl XlsxWriter {
    /// Creates a writer that highlights flagged rows with `fill`.
    pub fn new(fill: Fill) -> XlsxWriter {
        XlsxWriter { fill }
    }

    /// Writes `table` as a workbook into `writer`.
    ///
    /// # Arguments
    /// * `table` - Header and records to serialize
    /// * `flags` - One entry per record; `true` rows receive the fill
    /// * `writer` - Destination, usually a file or an in-memory cursor
    ///
    /// # Returns
    /// The destination, after the whole workbook has been written
    pub fn write<W: Write + Seek>(&self, table: &Table, flags: &[bool], mut writer: W) -> Result<W, RosterError> {
        let buffer = self.to_bytes(table, flags)?;
        writer.write_all(&buffer)?;
        Ok(writer)
    }

    /// Writes `table` into a fresh buffer.
    pub fn to_bytes(&self, table: &Table, flags: &[bool]) -> Result<Vec<u8>, RosterError> {
        if flags.len() != table.len() {
            Err(RosterError::InvalidOption {
                name: "flags".to_owned(),
                message: format!("{} highlight flags for {} rows", flags.len(), table.len()),
            })?
        }

        let header = Format::new().set_bold();
        let highlight = Format::new().set_background_color(Color::RGB(self.fill.0));
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        for (col, name) in table.columns().iter().enumerate() {
            worksheet.write_string_with_format(0, col_num(col)?, name, &header)?;
        }
        for (index, (record, flagged)) in table.rows().iter().zip(flags).enumerate() {
            let row = row_num(index + 1)?;
            let format = flagged.then_some(&highlight);
            for (col, value) in record.iter().enumerate() {
                write_value(worksheet, row, col_num(col)?, value, format)?;
            }
        }

        let buffer = workbook.save_to_buffer()?;
        debug!("{}: wrote {} rows, {} highlighted", table.name, table.len(), flags.iter().filter(|flag| **flag).count());
        Ok(buffer)
    }
}

fn row_num(row: usize) -> Result<RowNum, XlsxError> {
    RowNum::try_from(row).map_err(|_| XlsxError::RowColumnLimitError)
}

fn col_num(col: usize) -> Result<ColNum, XlsxError> {
    ColNum::try_from(col).map_err(|_| XlsxError::RowColumnLimitError)
}

/// Writes one cell. Empty values only produce a cell when formatted.
fn write_value(
    worksheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    value: &Value,
    format: Option<&Format>,
) -> Result<(), XlsxError> {
    match (value, format) {
        (Value::Empty, Some(format)) => worksheet.write_blank(row, col, format)?,
        (Value::Empty, None) => worksheet,
        (Value::Number(number), Some(format)) if number.is_finite() => {
            worksheet.write_number_with_format(row, col, *number, format)?
        }
        (Value::Number(number), None) if number.is_finite() => worksheet.write_number(row, col, *number)?,
        (Value::Boolean(boolean), Some(format)) => worksheet.write_boolean_with_format(row, col, *boolean, format)?,
        (Value::Boolean(boolean), None) => worksheet.write_boolean(row, col, *boolean)?,
        // Text, and numbers a worksheet cannot hold (NaN, infinities)
        (other, Some(format)) => worksheet.write_string_with_format(row, col, other.to_string(), format)?,
        (other, None) => worksheet.write_string(row, col, other.to_string())?,
    };
    Ok(())
}
