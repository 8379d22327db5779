use crate::error::RosterError;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Value;
use chrono::NaiveDate;
use chrono::TimeDelta;

/// Types of cell data in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values stored as "1" / "0"
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// ISO 8601 duration strings
    IsoDuration,
    /// Inline string values
    InlineString,
    /// Shared string table references
    SharedString,
    /// Error literals such as "#N/A"
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Looks for date/time tokens outside literals, escapes and bracketed sections.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_color = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_color => is_literal = true,

                ']' if is_color => is_color = false,
                '[' if !is_literal => is_color = true,
                _ if is_literal || is_color => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// Error literal for a BIFF8 error code
pub(crate) fn to_error_value(code: u8) -> &'static str {
    match code {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A single raw cell read from a sheet.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    /// Cell data type
    pub(crate) kind: CellType,
    /// Raw cell value as stored in the file
    pub(crate) value: String,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Converts the raw cell into a table value.
    /// Dates and times are rendered as ISO text; shared strings are resolved.
    pub(crate) fn to_value(&self, shared_strings: &[String]) -> Result<Value, RosterError> {
        let value = match self.kind {
            CellType::Empty => Value::Empty,
            CellType::Boolean => Value::Boolean(self.value == "1" || self.value.eq_ignore_ascii_case("true")),
            CellType::Number => Value::Number(self.value.trim().parse::<f64>()
                .map_err(|_| self.invalid("not a number"))?),
            CellType::NumberDateTime1900 => Value::Text(to_datetime_string(&self.value, false)
                .ok_or_else(|| self.invalid("not a date/time serial"))?),
            CellType::NumberDateTime1904 => Value::Text(to_datetime_string(&self.value, true)
                .ok_or_else(|| self.invalid("not a date/time serial"))?),
            CellType::NumberDate1900 => Value::Text(to_date_string(&self.value, false)
                .ok_or_else(|| self.invalid("not a date serial"))?),
            CellType::NumberDate1904 => Value::Text(to_date_string(&self.value, true)
                .ok_or_else(|| self.invalid("not a date serial"))?),
            CellType::NumberTime1900 | CellType::NumberTime1904 => Value::Text(to_time_string(&self.value)
                .ok_or_else(|| self.invalid("not a time serial"))?),
            CellType::IsoDateTime => Value::Text(self.value.replace('T', " ")),
            CellType::IsoDuration => Value::Text(self.value
                .replace("PT", "")
                .replace('H', ":")
                .replace('M', ":")
                .replace('S', "")),
            CellType::InlineString | CellType::Error => Value::Text(self.value.to_owned()),
            CellType::SharedString => {
                let index = self.value.parse::<usize>()?;
                let text = shared_strings
                    .get(index)
                    .ok_or_else(|| self.invalid("shared string index out of range"))?;
                Value::Text(text.to_owned())
            }
        };
        Ok(value)
    }

    fn invalid(&self, message: &str) -> SpreadsheetError {
        SpreadsheetError::CellValueError(self.reference(), format!("'{}' {}", self.value, message))
    }
}

/// Excel day zero for the 1900 date system
const EPOCH_1900: NaiveDate = match NaiveDate::from_ymd_opt(1899, 12, 30) {
    Some(date) => date,
    None => panic!("NaiveDate Literal"),
};

/// Converts an Excel date serial to an ISO date string.
/// Handles the Lotus 1-2-3 leap year bug for the 1900 epoch.
/// Returns None for text and for serials outside the calendar chrono supports.
fn to_date_string(value: &str, is_1904: bool) -> Option<String> {
    let days = value.trim().parse::<f64>().ok()?.trunc() as i64;
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let duration = TimeDelta::try_days(days.checked_add(offset)?)?;
    let date = EPOCH_1900.checked_add_signed(duration)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Converts the fractional part of an Excel serial to an ISO time string.
fn to_time_string(value: &str) -> Option<String> {
    let factor = value.trim().parse::<f64>().ok()?.fract();
    let mut rest = (factor * 86_400_000f64).round() as i64;
    let milliseconds = rest % 1_000; rest /= 1_000;
    let seconds = rest % 60; rest /= 60;
    let minutes = rest % 60; rest /= 60;
    let hours = rest;
    let timestamp = if milliseconds > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    };
    Some(timestamp)
}

/// Converts an Excel date/time serial to an ISO datetime string.
fn to_datetime_string(value: &str, is_1904: bool) -> Option<String> {
    let date = to_date_string(value, is_1904)?;
    let time = to_time_string(value)?;
    Some(format!("{date} {time}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell { row: 1, col: 2, kind, value: value.to_owned() }
    }

    #[test]
    fn custom_number_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("hh:mm:ss", true), CellType::NumberTime1904);
        assert_eq!(CellType::parse_custom_number_format("d/m/yy h:mm", false), CellType::NumberDateTime1900);
        assert_eq!(CellType::parse_custom_number_format("[Red]0.00", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("\"days\" 0", false), CellType::Number);
    }

    #[test]
    fn builtin_number_formats() {
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("22", true), Some(CellType::NumberDateTime1904));
        assert_eq!(CellType::parse_builtin_number_format_id("0", false), None);
    }

    #[test]
    fn values() {
        assert_eq!(cell(CellType::Number, "42").to_value(&[]).unwrap(), Value::Number(42.0));
        assert_eq!(cell(CellType::Boolean, "1").to_value(&[]).unwrap(), Value::Boolean(true));
        assert_eq!(cell(CellType::Boolean, "0").to_value(&[]).unwrap(), Value::Boolean(false));
        assert_eq!(cell(CellType::Error, "#N/A").to_value(&[]).unwrap(), Value::text("#N/A"));
        assert_eq!(to_error_value(0x07), "#DIV/0!");
        assert_eq!(to_error_value(0x99), "#ERROR!");
        assert_eq!(cell(CellType::IsoDateTime, "2025-03-01T08:30:00").to_value(&[]).unwrap(), Value::text("2025-03-01 08:30:00"));
        assert_eq!(cell(CellType::IsoDuration, "PT01H30M00S").to_value(&[]).unwrap(), Value::text("01:30:00"));
    }

    #[test]
    fn shared_strings() {
        let strings = vec!["Ana".to_owned(), "Completed".to_owned()];
        assert_eq!(cell(CellType::SharedString, "1").to_value(&strings).unwrap(), Value::text("Completed"));
        let error = cell(CellType::SharedString, "7").to_value(&strings).unwrap_err();
        assert!(error.to_string().contains("C2"));
    }

    #[test]
    fn dates() {
        assert_eq!(cell(CellType::NumberDate1900, "45658").to_value(&[]).unwrap(), Value::text("2025-01-01"));
        assert_eq!(cell(CellType::NumberDate1904, "0").to_value(&[]).unwrap(), Value::text("1904-01-01"));
        assert_eq!(cell(CellType::NumberTime1900, "0.5").to_value(&[]).unwrap(), Value::text("12:00:00"));
        assert_eq!(cell(CellType::NumberDateTime1900, "45658.75").to_value(&[]).unwrap(), Value::text("2025-01-01 18:00:00"));
        assert!(cell(CellType::NumberDate1900, "soon").to_value(&[]).is_err());
    }

    #[test]
    fn out_of_range_serials_are_invalid() {
        for value in ["1e20", "-1e20", "inf", "9223372036854775807"] {
            let error = cell(CellType::NumberDate1900, value).to_value(&[]).unwrap_err();
            assert!(error.to_string().contains("not a date serial"), "{value}");
        }
        assert!(cell(CellType::NumberDateTime1904, "1e20").to_value(&[]).is_err());
        assert!(cell(CellType::NumberDate1904, "1e15").to_value(&[]).is_err());
    }
}
