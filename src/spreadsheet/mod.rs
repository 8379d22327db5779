//! # Spreadsheet Processing Module
//!
//! Reads Office Open XML workbooks (.xlsx, .xlsm, .xltx, .xltm), Excel 97-2003
//! workbooks (.xls) and OpenDocument spreadsheets (.ods) into [`Table`]s, and
//! writes reconciled tables back out as .xlsx with highlighted rows.
use crate::error::ResultMessage;
use crate::error::RosterError;
use crate::helpers::cfb;
use crate::helpers::reader::Source;
use crate::helpers::reader::UnifiedReader;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::ods::OdsSpreadsheet;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use crate::table::Table;
use log::debug;
use log::info;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;
use zip::ZipArchive;

pub(crate) mod cell;
pub(crate) mod criteria;
pub(crate) mod excel;
pub(crate) mod ods;
pub(crate) mod reference;
pub(crate) mod sheet;
pub mod writer;
pub(crate) mod xls;
pub(crate) mod xlsx;

#[cfg(test)]
pub(crate) use cell::Cell;
#[cfg(test)]
pub(crate) use sheet::Sheet;

/// Errors raised while decoding spreadsheet containers.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Unsupported spreadsheet format '{0}'")]
    UnsupportedFormatError(String),

    #[error("Missing part '{0}'")]
    FileError(String),

    #[error("Spreadsheet '{0}' has no worksheets")]
    SpreadsheetEmptyError(String),

    #[error("Invalid cell value at {0}: {1}")]
    CellValueError(String, String),

    #[error("Sheet {0} spans {1} rows x {2} columns, too large to load")]
    SheetTooLargeError(String, usize, usize),
}

/// Common interface of the workbook readers.
pub(crate) trait Spreadsheet {
    /// Returns the workbook display name
    fn name(&self) -> String;

    /// Sheet names in workbook order, when known without scanning content
    fn sheet_names(&self) -> Vec<String>;

    /// Reads the first sheet accepted by the criteria, with its shared string table
    fn read_sheet(&mut self, criteria: &Criteria) -> Result<(sheet::Sheet, Vec<String>), RosterError>;
}

/// Container formats recognised by the readers.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Format {
    Xlsx,
    Xls,
    Ods,
}

/// Picks the reader from the file extension, or sniffs uploads without one.
fn detect_format(source: &Source) -> Result<Format, RosterError> {
    match source.extension().as_deref() {
        Some("xlsx" | "xlsm" | "xltx" | "xltm") => Ok(Format::Xlsx),
        Some("xls") => Ok(Format::Xls),
        Some("ods") => Ok(Format::Ods),
        Some(extension) if matches!(source, Source::File(_)) => {
            Err(SpreadsheetError::UnsupportedFormatError(extension.to_owned()))?
        }
        _ => sniff_format(source),
    }
}

/// Inspects in-memory bytes: ODS archives carry a MIME type entry.
fn sniff_format(source: &Source) -> Result<Format, RosterError> {
    if let Source::Memory { bytes, .. } = source {
        if let Ok(mut zip) = ZipArchive::new(std::io::Cursor::new(bytes.as_slice())) {
            if ods::has_ods_mime(&mut zip)? {
                return Ok(Format::Ods);
            }
        }
    }
    Ok(Format::Xlsx)
}

/// Opens a workbook from a path or an uploaded buffer.
pub(crate) fn open_spreadsheet(source: Source) -> Result<Box<dyn Spreadsheet>, RosterError> {
    let file_name = source.name();
    let format = detect_format(&source)?;
    let mut reader = UnifiedReader::new(source)?;
    // Encrypted OOXML packages are compound files too, whatever their extension
    let format = if is_compound_file(&mut reader)? { Format::Xls } else { format };
    debug!("{}: opening as {:?}", file_name, format);
    let spreadsheet: Box<dyn Spreadsheet> = match format {
        Format::Xlsx => Box::new(XlsxSpreadsheet::open(&file_name, reader)?),
        Format::Xls => Box::new(XlsSpreadsheet::open(&file_name, reader)?),
        Format::Ods => Box::new(OdsSpreadsheet::open(&file_name, reader)?),
    };
    Ok(spreadsheet)
}

/// Checks for the OLE compound file signature and rewinds the reader
fn is_compound_file(reader: &mut UnifiedReader) -> Result<bool, RosterError> {
    let mut signature = [0u8; 8];
    let matched = match reader.read_exact(&mut signature) {
        Ok(()) => signature == cfb::SIGNATURE,
        Err(_) => false,
    };
    reader.seek(SeekFrom::Start(0))?;
    Ok(matched)
}

/// Reads one sheet of a workbook into a table, using its first occupied row as header.
///
/// `sheet_name` is a glob pattern; the first matching sheet is read, and `None`
/// reads the first sheet. Any decoding failure is reported as `MalformedInput`.
pub fn read_table(source: Source, sheet_name: Option<&str>) -> Result<Table, RosterError> {
    let file_name = source.name();
    let criteria = Criteria::new(sheet_name).map_err(|error| RosterError::InvalidOption {
        name: "sheet".to_owned(),
        message: error.to_string(),
    })?;
    let table = open_spreadsheet(source)
        .and_then(|mut spreadsheet| {
            debug!("{}: sheets {:?}", spreadsheet.name(), spreadsheet.sheet_names());
            spreadsheet.read_sheet(&criteria)
        })
        .and_then(|(sheet, shared_strings)| sheet.into_table(&shared_strings))
        .malformed(&file_name)?;
    info!("{}: loaded {} records with {} columns", table.name, table.len(), table.columns().len());
    Ok(table)
}
