use crate::error::RosterError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::helpers::reader::UnifiedReader;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use encoding_rs::WINDOWS_1252;
use log::debug;
use std::collections::HashMap;
use thiserror::Error;

// BIFF8 record type identifiers
const FORMULA: u16 = 6;         // Formula with its cached result
const EOF: u16 = 10;            // End of a substream
const DATE1904: u16 = 34;       // Date system flag (1904 vs 1900 base)
const FILE_PASS: u16 = 47;      // Encryption header
const CODE_PAGE: u16 = 66;      // Encoding of compressed strings
const BOUND_SHEET8: u16 = 133;  // Sheet name, type and stream position
const MUL_RK: u16 = 189;        // Run of RK numbers in one row
const XF: u16 = 224;            // Extended format, links cells to number formats
const SST: u16 = 252;           // Shared string table
const LABEL_SST: u16 = 253;     // Cell referencing the shared string table
const NUMBER: u16 = 515;        // Floating point cell
const LABEL: u16 = 516;         // Inline string cell
const BOOL_ERR: u16 = 517;      // Boolean or error cell
const STRING: u16 = 519;        // String result of the preceding formula
const ARRAY: u16 = 545;         // Array formula, may precede STRING
const TABLE: u16 = 566;         // Data table formula, may precede STRING
const RK: u16 = 638;            // Compressed number cell
const FORMAT: u16 = 1054;       // Custom number format
const SHARED_FORMULA: u16 = 1212; // Shared formula, may precede STRING
const BOF: u16 = 2057;          // Beginning of a substream

const BIFF8_VERSION: u16 = 0x0600;
const CODE_PAGE_UTF16: u16 = 1200;
// BoundSheet8 sheet type of plain worksheets (charts, macros and modules are skipped)
const SHEET_TYPE_WORKSHEET: u8 = 0;

/// Error types specific to XLS file parsing
#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Invalid code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid formula value '{0:#018X}'")]
    FormulaValueError(u64),

    #[error("Unsupported BIFF version '{0:#06X}'; only Excel 97-2003 workbooks can be read")]
    BiffVersionError(u16),

    #[error("Spreadsheet '{0}' is password protected")]
    PasswordProtectedError(String),
}

/// Reader for Excel 97-2003 workbooks (.xls)
pub(crate) struct XlsSpreadsheet {
    /// File name of the workbook
    pub(crate) name: String,
    /// Reader over the whole workbook stream
    reader: Biff8Reader,
    /// Shared string table, loaded with the workbook globals
    shared_strings: Vec<String>,
    /// Parsed number formats for cell type detection, indexed by XF id
    number_formats: Vec<CellType>,
    /// Worksheets as (name, stream position) pairs in workbook order
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Opens a compound file and reads the workbook globals
    ///
    /// # Arguments
    /// * `file_name` - Display name of the workbook
    /// * `reader` - Compound file bytes
    ///
    /// # Returns
    /// The workbook with its shared strings, formats and worksheet list
    pub(crate) fn open(file_name: &str, mut reader: UnifiedReader) -> Result<XlsSpreadsheet, RosterError> {
        let cfb = Cfb::new(&mut reader)?;
        if cfb.exists("EncryptedPackage") {
            Err(XlsError::PasswordProtectedError(file_name.to_owned()))?
        }
        let stream = match cfb.read("Workbook")? {
            Some(stream) => Some(stream),
            None => cfb.read("Book")?,
        };
        let mut reader = stream
            .map(Biff8Reader::new)
            .ok_or_else(|| SpreadsheetError::FileError("Workbook".to_owned()))?;
        check_version(&mut reader)?;

        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: Vec<(String, String)> = Vec::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(XlsError::PasswordProtectedError(file_name.to_owned()))?,
            DATE1904 => is_1904 = reader.read_u16()? == 1,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                // Strings flagged as 16-bit are always UTF-16; this covers the 8-bit ones
                reader.encoding = match code_page {
                    CODE_PAGE_UTF16 => WINDOWS_1252,
                    _ => codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?,
                };
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.push((id.to_string(), format));
            }
            XF => {
                reader.skip(2)?;
                let id = reader.read_u16()?;
                format_indexes.push(id.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                let _visibility = reader.read_u8()?;
                let sheet_type = reader.read_u8()?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                if sheet_type == SHEET_TYPE_WORKSHEET {
                    sheets.push((sheet_name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
        }

        let custom_formats: HashMap<String, CellType> = custom_formats
            .into_iter()
            .map(|(id, format)| (id, CellType::parse_custom_number_format(&format, is_1904)))
            .collect();
        let number_formats = load_number_formats(format_indexes, custom_formats, is_1904);
        debug!("{}: {} worksheets, {} shared strings", file_name, sheets.len(), shared_strings.len());

        Ok(XlsSpreadsheet {
            name: file_name.to_owned(),
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    /// Cell type of an XF index; unknown indexes read as plain numbers
    fn number_format(&self, index: usize) -> CellType {
        self.number_formats.get(index).copied().unwrap_or(CellType::Number)
    }

    /// Reads every cell record of the worksheet substream at `pointer`
    fn read_cells(&mut self, sheet_name: &str, pointer: usize) -> Result<Sheet, RosterError> {
        let mut sheet = Sheet::new(&self.name, sheet_name);
        self.reader.goto(pointer);
        if self.reader.next()? != Some(BOF) {
            Err(SpreadsheetError::FileError(format!("worksheet '{sheet_name}'")))?
        }
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = usize::from(self.reader.read_u16()?);
                    let first_col = usize::from(self.reader.read_u16()?);
                    // 6-byte RkRec entries, then the last column index
                    let count = self.reader.remaining().saturating_sub(2) / 6;
                    for col in first_col..first_col + count {
                        let index = usize::from(self.reader.read_u16()?);
                        let value = self.reader.read_rk_number()?;
                        sheet.push(Cell {
                            row,
                            col,
                            kind: self.number_format(index),
                            value: value.to_string(),
                        });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = usize::from(self.reader.read_u16()?);
                    let col = usize::from(self.reader.read_u16()?);
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let kind = match either {
                        Either::Left(kind) => kind,
                        Either::Right(index) => self.number_format(index),
                    };
                    if !value.is_empty() {
                        sheet.push(Cell { row, col, kind, value });
                    }
                }
                _ => (),
            }
        }
        Ok(sheet)
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Reads the first worksheet accepted by the criteria.
    fn read_sheet(&mut self, criteria: &Criteria) -> Result<(Sheet, Vec<String>), RosterError> {
        let (sheet_name, pointer) = self.sheets
            .iter()
            .find(|(sheet_name, _)| criteria.accept(sheet_name))
            .cloned()
            .ok_or_else(|| RosterError::SheetNotFound {
                file_name: self.name.to_owned(),
                pattern: criteria.describe(),
            })?;
        debug!("{}: reading worksheet '{}' at offset {}", self.name, sheet_name, pointer);
        let sheet = self.read_cells(&sheet_name, pointer)?;
        Ok((sheet, self.shared_strings.to_owned()))
    }
}

/// Requires the workbook stream to open with a BIFF8 BOF record
fn check_version(reader: &mut Biff8Reader) -> Result<(), RosterError> {
    if reader.next()? != Some(BOF) {
        Err(SpreadsheetError::FileError("BOF".to_owned()))?
    }
    let version = reader.read_u16()?;
    if version != BIFF8_VERSION {
        Err(XlsError::BiffVersionError(version))?
    }
    Ok(())
}

/// Loads the shared string table from the SST record and its CONTINUE records
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, RosterError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    // The count is untrusted; every string takes at least 3 bytes
    let mut shared_strings = Vec::with_capacity(count.min(reader.remaining() / 3));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

/// Reads a BOOL_ERR record: a boolean, or an error code rendered as its literal
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let is_error = reader.read_u8()? != 0;
    Ok(if is_error {
        (Either::Left(CellType::Error), to_error_value(value).to_owned())
    } else {
        (Either::Left(CellType::Boolean), value.to_string())
    })
}

/// Reads a NUMBER record; the XF index decides whether it is a date
fn read_number_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    let index = usize::from(reader.read_u16()?);
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

/// Reads an RK record
fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    let index = usize::from(reader.read_u16()?);
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value.to_string()))
}

/// Reads a LABEL_SST record; the value is the shared string index
fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    reader.skip(2)?;
    let value = reader.read_usize()?;
    Ok((Either::Left(CellType::SharedString), value.to_string()))
}

/// Reads a LABEL record
fn read_label_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::InlineString), value))
}

/// Reads the cached result of a FORMULA record
///
/// Numbers are stored in place. Other results mark the top two bytes with
/// 0xFFFF and put the result type in the first byte: 0 string (in a following
/// STRING record), 1 boolean, 2 error, 3 empty string.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), RosterError> {
    let index = usize::from(reader.read_u16()?);
    let formula = reader.read_u64()?;
    if (formula & 0xFFFF_0000_0000_0000) != 0xFFFF_0000_0000_0000 {
        return Ok((Either::Right(index), f64::from_bits(formula).to_string()));
    }
    let result = ((formula >> 16) & 0xFF) as u8;
    match formula & 0xFF {
        0 => Ok((Either::Left(CellType::InlineString), read_formula_string(reader, formula)?)),
        1 => Ok((Either::Left(CellType::Boolean), if result != 0 { "1" } else { "0" }.to_owned())),
        2 => Ok((Either::Left(CellType::Error), to_error_value(result).to_owned())),
        3 => Ok((Either::Left(CellType::InlineString), String::new())),
        _ => Err(XlsError::FormulaValueError(formula).into()),
    }
}

/// Reads the STRING record that carries a formula's text result
fn read_formula_string(reader: &mut Biff8Reader, formula: u64) -> Result<String, RosterError> {
    while let Some(tag) = reader.next()? {
        match tag {
            STRING => return reader.read_xl_unicode_string(),
            SHARED_FORMULA | ARRAY | TABLE => continue,
            _ => break,
        }
    }
    Err(XlsError::FormulaValueError(formula).into())
}
