use crate::error::RosterError;
use crate::helpers::reader::UnifiedReader;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use log::debug;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::io::Read;
use thiserror::Error;
use zip::ZipArchive;

/// ODS file MIME type identifier
pub(crate) const MIME_TYPE: &[u8] = b"application/vnd.oasis.opendocument.spreadsheet";
/// XML element name for spreadsheet root
const SPREADSHEET: QName = QName(b"office:spreadsheet");
/// XML element name for table (sheet)
const TABLE: QName = QName(b"table:table");
/// XML element name for table row
const TABLE_ROW: QName = QName(b"table:table-row");
/// XML element name for table cell
const TABLE_CELL: QName = QName(b"table:table-cell");
/// XML element name for covered table cell (merged cells)
const TABLE_COVERED_CELL: QName = QName(b"table:covered-table-cell");
/// XML element name for annotations (comments)
const ANNOTATION: QName = QName(b"office:annotation");
/// XML element name for paragraph text
const PARAGRAPH: QName = QName(b"text:p");
/// XML element name for string (space) text
const STRING: QName = QName(b"text:s");

/// Error types specific to ODS processing
#[derive(Error, Debug)]
pub enum OdsError {
    /// Invalid ODS MIME type detected in file
    #[error("Invalid ODS MIME type")]
    MimeTypeError,

    /// Password protected document
    #[error("ODS file '{0}' is password protected")]
    PasswordProtectedError(String),
}

/// ODS spreadsheet handler for reading OpenDocument Spreadsheet files
pub(crate) struct OdsSpreadsheet {
    /// Name of the ODS file
    pub(crate) name: String,
    /// ZIP archive containing the ODS file contents
    zip: ZipArchive<UnifiedReader>,
}

impl OdsSpreadsheet {
    /// Opens an ODS document and validates its format
    pub(crate) fn open(file_name: &str, reader: UnifiedReader) -> Result<Self, RosterError> {
        let mut zip = ZipArchive::new(reader)?;
        check_mime(&mut zip)?;
        if is_password_protected(&mut zip)? {
            Err(OdsError::PasswordProtectedError(file_name.to_owned()))?;
        }
        Ok(OdsSpreadsheet {
            name: file_name.to_owned(),
            zip,
        })
    }
}

impl Spreadsheet for OdsSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    /// ODS sheet names live inside content.xml, which is only scanned by `read_sheet`.
    fn sheet_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Reads the first table accepted by the criteria.
    /// ODS stores strings inline, so no shared string table is returned.
    fn read_sheet(&mut self, criteria: &Criteria) -> Result<(Sheet, Vec<String>), RosterError> {
        let file_name = self.name.to_owned();
        let mut reader = self.zip
            .xml_reader("content.xml")?
            .ok_or_else(|| SpreadsheetError::FileError("content.xml".to_owned()))?;
        let mut sheet_name = None::<String>;
        match_xml_events!(reader => {
            Event::End(event) if event.name() == SPREADSHEET => break,
            Event::Start(event) if event.name() == TABLE => {
                let table_name = event.get_attribute_value("table:name")?.unwrap_or_default();
                if criteria.accept(&table_name) {
                    sheet_name = Some(table_name.to_string());
                    break;
                }
            }
        });
        let sheet_name = sheet_name.ok_or_else(|| RosterError::SheetNotFound {
            file_name: file_name.to_owned(),
            pattern: criteria.describe(),
        })?;
        debug!("{}: reading table '{}'", file_name, sheet_name);

        let mut sheet = Sheet::new(&file_name, &sheet_name);
        let mut row = 0usize;
        let mut col = 0usize;
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        let mut element_context = false; // reading string content
        let mut comment_context = false; // inside an annotation
        match_xml_events!(reader => {
            Event::End(event) if event.name() == TABLE => break,
            Event::Start(event) if event.name() == TABLE_ROW => {
                row_count = event.parse_attribute_value("table:number-rows-repeated")?.unwrap_or(1);
                col = 0;
            }
            Event::End(event) if event.name() == TABLE_ROW => {
                row += row_count;
            }
            Event::Start(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                value.clear();
                col_count = event.parse_attribute_value::<usize>("table:number-columns-repeated")?.unwrap_or(1);
                let value_type = event.get_attribute_value("office:value-type")?;
                let is_error = event.get_attribute_value("calcext:value-type")?
                    .map(|cow| cow == "error")
                    .unwrap_or(false);
                kind = match value_type.as_deref() {
                    Some("boolean") => CellType::Boolean,
                    Some("date") => CellType::IsoDateTime,
                    Some("time") => CellType::IsoDuration,
                    Some("string") if is_error => CellType::Error,
                    Some("string") => CellType::InlineString,
                    Some(_) => CellType::Number,
                    None => CellType::Empty,
                };
                match value_type.as_deref() {
                    Some("string") => element_context = true,
                    Some("boolean") => if event.get_attribute_value("office:boolean-value")?.map(|cow| cow != "false" && cow != "0").unwrap_or(false) {
                        value.push('1');
                    } else {
                        value.push('0');
                    },
                    Some("date") => if let Some(data) = event.get_attribute_value("office:date-value")? {
                        value.push_str(&data);
                    },
                    Some("time") => if let Some(data) = event.get_attribute_value("office:time-value")? {
                        value.push_str(&data);
                    },
                    Some(_) => if let Some(data) = event.get_attribute_value("office:value")? {
                        value.push_str(&data);
                    },
                    None => (),
                }
            }
            Event::End(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                if kind != CellType::Empty && !value.is_empty() {
                    for row_offset in 0..row_count {
                        for col_offset in 0..col_count {
                            sheet.push(Cell {
                                row: row + row_offset,
                                col: col + col_offset,
                                kind,
                                value: value.to_owned(),
                            });
                        }
                    }
                }
                col += col_count;
                element_context = false;
                comment_context = false;
            }
            Event::Start(event) if element_context && event.name() == ANNOTATION => comment_context = true,
            Event::End(event) if element_context && comment_context && event.name() == ANNOTATION => comment_context = false,
            Event::Start(event) if element_context && !comment_context && event.name() == PARAGRAPH => {
                if !value.is_empty() {
                    value.push('\n');
                }
            }
            Event::Start(event) if element_context && !comment_context && event.name() == STRING => {
                let count = event.parse_attribute_value("text:c")?.unwrap_or(1);
                for _ in 0..count {
                    value.push(' ');
                }
            }
            Event::Text(event) if element_context && !comment_context => value.push_bytes_text(&event)?,
            Event::GeneralRef(event) if element_context && !comment_context => value.push_bytes_ref(&event)?,
        });
        Ok((sheet, Vec::new()))
    }
}

/// Returns true if the archive carries the ODS MIME type entry
pub(crate) fn has_ods_mime<RS: Read + std::io::Seek>(zip: &mut ZipArchive<RS>) -> Result<bool, RosterError> {
    if let Some(file) = zip.file("mimetype")? {
        let mut buffer = Vec::with_capacity(MIME_TYPE.len());
        file.take(MIME_TYPE.len() as u64).read_to_end(&mut buffer)?;
        return Ok(buffer == MIME_TYPE);
    }
    Ok(false)
}

/// Validates the MIME type entry when present
fn check_mime(zip: &mut ZipArchive<UnifiedReader>) -> Result<(), RosterError> {
    if zip.file("mimetype")?.is_some() && !has_ods_mime(zip)? {
        Err(OdsError::MimeTypeError)?;
    }
    Ok(())
}

/// Checks the manifest for encryption data
fn is_password_protected(zip: &mut ZipArchive<UnifiedReader>) -> Result<bool, RosterError> {
    let mut reader = match zip.xml_reader("META-INF/manifest.xml")? {
        Some(reader) => reader,
        None => return Ok(false),
    };
    let mut in_file_entry = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == QName(b"manifest:file-entry") => in_file_entry = true,
        Event::End(event) if event.name() == QName(b"manifest:file-entry") => in_file_entry = false,
        Event::Start(event) if in_file_entry && event.name() == QName(b"manifest:encryption-data") => {
            return Ok(true);
        }
    });
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::reader::Source;
    use crate::helpers::zip::ZipWriterHelper;
    use crate::table::Value;
    use std::io::Cursor;
    use zip::ZipWriter;

    const CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0">
<office:body><office:spreadsheet>
<table:table table:name="Notes"><table:table-row><table:table-cell office:value-type="string"><text:p>ignore</text:p></table:table-cell></table:table-row></table:table>
<table:table table:name="Export">
<table:table-row>
<table:table-cell office:value-type="string"><text:p>First Name</text:p></table:table-cell>
<table:table-cell office:value-type="string"><text:p>Last Name</text:p></table:table-cell>
<table:table-cell office:value-type="string"><text:p>Status</text:p></table:table-cell>
<table:table-cell office:value-type="string"><text:p>Score</text:p></table:table-cell>
</table:table-row>
<table:table-row>
<table:table-cell office:value-type="string"><text:p>Bo</text:p><office:annotation><text:p>note</text:p></office:annotation></table:table-cell>
<table:table-cell office:value-type="string"><text:p>Wu<text:s text:c="2"/>Jr</text:p></table:table-cell>
<table:table-cell office:value-type="string"><text:p>Completed</text:p></table:table-cell>
<table:table-cell office:value-type="float" office:value="95"/>
</table:table-row>
<table:table-row table:number-rows-repeated="2">
<table:table-cell table:number-columns-repeated="2" office:value-type="string"><text:p>x</text:p></table:table-cell>
<table:table-cell table:number-columns-repeated="1020"/>
</table:table-row>
</table:table>
</office:spreadsheet></office:body></office:document-content>"#;

    fn document() -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.entry("mimetype", MIME_TYPE).unwrap();
        zip.entry("content.xml", CONTENT.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn reads_matching_table() {
        let reader = UnifiedReader::new(Source::memory("export.ods", document())).unwrap();
        let mut spreadsheet = OdsSpreadsheet::open("export.ods", reader).unwrap();
        let criteria = Criteria::new(Some("Exp*")).unwrap();
        let (sheet, shared_strings) = spreadsheet.read_sheet(&criteria).unwrap();
        let table = sheet.into_table(&shared_strings).unwrap();

        assert_eq!(table.name, "export.ods [Export]");
        assert_eq!(table.columns(), &["First Name", "Last Name", "Status", "Score"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[0], vec![
            Value::text("Bo"),
            Value::text("Wu  Jr"),
            Value::text("Completed"),
            Value::Number(95.0),
        ]);
        assert_eq!(table.rows()[2], vec![Value::text("x"), Value::text("x"), Value::Empty, Value::Empty]);
    }

    #[test]
    fn missing_table_is_reported() {
        let reader = UnifiedReader::new(Source::memory("export.ods", document())).unwrap();
        let mut spreadsheet = OdsSpreadsheet::open("export.ods", reader).unwrap();
        let criteria = Criteria::new(Some("Roster")).unwrap();
        let error = spreadsheet.read_sheet(&criteria).err().unwrap();
        assert!(matches!(error, RosterError::SheetNotFound { .. }));
    }

    #[test]
    fn wrong_mime_type() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.entry("mimetype", b"application/vnd.oasis.opendocument.text").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let reader = UnifiedReader::new(Source::memory("notes.odt", bytes)).unwrap();
        assert!(OdsSpreadsheet::open("notes.odt", reader).is_err());
    }
}
