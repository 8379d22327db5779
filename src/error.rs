use thiserror::Error;

/// Main error type for roster reconciliation.
/// Aggregates errors from the standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum RosterError {
    // Domain errors
    #[error("Column '{column}' not found in {table}")]
    ColumnNotFound { table: String, column: String },

    #[error("Malformed input '{0}': {1}")]
    MalformedInput(String, String),

    #[error("No sheet matching '{pattern}' in '{file_name}'")]
    SheetNotFound { file_name: String, pattern: String },

    #[error("Empty highlight range: column '{start}' comes after column '{end}'")]
    EmptyRange { start: String, end: String },

    #[error("Invalid option '{name}': {message}")]
    InvalidOption { name: String, message: String },

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    XlsxWriterError(#[from] rust_xlsxwriter::XlsxError),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    Biff8HelperError(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    OdsError(#[from] crate::spreadsheet::ods::OdsError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),
}

impl RosterError {
    /// Folds low-level parsing failures into a single `MalformedInput` for `file_name`.
    /// Domain errors and plain I/O errors pass through unchanged.
    pub(crate) fn into_malformed(self, file_name: &str) -> RosterError {
        match self {
            error @ (RosterError::ColumnNotFound { .. }
            | RosterError::MalformedInput(..)
            | RosterError::SheetNotFound { .. }
            | RosterError::EmptyRange { .. }
            | RosterError::InvalidOption { .. }
            | RosterError::IoError(_)) => error,
            error => RosterError::MalformedInput(file_name.to_owned(), error.to_string()),
        }
    }
}

pub(crate) trait ResultMessage {
    fn malformed(self, file_name: &str) -> Self;
}

impl<T> ResultMessage for Result<T, RosterError> {
    fn malformed(self, file_name: &str) -> Self {
        self.map_err(|e| e.into_malformed(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failures_become_malformed_input() {
        let error = RosterError::from("x".parse::<usize>().unwrap_err()).into_malformed("roster.xlsx");
        assert!(matches!(error, RosterError::MalformedInput(ref name, _) if name == "roster.xlsx"));
    }

    #[test]
    fn domain_errors_pass_through() {
        let error = RosterError::ColumnNotFound {
            table: "master".to_owned(),
            column: "Email".to_owned(),
        }.into_malformed("roster.xlsx");
        assert!(matches!(error, RosterError::ColumnNotFound { .. }));
        assert_eq!(error.to_string(), "Column 'Email' not found in master");
    }
}
