use crate::error::RosterError;
use glob::Pattern;

/// Criteria for selecting which sheet of a workbook becomes the table.
#[derive(Clone, Debug, Default)]
pub(crate) struct Criteria {
    /// Sheet name pattern; the first matching sheet is read. None reads the first sheet.
    pub(crate) sheet_name_pattern: Option<Pattern>,
}

impl Criteria {
    /// Builds criteria from an optional glob such as "Roster*".
    pub(crate) fn new(sheet_name: Option<&str>) -> Result<Self, RosterError> {
        Ok(Criteria {
            sheet_name_pattern: sheet_name.map(Pattern::new).transpose()?,
        })
    }

    /// Checks if a sheet name matches the criteria pattern.
    /// Returns true if no pattern is specified.
    pub(crate) fn accept(&self, sheet_name: &str) -> bool {
        self.sheet_name_pattern
            .as_ref()
            .map(|pattern| pattern.matches(sheet_name))
            .unwrap_or(true)
    }

    /// Pattern text for error messages.
    pub(crate) fn describe(&self) -> String {
        self.sheet_name_pattern
            .as_ref()
            .map(|pattern| pattern.as_str().to_owned())
            .unwrap_or_else(|| "*".to_owned())
    }
}
