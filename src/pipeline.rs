//! # Pipeline
//!
//! One invocation: read both tables, match, highlight, and hand back an
//! [`Outcome`] the caller can serialize. Nothing is persisted here.
use crate::error::RosterError;
use crate::helpers::reader::Source;
use crate::reconcile::Highlight;
use crate::reconcile::MatchColumns;
use crate::reconcile::MatchReport;
use crate::reconcile::Matcher;
use crate::reconcile::RangeHighlighter;
use crate::spreadsheet::read_table;
use crate::spreadsheet::writer::Fill;
use crate::spreadsheet::writer::XlsxWriter;
use crate::table::guess;
use crate::table::Table;
use log::debug;
use std::fmt::Display;
use std::io::Seek;
use std::io::Write;

/// Caller choices for one run. Unset columns are guessed from the headers.
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Master column that receives "Completed"; never guessed
    pub training: String,
    /// First column of the highlight range; defaults to the first master column
    pub range_start: Option<String>,
    /// Last column of the highlight range; defaults to the last master column
    pub range_end: Option<String>,
    pub master_first: Option<String>,
    pub master_last: Option<String>,
    pub export_first: Option<String>,
    pub export_last: Option<String>,
    pub status: Option<String>,
    /// Sheet name glob for the master workbook; the first sheet when unset
    pub master_sheet: Option<String>,
    /// Sheet name glob for the export workbook; the first sheet when unset
    pub export_sheet: Option<String>,
}

impl Options {
    pub fn new(training: &str) -> Options {
        Options {
            training: training.to_owned(),
            ..Options::default()
        }
    }

    /// Resolves column choices against the loaded tables.
    ///
    /// # Returns
    /// The matcher columns and the highlighter, with guesses filled in
    pub fn resolve(&self, master: &Table, export: &Table) -> Result<(MatchColumns, RangeHighlighter), RosterError> {
        if self.training.trim().is_empty() {
            Err(RosterError::InvalidOption {
                name: "training".to_owned(),
                message: "a training column is required".to_owned(),
            })?
        }
        let columns = MatchColumns {
            master_first: choose(&self.master_first, master, "first name", guess::first_name)?,
            master_last: choose(&self.master_last, master, "last name", guess::last_name)?,
            export_first: choose(&self.export_first, export, "first name", guess::first_name)?,
            export_last: choose(&self.export_last, export, "last name", guess::last_name)?,
            status: choose(&self.status, export, "status", guess::status)?,
            training: self.training.to_owned(),
        };
        let start = choose(&self.range_start, master, "range start", guess::range_start)?;
        let end = choose(&self.range_end, master, "range end", guess::range_end)?;
        debug!("columns {:?}, range '{}' to '{}'", columns, start, end);
        Ok((columns, RangeHighlighter::new(&start, &end)))
    }
}

/// Explicit choice first, then the header guess.
fn choose(
    explicit: &Option<String>,
    table: &Table,
    role: &str,
    guess: fn(&[String]) -> Option<String>,
) -> Result<String, RosterError> {
    explicit
        .clone()
        .or_else(|| guess(table.columns()))
        .ok_or_else(|| RosterError::ColumnNotFound {
            table: table.name.to_owned(),
            column: role.to_owned(),
        })
}

/// Counts reported after a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total: usize,
    pub matched: usize,
    pub updated: usize,
    pub highlighted: usize,
}

impl Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total records:       {}", self.total)?;
        writeln!(f, "Matched records:     {}", self.matched)?;
        writeln!(f, "Updated records:     {}", self.updated)?;
        write!(f, "Highlighted rows:    {}", self.highlighted)
    }
}

/// Result of a run: the updated master table plus what happened to it.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub table: Table,
    pub report: MatchReport,
    pub highlight: Highlight,
}

impl Outcome {
    pub fn statistics(&self) -> Statistics {
        Statistics {
            total: self.table.len(),
            matched: self.report.matched,
            updated: self.report.updated,
            highlighted: self.highlight.count,
        }
    }

    /// Serializes the updated table with flagged rows filled.
    pub fn write_xlsx<W: Write + Seek>(&self, fill: Fill, writer: W) -> Result<W, RosterError> {
        XlsxWriter::new(fill).write(&self.table, &self.highlight.flags, writer)
    }

    /// Serializes into a fresh buffer, for callers that persist or upload it themselves.
    pub fn to_xlsx_bytes(&self, fill: Fill) -> Result<Vec<u8>, RosterError> {
        XlsxWriter::new(fill).to_bytes(&self.table, &self.highlight.flags)
    }
}

/// Matches, then highlights. Training updates land before the range is evaluated.
pub fn run(options: &Options, mut master: Table, export: Table) -> Result<Outcome, RosterError> {
    let (columns, highlighter) = options.resolve(&master, &export)?;
    // Validate the range before the master is touched
    highlighter.positions(&master)?;
    let report = Matcher::new(columns).apply(&mut master, &export)?;
    let highlight = highlighter.evaluate(&master)?;
    Ok(Outcome {
        table: master,
        report,
        highlight,
    })
}

/// Reads both workbooks, then [`run`]s.
pub fn run_sources(options: &Options, master: Source, export: Source) -> Result<Outcome, RosterError> {
    let master = read_table(master, options.master_sheet.as_deref())?;
    let export = read_table(export, options.export_sheet.as_deref())?;
    run(options, master, export)
}
