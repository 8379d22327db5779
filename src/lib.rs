//! # Roster Training Reconciliation
//!
//! Reconciles a master roster against an export of training-completion
//! records, and writes the updated roster as an .xlsx workbook where rows with
//! a fully completed range of training columns are highlighted.
//!
//! ## Features
//!
//! - **Spreadsheet input**: Excel (`.xlsx`, `.xlsm`, `.xltx`, `.xltm`), Excel
//!   97-2003 (`.xls`) and OpenDocument (`.ods`) workbooks, from disk or from an
//!   uploaded buffer
//! - **Name matching**: first and last names compared after trimming and
//!   lowercasing, on both tables with the same rule
//! - **Range highlighting**: a positional range of columns, flagged when every
//!   cell reads "completed"
//! - **Column guessing**: name and status columns default to header matches
//! - **XLSX output**: bold header and a solid fill on flagged rows
//!
//! ## Usage
//!
//! ```no_run
//! use roster_sync::pipeline::{run_sources, Options};
//! use roster_sync::{Fill, Source};
//!
//! let options = Options::new("Training B");
//! let outcome = run_sources(&options, Source::file("main.xlsx"), Source::file("export.xlsx"))?;
//! let bytes = outcome.to_xlsx_bytes(Fill::default())?;
//! std::fs::write("updated_training_file.xlsx", bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod error;
mod helpers;
pub mod pipeline;
pub mod reconcile;
pub mod spreadsheet;
pub mod table;

pub use error::RosterError;
pub use helpers::reader::Source;
pub use helpers::string::normalize;
pub use helpers::string::COMPLETED;
pub use spreadsheet::read_table;
pub use spreadsheet::writer::Fill;
pub use spreadsheet::writer::XlsxWriter;
pub use table::Table;
pub use table::Value;
