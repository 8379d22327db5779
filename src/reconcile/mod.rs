//! # Reconciliation
//!
//! The two core stages: [`Matcher`] marks master records as completed from an
//! export snapshot, then [`RangeHighlighter`] flags records whose whole range
//! of training columns is complete.
pub mod highlighter;
pub mod matcher;

pub use highlighter::Highlight;
pub use highlighter::RangeHighlighter;
pub use matcher::MatchColumns;
pub use matcher::MatchReport;
pub use matcher::Matcher;
pub use matcher::Update;
