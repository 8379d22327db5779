//! Text normalization shared by name matching and completion checks.

/// Status literal written into matched training cells.
pub const COMPLETED: &str = "Completed";

/// Trims surrounding whitespace and lowercases.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// True when the text reads "completed" after normalization.
pub fn is_completed(text: &str) -> bool {
    normalize(text) == "completed"
}

/// Joins normalized first and last names into an identity key.
pub fn identity_key(first: &str, last: &str) -> String {
    format!("{} {}", normalize(first), normalize(last))
}
