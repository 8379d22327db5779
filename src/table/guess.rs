//! Default column choices derived from header names.

/// Returns the first column whose lowercase name contains `needle`,
/// falling back to the column at position `fallback` when none does.
pub fn guess_column(columns: &[String], needle: &str, fallback: usize) -> Option<String> {
    let needle = needle.to_lowercase();
    columns
        .iter()
        .find(|column| column.to_lowercase().contains(&needle))
        .or_else(|| columns.get(fallback))
        .cloned()
}

/// First-name column: contains "first", else position 0.
pub fn first_name(columns: &[String]) -> Option<String> {
    guess_column(columns, "first", 0)
}

/// Last-name column: contains "last", else position 1.
pub fn last_name(columns: &[String]) -> Option<String> {
    guess_column(columns, "last", 1)
}

/// Status column: contains "status", else position 0.
pub fn status(columns: &[String]) -> Option<String> {
    guess_column(columns, "status", 0)
}

/// Range start: the first column in schema order.
pub fn range_start(columns: &[String]) -> Option<String> {
    columns.first().cloned()
}

/// Range end: the last column in schema order.
pub fn range_end(columns: &[String]) -> Option<String> {
    columns.last().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn substring_match_is_case_insensitive_and_first_wins() {
        let columns = columns(&["ID", "FIRST NAME", "Last Name", "First Aid"]);
        assert_eq!(first_name(&columns).as_deref(), Some("FIRST NAME"));
        assert_eq!(last_name(&columns).as_deref(), Some("Last Name"));
    }

    #[test]
    fn falls_back_to_position() {
        let columns = columns(&["Given", "Family", "State"]);
        assert_eq!(first_name(&columns).as_deref(), Some("Given"));
        assert_eq!(last_name(&columns).as_deref(), Some("Family"));
        assert_eq!(status(&columns).as_deref(), Some("Given"));
        assert_eq!(range_start(&columns).as_deref(), Some("Given"));
        assert_eq!(range_end(&columns).as_deref(), Some("State"));
    }

    #[test]
    fn status_guess() {
        let columns = columns(&["Learner", "Course", "Completion Status"]);
        assert_eq!(status(&columns).as_deref(), Some("Completion Status"));
    }

    #[test]
    fn nothing_to_guess_from() {
        let columns = columns(&["Only"]);
        assert_eq!(last_name(&columns), None);
        assert_eq!(range_end(&[]), None);
    }
}
