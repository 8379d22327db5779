//! Conversions between zero-based (row, col) indexes and A1-style references.

/// Converts a zero-based column index to its letters (0 -> "A", 26 -> "AA").
pub(crate) fn index_to_col(col: usize) -> String {
    let mut letters = Vec::<u8>::new();
    let mut remain = col + 1;
    while remain > 0 {
        remain -= 1;
        letters.push(b'A' + (remain % 26) as u8);
        remain /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Converts zero-based (row, col) to a reference such as "B3".
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", index_to_col(col), row + 1)
}

/// Converts column letters to a zero-based index ("A" -> 0). Case-insensitive.
pub(crate) fn col_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    letters.bytes().try_fold(0usize, |index, byte| {
        let byte = byte.to_ascii_uppercase();
        byte.is_ascii_uppercase()
            .then(|| index * 26 + (byte - b'A') as usize + 1)
    }).map(|index| index - 1)
}

/// Converts a one-based row number to a zero-based index ("1" -> 0).
pub(crate) fn row_to_index(digits: &str) -> Option<usize> {
    digits.parse::<usize>().ok().and_then(|row| row.checked_sub(1))
}

/// Converts a reference such as "B3" (or "$B$3") to zero-based (row, col).
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    Some((row_to_index(digits)?, col_to_index(letters)?))
}
