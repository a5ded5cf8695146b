//! Unicode block ranges accepted as single-code-point identifiers.
//!
//! Emojicode identifiers are names drawn from the emoji/pictographic
//! blocks of Unicode; §4.A requires this set to be declared explicitly
//! rather than inferred from a general "is emoji" predicate, since not
//! every block the Unicode emoji data file lists is desirable as an
//! identifier (e.g. skin-tone modifiers, regional indicators).
const IDENTIFIER_RANGES: &[(char, char)] = &[
    ('\u{2600}', '\u{27BF}'),   // Miscellaneous Symbols, Dingbats
    ('\u{1F300}', '\u{1F5FF}'), // Miscellaneous Symbols and Pictographs
    ('\u{1F600}', '\u{1F64F}'), // Emoticons
    ('\u{1F680}', '\u{1F6FF}'), // Transport and Map Symbols
    ('\u{1F900}', '\u{1F9FF}'), // Supplemental Symbols and Pictographs
    ('\u{1FA70}', '\u{1FAFF}'), // Symbols and Pictographs Extended-A
];

pub fn is_identifier_char(c: char) -> bool {
    IDENTIFIER_RANGES
        .iter()
        .any(|(lo, hi)| *lo <= c && c <= *hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_pictographs() {
        assert!(is_identifier_char('\u{1F431}'));
        assert!(is_identifier_char('\u{1F600}'));
    }

    #[test]
    fn rejects_ascii() {
        assert!(!is_identifier_char('a'));
        assert!(!is_identifier_char('9'));
    }
}
