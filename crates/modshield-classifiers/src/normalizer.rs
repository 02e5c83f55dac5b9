//! Text normalizer
//!
//! Deterministic, idempotent canonicalization used as the detector's second
//! pass and to give the severity judge a de-obfuscated view of the text:
//!
//! 1. lowercase
//! 2. drop zero-width / invisible characters
//! 3. replace single-glyph confusables with their canonical ASCII letter
//! 4. remove separator runs (whitespace, `.`, `_`, `-`) that sit directly
//!    between two letters
//!
//! Step 4 works on maximal runs, so a second pass finds nothing left to do.

use crate::confusables::ConfusableTable;
use std::sync::Arc;

/// Normalizes text against a confusable table
#[derive(Debug, Clone)]
pub struct Normalizer {
    table: Arc<ConfusableTable>,
}

impl Normalizer {
    /// Create a normalizer over a confusable table
    pub fn new(table: Arc<ConfusableTable>) -> Self {
        Self { table }
    }

    /// Normalize `text`
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mapped: Vec<char> = text
            .to_lowercase()
            .chars()
            .filter(|c| !is_invisible(*c))
            .map(|c| self.table.canonical(c).unwrap_or(c))
            .collect();

        collapse_separators(&mapped)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Arc::new(ConfusableTable::default()))
    }
}

/// Separator characters the matcher tolerates between letters
pub fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | '_' | '-')
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

fn collapse_separators(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !is_separator(c) {
            out.push(c);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && is_separator(chars[i]) {
            i += 1;
        }

        let between_letters = start > 0
            && chars[start - 1].is_alphabetic()
            && i < chars.len()
            && chars[i].is_alphabetic();

        if !between_letters {
            out.extend(&chars[start..i]);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_replaces_confusables() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.normalize("H3LL0"), "hello");
        assert_eq!(normalizer.normalize("c@t"), "cat");
        assert_eq!(normalizer.normalize("çαt"), "cat");
        assert_eq!(normalizer.normalize("$h!+"), "shit");
    }

    #[test]
    fn test_collapses_separators_between_letters() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.normalize("c.a.t"), "cat");
        assert_eq!(normalizer.normalize("c a t"), "cat");
        assert_eq!(normalizer.normalize("c - a _ t"), "cat");
    }

    #[test]
    fn test_keeps_separators_next_to_non_letters() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.normalize("hi, there"), "hi, there");
        assert_eq!(normalizer.normalize("  lead"), "  lead");
        assert_eq!(normalizer.normalize("tail. "), "tail. ");
    }

    #[test]
    fn test_strips_invisible_characters() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.normalize("c\u{200B}a\u{200D}t"), "cat");
    }

    #[test]
    fn test_empty() {
        assert_eq!(Normalizer::default().normalize(""), "");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(text in "\\PC{0,64}") {
            let normalizer = Normalizer::default();
            let once = normalizer.normalize(&text);
            let twice = normalizer.normalize(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_idempotent_on_obfuscation_alphabet(text in "[a-z4@301!|$+ ._\\-αçоі]{0,48}") {
            let normalizer = Normalizer::default();
            let once = normalizer.normalize(&text);
            prop_assert_eq!(normalizer.normalize(&once), once);
        }
    }
}
