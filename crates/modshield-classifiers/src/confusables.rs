//! Confusable table
//!
//! Maps each canonical lowercase letter to the glyphs a reader may take for
//! it: digits and symbols, accented forms, and homoglyphs from other scripts.
//! Multi-character stand-ins ("vv" for w, "rn" for m) are allowed here; the
//! pattern compiler turns them into alternations and the normalizer ignores
//! them.

use std::collections::{BTreeMap, HashMap};

/// Built-in substitutions. Letter order matters for normalization: when a glyph
/// is registered under two letters, the alphabetically first letter wins.
const DEFAULT_CONFUSABLES: &[(char, &[&str])] = &[
    ('a', &["4", "@", "α", "а", "à", "á", "â", "ã", "ä", "å", "ā", "ą"]),
    ('b', &["8", "β", "ь"]),
    ('c', &["(", "<", "с", "ç", "ć", "č", "¢"]),
    ('d', &["ԁ", "đ", "ď"]),
    ('e', &["3", "€", "ε", "е", "è", "é", "ê", "ë", "ē", "ę", "ě"]),
    ('f', &["ƒ"]),
    ('g', &["9", "q", "ğ", "ġ"]),
    ('h', &["н", "һ"]),
    ('i', &["1", "!", "|", "l", "ı", "і", "ì", "í", "î", "ï", "ī", "¡"]),
    ('j', &["ј"]),
    ('k', &["κ", "к"]),
    ('l', &["1", "|", "ł", "ĺ", "ľ"]),
    ('m', &["rn", "м"]),
    ('n', &["η", "п", "ñ", "ń", "ň"]),
    ('o', &["0", "ο", "о", "ò", "ó", "ô", "õ", "ö", "ø", "ō"]),
    ('p', &["р", "ρ"]),
    ('q', &["ԛ"]),
    ('r', &["г", "ŕ", "ř"]),
    ('s', &["5", "$", "ş", "ѕ", "š", "ś", "§"]),
    ('t', &["7", "+", "τ", "т", "ţ", "ť"]),
    ('u', &["v", "υ", "ù", "ú", "û", "ü", "ū", "µ"]),
    ('v', &["ν"]),
    ('w', &["vv", "ω", "ш", "ŵ"]),
    ('x', &["х", "×", "χ"]),
    ('y', &["у", "ý", "ÿ", "ŷ", "γ"]),
    ('z', &["2", "ž", "ź", "ż"]),
];

/// Letter → look-alike glyphs, plus the reverse single-glyph mapping
#[derive(Debug, Clone)]
pub struct ConfusableTable {
    substitutions: BTreeMap<char, Vec<String>>,
    canonical: HashMap<char, char>,
}

impl ConfusableTable {
    /// Build a table from `(letter, glyphs)` entries
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (char, Vec<S>)>,
        S: Into<String>,
    {
        let mut substitutions: BTreeMap<char, Vec<String>> = BTreeMap::new();
        for (letter, glyphs) in entries {
            let letter = letter.to_ascii_lowercase();
            let slot = substitutions.entry(letter).or_default();
            for glyph in glyphs {
                let glyph = glyph.into();
                if !glyph.is_empty() && !slot.contains(&glyph) {
                    slot.push(glyph);
                }
            }
        }

        let mut canonical = HashMap::new();
        for (letter, glyphs) in &substitutions {
            for glyph in glyphs {
                let mut chars = glyph.chars();
                if let (Some(c), None) = (chars.next(), chars.next()) {
                    // ASCII letters stay themselves; "l" must not collapse into "i".
                    if !c.is_ascii_alphabetic() {
                        canonical.entry(c).or_insert(*letter);
                    }
                }
            }
        }

        Self {
            substitutions,
            canonical,
        }
    }

    /// Glyphs registered for `letter` (the letter itself excluded)
    pub fn substitutes(&self, letter: char) -> &[String] {
        self.substitutions
            .get(&letter.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `letter` has any registered substitutes
    pub fn has_letter(&self, letter: char) -> bool {
        self.substitutions.contains_key(&letter.to_ascii_lowercase())
    }

    /// Canonical ASCII letter for a single confusable glyph
    pub fn canonical(&self, glyph: char) -> Option<char> {
        self.canonical.get(&glyph).copied()
    }

    /// Iterate `(letter, glyphs)` entries in letter order
    pub fn iter(&self) -> impl Iterator<Item = (char, &[String])> {
        self.substitutions.iter().map(|(c, g)| (*c, g.as_slice()))
    }
}

impl Default for ConfusableTable {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONFUSABLES
                .iter()
                .map(|(letter, glyphs)| (*letter, glyphs.to_vec())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_canonicalization_matches_leet_conventions() {
        let table = ConfusableTable::default();
        assert_eq!(table.canonical('4'), Some('a'));
        assert_eq!(table.canonical('@'), Some('a'));
        assert_eq!(table.canonical('3'), Some('e'));
        assert_eq!(table.canonical('1'), Some('i'));
        assert_eq!(table.canonical('0'), Some('o'));
        assert_eq!(table.canonical('$'), Some('s'));
        assert_eq!(table.canonical('+'), Some('t'));
        assert_eq!(table.canonical('α'), Some('a'));
        assert_eq!(table.canonical('ç'), Some('c'));
    }

    #[test]
    fn test_ascii_letters_never_remapped() {
        let table = ConfusableTable::default();
        assert_eq!(table.canonical('l'), None);
        assert_eq!(table.canonical('q'), None);
        assert_eq!(table.canonical('v'), None);
    }

    #[test]
    fn test_multi_char_glyphs_kept_for_patterns_only() {
        let table = ConfusableTable::default();
        assert!(table.substitutes('w').iter().any(|g| g == "vv"));
        assert!(table.substitutes('m').iter().any(|g| g == "rn"));
        assert_eq!(table.canonical('r'), None);
    }

    #[test]
    fn test_custom_table_dedups() {
        let table = ConfusableTable::new(vec![('A', vec!["4", "4", ""])]);
        assert_eq!(table.substitutes('a'), &["4".to_string()]);
        assert!(table.has_letter('a'));
        assert!(!table.has_letter('b'));
    }
}
