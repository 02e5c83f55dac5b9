//! Pattern compiler
//!
//! Turns a canonical term into a regex that also recognizes its obfuscated
//! spellings. Every letter becomes a class of the letter plus its confusables,
//! any run of separators may sit between letters, and the whole thing must be
//! delimited by a non-letter or the string boundary on both sides.

use crate::confusables::ConfusableTable;
use modshield_core::{DetectionMatch, Term, TextOrigin};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Separator run allowed between letters and in place of inline spaces
const SEPARATORS: &str = r"[\s._\-]*";

/// Apostrophes accepted in possessive suffixes
const APOSTROPHES: &str = "'’";

/// Default compiled-program size cap per term
pub const DEFAULT_SIZE_LIMIT: usize = 1 << 20;

/// How inflected forms (`-s`, `-es`, `'s`) are caught
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuffixMode {
    /// Plain substring search for `term+s`, `term+es`, `term+'s` at a word start
    #[default]
    Literal,
    /// Suffixes compiled into the confusable matcher as an optional tail
    Obfuscated,
}

/// Why a term could not be compiled
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Nothing left to match after canonicalization
    #[error("term in category '{category}' is empty")]
    EmptyTerm { category: String },

    /// The regex engine rejected the generated pattern
    #[error("pattern for term '{term}' failed to build: {source}")]
    Regex {
        term: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled matcher for exactly one term
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    term: Term,
    regex: Regex,
}

impl CompiledMatcher {
    /// The term this matcher was built from
    pub fn term(&self) -> &Term {
        &self.term
    }

    /// Generated pattern source
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether the term occurs anywhere in `text`
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Matched substrings (boundaries excluded) in order of appearance
    pub fn find_all<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .collect()
    }

    /// Matches as detection records tagged with `origin`
    pub fn detect(&self, text: &str, origin: TextOrigin) -> Vec<DetectionMatch> {
        self.find_all(text)
            .into_iter()
            .map(|matched| DetectionMatch {
                matched: matched.to_string(),
                term: self.term.text.clone(),
                category: self.term.category.clone(),
                origin,
            })
            .collect()
    }
}

/// Builds `CompiledMatcher`s from terms
#[derive(Debug, Clone)]
pub struct PatternCompiler {
    table: Arc<ConfusableTable>,
    size_limit: usize,
    suffix_mode: SuffixMode,
}

impl PatternCompiler {
    /// Create a compiler over a confusable table
    pub fn new(table: Arc<ConfusableTable>) -> Self {
        Self {
            table,
            size_limit: DEFAULT_SIZE_LIMIT,
            suffix_mode: SuffixMode::default(),
        }
    }

    /// Cap the compiled program size per term
    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Choose how inflected forms are handled
    pub fn with_suffix_mode(mut self, suffix_mode: SuffixMode) -> Self {
        self.suffix_mode = suffix_mode;
        self
    }

    /// Configured suffix mode
    pub fn suffix_mode(&self) -> SuffixMode {
        self.suffix_mode
    }

    /// Generate the pattern source for a term without compiling it
    pub fn pattern_for(&self, term: &Term) -> Result<String, CompileError> {
        if term.is_empty() {
            return Err(CompileError::EmptyTerm {
                category: term.category.clone(),
            });
        }

        let atoms: Vec<String> = term
            .text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| self.atom(c))
            .collect();

        let mut body = atoms.join(SEPARATORS);
        if self.suffix_mode == SuffixMode::Obfuscated {
            let e = self.atom('e');
            let s = self.atom('s');
            body.push_str(&format!(
                "(?:{sep}(?:(?:{e})?{s}|[{apos}]{s}))?",
                sep = SEPARATORS,
                apos = APOSTROPHES,
            ));
        }

        Ok(format!(r"(?i)(?:^|[^\p{{L}}])({})(?:$|[^\p{{L}}])", body))
    }

    /// Compile a single term
    pub fn compile(&self, term: &Term) -> Result<CompiledMatcher, CompileError> {
        let pattern = self.pattern_for(term)?;
        let regex = RegexBuilder::new(&pattern)
            .size_limit(self.size_limit)
            .build()
            .map_err(|source| CompileError::Regex {
                term: term.text.clone(),
                source,
            })?;

        Ok(CompiledMatcher {
            term: term.clone(),
            regex,
        })
    }

    /// Regex fragment for one letter of a term
    fn atom(&self, letter: char) -> String {
        let lower = letter.to_lowercase().next().unwrap_or(letter);
        if !self.table.has_letter(lower) {
            return regex::escape(&letter.to_string());
        }

        let mut class = String::from("[");
        class.push_str(&regex::escape(&lower.to_string()));
        let mut sequences = Vec::new();

        for glyph in self.table.substitutes(lower) {
            if glyph.chars().count() == 1 {
                class.push_str(&regex::escape(glyph));
            } else {
                sequences.push(regex::escape(glyph));
            }
        }
        class.push(']');

        if sequences.is_empty() {
            class
        } else {
            format!("(?:{}|{})", class, sequences.join("|"))
        }
    }
}

impl Default for PatternCompiler {
    fn default() -> Self {
        Self::new(Arc::new(ConfusableTable::default()))
    }
}
