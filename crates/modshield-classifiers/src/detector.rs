//! Term detector
//!
//! Runs every compiled matcher over a text and over its normalized form,
//! adds a cheap suffix supplement for inflected forms, and folds the results
//! into a report holding at most one match per term.

use crate::compiler::{CompiledMatcher, PatternCompiler, SuffixMode, DEFAULT_SIZE_LIMIT};
use crate::confusables::ConfusableTable;
use crate::normalizer::Normalizer;
use crate::terms::TermSet;
use aho_corasick::AhoCorasick;
use modshield_core::{DetectionMatch, TextOrigin};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Inflections checked by the literal suffix supplement
const SUFFIXES: &[&str] = &["s", "es", "'s", "’s"];

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// How inflected forms are caught
    #[serde(default)]
    pub suffix_mode: SuffixMode,

    /// Compiled-program size cap per term
    #[serde(default = "default_size_limit")]
    pub regex_size_limit: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            suffix_mode: SuffixMode::default(),
            regex_size_limit: default_size_limit(),
        }
    }
}

fn default_size_limit() -> usize {
    DEFAULT_SIZE_LIMIT
}

/// Deduplicated detection result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionReport {
    by_term: BTreeMap<String, DetectionMatch>,
}

impl DetectionReport {
    /// An empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any term matched
    pub fn is_match(&self) -> bool {
        !self.by_term.is_empty()
    }

    /// Number of distinct terms matched
    pub fn len(&self) -> usize {
        self.by_term.len()
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.by_term.is_empty()
    }

    /// Matched terms, sorted
    pub fn terms(&self) -> BTreeSet<String> {
        self.by_term.keys().cloned().collect()
    }

    /// Matched terms as an owned list, sorted
    pub fn term_list(&self) -> Vec<String> {
        self.by_term.keys().cloned().collect()
    }

    /// One representative match per term, sorted by term
    pub fn matches(&self) -> impl Iterator<Item = &DetectionMatch> {
        self.by_term.values()
    }

    /// The first match by term order
    pub fn first(&self) -> Option<&DetectionMatch> {
        self.by_term.values().next()
    }

    /// Add a match. When the term is already present the smaller
    /// `(origin, matched)` pair is kept, so insertion order never matters.
    pub fn insert(&mut self, found: DetectionMatch) {
        match self.by_term.get_mut(&found.term) {
            Some(existing) => {
                if (found.origin, &found.matched) < (existing.origin, &existing.matched) {
                    *existing = found;
                }
            }
            None => {
                self.by_term.insert(found.term.clone(), found);
            }
        }
    }

    /// Union another report into this one
    pub fn merge(&mut self, other: DetectionReport) {
        for found in other.by_term.into_values() {
            self.insert(found);
        }
    }
}

/// Literal search for `term+suffix` forms
#[derive(Debug, Clone)]
struct SuffixSupplement {
    automaton: AhoCorasick,
    /// pattern index → term index
    owners: Vec<usize>,
}

/// Obfuscation-tolerant term detector
#[derive(Debug, Clone)]
pub struct Detector {
    terms: TermSet,
    matchers: Vec<CompiledMatcher>,
    normalizer: Normalizer,
    suffixes: Option<SuffixSupplement>,
    skipped: usize,
}

impl Detector {
    /// Compile `terms` with the default confusable table
    pub fn new(terms: TermSet, config: &DetectorConfig) -> Self {
        Self::with_table(terms, config, Arc::new(ConfusableTable::default()))
    }

    /// Compile `terms` against a specific confusable table.
    ///
    /// Terms whose pattern fails to build are skipped and logged; the detector
    /// works with whatever compiled.
    pub fn with_table(terms: TermSet, config: &DetectorConfig, table: Arc<ConfusableTable>) -> Self {
        let compiler = PatternCompiler::new(table.clone())
            .with_size_limit(config.regex_size_limit)
            .with_suffix_mode(config.suffix_mode);

        let mut matchers = Vec::with_capacity(terms.len());
        let mut skipped = 0;
        for term in terms.iter() {
            match compiler.compile(term) {
                Ok(matcher) => matchers.push(matcher),
                Err(e) => {
                    skipped += 1;
                    warn!(term = %term.text, category = %term.category, error = %e, "Skipping term");
                }
            }
        }

        let suffixes = match config.suffix_mode {
            SuffixMode::Literal => build_suffix_supplement(&matchers),
            SuffixMode::Obfuscated => None,
        };

        info!(
            compiled = matchers.len(),
            skipped,
            suffix_mode = ?config.suffix_mode,
            "Detector ready"
        );

        Self {
            terms,
            matchers,
            normalizer: Normalizer::new(table),
            suffixes,
            skipped,
        }
    }

    /// A detector with no terms; never matches
    pub fn empty() -> Self {
        Self::new(TermSet::empty(), &DetectorConfig::default())
    }

    /// Loaded terms
    pub fn terms(&self) -> &TermSet {
        &self.terms
    }

    /// Number of compiled matchers
    pub fn matcher_count(&self) -> usize {
        self.matchers.len()
    }

    /// Number of terms that failed to compile
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    /// The normalizer used for the second pass
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Detect terms in a message body
    pub fn detect(&self, text: &str) -> DetectionReport {
        self.detect_variant(text, TextOrigin::Original)
    }

    /// Detect terms in one text variant. The normalized second pass is
    /// tagged `Normalized`.
    pub fn detect_variant(&self, text: &str, origin: TextOrigin) -> DetectionReport {
        let mut report = DetectionReport::new();
        if text.trim().is_empty() || self.matchers.is_empty() {
            return report;
        }

        let start = Instant::now();
        let normalized = self.normalizer.normalize(text);

        for matcher in &self.matchers {
            for found in matcher.detect(text, origin) {
                report.insert(found);
            }
            for found in matcher.detect(&normalized, TextOrigin::Normalized) {
                report.insert(found);
            }
        }

        if let Some(supplement) = &self.suffixes {
            self.supplement(supplement, &text.to_lowercase(), origin, &mut report);
            self.supplement(supplement, &normalized, TextOrigin::Normalized, &mut report);
        }

        debug!(
            origin = %origin,
            matched = report.len(),
            latency_us = start.elapsed().as_micros() as u64,
            "Detection pass complete"
        );
        report
    }

    /// Detect over several variants and union the results
    pub fn detect_all<'a, I>(&self, variants: I) -> DetectionReport
    where
        I: IntoIterator<Item = (TextOrigin, &'a str)>,
    {
        let mut report = DetectionReport::new();
        for (origin, text) in variants {
            report.merge(self.detect_variant(text, origin));
        }
        report
    }

    fn supplement(
        &self,
        supplement: &SuffixSupplement,
        lowered: &str,
        origin: TextOrigin,
        report: &mut DetectionReport,
    ) {
        for hit in supplement.automaton.find_overlapping_iter(lowered) {
            let starts_word = lowered[..hit.start()]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphabetic());
            let ends_word = lowered[hit.end()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphabetic());
            if !starts_word || !ends_word {
                continue;
            }

            let term = self.matchers[supplement.owners[hit.pattern().as_usize()]].term();
            report.insert(DetectionMatch {
                matched: lowered[hit.start()..hit.end()].to_string(),
                term: term.text.clone(),
                category: term.category.clone(),
                origin,
            });
        }
    }
}

fn build_suffix_supplement(matchers: &[CompiledMatcher]) -> Option<SuffixSupplement> {
    let mut patterns = Vec::new();
    let mut owners = Vec::new();
    for (index, matcher) in matchers.iter().enumerate() {
        for suffix in SUFFIXES {
            patterns.push(format!("{}{}", matcher.term().text, suffix));
            owners.push(index);
        }
    }
    if patterns.is_empty() {
        return None;
    }

    match AhoCorasick::new(&patterns) {
        Ok(automaton) => Some(SuffixSupplement { automaton, owners }),
        Err(e) => {
            warn!(error = %e, "Suffix supplement disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modshield_core::Term;

    fn detector(terms: &[&str]) -> Detector {
        let set = TermSet::new(terms.iter().map(|t| Term::new(t, "test")));
        Detector::new(set, &DetectorConfig::default())
    }

    #[test]
    fn test_detects_obfuscated_term() {
        let d = detector(&["cat"]);
        let report = d.detect("you are such a c@t");
        assert!(report.is_match());
        assert_eq!(report.term_list(), vec!["cat"]);
    }

    #[test]
    fn test_normalized_pass_catches_mixed_separators() {
        let d = detector(&["cat"]);
        assert!(d.detect("c a.t").is_match());
        // Zero-width spaces are not whitespace; only the normalized pass sees through them
        let report = d.detect("c\u{200B}a\u{200B}t");
        assert!(report.is_match());
        assert_eq!(report.first().unwrap().origin, TextOrigin::Normalized);
    }

    #[test]
    fn test_suffix_supplement() {
        let d = detector(&["cat"]);
        for text in ["cats everywhere", "the cat's toy", "caTES!", "CATS"] {
            assert!(d.detect(text).is_match(), "expected match for {:?}", text);
        }
        assert!(!d.detect("bobcats").is_match());
    }

    #[test]
    fn test_suffix_supplement_needs_word_end() {
        let d = detector(&["ass", "cat"]);
        for text in [
            "please fill in the assessment",
            "pass the catsup",
            "a catsuit",
        ] {
            assert!(!d.detect(text).is_match(), "unexpected match for {:?}", text);
        }
        assert_eq!(d.detect("two asses").term_list(), vec!["ass"]);
    }

    #[test]
    fn test_no_false_positive_inside_word() {
        let d = detector(&["cat"]);
        assert!(!d.detect("this category is fine").is_match());
    }

    #[test]
    fn test_empty_inputs() {
        let d = detector(&["cat"]);
        assert!(!d.detect("").is_match());
        assert!(!d.detect("   \n\t").is_match());

        let empty = Detector::empty();
        assert!(!empty.detect("cat").is_match());
        assert_eq!(empty.matcher_count(), 0);
    }

    #[test]
    fn test_deduplicates_across_passes() {
        let d = detector(&["cat", "dog"]);
        let report = d.detect("cat c4t c.a.t d0g");
        assert_eq!(report.len(), 2);
        assert_eq!(report.term_list(), vec!["cat", "dog"]);
    }

    #[test]
    fn test_detect_all_is_order_independent() {
        let d = detector(&["cat", "dog"]);
        let a = d.detect_all([
            (TextOrigin::Original, "c@t"),
            (TextOrigin::Translated, "dog and cat"),
        ]);
        let b = d.detect_all([
            (TextOrigin::Translated, "dog and cat"),
            (TextOrigin::Original, "c@t"),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_skips_uncompilable_terms() {
        let set = TermSet::new(vec![Term::new("cat", "test"), Term::new("dog", "test")]);
        let config = DetectorConfig {
            regex_size_limit: 16,
            ..Default::default()
        };
        let d = Detector::new(set, &config);
        assert_eq!(d.matcher_count(), 0);
        assert_eq!(d.skipped_count(), 2);
        assert!(!d.detect("cat").is_match());
    }
}
