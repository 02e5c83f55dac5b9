//! Term list loading
//!
//! Term lists are JSON objects mapping a category to an array of base terms:
//!
//! ```json
//! {
//!   "_comment": "keys and terms starting with '_' are ignored",
//!   "harassment": ["cat", "bad word"]
//! }
//! ```

use modshield_core::{Error, Result, Term};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Ordered, de-duplicated set of terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermSet {
    terms: Vec<Term>,
}

impl TermSet {
    /// A term set that never matches
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from terms, dropping empty ones and keeping the first category
    /// a duplicate term was seen under
    pub fn new(terms: impl IntoIterator<Item = Term>) -> Self {
        let mut seen = HashSet::new();
        let terms = terms
            .into_iter()
            .filter(|term| !term.is_empty())
            .filter(|term| seen.insert(term.text.clone()))
            .collect();
        Self { terms }
    }

    /// Build from `(category, raw terms)` pairs
    pub fn from_categories<I, C, T>(categories: I) -> Self
    where
        I: IntoIterator<Item = (C, Vec<T>)>,
        C: AsRef<str>,
        T: AsRef<str>,
    {
        let mut terms = Vec::new();
        for (category, raw_terms) in categories {
            let category = category.as_ref();
            if category.starts_with('_') {
                continue;
            }
            for raw in raw_terms {
                let raw = raw.as_ref().trim();
                if raw.starts_with('_') {
                    continue;
                }
                terms.push(Term::new(raw, category));
            }
        }
        Self::new(terms)
    }

    /// Parse a JSON term list
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut categories = Vec::new();

        for (category, value) in raw {
            if category.starts_with('_') {
                continue;
            }
            let words = value.as_array().ok_or_else(|| {
                Error::config(format!("term category '{}' must be an array", category))
            })?;
            let words: Vec<String> = words
                .iter()
                .filter_map(|w| w.as_str().map(str::to_string))
                .collect();
            debug!(category = %category, count = words.len(), "Loaded term category");
            categories.push((category, words));
        }

        Ok(Self::from_categories(categories))
    }

    /// Load a JSON term list from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read term list {}: {}", path.display(), e))
        })?;
        let set = Self::from_json(&content)?;
        info!(path = %path.display(), terms = set.len(), "Loaded term list");
        Ok(set)
    }

    /// Terms in load order
    pub fn iter(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter()
    }

    /// Number of terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether there are no terms
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Distinct categories in load order
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.terms
            .iter()
            .map(|t| t.category.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }
}
