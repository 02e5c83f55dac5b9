//! Core types for modshield

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform identifier of a message author
pub type UserId = u64;

/// Contextual harm rating, always an integer in `[1, 10]`.
///
/// Construction clamps out-of-range input, so a `Severity` held anywhere in
/// the system is inside the band. Deserialization clamps as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    /// Lowest band: playful, no malice
    pub const MIN: Severity = Severity(1);

    /// Highest band: severe or threatening
    pub const MAX: Severity = Severity(10);

    /// Create a severity, rejecting values outside `[1, 10]`
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN.0..=Self::MAX.0)
            .contains(&value)
            .then_some(Self(value))
    }

    /// Create a severity from any integer, clamping into `[1, 10]`
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(Self::MIN.0 as i64, Self::MAX.0 as i64) as u8)
    }

    /// Raw integer value
    pub fn get(self) -> u8 {
        self.0
    }
}

impl From<u8> for Severity {
    fn from(value: u8) -> Self {
        Self::clamped(value as i64)
    }
}

impl From<Severity> for u8 {
    fn from(value: Severity) -> Self {
        value.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/10", self.0)
    }
}

/// A canonical base term belonging to a category of disallowed content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    /// Canonical text: lowercase, trimmed, single inner spaces
    pub text: String,

    /// Category the term was loaded under
    pub category: String,
}

impl Term {
    /// Create a term, canonicalizing its text
    pub fn new(text: &str, category: impl Into<String>) -> Self {
        Self {
            text: canonical_term(text),
            category: category.into(),
        }
    }

    /// Whether canonicalization left anything to match
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Canonicalize raw term text: trim, lowercase, collapse inner whitespace
pub fn canonical_term(raw: &str) -> String {
    raw.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Which variant of a message a piece of text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextOrigin {
    /// The message body as sent (plus extracted emoji names)
    Original,
    /// The normalizer's canonical form of another variant
    Normalized,
    /// Machine-translated body
    Translated,
    /// Text extracted from an image attachment
    Ocr,
}

impl fmt::Display for TextOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Original => "original",
            Self::Normalized => "normalized",
            Self::Translated => "translated",
            Self::Ocr => "ocr",
        };
        f.write_str(name)
    }
}

/// One detected occurrence of a term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionMatch {
    /// Substring of the scanned text that matched
    pub matched: String,

    /// Canonical term that produced the match
    pub term: String,

    /// Category of the term
    pub category: String,

    /// Text variant the match was found in
    pub origin: TextOrigin,
}

/// Result of one severity classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityResult {
    /// Whether the judge considered the text harmful
    pub is_harmful: bool,

    /// Harm rating
    pub severity: Severity,

    /// Short explanation
    pub reason: String,

    /// Context tag (playful / neutral / hostile / ...)
    pub context: String,
}

impl SeverityResult {
    /// Create a result from its parts
    pub fn new(
        is_harmful: bool,
        severity: Severity,
        reason: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            is_harmful,
            severity,
            reason: reason.into(),
            context: context.into(),
        }
    }
}

/// A recorded incident. Append-only once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Offending author
    pub user_id: UserId,

    /// When the incident was recorded
    pub timestamp: DateTime<Utc>,

    /// Severity the verdict was based on (real or fallback)
    pub severity: Severity,

    /// Category of the first triggering term, or `classifier` when none
    pub category: String,

    /// First triggering term, if the detector matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,

    /// Free-text reason
    pub reason: String,

    /// Context tag from the severity classifier, if it ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// What the author sent
    #[serde(flatten)]
    pub evidence: Evidence,
}

/// Message content kept with a violation for later review
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Message body as sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Translated body, when it differs from the original
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated: Option<String>,

    /// Text extracted from image attachments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ocr: Vec<String>,

    /// Attachment locations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl Violation {
    /// Create a violation stamped with the current time
    pub fn new(
        user_id: UserId,
        severity: Severity,
        category: impl Into<String>,
        term: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            timestamp: Utc::now(),
            severity,
            category: category.into(),
            term,
            reason: reason.into(),
            context: None,
            evidence: Evidence::default(),
        }
    }

    /// Attach the classifier's context tag
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Attach the message content
    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }
}
