//! modshield classifiers
//!
//! Detection and grading stages of the moderation engine.
//!
//! Two stages are provided:
//! - Detection (microseconds, in-memory): confusable-aware pattern matching
//!   over the raw text and its normalized form, with a suffix supplement
//! - Severity (network-bound): an external judgment service grades the text
//!   on a 1-10 rubric, with sticky multi-credential failover
//!
//! Detection never blocks. Severity calls are bounded per attempt.

pub mod compiler;
pub mod confusables;
pub mod detector;
pub mod emoji;
pub mod normalizer;
pub mod severity;
pub mod terms;

pub use compiler::{CompileError, CompiledMatcher, PatternCompiler, SuffixMode};
pub use confusables::ConfusableTable;
pub use detector::{DetectionReport, Detector, DetectorConfig};
pub use emoji::extract_emoji_names;
pub use normalizer::Normalizer;
pub use severity::{
    Assessment, AttemptError, AttemptErrorKind, Credential, CredentialPool, FailoverClassifier,
    GeminiJudge, JudgmentService, SeverityClassifier,
};
pub use terms::TermSet;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::detector::{DetectionReport, Detector, DetectorConfig};
    pub use crate::normalizer::Normalizer;
    pub use crate::severity::{Assessment, SeverityClassifier};
    pub use crate::terms::TermSet;
}
