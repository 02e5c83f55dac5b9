//! Severity classification
//!
//! Asks an external judgment service to grade a text on a 1-10 rubric,
//! rotating through a pool of credentials on failure.

pub mod credentials;
pub mod failover;
pub mod gemini;
pub mod judge;
pub mod response;
pub mod rubric;

pub use credentials::{Credential, CredentialPool, CREDENTIALS_KEY, CURSOR_KEY};
pub use failover::{FailoverClassifier, DEFAULT_ATTEMPT_TIMEOUT};
pub use gemini::GeminiJudge;
pub use judge::{AttemptError, AttemptErrorKind, JudgmentService};
pub use response::parse_judgment;
pub use rubric::build_prompt;

use async_trait::async_trait;
use modshield_core::SeverityResult;

/// Outcome of a classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    /// The service produced a usable judgment
    Judged(SeverityResult),
    /// No credential produced a usable judgment
    Unavailable,
}

impl Assessment {
    /// The judgment, if any
    pub fn judged(&self) -> Option<&SeverityResult> {
        match self {
            Self::Judged(result) => Some(result),
            Self::Unavailable => None,
        }
    }

    /// Whether a judgment was produced
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Judged(_))
    }
}

/// Grades a text for contextual harm
#[async_trait]
pub trait SeverityClassifier: Send + Sync {
    /// Classify `text`, given the terms the detector found in it
    async fn classify(&self, text: &str, detected_terms: &[String]) -> Assessment;

    /// Classifier name for logs
    fn name(&self) -> &str;
}
