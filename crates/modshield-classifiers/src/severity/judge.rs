//! Judgment-service seam
//!
//! One call to the external service with one credential. The failover loop
//! decides what to do with the outcome; implementations only classify what
//! went wrong.

use super::credentials::Credential;
use async_trait::async_trait;
use std::fmt;

/// Why a single credential attempt did not produce a judgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptErrorKind {
    /// Credential rejected (401/403)
    Auth,
    /// Rate limited or out of quota (429)
    Quota,
    /// Request rejected as malformed (400)
    BadRequest,
    /// Service-side error status (5xx)
    Server,
    /// Attempt exceeded its timeout
    Timeout,
    /// Connection or protocol failure
    Transport,
    /// Response arrived but no judgment could be extracted
    MalformedPayload,
    /// Not credential-specific; trying another credential cannot help
    Fatal,
}

impl AttemptErrorKind {
    /// Metric/log label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Quota => "quota",
            Self::BadRequest => "bad_request",
            Self::Server => "server",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::MalformedPayload => "malformed_payload",
            Self::Fatal => "fatal",
        }
    }

    /// Map an HTTP status to an attempt error kind
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::Quota,
            500..=599 => Self::Server,
            _ => Self::BadRequest,
        }
    }
}

impl fmt::Display for AttemptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed credential attempt
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AttemptError {
    /// Failure class
    pub kind: AttemptErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl AttemptError {
    /// Create an attempt error
    pub fn new(kind: AttemptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the next credential should be tried
    pub fn is_retryable(&self) -> bool {
        self.kind != AttemptErrorKind::Fatal
    }
}

/// External contextual-judgment service
#[async_trait]
pub trait JudgmentService: Send + Sync {
    /// Submit `prompt` using `credential`; returns the raw response text
    async fn judge(&self, credential: &Credential, prompt: &str) -> Result<String, AttemptError>;

    /// Service name for logs
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AttemptErrorKind::from_status(401), AttemptErrorKind::Auth);
        assert_eq!(AttemptErrorKind::from_status(403), AttemptErrorKind::Auth);
        assert_eq!(AttemptErrorKind::from_status(429), AttemptErrorKind::Quota);
        assert_eq!(AttemptErrorKind::from_status(400), AttemptErrorKind::BadRequest);
        assert_eq!(AttemptErrorKind::from_status(503), AttemptErrorKind::Server);
    }

    #[test]
    fn test_only_fatal_stops_rotation() {
        assert!(AttemptError::new(AttemptErrorKind::Quota, "x").is_retryable());
        assert!(AttemptError::new(AttemptErrorKind::MalformedPayload, "x").is_retryable());
        assert!(!AttemptError::new(AttemptErrorKind::Fatal, "x").is_retryable());
    }
}
