//! Message source and outcome records
//!
//! Inbound messages arrive as JSON lines; each processed message produces one
//! outcome line for the platform layer to act on.

use modshield_core::{Error, Result, Severity, UserId};
use modshield_policy::{Decision, EscalationRule, Verdict};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A file attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type reported by the platform
    #[serde(default)]
    pub content_type: Option<String>,

    /// Local path of the downloaded file
    pub path: PathBuf,
}

impl Attachment {
    /// Whether this attachment should go through OCR
    pub fn is_image(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.starts_with("image/"),
            None => self
                .path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .is_some_and(|e| matches!(e.as_str(), "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp")),
        }
    }
}

/// One message to moderate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message id, echoed in the outcome
    #[serde(default)]
    pub id: Option<String>,

    /// Author
    pub author_id: UserId,

    /// Author's role ids
    #[serde(default)]
    pub role_ids: Vec<u64>,

    /// Message body
    #[serde(default)]
    pub text: String,

    /// Attached files
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    /// A text-only message
    pub fn text(author_id: UserId, text: impl Into<String>) -> Self {
        Self {
            id: None,
            author_id,
            role_ids: Vec::new(),
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Parse one JSON line; blank lines yield `None`
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(Error::from)
    }
}

/// What happened to one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Echo of the message id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Author
    pub author_id: UserId,

    /// Verdict
    pub verdict: Verdict,

    /// Severity behind the verdict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Detected terms, sorted
    pub terms: Vec<String>,

    /// Explanation
    pub reason: String,

    /// Sanction tier reached, when a violation was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationRule>,
}

impl Outcome {
    /// Build from a policy decision
    pub fn from_decision(message: &InboundMessage, decision: Decision, escalation: Option<EscalationRule>) -> Self {
        Self {
            id: message.id.clone(),
            author_id: message.author_id,
            verdict: decision.verdict,
            severity: decision.severity,
            terms: decision.terms,
            reason: decision.reason,
            escalation,
        }
    }

    /// An ignore outcome that never reached the policy engine
    pub fn ignored(message: &InboundMessage, reason: impl Into<String>) -> Self {
        Self::from_decision(message, Decision::ignore(reason), None)
    }
}
