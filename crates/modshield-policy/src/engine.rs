//! Policy evaluation engine
//!
//! Turns a detection report and the configured mode into a verdict. Each mode
//! is one arm of a single dispatch; the classifier is consulted only where the
//! mode calls for it.

use crate::mode::{Mode, ModerationConfig};
use modshield_classifiers::{Assessment, DetectionReport, SeverityClassifier};
use modshield_core::{Severity, UserId, Violation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Category recorded when no detector term triggered the violation
pub const CLASSIFIER_CATEGORY: &str = "classifier";

/// What the platform layer should do with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Nothing to do; no violation recorded
    Ignore,
    /// Record the violation but leave the content
    LogOnly,
    /// Remove the content and notify
    Act,
}

impl Verdict {
    /// Metric/log label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::LogOnly => "log_only",
            Self::Act => "act",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a decision's severity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeveritySource {
    /// No severity was needed
    None,
    /// Judged by the severity classifier
    Classifier,
    /// Calm-mode fallback for an unavailable classifier
    Fallback,
    /// Relax mode: any match is maximum severity
    Relax,
}

/// Outcome of evaluating one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Verdict
    pub verdict: Verdict,

    /// Severity the verdict was based on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Where the severity came from
    pub source: SeveritySource,

    /// Explanation
    pub reason: String,

    /// Context tag from the classifier, if it ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Detected terms, sorted
    pub terms: Vec<String>,

    /// Category of the first detected term
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Decision {
    /// An ignore verdict
    pub fn ignore(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Ignore,
            severity: None,
            source: SeveritySource::None,
            reason: reason.into(),
            context: None,
            terms: Vec::new(),
            category: None,
        }
    }

    /// Whether this decision produces a violation record
    pub fn records_violation(&self) -> bool {
        self.verdict != Verdict::Ignore
    }

    /// The violation to record for `user_id`, if any
    pub fn to_violation(&self, user_id: UserId) -> Option<Violation> {
        if !self.records_violation() {
            return None;
        }
        Some(Violation::new(
            user_id,
            self.severity.unwrap_or(Severity::MAX),
            self.category.as_deref().unwrap_or(CLASSIFIER_CATEGORY),
            self.terms.first().cloned(),
            self.reason.clone(),
        )
        .with_context(self.context.clone()))
    }
}

/// Stateless evaluator; configuration is passed per call
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// Create an engine
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one message.
    ///
    /// `report` is the union of detections over every text variant and
    /// `judged_text` is what the classifier sees.
    pub async fn evaluate(
        &self,
        config: &ModerationConfig,
        report: &DetectionReport,
        judged_text: &str,
        classifier: &dyn SeverityClassifier,
    ) -> Decision {
        if !config.enabled {
            return Decision::ignore("moderation disabled");
        }

        let terms = report.term_list();
        let category = report.first().map(|m| m.category.clone());
        let threshold = config.threshold();

        let decision = match config.mode {
            Mode::Strict => {
                match classifier.classify(judged_text, &terms).await {
                    Assessment::Unavailable => {
                        info!(terms = ?terms, "Classifier unavailable in strict mode, allowing");
                        Decision {
                            terms,
                            category,
                            ..Decision::ignore("classifier unavailable, allowed")
                        }
                    }
                    Assessment::Judged(result) => {
                        let verdict = if result.severity >= threshold {
                            Verdict::Act
                        } else if report.is_match() {
                            Verdict::LogOnly
                        } else {
                            Verdict::Ignore
                        };
                        Decision {
                            verdict,
                            severity: Some(result.severity),
                            source: SeveritySource::Classifier,
                            reason: judged_reason(&result.reason, result.severity),
                            context: Some(result.context),
                            terms,
                            category,
                        }
                    }
                }
            }

            Mode::Calm | Mode::Relax if !report.is_match() => {
                return Decision::ignore("no terms detected");
            }

            Mode::Calm => {
                let (severity, source, reason, context) =
                    match classifier.classify(judged_text, &terms).await {
                        Assessment::Judged(result) => (
                            result.severity,
                            SeveritySource::Classifier,
                            judged_reason(&result.reason, result.severity),
                            Some(result.context),
                        ),
                        Assessment::Unavailable => {
                            let fallback = config.calm_fallback();
                            info!(severity = fallback.get(), "Classifier unavailable, using fallback severity");
                            (
                                fallback,
                                SeveritySource::Fallback,
                                format!("classifier unavailable, fallback severity {}", fallback),
                                None,
                            )
                        }
                    };
                Decision {
                    verdict: threshold_verdict(severity, threshold),
                    severity: Some(severity),
                    source,
                    reason: format!("detected: {} - {}", terms.join(", "), reason),
                    context,
                    terms,
                    category,
                }
            }

            Mode::Relax => Decision {
                verdict: threshold_verdict(Severity::MAX, threshold),
                severity: Some(Severity::MAX),
                source: SeveritySource::Relax,
                reason: format!("detected: {}", terms.join(", ")),
                context: None,
                terms,
                category,
            },
        };

        debug!(
            mode = %config.mode,
            verdict = %decision.verdict,
            severity = ?decision.severity.map(Severity::get),
            "Policy evaluated"
        );
        decision
    }
}

fn threshold_verdict(severity: Severity, threshold: Severity) -> Verdict {
    if severity >= threshold {
        Verdict::Act
    } else {
        Verdict::LogOnly
    }
}

fn judged_reason(reason: &str, severity: Severity) -> String {
    if reason.is_empty() {
        format!("severity {}", severity)
    } else {
        format!("severity {}: {}", severity, reason)
    }
}
