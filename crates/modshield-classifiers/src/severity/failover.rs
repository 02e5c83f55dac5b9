//! Multi-credential failover classifier

use super::credentials::{Credential, CredentialPool};
use super::judge::{AttemptError, AttemptErrorKind, JudgmentService};
use super::response::parse_judgment;
use super::rubric::build_prompt;
use super::{Assessment, SeverityClassifier};
use crate::normalizer::Normalizer;
use async_trait::async_trait;
use metrics::counter;
use modshield_core::SeverityResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-attempt timeout used when none is configured
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);

/// Severity classifier that rotates through a credential pool.
///
/// Each call tries credentials starting at the pool's cursor and wraps once,
/// so at most N attempts are made for N credentials. The first parseable
/// judgment wins and its credential becomes the new cursor. Exhaustion yields
/// `Assessment::Unavailable` and leaves the cursor alone.
pub struct FailoverClassifier {
    pool: Arc<CredentialPool>,
    judge: Arc<dyn JudgmentService>,
    normalizer: Normalizer,
    attempt_timeout: Duration,
}

impl FailoverClassifier {
    /// Create a classifier over a pool and a judgment service
    pub fn new(pool: Arc<CredentialPool>, judge: Arc<dyn JudgmentService>) -> Self {
        Self {
            pool,
            judge,
            normalizer: Normalizer::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Bound each attempt
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Use a specific normalizer for the prompt's de-obfuscated form
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// The credential pool
    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    async fn attempt(
        &self,
        index: usize,
        credential: &Credential,
        prompt: &str,
    ) -> Result<SeverityResult, AttemptError> {
        let raw = tokio::time::timeout(self.attempt_timeout, self.judge.judge(credential, prompt))
            .await
            .map_err(|_| {
                AttemptError::new(
                    AttemptErrorKind::Timeout,
                    format!("no response within {}ms", self.attempt_timeout.as_millis()),
                )
            })??;
        debug!(credential = index, "Parsing judgment");
        parse_judgment(&raw)
    }
}

#[async_trait]
impl SeverityClassifier for FailoverClassifier {
    async fn classify(&self, text: &str, detected_terms: &[String]) -> Assessment {
        let rotation = self.pool.rotation();
        if rotation.is_empty() {
            warn!("No judgment credentials configured");
            counter!("modshield_classifier_unavailable_total").increment(1);
            return Assessment::Unavailable;
        }

        let normalized = self.normalizer.normalize(text);
        let prompt = build_prompt(text, detected_terms, Some(&normalized));

        for (index, credential) in rotation {
            match self.attempt(index, &credential, &prompt).await {
                Ok(result) => {
                    counter!("modshield_classifier_attempts_total", "outcome" => "ok").increment(1);
                    self.pool.commit(index);
                    info!(
                        credential = index,
                        severity = result.severity.get(),
                        context = %result.context,
                        "Judgment complete"
                    );
                    return Assessment::Judged(result);
                }
                Err(e) => {
                    counter!("modshield_classifier_attempts_total", "outcome" => e.kind.as_str())
                        .increment(1);
                    warn!(
                        credential = index,
                        masked = %credential.masked(),
                        kind = %e.kind,
                        error = %e.message,
                        "Judgment attempt failed"
                    );
                    if !e.is_retryable() {
                        break;
                    }
                }
            }
        }

        warn!(service = self.judge.name(), "All judgment credentials exhausted");
        counter!("modshield_classifier_unavailable_total").increment(1);
        Assessment::Unavailable
    }

    fn name(&self) -> &str {
        self.judge.name()
    }
}
