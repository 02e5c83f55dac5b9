//! Gemini `generateContent` judgment client

use super::credentials::Credential;
use super::judge::{AttemptError, AttemptErrorKind, JudgmentService};
use async_trait::async_trait;
use modshield_core::{Error, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Public Gemini REST endpoint
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Longest slice of an error body kept in attempt errors
const MAX_ERROR_BODY: usize = 200;

/// HTTP judgment client for the Gemini API
#[derive(Debug, Clone)]
pub struct GeminiJudge {
    client: Client,
    endpoint: String,
    model: String,
}

impl GeminiJudge {
    /// Create a client against `endpoint` for `model`
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::classifier(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Client for the public endpoint and default model
    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_MODEL)
    }

    /// Configured model
    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl JudgmentService for GeminiJudge {
    async fn judge(&self, credential: &Credential, prompt: &str) -> std::result::Result<String, AttemptError> {
        let request = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.0 }
        });

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", credential.secret())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(AttemptError::new(
                AttemptErrorKind::from_status(status.as_u16()),
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        let data: Value = response.json().await.map_err(|e| {
            AttemptError::new(AttemptErrorKind::MalformedPayload, e.to_string())
        })?;

        let text = response_text(&data).ok_or_else(|| {
            AttemptError::new(AttemptErrorKind::MalformedPayload, "response has no candidate text")
        })?;
        debug!(model = %self.model, chars = text.len(), "Judgment received");
        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Concatenated text parts of the first candidate
fn response_text(data: &Value) -> Option<String> {
    let parts = data["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    (!text.trim().is_empty()).then_some(text)
}

fn transport_error(e: reqwest::Error) -> AttemptError {
    let kind = if e.is_timeout() {
        AttemptErrorKind::Timeout
    } else if e.is_builder() {
        AttemptErrorKind::Fatal
    } else {
        AttemptErrorKind::Transport
    };
    AttemptError::new(kind, e.without_url().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url() {
        let judge = GeminiJudge::new("https://example.test/v1beta/", "gemini-test").unwrap();
        assert_eq!(
            judge.url(),
            "https://example.test/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn test_response_text_joins_parts() {
        let data = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"severity\":" }, { "text": " 3}" }] } }]
        });
        assert_eq!(response_text(&data).unwrap(), "{\"severity\": 3}");
        assert!(response_text(&json!({ "candidates": [] })).is_none());
        assert!(response_text(&json!({ "error": "x" })).is_none());
    }
}
