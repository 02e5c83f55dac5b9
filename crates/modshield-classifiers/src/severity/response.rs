//! Tolerant judgment parsing
//!
//! Models wrap JSON in code fences or prose and occasionally break it. The
//! payload is located heuristically, parsed strictly, and if that fails the
//! fields are pulled out with lightweight patterns. A missing or corrupt
//! severity becomes the maximum band.

use super::judge::{AttemptError, AttemptErrorKind};
use modshield_core::{Severity, SeverityResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::debug;

const DEFAULT_CONTEXT: &str = "unknown";

/// Parse a raw judgment into a `SeverityResult`
pub fn parse_judgment(raw: &str) -> Result<SeverityResult, AttemptError> {
    let payload = extract_payload(raw);

    if let Some(result) = parse_strict(payload).or_else(|| parse_strict(brace_slice(payload)?)) {
        return Ok(result);
    }

    debug!("Strict parse failed, trying field extraction");
    parse_lenient(raw).ok_or_else(|| {
        let preview: String = raw.chars().take(80).collect();
        AttemptError::new(
            AttemptErrorKind::MalformedPayload,
            format!("no judgment fields in response: {:?}", preview),
        )
    })
}

/// Locate the structured payload: a ```json fence, then any fence, then the
/// outermost braces
pub fn extract_payload(raw: &str) -> &str {
    if let Some(inner) = fenced(raw, "```json") {
        return inner;
    }
    if let Some(inner) = fenced(raw, "```") {
        return inner;
    }
    brace_slice(raw).unwrap_or_else(|| raw.trim())
}

fn fenced<'a>(raw: &'a str, opener: &str) -> Option<&'a str> {
    let start = raw.find(opener)? + opener.len();
    let rest = &raw[start..];
    let inner = rest.split("```").next().unwrap_or(rest);
    Some(inner.trim())
}

fn brace_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn parse_strict(payload: &str) -> Option<SeverityResult> {
    match serde_json::from_str::<Value>(payload).ok()? {
        Value::Object(map) => Some(from_object(&map)),
        _ => None,
    }
}

fn from_object(map: &Map<String, Value>) -> SeverityResult {
    let severity = map
        .get("severity")
        .and_then(coerce_severity)
        .unwrap_or(Severity::MAX);

    let is_harmful = match map.get("is_harmful") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.trim().eq_ignore_ascii_case("false"),
        _ => true,
    };

    let reason = map
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let context = map
        .get("context")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_CONTEXT)
        .to_string();

    SeverityResult::new(is_harmful, severity, reason, context)
}

/// Integer, float (rounded) or a string with leading digits
fn coerce_severity(value: &Value) -> Option<Severity> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .map(Severity::clamped),
        Value::String(s) => leading_integer(s).map(Severity::clamped),
        _ => None,
    }
}

fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(digits.len(), |(i, _)| i);
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn field_patterns() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r#"(?i)"?severity"?\s*[:=]\s*"?(-?\d+(?:\.\d+)?)"#).expect("static regex"),
            Regex::new(r#"(?i)"?is_harmful"?\s*[:=]\s*"?(true|false)"#).expect("static regex"),
            Regex::new(r#"(?i)"?reason"?\s*[:=]\s*"([^"]*)"#).expect("static regex"),
            Regex::new(r#"(?i)"?context"?\s*[:=]\s*"?([A-Za-z_\-]+)"#).expect("static regex"),
        ]
    })
}

fn parse_lenient(raw: &str) -> Option<SeverityResult> {
    let [severity_re, harmful_re, reason_re, context_re] = field_patterns();
    let capture = |re: &Regex| {
        re.captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    let severity = capture(severity_re).and_then(|s| {
        s.parse::<f64>()
            .ok()
            .map(|f| Severity::clamped(f.round() as i64))
    });
    let is_harmful = capture(harmful_re).map(|s| s.eq_ignore_ascii_case("true"));

    if severity.is_none() && is_harmful.is_none() {
        return None;
    }

    Some(SeverityResult::new(
        is_harmful.unwrap_or(true),
        severity.unwrap_or(Severity::MAX),
        capture(reason_re).unwrap_or_default(),
        capture(context_re).unwrap_or_else(|| DEFAULT_CONTEXT.to_string()),
    ))
}
