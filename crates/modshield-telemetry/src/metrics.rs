//! Metrics collection and reporting
//!
//! `MetricsCollector` keeps in-process totals for summaries and mirrors every
//! observation to the `metrics` facade, which the binary may export to
//! Prometheus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const MESSAGES_TOTAL: &str = "modshield_messages_total";
pub const VERDICTS_TOTAL: &str = "modshield_verdicts_total";
pub const CLASSIFIER_ATTEMPTS_TOTAL: &str = "modshield_classifier_attempts_total";
pub const CLASSIFIER_UNAVAILABLE_TOTAL: &str = "modshield_classifier_unavailable_total";
pub const PIPELINE_LATENCY_US: &str = "modshield_pipeline_latency_us";

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    ::metrics::describe_counter!(MESSAGES_TOTAL, "Messages processed, by mode");
    ::metrics::describe_counter!(VERDICTS_TOTAL, "Policy verdicts, by verdict");
    ::metrics::describe_counter!(
        CLASSIFIER_ATTEMPTS_TOTAL,
        "Judgment-service attempts, by outcome"
    );
    ::metrics::describe_counter!(
        CLASSIFIER_UNAVAILABLE_TOTAL,
        "Classifications where every credential failed"
    );
    ::metrics::describe_histogram!(
        PIPELINE_LATENCY_US,
        ::metrics::Unit::Microseconds,
        "End-to-end message processing latency"
    );
}

/// In-process moderation counters
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    messages: AtomicU64,
    ignored: AtomicU64,
    logged: AtomicU64,
    acted: AtomicU64,
    total_latency_us: AtomicU64,
}

impl MetricsCollector {
    /// Create a collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed message
    pub fn record_message(&self, mode: &'static str) {
        self.inner.messages.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!(MESSAGES_TOTAL, "mode" => mode).increment(1);
    }

    /// Record a verdict by its label (`ignore`, `log_only`, `act`)
    pub fn record_verdict(&self, verdict: &'static str) {
        let counter = match verdict {
            "act" => &self.inner.acted,
            "log_only" => &self.inner.logged,
            _ => &self.inner.ignored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!(VERDICTS_TOTAL, "verdict" => verdict).increment(1);
    }

    /// Record end-to-end latency
    pub fn record_latency(&self, latency: Duration) {
        let micros = latency.as_micros() as u64;
        self.inner
            .total_latency_us
            .fetch_add(micros, Ordering::Relaxed);
        ::metrics::histogram!(PIPELINE_LATENCY_US).record(micros as f64);
    }

    /// Current totals
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages: self.inner.messages.load(Ordering::Relaxed),
            ignored: self.inner.ignored.load(Ordering::Relaxed),
            logged: self.inner.logged.load(Ordering::Relaxed),
            acted: self.inner.acted.load(Ordering::Relaxed),
            total_latency_us: self.inner.total_latency_us.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of current totals
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub messages: u64,
    pub ignored: u64,
    pub logged: u64,
    pub acted: u64,
    pub total_latency_us: u64,
}

impl MetricsSnapshot {
    /// Average latency per message
    pub fn avg_latency_us(&self) -> u64 {
        if self.messages == 0 {
            0
        } else {
            self.total_latency_us / self.messages
        }
    }

    /// Share of messages that produced a violation
    pub fn flag_rate(&self) -> f64 {
        if self.messages == 0 {
            0.0
        } else {
            (self.logged + self.acted) as f64 / self.messages as f64
        }
    }
}
