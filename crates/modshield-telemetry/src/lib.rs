//! modshield telemetry
//!
//! Everything the moderation engine leaves behind:
//! - Hash-chained, append-only violation log (JSON lines)
//! - File-backed `StateStore` for the cursor, config and whitelist
//! - Daily scan statistics
//! - `metrics` facade counters and histograms

pub mod metrics;
pub mod persistence;
pub mod stats;
pub mod violations;

pub use crate::metrics::{describe_metrics, MetricsCollector, MetricsSnapshot};
pub use persistence::JsonFileStore;
pub use stats::{DailyStats, StatsSnapshot};
pub use violations::{verify_records, ViolationLog, ViolationRecord};
