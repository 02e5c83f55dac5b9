//! modshield core
//!
//! Types and seams shared by every modshield component.
//!
//! This crate provides:
//! - The moderation data model (terms, detection matches, severities, violations)
//! - Error types and result handling
//! - The `StateStore` persistence seam and an in-memory implementation

pub mod error;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use store::{MemoryStore, StateStore, StateStoreExt};
pub use types::{
    DetectionMatch, Evidence, Severity, SeverityResult, Term, TextOrigin, UserId, Violation,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::store::{StateStore, StateStoreExt};
    pub use crate::types::{DetectionMatch, Evidence, Severity, SeverityResult, Term, TextOrigin, Violation};
}
