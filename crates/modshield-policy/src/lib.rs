//! modshield policy
//!
//! Decides what happens to a message once detection has run.
//!
//! - `Mode` selects how the severity classifier is used (strict, calm, relax)
//! - `PolicyEngine` turns detections and severity into a `Verdict`
//! - `EscalationTracker` turns a user's violation count into a `Sanction`
//! - `Whitelist` exempts authors and roles from moderation

pub mod engine;
pub mod escalation;
pub mod mode;
pub mod whitelist;

pub use engine::{Decision, PolicyEngine, SeveritySource, Verdict, CLASSIFIER_CATEGORY};
pub use escalation::{
    EscalationRule, EscalationTable, EscalationTracker, ResetLedger, Sanction, UserHistory, RESETS_KEY,
};
pub use mode::{Mode, ModerationConfig};
pub use whitelist::Whitelist;
