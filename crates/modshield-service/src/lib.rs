//! modshield service
//!
//! Wires the detection, severity and policy stages into a per-message
//! pipeline and runs it over a stream of inbound messages.
//!
//! # Architecture
//!
//! ```text
//! message ─► whitelist ─► emoji names / translation / OCR ─► Detector
//!                                                              │
//!                 outcome ◄─ escalation ◄─ violation ◄─ PolicyEngine ◄─ classifier
//! ```

pub mod collaborators;
pub mod config;
pub mod pipeline;
pub mod source;
pub mod worker;

pub use collaborators::{NoOcr, OcrEngine, PassthroughTranslator, Translation, Translator};
pub use config::{ConfigOverrides, ServiceConfig};
pub use pipeline::{Moderator, ModeratorBuilder, CONFIG_KEY};
pub use source::{Attachment, InboundMessage, Outcome};
pub use worker::{process_lines, RunSummary};
