//! Per-message moderation pipeline
//!
//! A [`Moderator`] is the explicit context every message is processed
//! against: the current detector and configuration, the whitelist, the
//! classifier, the escalation tracker and the telemetry sinks. It is shared
//! between workers behind an `Arc`; every field is internally synchronized.

use crate::collaborators::{NoOcr, OcrEngine, PassthroughTranslator, Translator};
use crate::source::{InboundMessage, Outcome};
use chrono::Utc;
use modshield_classifiers::{extract_emoji_names, DetectionReport, Detector, DetectorConfig, SeverityClassifier, TermSet};
use modshield_core::{Evidence, MemoryStore, Result, StateStore, StateStoreExt, TextOrigin, UserId};
use modshield_policy::{
    EscalationRule, EscalationTable, EscalationTracker, Mode, ModerationConfig, PolicyEngine, ResetLedger,
    UserHistory, Whitelist,
};
use modshield_telemetry::{DailyStats, MetricsCollector, MetricsSnapshot, StatsSnapshot, ViolationLog};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Store key for administrative changes to the moderation config
pub const CONFIG_KEY: &str = "moderation_config";

/// Text the classifier sees when a message has no text at all
const EMPTY_MESSAGE: &str = "empty message";

/// Builder for [`Moderator`]
pub struct ModeratorBuilder {
    terms: TermSet,
    detector_config: DetectorConfig,
    classifier: Arc<dyn SeverityClassifier>,
    translator: Arc<dyn Translator>,
    ocr: Arc<dyn OcrEngine>,
    config: ModerationConfig,
    whitelist: Whitelist,
    escalation: EscalationTable,
    log: Option<ViolationLog>,
    store: Arc<dyn StateStore>,
}

impl ModeratorBuilder {
    /// Start from a term list and a classifier
    pub fn new(terms: TermSet, classifier: Arc<dyn SeverityClassifier>) -> Self {
        Self {
            terms,
            detector_config: DetectorConfig::default(),
            classifier,
            translator: Arc::new(PassthroughTranslator),
            ocr: Arc::new(NoOcr),
            config: ModerationConfig::default(),
            whitelist: Whitelist::default(),
            escalation: EscalationTable::default(),
            log: None,
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Suffix handling and per-term size cap for the detector
    pub fn detector_config(mut self, config: DetectorConfig) -> Self {
        self.detector_config = config;
        self
    }

    /// Translator for message and image text; passthrough by default
    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    /// Image text extraction; disabled by default
    pub fn ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = ocr;
        self
    }

    /// Initial moderation config; a persisted one takes precedence
    pub fn config(mut self, config: ModerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Initial whitelist; merged with the persisted one
    pub fn whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    /// Escalation table
    pub fn escalation(mut self, table: EscalationTable) -> Self {
        self.escalation = table;
        self
    }

    /// Append violations here and rebuild escalation history from it
    pub fn violation_log(mut self, log: ViolationLog) -> Self {
        self.log = Some(log);
        self
    }

    /// State store for administrative changes; in-memory by default
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    /// Compile the detector and restore persisted state.
    ///
    /// A persisted moderation config replaces the configured one. The
    /// persisted whitelist is merged into the configured one. The escalation
    /// tracker is replayed from the violation log.
    pub fn build(self) -> Result<Moderator> {
        let mut config = self.config;
        if let Some(saved) = self.store.load_as::<ModerationConfig>(CONFIG_KEY)? {
            info!(mode = %saved.mode, threshold = saved.severity_threshold, "Restored moderation config");
            config = saved;
        }
        config.validate()?;

        let mut whitelist = self.whitelist;
        let saved = Whitelist::load(self.store.as_ref())?;
        for user in saved.users() {
            whitelist.add_user(user);
        }
        for role in saved.roles() {
            whitelist.add_role(role);
        }

        let stats = DailyStats::load(self.store.as_ref())?;
        stats.roll_over(Utc::now().date_naive());

        let resets = ResetLedger::load(self.store.as_ref())?;
        let tracker = EscalationTracker::new(self.escalation);
        if let Some(log) = &self.log {
            let records = log.read_all()?;
            if !modshield_telemetry::verify_records(&records) {
                warn!(path = %log.path().display(), "Violation log chain is broken; replaying anyway");
            }
            tracker.rebuild(
                records
                    .into_iter()
                    .map(|r| r.violation)
                    .filter(|v| resets.counts(v)),
            );
        }

        let detector = Detector::new(self.terms, &self.detector_config);

        Ok(Moderator {
            detector: RwLock::new(Arc::new(detector)),
            detector_config: self.detector_config,
            config: RwLock::new(config),
            whitelist: RwLock::new(whitelist),
            classifier: self.classifier,
            translator: self.translator,
            ocr: self.ocr,
            engine: PolicyEngine::new(),
            tracker,
            resets: Mutex::new(resets),
            log: self.log,
            stats,
            metrics: MetricsCollector::new(),
            store: self.store,
        })
    }
}

/// Shared moderation context
pub struct Moderator {
    detector: RwLock<Arc<Detector>>,
    detector_config: DetectorConfig,
    config: RwLock<ModerationConfig>,
    whitelist: RwLock<Whitelist>,
    classifier: Arc<dyn SeverityClassifier>,
    translator: Arc<dyn Translator>,
    ocr: Arc<dyn OcrEngine>,
    engine: PolicyEngine,
    tracker: EscalationTracker,
    resets: Mutex<ResetLedger>,
    log: Option<ViolationLog>,
    stats: DailyStats,
    metrics: MetricsCollector,
    store: Arc<dyn StateStore>,
}

/// Text variants of one message
#[derive(Debug, Default)]
struct Variants {
    body: String,
    translated: String,
    ocr: Vec<(String, String)>,
}

impl Variants {
    fn detection_inputs(&self) -> Vec<(TextOrigin, &str)> {
        let mut inputs = vec![
            (TextOrigin::Original, self.body.as_str()),
            (TextOrigin::Translated, self.translated.as_str()),
        ];
        for (raw, translated) in &self.ocr {
            inputs.push((TextOrigin::Ocr, raw.as_str()));
            inputs.push((TextOrigin::Translated, translated.as_str()));
        }
        inputs
    }

    fn judged_text(&self) -> String {
        let mut text = self.translated.trim().to_string();
        for (_, translated) in &self.ocr {
            text.push_str("\n[Image text: ");
            text.push_str(translated.trim());
            text.push(']');
        }
        if text.trim().is_empty() {
            EMPTY_MESSAGE.to_string()
        } else {
            text
        }
    }

    fn evidence(&self, message: &InboundMessage) -> Evidence {
        Evidence {
            content: Some(message.text.clone()).filter(|t| !t.is_empty()),
            translated: Some(self.translated.clone()).filter(|t| *t != self.body),
            ocr: self.ocr.iter().map(|(raw, _)| raw.clone()).collect(),
            attachments: message
                .attachments
                .iter()
                .map(|a| a.path.display().to_string())
                .collect(),
        }
    }
}

impl Moderator {
    /// Start building a moderator
    pub fn builder(terms: TermSet, classifier: Arc<dyn SeverityClassifier>) -> ModeratorBuilder {
        ModeratorBuilder::new(terms, classifier)
    }

    /// Process one message end to end
    pub async fn process(&self, message: &InboundMessage) -> Outcome {
        let start = Instant::now();

        if self.whitelist.read().contains(message.author_id, &message.role_ids) {
            debug!(user = message.author_id, "Author whitelisted");
            return Outcome::ignored(message, "whitelisted");
        }

        let config = self.config.read().clone();
        if !config.enabled {
            return Outcome::ignored(message, "moderation disabled");
        }

        if let Some(finished) = self.stats.roll_over(Utc::now().date_naive()) {
            debug!(date = %finished.date, "Statistics day finished");
        }
        self.stats.record_scan();
        self.metrics.record_message(config.mode.as_str());

        let variants = self.variants(message).await;
        let detector = self.detector();
        let report = detector.detect_all(variants.detection_inputs());
        let judged_text = variants.judged_text();

        let decision = self
            .engine
            .evaluate(&config, &report, &judged_text, self.classifier.as_ref())
            .await;

        let mut escalation = None;
        if let Some(violation) = decision.to_violation(message.author_id) {
            let violation = violation.with_evidence(variants.evidence(message));
            if let Some(log) = &self.log {
                if let Err(e) = log.append(violation.clone()) {
                    warn!(user = message.author_id, error = %e, "Failed to append violation");
                }
            }
            let rule = self.tracker.record(violation);
            self.stats.record_flag(message.author_id);
            info!(
                user = message.author_id,
                verdict = %decision.verdict,
                terms = ?decision.terms,
                sanction = %rule.sanction,
                "Violation recorded"
            );
            escalation = Some(rule);
        }

        self.metrics.record_verdict(decision.verdict.as_str());
        self.metrics.record_latency(start.elapsed());

        Outcome::from_decision(message, decision, escalation)
    }

    /// Run only the detector
    pub fn scan(&self, text: &str) -> DetectionReport {
        self.detector().detect(text)
    }

    /// Current detector
    pub fn detector(&self) -> Arc<Detector> {
        self.detector.read().clone()
    }

    /// Recompile the detector for a new term list. In-flight messages keep
    /// the detector they started with.
    pub fn reload_terms(&self, terms: TermSet) {
        let detector = Arc::new(Detector::new(terms, &self.detector_config));
        info!(terms = detector.terms().len(), "Term list reloaded");
        *self.detector.write() = detector;
    }

    /// Current moderation config
    pub fn config(&self) -> ModerationConfig {
        self.config.read().clone()
    }

    /// Switch mode and persist
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        self.update_config(|c| c.mode = mode)
    }

    /// Change the threshold and persist
    pub fn set_threshold(&self, threshold: u8) -> Result<()> {
        self.update_config(|c| c.severity_threshold = threshold)
    }

    /// Turn moderation on or off and persist
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.update_config(|c| c.enabled = enabled)
    }

    fn update_config(&self, change: impl FnOnce(&mut ModerationConfig)) -> Result<()> {
        // Held across save so concurrent changes cannot overwrite each other
        let mut config = self.config.write();
        let mut updated = config.clone();
        change(&mut updated);
        updated.validate()?;
        self.store.save_as(CONFIG_KEY, &updated)?;
        info!(mode = %updated.mode, threshold = updated.severity_threshold, enabled = updated.enabled, "Moderation config updated");
        *config = updated;
        Ok(())
    }

    /// Add or remove a whitelisted user and persist
    pub fn whitelist_user(&self, user_id: UserId, allowed: bool) -> Result<bool> {
        self.update_whitelist(|w| if allowed { w.add_user(user_id) } else { w.remove_user(user_id) })
    }

    /// Add or remove a whitelisted role and persist
    pub fn whitelist_role(&self, role_id: u64, allowed: bool) -> Result<bool> {
        self.update_whitelist(|w| if allowed { w.add_role(role_id) } else { w.remove_role(role_id) })
    }

    fn update_whitelist(&self, change: impl FnOnce(&mut Whitelist) -> bool) -> Result<bool> {
        let mut whitelist = self.whitelist.write();
        let changed = change(&mut whitelist);
        if changed {
            whitelist.save(self.store.as_ref())?;
        }
        Ok(changed)
    }

    /// A user's violations and tier
    pub fn history(&self, user_id: UserId) -> Option<UserHistory> {
        self.tracker.history(user_id)
    }

    /// A user's current sanction
    pub fn escalation(&self, user_id: UserId) -> Option<EscalationRule> {
        self.tracker.escalate(user_id)
    }

    /// Administrative escalation reset; persisted so a restart does not
    /// replay the user's earlier violations
    pub fn reset_user(&self, user_id: UserId) -> Result<bool> {
        let mut resets = self.resets.lock();
        let had_history = self.tracker.reset(user_id);
        resets.mark(user_id, Utc::now());
        resets.save(self.store.as_ref())?;
        Ok(had_history)
    }

    /// Today's statistics
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Process-lifetime counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Save statistics and flush the violation log
    pub fn persist(&self) -> Result<()> {
        self.stats.save(self.store.as_ref())?;
        if let Some(log) = &self.log {
            log.flush()?;
        }
        Ok(())
    }

    async fn variants(&self, message: &InboundMessage) -> Variants {
        let emoji = extract_emoji_names(&message.text);
        let body = if emoji.is_empty() {
            message.text.clone()
        } else {
            format!("{} [emojis: {}]", message.text, emoji.join(", "))
        };

        let translated = self.translate(&body).await;

        let mut ocr = Vec::new();
        for attachment in message.attachments.iter().filter(|a| a.is_image()) {
            let bytes = match tokio::fs::read(&attachment.path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %attachment.path.display(), error = %e, "Failed to read attachment");
                    continue;
                }
            };
            match self.ocr.extract_text(&bytes).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    let translated = self.translate(&text).await;
                    ocr.push((text, translated));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(engine = self.ocr.name(), path = %attachment.path.display(), error = %e, "OCR failed");
                }
            }
        }

        Variants { body, translated, ocr }
    }

    async fn translate(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        match self.translator.translate(text).await {
            Ok(translation) => {
                debug!(lang = translation.source_lang_or_unknown(), "Translated");
                translation.text
            }
            Err(e) => {
                warn!(translator = self.translator.name(), error = %e, "Translation failed, using original text");
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judged_text_sections() {
        let variants = Variants {
            body: "hi".into(),
            translated: "hello".into(),
            ocr: vec![("hola".into(), "hi there".into())],
        };
        assert_eq!(variants.judged_text(), "hello\n[Image text: hi there]");
        assert_eq!(variants.detection_inputs().len(), 4);
    }

    #[test]
    fn test_evidence_skips_unchanged_translation() {
        let message = InboundMessage::text(9, "hola");
        let variants = Variants {
            body: "hola".into(),
            translated: "hola".into(),
            ocr: vec![("sign".into(), "sign".into())],
        };
        let evidence = variants.evidence(&message);
        assert_eq!(evidence.content.as_deref(), Some("hola"));
        assert!(evidence.translated.is_none());
        assert_eq!(evidence.ocr, vec!["sign".to_string()]);

        let translated = Variants {
            translated: "hello".into(),
            ..variants
        };
        assert_eq!(translated.evidence(&message).translated.as_deref(), Some("hello"));
    }

    #[test]
    fn test_empty_message_placeholder() {
        assert_eq!(Variants::default().judged_text(), EMPTY_MESSAGE);
    }
}
