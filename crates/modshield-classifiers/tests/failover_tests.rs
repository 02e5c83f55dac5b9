//! Failover classifier tests
//!
//! A scripted judgment service decides per credential whether an attempt
//! fails, hangs or returns a payload, and counts every network attempt.

use async_trait::async_trait;
use modshield_classifiers::severity::{
    Assessment, AttemptError, AttemptErrorKind, Credential, CredentialPool, FailoverClassifier,
    JudgmentService, SeverityClassifier,
};
use modshield_core::{MemoryStore, StateStore, StateStoreExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const GOOD_PAYLOAD: &str =
    r#"{"is_harmful": true, "severity": 8, "reason": "insult", "context": "hostile"}"#;

#[derive(Clone)]
enum Behavior {
    Fail(AttemptErrorKind),
    Respond(String),
    Hang(Duration),
}

/// Judgment service driven by a per-secret script
struct ScriptedJudge {
    script: HashMap<String, Behavior>,
    fallback: Behavior,
    call_count: AtomicU32,
    tried: Mutex<Vec<String>>,
}

impl ScriptedJudge {
    fn new() -> Self {
        Self {
            script: HashMap::new(),
            fallback: Behavior::Respond(GOOD_PAYLOAD.to_string()),
            call_count: AtomicU32::new(0),
            tried: Mutex::new(Vec::new()),
        }
    }

    fn on(mut self, secret: &str, behavior: Behavior) -> Self {
        self.script.insert(secret.to_string(), behavior);
        self
    }

    fn otherwise(mut self, behavior: Behavior) -> Self {
        self.fallback = behavior;
        self
    }

    fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    fn tried(&self) -> Vec<String> {
        self.tried.lock().clone()
    }
}

#[async_trait]
impl JudgmentService for ScriptedJudge {
    async fn judge(&self, credential: &Credential, _prompt: &str) -> Result<String, AttemptError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.tried.lock().push(credential.secret().to_string());

        let behavior = self
            .script
            .get(credential.secret())
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());

        match behavior {
            Behavior::Fail(kind) => Err(AttemptError::new(kind, "scripted failure")),
            Behavior::Respond(raw) => Ok(raw),
            Behavior::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(GOOD_PAYLOAD.to_string())
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn pool(n: usize) -> Arc<CredentialPool> {
    Arc::new(CredentialPool::from_secrets((0..n).map(|i| format!("key-{}", i))))
}

fn classifier(pool: Arc<CredentialPool>, judge: Arc<ScriptedJudge>) -> FailoverClassifier {
    FailoverClassifier::new(pool, judge).with_attempt_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_first_k_failures_advance_cursor_to_k() {
    let judge = Arc::new(
        ScriptedJudge::new()
            .on("key-0", Behavior::Fail(AttemptErrorKind::Quota))
            .on("key-1", Behavior::Fail(AttemptErrorKind::Auth))
            .on("key-2", Behavior::Fail(AttemptErrorKind::Server)),
    );
    let pool = pool(5);
    let classifier = classifier(pool.clone(), judge.clone());

    let assessment = classifier.classify("you c4t", &["cat".to_string()]).await;

    let result = assessment.judged().expect("judgment");
    assert_eq!(result.severity.get(), 8);
    assert_eq!(pool.cursor(), 3);
    assert_eq!(judge.call_count(), 4);
}

#[tokio::test]
async fn test_exhaustion_is_unavailable_and_keeps_cursor() {
    let judge = Arc::new(ScriptedJudge::new().otherwise(Behavior::Fail(AttemptErrorKind::Quota)));
    let pool = Arc::new(CredentialPool::from_secrets(["key-0", "key-1", "key-2"]).with_cursor(2));
    let classifier = classifier(pool.clone(), judge.clone());

    let assessment = classifier.classify("text", &[]).await;

    assert_eq!(assessment, Assessment::Unavailable);
    assert_eq!(pool.cursor(), 2);
    assert_eq!(judge.call_count(), 3);
    assert_eq!(judge.tried(), vec!["key-2", "key-0", "key-1"]);
}

#[tokio::test]
async fn test_cursor_is_sticky_across_calls() {
    let judge = Arc::new(
        ScriptedJudge::new()
            .on("key-0", Behavior::Fail(AttemptErrorKind::Quota))
            .on("key-1", Behavior::Fail(AttemptErrorKind::Quota)),
    );
    let pool = pool(4);
    let classifier = classifier(pool.clone(), judge.clone());

    assert!(classifier.classify("one", &[]).await.is_available());
    assert_eq!(judge.call_count(), 3);

    assert!(classifier.classify("two", &[]).await.is_available());
    assert_eq!(judge.call_count(), 4);
    assert_eq!(judge.tried().last().map(String::as_str), Some("key-2"));
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_moves_to_next_credential() {
    let judge = Arc::new(ScriptedJudge::new().on("key-0", Behavior::Hang(Duration::from_secs(60))));
    let pool = pool(2);
    let classifier = classifier(pool.clone(), judge.clone());

    let assessment = classifier.classify("text", &[]).await;

    assert!(assessment.is_available());
    assert_eq!(pool.cursor(), 1);
    assert_eq!(judge.call_count(), 2);
}

#[tokio::test]
async fn test_malformed_payload_is_retryable() {
    let judge = Arc::new(
        ScriptedJudge::new().on("key-0", Behavior::Respond("I'd rather not say.".to_string())),
    );
    let pool = pool(2);
    let classifier = classifier(pool.clone(), judge.clone());

    assert!(classifier.classify("text", &[]).await.is_available());
    assert_eq!(pool.cursor(), 1);
}

#[tokio::test]
async fn test_fenced_payload_without_severity_defaults_to_max() {
    let judge = Arc::new(ScriptedJudge::new().otherwise(Behavior::Respond(
        "```json\n{\"is_harmful\": true, \"reason\": \"?\"}\n```".to_string(),
    )));
    let classifier = classifier(pool(1), judge);

    let assessment = classifier.classify("text", &[]).await;
    assert_eq!(assessment.judged().map(|r| r.severity.get()), Some(10));
}

#[tokio::test]
async fn test_fatal_error_stops_rotation() {
    let judge = Arc::new(ScriptedJudge::new().on("key-0", Behavior::Fail(AttemptErrorKind::Fatal)));
    let pool = pool(3);
    let classifier = classifier(pool.clone(), judge.clone());

    assert_eq!(classifier.classify("text", &[]).await, Assessment::Unavailable);
    assert_eq!(judge.call_count(), 1);
    assert_eq!(pool.cursor(), 0);
}

#[tokio::test]
async fn test_empty_pool_is_unavailable() {
    let judge = Arc::new(ScriptedJudge::new());
    let classifier = classifier(pool(0), judge.clone());

    assert_eq!(classifier.classify("text", &[]).await, Assessment::Unavailable);
    assert_eq!(judge.call_count(), 0);
}

#[tokio::test]
async fn test_successful_rotation_persists_cursor() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let pool = Arc::new(
        CredentialPool::from_secrets(["key-0", "key-1"]).with_store(store.clone()),
    );
    let judge = Arc::new(ScriptedJudge::new().on("key-0", Behavior::Fail(AttemptErrorKind::Quota)));
    let classifier = classifier(pool, judge);

    classifier.classify("text", &[]).await;

    assert_eq!(store.load_as::<usize>("rotation_cursor").unwrap(), Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_keep_cursor_in_range() {
    let judge = Arc::new(
        ScriptedJudge::new()
            .on("key-0", Behavior::Fail(AttemptErrorKind::Quota))
            .on("key-2", Behavior::Fail(AttemptErrorKind::Server)),
    );
    let pool = pool(6);
    let classifier = Arc::new(classifier(pool.clone(), judge));

    let mut handles = Vec::new();
    for i in 0..32 {
        let classifier = classifier.clone();
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            if i % 8 == 0 {
                pool.remove(pool.len().saturating_sub(1)).unwrap();
            }
            classifier.classify("text", &[]).await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(pool.len() >= 2);
    assert!(pool.cursor() < pool.len());
}
