//! Credential pool with a sticky rotation cursor
//!
//! The cursor is the index of the last credential that produced a usable
//! judgment. Every call starts there, so a healthy credential keeps serving
//! until it fails. The cursor is always a valid index into the current pool
//! (or 0 for an empty pool), including after removals.
//!
//! Keys added or removed at runtime are recorded as changes against the
//! configured list, so they survive restarts without rewriting the config.

use modshield_core::{Result, StateStore, StateStoreExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store key the cursor is persisted under
pub const CURSOR_KEY: &str = "rotation_cursor";

/// Store key for runtime key-list changes
pub const CREDENTIALS_KEY: &str = "credentials";

/// Secrets added and removed since the configured list
#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyChanges {
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
}

/// One secret for the judgment service
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    secret: String,
}

impl Credential {
    /// Wrap a secret, trimming surrounding whitespace
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().trim().to_string(),
        }
    }

    /// The raw secret. Never log this.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Secret rendered as its first and last four characters
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.secret.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

/// Ordered credential pool
pub struct CredentialPool {
    credentials: RwLock<Vec<Credential>>,
    cursor: AtomicUsize,
    store: Option<Arc<dyn StateStore>>,
}

impl CredentialPool {
    /// Create a pool, dropping empty and duplicate secrets
    pub fn new(credentials: impl IntoIterator<Item = Credential>) -> Self {
        let mut unique: Vec<Credential> = Vec::new();
        for credential in credentials {
            if !credential.secret.is_empty() && !unique.contains(&credential) {
                unique.push(credential);
            }
        }

        Self {
            credentials: RwLock::new(unique),
            cursor: AtomicUsize::new(0),
            store: None,
        }
    }

    /// Create a pool from raw secrets
    pub fn from_secrets<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(secrets.into_iter().map(Credential::new))
    }

    /// Start from a given cursor, clamped into the pool
    pub fn with_cursor(self, cursor: usize) -> Self {
        let len = self.len();
        self.cursor
            .store(if cursor < len { cursor } else { 0 }, Ordering::SeqCst);
        self
    }

    /// Persist the cursor and key-list changes through `store`, applying
    /// any saved ones
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        match store.load_as::<KeyChanges>(CREDENTIALS_KEY) {
            Ok(Some(changes)) => {
                let credentials = self.credentials.get_mut();
                credentials.retain(|c| !changes.removed.iter().any(|s| s == c.secret()));
                for secret in changes.added {
                    let credential = Credential::new(secret);
                    if !credential.secret.is_empty() && !credentials.contains(&credential) {
                        credentials.push(credential);
                    }
                }
                debug!(total = credentials.len(), "Applied saved key changes");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable key changes"),
        }

        match store.load_as::<usize>(CURSOR_KEY) {
            Ok(Some(saved)) => {
                self = self.with_cursor(saved);
                debug!(cursor = self.cursor(), "Restored rotation cursor");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable rotation cursor"),
        }
        self.store = Some(store);
        self
    }

    /// Number of credentials
    pub fn len(&self) -> usize {
        self.credentials.read().len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.credentials.read().is_empty()
    }

    /// Current cursor
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Credentials in attempt order for one call: starting at the cursor and
    /// wrapping once. Each entry carries its pool index.
    pub fn rotation(&self) -> Vec<(usize, Credential)> {
        let credentials = self.credentials.read();
        let len = credentials.len();
        if len == 0 {
            return Vec::new();
        }

        let start = self.cursor().min(len - 1);
        (0..len)
            .map(|offset| {
                let index = (start + offset) % len;
                (index, credentials[index].clone())
            })
            .collect()
    }

    /// Record `index` as last-known-good. Ignored if the pool shrank below it
    /// since the rotation was taken.
    pub fn commit(&self, index: usize) {
        let credentials = self.credentials.read();
        if index >= credentials.len() {
            debug!(index, len = credentials.len(), "Discarding stale cursor commit");
            return;
        }

        let previous = self.cursor.swap(index, Ordering::SeqCst);
        if previous != index {
            info!(from = previous, to = index, "Rotation cursor advanced");
            self.persist(index);
        }
    }

    /// Append a credential. Returns false if it is empty or already present.
    pub fn add(&self, credential: Credential) -> Result<bool> {
        let mut credentials = self.credentials.write();
        if credential.secret.is_empty() || credentials.contains(&credential) {
            return Ok(false);
        }
        info!(credential = %credential.masked(), total = credentials.len() + 1, "Credential added");
        self.save_change(|changes| {
            changes.removed.retain(|s| s != credential.secret());
            changes.added.push(credential.secret.clone());
        })?;
        credentials.push(credential);
        Ok(true)
    }

    /// Remove the credential at `index`, keeping the cursor on the same
    /// credential where possible
    pub fn remove(&self, index: usize) -> Result<Option<Credential>> {
        let mut credentials = self.credentials.write();
        if index >= credentials.len() {
            return Ok(None);
        }
        let secret = credentials[index].secret.clone();
        self.save_change(|changes| {
            let before = changes.added.len();
            changes.added.retain(|s| *s != secret);
            if changes.added.len() == before {
                changes.removed.push(secret.clone());
            }
        })?;

        let removed = credentials.remove(index);
        let cursor = self.cursor.load(Ordering::SeqCst);
        let adjusted = if index < cursor { cursor - 1 } else { cursor };
        let adjusted = if adjusted < credentials.len() { adjusted } else { 0 };
        self.cursor.store(adjusted, Ordering::SeqCst);
        drop(credentials);

        info!(credential = %removed.masked(), cursor = adjusted, "Credential removed");
        if adjusted != cursor {
            self.persist(adjusted);
        }
        Ok(Some(removed))
    }

    /// Masked listing; the entry under the cursor is marked
    pub fn masked(&self) -> Vec<String> {
        let cursor = self.cursor();
        self.credentials
            .read()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let marker = if i == cursor { " (current)" } else { "" };
                format!("{}. {}{}", i + 1, c.masked(), marker)
            })
            .collect()
    }

    fn save_change(&self, change: impl FnOnce(&mut KeyChanges)) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let mut changes = store.load_as::<KeyChanges>(CREDENTIALS_KEY)?.unwrap_or_default();
        change(&mut changes);
        store.save_as(CREDENTIALS_KEY, &changes)
    }

    fn persist(&self, cursor: usize) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_as(CURSOR_KEY, &cursor) {
                warn!(error = %e, "Failed to persist rotation cursor");
            }
        }
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("credentials", &self.masked())
            .field("cursor", &self.cursor())
            .finish()
    }
}
