//! Service configuration
//!
//! Loaded from YAML, falling back to defaults when the file is absent, then
//! overridden from the command line. Judgment credentials may also come from
//! `GEMINI_API_KEY_1` .. `GEMINI_API_KEY_20` and `GEMINI_API_KEY`.

use modshield_classifiers::severity::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use modshield_classifiers::DetectorConfig;
use modshield_core::{Error, Result};
use modshield_policy::{EscalationTable, Mode, ModerationConfig, Whitelist};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Numbered environment credentials checked before the unnumbered one
const ENV_KEY_SLOTS: usize = 20;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Mode, threshold and fallback severity
    #[serde(default)]
    pub moderation: ModerationConfig,

    /// Matcher settings
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Judgment service settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Sanction table
    #[serde(default)]
    pub escalation: EscalationTable,

    /// Initial whitelist; merged with the persisted one
    #[serde(default)]
    pub whitelist: Whitelist,

    /// Where state lives
    #[serde(default)]
    pub storage: StorageConfig,

    /// Concurrency limits
    #[serde(default)]
    pub workers: WorkerConfig,
}

/// Judgment service settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// API base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Credential secrets, in rotation order
    #[serde(default)]
    pub credentials: Vec<String>,
}

impl ClassifierConfig {
    /// Per-attempt timeout
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            credentials: Vec::new(),
        }
    }
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("attempt_timeout_ms", &self.attempt_timeout_ms)
            .field("credentials", &self.credentials.len())
            .finish()
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_attempt_timeout_ms() -> u64 {
    8_000
}

/// Storage locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// State directory; defaults to the platform data dir
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Term list; defaults to `<data_dir>/terms.json`
    #[serde(default)]
    pub terms_file: Option<PathBuf>,

    /// Flush the violation log after this many records
    #[serde(default = "default_flush_interval")]
    pub log_flush_interval: usize,
}

fn default_flush_interval() -> usize {
    1
}

impl StorageConfig {
    /// Effective data directory
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Effective term list path
    pub fn terms_file(&self) -> PathBuf {
        self.terms_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join("terms.json"))
    }

    /// Violation log path
    pub fn violation_log(&self) -> PathBuf {
        self.data_dir().join("violations.jsonl")
    }
}

/// `<platform data dir>/modshield`, or `./modshield-data` without one
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("modshield"))
        .unwrap_or_else(|| PathBuf::from("./modshield-data"))
}

/// Concurrency limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Messages processed at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    num_cpus::get().max(1) * 4
}

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub terms_file: Option<PathBuf>,
    pub mode: Option<Mode>,
    pub severity_threshold: Option<u8>,
}

impl ServiceConfig {
    /// Load from `path` if it exists, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("failed to read {}: {}", path.display(), e))
                })?;
                let config: Self = serde_yaml::from_str(&content).map_err(|e| {
                    Error::config(format!("invalid config {}: {}", path.display(), e))
                })?;
                info!(path = %path.display(), "Configuration loaded");
                config
            }
            Some(path) => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(dir) = overrides.data_dir {
            self.storage.data_dir = Some(dir);
        }
        if let Some(terms) = overrides.terms_file {
            self.storage.terms_file = Some(terms);
        }
        if let Some(mode) = overrides.mode {
            self.moderation.mode = mode;
        }
        if let Some(threshold) = overrides.severity_threshold {
            self.moderation.severity_threshold = threshold;
        }
    }

    /// Append environment credentials not already configured
    pub fn with_env_credentials(mut self) -> Self {
        let found = env_credentials(|name| std::env::var(name).ok());
        let before = self.classifier.credentials.len();
        for key in found {
            if !self.classifier.credentials.contains(&key) {
                self.classifier.credentials.push(key);
            }
        }
        let added = self.classifier.credentials.len() - before;
        if added > 0 {
            info!(added, "Loaded judgment credentials from environment");
        }
        self
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.moderation.validate()?;
        if self.classifier.attempt_timeout_ms == 0 {
            return Err(Error::config("classifier.attempt_timeout_ms must be positive"));
        }
        if self.workers.max_concurrent == 0 {
            return Err(Error::config("workers.max_concurrent must be positive"));
        }
        debug!(config = ?self, "Configuration validated");
        Ok(())
    }
}

/// Credentials from `GEMINI_API_KEY_1..20` then `GEMINI_API_KEY`, trimmed and
/// de-duplicated
pub fn env_credentials(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let names = (1..=ENV_KEY_SLOTS)
        .map(|i| format!("GEMINI_API_KEY_{}", i))
        .chain(std::iter::once("GEMINI_API_KEY".to_string()));

    for name in names {
        if let Some(value) = lookup(&name) {
            let value = value.trim().to_string();
            if !value.is_empty() && !keys.contains(&value) {
                keys.push(value);
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use modshield_classifiers::SuffixMode;
    use std::collections::HashMap;

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
moderation:
  mode: relax
  severity_threshold: 6
  calm_fallback_severity: 8
detector:
  suffix_mode: obfuscated
classifier:
  model: gemini-test
  attempt_timeout_ms: 2500
  credentials: ["k1", "k2"]
escalation:
  - min_count: 1
    action: warn
  - min_count: 2
    action: ban
whitelist:
  users: [1]
  roles: [2]
workers:
  max_concurrent: 3
"#;
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.moderation.mode, Mode::Relax);
        assert_eq!(config.moderation.calm_fallback_severity, 8);
        assert_eq!(config.detector.suffix_mode, SuffixMode::Obfuscated);
        assert_eq!(config.classifier.attempt_timeout(), Duration::from_millis(2500));
        assert_eq!(config.escalation.rules().len(), 2);
        assert!(config.whitelist.contains(1, &[]));
        assert_eq!(config.workers.max_concurrent, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = ServiceConfig::load(Some(Path::new("/nonexistent/modshield.yaml"))).unwrap();
        assert_eq!(config.moderation.mode, Mode::Calm);
        assert_eq!(config.classifier.model, DEFAULT_MODEL);
        assert!(config.workers.max_concurrent >= 1);
    }

    #[test]
    fn test_overrides() {
        let mut config = ServiceConfig::default();
        config.apply(ConfigOverrides {
            data_dir: Some(PathBuf::from("/tmp/ms")),
            mode: Some(Mode::Strict),
            severity_threshold: Some(11),
            ..Default::default()
        });
        assert_eq!(config.storage.data_dir(), PathBuf::from("/tmp/ms"));
        assert_eq!(config.storage.terms_file(), PathBuf::from("/tmp/ms/terms.json"));
        assert_eq!(config.moderation.mode, Mode::Strict);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_credentials_order_and_dedup() {
        let env: HashMap<&str, &str> = [
            ("GEMINI_API_KEY_2", " second "),
            ("GEMINI_API_KEY_1", "first"),
            ("GEMINI_API_KEY_5", "first"),
            ("GEMINI_API_KEY", "single"),
            ("GEMINI_API_KEY_21", "ignored"),
        ]
        .into_iter()
        .collect();
        let keys = env_credentials(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(keys, vec!["first", "second", "single"]);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = ClassifierConfig {
            credentials: vec!["AIzaSECRETSECRET".to_string()],
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("SECRET"));
    }
}
