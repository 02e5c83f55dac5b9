//! Moderation modes and configuration

use modshield_core::{Error, Result, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How aggressively the severity classifier is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every message is judged, matched or not. Unavailable judge allows.
    Strict,
    /// Only matched messages are judged. Unavailable judge uses the fallback severity.
    #[default]
    Calm,
    /// Matched messages are flagged at maximum severity without a judge.
    Relax,
}

impl Mode {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Calm => "calm",
            Self::Relax => "relax",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "calm" => Ok(Self::Calm),
            "relax" => Ok(Self::Relax),
            other => Err(Error::config(format!(
                "unknown mode '{}' (expected strict, calm or relax)",
                other
            ))),
        }
    }
}

/// Moderation settings read by the policy engine on every message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Master switch; disabled means every message is ignored
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Active mode
    #[serde(default)]
    pub mode: Mode,

    /// Severity at or above which content is acted on
    #[serde(default = "default_threshold")]
    pub severity_threshold: u8,

    /// Severity assumed in calm mode when the judge is unavailable
    #[serde(default = "default_calm_fallback")]
    pub calm_fallback_severity: u8,
}

fn default_enabled() -> bool {
    true
}

fn default_threshold() -> u8 {
    7
}

fn default_calm_fallback() -> u8 {
    Severity::MAX.get()
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            mode: Mode::default(),
            severity_threshold: default_threshold(),
            calm_fallback_severity: default_calm_fallback(),
        }
    }
}

impl ModerationConfig {
    /// Set the mode
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the threshold
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.severity_threshold = threshold;
        self
    }

    /// Reject values outside `[1, 10]`
    pub fn validate(&self) -> Result<()> {
        if Severity::new(self.severity_threshold).is_none() {
            return Err(Error::config(format!(
                "severity_threshold must be between 1 and 10, got {}",
                self.severity_threshold
            )));
        }
        if Severity::new(self.calm_fallback_severity).is_none() {
            return Err(Error::config(format!(
                "calm_fallback_severity must be between 1 and 10, got {}",
                self.calm_fallback_severity
            )));
        }
        Ok(())
    }

    /// Threshold as a severity
    pub fn threshold(&self) -> Severity {
        Severity::from(self.severity_threshold)
    }

    /// Calm-mode fallback as a severity
    pub fn calm_fallback(&self) -> Severity {
        Severity::from(self.calm_fallback_severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModerationConfig::default();
        assert!(config.enabled);
        assert_eq!(config.mode, Mode::Calm);
        assert_eq!(config.threshold().get(), 7);
        assert_eq!(config.calm_fallback(), Severity::MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_out_of_band() {
        assert!(ModerationConfig::default().with_threshold(0).validate().is_err());
        assert!(ModerationConfig::default().with_threshold(11).validate().is_err());

        let config = ModerationConfig {
            calm_fallback_severity: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("STRICT".parse::<Mode>().unwrap(), Mode::Strict);
        assert_eq!(" relax ".parse::<Mode>().unwrap(), Mode::Relax);
        assert!("chill".parse::<Mode>().is_err());
    }

    #[test]
    fn test_yaml_partial() {
        let config: ModerationConfig = serde_yaml::from_str("mode: strict\nseverity_threshold: 9\n").unwrap();
        assert_eq!(config.mode, Mode::Strict);
        assert_eq!(config.severity_threshold, 9);
        assert!(config.enabled);
    }
}
