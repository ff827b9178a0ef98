//! Scan validation: does a decoded payload name the level we expect next?
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::config::{ConfigError, HuntConfig};

/// Outcome of checking a decoded payload against the expected level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ScanDecision {
    Match,
    /// A level token was read but it is not the expected one.
    Mismatch { scanned: u32 },
    /// No level token in the payload.
    Unrecognized,
}

/// Extracts level tokens from decoded QR text.
///
/// Accepts a configured prefix followed by optional separators and digits
/// (`qr3`, `QR-03`, `level: 3`, `.../scan?code=signal_3`), or a payload that
/// is only digits. The first token wins.
#[derive(Debug, Clone)]
pub struct ScanValidator {
    prefixed: Regex,
}

fn bare_number() -> &'static Regex {
    static BARE: OnceLock<Regex> = OnceLock::new();
    BARE.get_or_init(|| Regex::new(r"^\s*(\d+)\s*$").expect("static pattern compiles"))
}

impl ScanValidator {
    /// Build a validator recognising `prefixes` in front of level numbers.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable prefix is given.
    pub fn new<I, S>(prefixes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = prefixes
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .map(|p| regex::escape(&p))
            .collect();
        if alternatives.is_empty() {
            return Err(ConfigError::NoCodePrefixes);
        }
        let pattern = format!(
            r"(?i)(?:^|[^A-Za-z0-9])(?:{})[\s:#_-]*(\d+)",
            alternatives.join("|")
        );
        let prefixed = Regex::new(&pattern).map_err(|err| ConfigError::Pattern(err.to_string()))?;
        Ok(Self { prefixed })
    }

    /// Validator for the prefixes named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured prefixes are unusable.
    pub fn from_config(config: &HuntConfig) -> Result<Self, ConfigError> {
        Self::new(&config.code_prefixes)
    }

    /// Level number carried by `payload`, if any.
    #[must_use]
    pub fn extract_level(&self, payload: &str) -> Option<u32> {
        let caps = self
            .prefixed
            .captures(payload)
            .or_else(|| bare_number().captures(payload))?;
        caps.get(1)?.as_str().parse().ok()
    }

    /// Compare a payload against the expected level. Never mutates anything.
    #[must_use]
    pub fn validate(&self, payload: &str, expected_level: u32) -> ScanDecision {
        match self.extract_level(payload) {
            None => ScanDecision::Unrecognized,
            Some(level) if level == expected_level => ScanDecision::Match,
            Some(scanned) => ScanDecision::Mismatch { scanned },
        }
    }
}

impl Default for ScanValidator {
    fn default() -> Self {
        Self::from_config(&HuntConfig::default()).expect("default prefixes compile")
    }
}
