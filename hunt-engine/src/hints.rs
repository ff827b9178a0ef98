//! Riddle text shown for each level.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::constants::HINT_PLACEHOLDER;

const DEFAULT_HINT_DATA: &str = include_str!("../data/hints.json");

/// One riddle entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub level: u32,
    pub text: String,
}

/// Riddles keyed by level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintCatalog {
    #[serde(default)]
    pub levels: Vec<Hint>,
}

impl HintCatalog {
    /// Empty catalog (useful for tests).
    #[must_use]
    pub fn empty() -> Self {
        Self { levels: Vec::new() }
    }

    /// Load a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a catalog.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Bundled riddles for the stock six-level hunt.
    #[must_use]
    pub fn load_from_static() -> Self {
        static CATALOG: OnceLock<HintCatalog> = OnceLock::new();
        CATALOG
            .get_or_init(|| Self::from_json(DEFAULT_HINT_DATA).unwrap_or_default())
            .clone()
    }

    /// Riddle for `level`, if the catalog has one.
    #[must_use]
    pub fn hint_for(&self, level: u32) -> Option<&str> {
        self.levels
            .iter()
            .find(|hint| hint.level == level)
            .map(|hint| hint.text.as_str())
    }

    /// Riddle for `level`, falling back to the placeholder text.
    #[must_use]
    pub fn text_or_placeholder(&self, level: u32) -> &str {
        self.hint_for(level).unwrap_or(HINT_PLACEHOLDER)
    }

    /// Levels in `1..=total_levels` with no riddle.
    #[must_use]
    pub fn missing_levels(&self, total_levels: u32) -> Vec<u32> {
        let by_level: BTreeMap<u32, &Hint> = self.levels.iter().map(|h| (h.level, h)).collect();
        (1..=total_levels)
            .filter(|level| !by_level.contains_key(level))
            .collect()
    }
}
