//! Hunt Engine
//!
//! Platform-agnostic progression logic for a sequential QR scavenger hunt.
//! Participants register, start a timed hunt, and clear levels strictly in
//! order by scanning codes. This crate owns the state machine, the scan
//! validation, and the transactional advancement; rendering, camera access,
//! and sign-in are left to the embedding application.

pub mod advance;
pub mod clock;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod hints;
pub mod progress;
pub mod record;
pub mod scan;
pub mod store;

// Re-export commonly used types
pub use advance::advance_level;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Collections, ConfigError, HuntConfig};
pub use controller::{
    BeginOutcome, HuntController, HuntSnapshot, HuntState, ScanOutcome, ScanReport,
};
pub use error::{HuntError, HuntResult, StoreError};
pub use hints::{Hint, HintCatalog};
pub use progress::{
    Evaluation, LevelStatus, Progress, evaluate, evaluate_lookup, expected_level, signals_found,
    timeline,
};
pub use record::{Identity, LevelFlags, ParticipantRecord, format_elapsed, minutes_between};
pub use scan::{ScanDecision, ScanValidator};
pub use store::{
    CommitOutcome, FileStore, FlakyStore, MemoryStore, ParticipantStore, StoredRecord,
    with_deadline,
};

/// Trait for abstracting hunt data loading
/// Platform-specific implementations should provide this
pub trait DataLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the hunt configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or is invalid.
    fn load_config(&self) -> Result<HuntConfig, Self::Error>;

    /// Load the riddle catalog
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded.
    fn load_hints(&self) -> Result<HintCatalog, Self::Error>;
}

/// Loader serving an in-memory configuration and riddle catalog.
///
/// Starts from the bundled riddles; [`StaticData::with_hints`] swaps in a
/// catalog read from elsewhere.
#[derive(Debug, Clone)]
pub struct StaticData {
    config: HuntConfig,
    hints: HintCatalog,
}

impl Default for StaticData {
    fn default() -> Self {
        Self::new(HuntConfig::default())
    }
}

impl StaticData {
    #[must_use]
    pub fn new(config: HuntConfig) -> Self {
        Self {
            config,
            hints: HintCatalog::load_from_static(),
        }
    }

    #[must_use]
    pub fn with_hints(mut self, hints: HintCatalog) -> Self {
        self.hints = hints;
        self
    }

    /// Parse the configuration from JSON, keeping the bundled riddles.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the configuration invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        HuntConfig::from_json(json).map(Self::new)
    }
}

impl DataLoader for StaticData {
    type Error = ConfigError;

    fn load_config(&self) -> Result<HuntConfig, Self::Error> {
        self.config.validate()?;
        Ok(self.config.clone())
    }

    fn load_hints(&self) -> Result<HintCatalog, Self::Error> {
        Ok(self.hints.clone())
    }
}

/// Main engine for wiring controllers from loaded data
#[derive(Debug, Clone)]
pub struct HuntEngine<L>
where
    L: DataLoader,
{
    data_loader: L,
}

impl<L> HuntEngine<L>
where
    L: DataLoader,
{
    /// Create a new engine with the provided data loader
    pub const fn new(data_loader: L) -> Self {
        Self { data_loader }
    }

    pub const fn data_loader(&self) -> &L {
        &self.data_loader
    }

    /// Build a controller over `store` using the loaded configuration and riddles.
    ///
    /// # Errors
    ///
    /// Returns an error if data cannot be loaded or the controller rejects it.
    pub fn controller<S, C>(&self, store: S, clock: C) -> anyhow::Result<HuntController<S, C>>
    where
        S: ParticipantStore,
        C: Clock,
        L::Error: Into<anyhow::Error>,
    {
        let config = self.data_loader.load_config().map_err(Into::into)?;
        let hints = self.data_loader.load_hints().map_err(Into::into)?;
        Ok(HuntController::new(config, store, clock, hints)?)
    }
}
