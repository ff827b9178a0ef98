use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use hunt_engine::{
    DataLoader, FileStore, FlakyStore, HintCatalog, HuntConfig, HuntController, HuntEngine,
    Identity, ManualClock, MemoryStore, ParticipantStore, StaticData,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::util::unique_suffix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// In-process map, nothing touches disk
    Memory,
    /// JSON documents under --data-dir
    File,
}

pub type DrillStore = FlakyStore<Arc<dyn ParticipantStore>>;
pub type DrillController = HuntController<DrillStore, Arc<ManualClock>>;

/// Builds a fresh controller for every drill iteration.
#[derive(Debug, Clone)]
pub struct HarnessFactory {
    engine: HuntEngine<StaticData>,
    backend: StoreBackend,
    data_dir: PathBuf,
}

impl HarnessFactory {
    pub fn new(
        config: HuntConfig,
        hints: HintCatalog,
        backend: StoreBackend,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            engine: HuntEngine::new(StaticData::new(config).with_hints(hints)),
            backend,
            data_dir,
        }
    }

    /// Factory for the given backend, preferring a riddle file in `data_dir`
    /// over the bundled riddles when the file backend is selected.
    pub async fn load(config: HuntConfig, backend: StoreBackend, data_dir: PathBuf) -> Result<Self> {
        let hints = match backend {
            StoreBackend::File => FileStore::new(&data_dir, &config)
                .load_hints()
                .await
                .with_context(|| format!("failed to read riddles from {}", data_dir.display()))?
                .unwrap_or_else(HintCatalog::load_from_static),
            StoreBackend::Memory => HintCatalog::load_from_static(),
        };
        Ok(Self::new(config, hints, backend, data_dir))
    }

    pub fn build(&self, label: &str) -> Result<Harness> {
        let config = self.engine.data_loader().load_config()?;
        let scratch = match self.backend {
            StoreBackend::Memory => None,
            StoreBackend::File => Some(self.data_dir.join(format!("{label}-{}", unique_suffix()))),
        };
        let store: Arc<dyn ParticipantStore> = match &scratch {
            Some(dir) => Arc::new(FileStore::new(dir, &config)),
            None => Arc::new(MemoryStore::new(&config)),
        };
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0)
                .single()
                .context("invalid drill start time")?,
        ));
        let controller = self
            .engine
            .controller(FlakyStore::new(store), clock)
            .context("failed to build hunt controller")?;
        Ok(Harness {
            controller: Arc::new(controller),
            scratch,
        })
    }
}

/// One drill's controller plus any on-disk scratch space it owns.
pub struct Harness {
    controller: Arc<DrillController>,
    scratch: Option<PathBuf>,
}

impl Harness {
    pub fn controller(&self) -> &DrillController {
        &self.controller
    }

    pub fn shared(&self) -> Arc<DrillController> {
        Arc::clone(&self.controller)
    }

    pub fn clock(&self) -> &ManualClock {
        self.controller.clock()
    }

    pub fn store(&self) -> &DrillStore {
        self.controller.store()
    }

    pub fn total_levels(&self) -> u32 {
        self.controller.config().total_levels
    }

    /// Register and start a participant, returning their identity.
    pub async fn started_participant(&self, tag: &str) -> Result<Identity> {
        let identity = participant(tag)?;
        self.controller
            .register(Some(&identity), tag)
            .await
            .with_context(|| format!("register {identity}"))?;
        self.controller
            .begin_hunt(Some(&identity))
            .await
            .with_context(|| format!("begin hunt for {identity}"))?;
        Ok(identity)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(dir) = self.scratch.take() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

pub fn participant(tag: &str) -> Result<Identity> {
    Identity::parse(&format!("{tag}@drill.hunt")).with_context(|| format!("bad identity tag {tag:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_harness_has_no_scratch_dir() {
        let factory = HarnessFactory::new(
            HuntConfig::with_levels(3),
            HintCatalog::empty(),
            StoreBackend::Memory,
            std::env::temp_dir(),
        );
        let harness = factory.build("memory").unwrap();
        assert!(harness.scratch.is_none());
        assert_eq!(harness.total_levels(), 3);
    }

    #[test]
    fn harness_serves_factory_riddles() {
        let hints =
            HintCatalog::from_json(r#"{"levels":[{"level":1,"text":"behind the clock"}]}"#).unwrap();
        let factory = HarnessFactory::new(
            HuntConfig::with_levels(1),
            hints,
            StoreBackend::Memory,
            std::env::temp_dir(),
        );
        let harness = factory.build("riddles").unwrap();
        assert_eq!(harness.controller().hints().hint_for(1), Some("behind the clock"));
    }

    #[test]
    fn invalid_config_fails_to_build() {
        let factory = HarnessFactory::new(
            HuntConfig::with_levels(0),
            HintCatalog::empty(),
            StoreBackend::Memory,
            std::env::temp_dir(),
        );
        assert!(factory.build("broken").is_err());
    }

    #[test]
    fn file_harness_cleans_up_on_drop() {
        let base = std::env::temp_dir().join(format!("hunt-harness-{}", unique_suffix()));
        let factory = HarnessFactory::new(
            HuntConfig::with_levels(2),
            HintCatalog::empty(),
            StoreBackend::File,
            base.clone(),
        );
        let harness = factory.build("file").unwrap();
        let scratch = harness.scratch.clone().unwrap();
        tokio_test::block_on(harness.started_participant("disk")).unwrap();
        assert!(scratch.exists());
        drop(harness);
        assert!(!scratch.exists());
        let _ = std::fs::remove_dir_all(base);
    }
}
