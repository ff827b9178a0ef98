use anyhow::Result;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::harness::{Harness, HarnessFactory};

pub mod drills;

/// Per-iteration context handed to a drill.
pub struct DrillCtx<'a> {
    pub harness: &'a Harness,
    pub iteration: usize,
    pub verbose: bool,
}

impl DrillCtx<'_> {
    /// Participant tag unique to this drill iteration.
    pub fn tag(&self, role: &str) -> String {
        format!("{role}-{}", self.iteration)
    }
}

#[async_trait::async_trait]
pub trait Drill: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
}

pub struct ScenarioRunner<'a> {
    factory: &'a HarnessFactory,
    verbose: bool,
}

impl<'a> ScenarioRunner<'a> {
    pub const fn new(factory: &'a HarnessFactory, verbose: bool) -> Self {
        Self { factory, verbose }
    }

    pub async fn run(&self, key: &str, drill: &dyn Drill, iterations: usize) -> ScenarioResult {
        if self.verbose {
            println!("🧪 Running drill: {}", drill.name().bright_white());
        }

        let mut successes = 0;
        let mut failures = Vec::new();
        let mut timings = Vec::with_capacity(iterations);

        for iteration in 0..iterations {
            let harness = match self.factory.build(key) {
                Ok(harness) => harness,
                Err(err) => {
                    failures.push(format!("iteration {iteration}: {err:#}"));
                    continue;
                }
            };
            let ctx = DrillCtx {
                harness: &harness,
                iteration,
                verbose: self.verbose,
            };
            let started = Instant::now();
            let outcome = drill.run(&ctx).await;
            timings.push(started.elapsed());
            match outcome {
                Ok(()) => successes += 1,
                Err(err) => {
                    log::debug!("{key} iteration {iteration} failed: {err:#}");
                    failures.push(format!("iteration {iteration}: {err:#}"));
                }
            }
        }

        let average_duration = if timings.is_empty() {
            Duration::ZERO
        } else {
            timings.iter().sum::<Duration>() / u32::try_from(timings.len()).unwrap_or(u32::MAX)
        };

        ScenarioResult {
            scenario_name: drill.name().to_string(),
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
        }
    }
}

pub fn get_scenario(name: &str) -> Option<Box<dyn Drill>> {
    match name.to_lowercase().as_str() {
        "smoke" => Some(Box::new(drills::SmokeDrill)),
        "out-of-sequence" | "sequence" => Some(Box::new(drills::OutOfSequenceDrill)),
        "unrecognized-payload" | "unrecognized" => Some(Box::new(drills::UnrecognizedPayloadDrill)),
        "double-begin" => Some(Box::new(drills::DoubleBeginDrill)),
        "concurrent-race" | "race" => Some(Box::new(drills::ConcurrentRaceDrill)),
        "unregistered" => Some(Box::new(drills::UnregisteredDrill)),
        "completion-timing" | "timing" => Some(Box::new(drills::CompletionTimingDrill)),
        "scan-stream" | "stream" => Some(Box::new(drills::ScanStreamDrill)),
        "store-outage" | "outage" => Some(Box::new(drills::StoreOutageDrill)),
        _ => None,
    }
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    vec![
        ("smoke", "Full hunt from registration to completion"),
        ("out-of-sequence", "Skipped and replayed levels are refused"),
        ("unrecognized-payload", "Junk payloads change nothing"),
        ("double-begin", "Starting twice keeps the first start time"),
        ("concurrent-race", "Racing scans clear a level exactly once"),
        ("unregistered", "Missing records and identities are hard stops"),
        ("completion-timing", "Completion stamps duration in minutes"),
        ("scan-stream", "Scanner stream debounces repeated frames"),
        ("store-outage", "Store failures are retryable and harmless"),
    ]
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::StoreBackend;
    use hunt_engine::{HintCatalog, HuntConfig};

    struct FailingDrill;

    #[async_trait::async_trait]
    impl Drill for FailingDrill {
        fn name(&self) -> &'static str {
            "Always Fails"
        }

        async fn run(&self, ctx: &DrillCtx<'_>) -> Result<()> {
            anyhow::ensure!(ctx.iteration > 0, "first iteration refuses");
            Ok(())
        }
    }

    fn factory() -> HarnessFactory {
        HarnessFactory::new(
            HuntConfig::with_levels(3),
            HintCatalog::load_from_static(),
            StoreBackend::Memory,
            std::env::temp_dir(),
        )
    }

    #[test]
    fn every_listed_scenario_resolves() {
        for (key, _) in list_scenarios() {
            assert!(get_scenario(key).is_some(), "missing drill for {key}");
        }
        assert!(get_scenario("nope").is_none());
    }

    #[test]
    fn failures_are_recorded_per_iteration() {
        let factory = factory();
        let runner = ScenarioRunner::new(&factory, false);
        let result = tokio_test::block_on(runner.run("failing", &FailingDrill, 3));
        assert!(!result.passed);
        assert_eq!(result.iterations_run, 3);
        assert_eq!(result.successful_iterations, 2);
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].contains("first iteration refuses"));
    }

    #[test]
    fn scenario_result_serializes_duration_as_millis() {
        let result = ScenarioResult {
            scenario_name: "Smoke".into(),
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_duration: Duration::from_millis(42),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["average_duration"], 42);
    }
}
