//! Hunt controller: the session-facing state machine.
//!
//! `Unregistered -> NotStarted -> InProgress(1..=N) -> Completed`. Nothing is
//! cached between calls; every operation re-reads the store and derives state
//! through the progress evaluator.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::advance::advance_level;
use crate::clock::{Clock, SystemClock};
use crate::config::HuntConfig;
use crate::error::{HuntError, HuntResult, StoreError};
use crate::hints::HintCatalog;
use crate::progress::{LevelStatus, evaluate, signals_found, timeline};
use crate::record::{Identity, ParticipantRecord};
use crate::scan::{ScanDecision, ScanValidator};
use crate::store::{CommitOutcome, ParticipantStore, StoredRecord, with_deadline};

/// Where a participant is in the hunt lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HuntState {
    Unregistered,
    NotStarted,
    InProgress { level: u32 },
    Completed,
}

impl HuntState {
    fn of(record: &ParticipantRecord) -> Self {
        let progress = evaluate(record);
        if progress.completed {
            Self::Completed
        } else if !record.is_started() {
            Self::NotStarted
        } else {
            Self::InProgress {
                level: progress.current_level,
            }
        }
    }
}

/// Everything the presentation layer needs to draw the participant's view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuntSnapshot {
    pub identity: Identity,
    pub user_name: String,
    pub state: HuntState,
    pub current_level: u32,
    pub total_levels: u32,
    pub completed: bool,
    /// Riddle for the current level; only while the hunt is in progress.
    pub hint_text: Option<String>,
    pub signals_found: u32,
    pub timeline: Vec<LevelStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub time_taken: Option<f64>,
    /// `time_taken` as `MM:SS`, `--:--` until completion.
    pub elapsed_display: String,
}

/// Result of the "begin hunt" action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Started { at: DateTime<Utc> },
    /// The hunt had already begun; nothing changed.
    AlreadyStarted { at: DateTime<Utc> },
}

/// What happened to one decoded scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    Advanced { cleared: u32 },
    /// The final level was cleared.
    Completed,
    Mismatch { scanned: u32 },
    Unrecognized,
    /// The store had already moved past this level.
    OutOfSequence,
    /// Another advancement for this participant is still in flight.
    Debounced,
    NotStarted,
    AlreadyCompleted,
}

/// Scan outcome plus the server-confirmed view after handling it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    pub snapshot: HuntSnapshot,
}

/// Orchestrates evaluation, validation and advancement for participants.
pub struct HuntController<S, C = SystemClock> {
    config: HuntConfig,
    store: S,
    clock: C,
    validator: ScanValidator,
    hints: HintCatalog,
    in_flight: Mutex<HashSet<Identity>>,
}

/// Marks an identity as having an advancement in flight until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<Identity>>,
    identity: Identity,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<Identity>>, identity: &Identity) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(identity.clone());
        inserted.then(|| Self {
            set,
            identity: identity.clone(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.identity);
    }
}

fn require(identity: Option<&Identity>) -> HuntResult<&Identity> {
    identity.ok_or(HuntError::NotAuthenticated)
}

impl<S: ParticipantStore> HuntController<S, SystemClock> {
    /// Controller on the wall clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_system_clock(config: HuntConfig, store: S, hints: HintCatalog) -> HuntResult<Self> {
        Self::new(config, store, SystemClock, hints)
    }
}

impl<S, C> HuntController<S, C>
where
    S: ParticipantStore,
    C: Clock,
{
    /// Create a controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store decodes
    /// records with a different level count.
    pub fn new(config: HuntConfig, store: S, clock: C, hints: HintCatalog) -> HuntResult<Self> {
        config.validate()?;
        config.check_store_levels(store.total_levels())?;
        let validator = ScanValidator::from_config(&config)?;
        let missing = hints.missing_levels(config.total_levels);
        if !missing.is_empty() {
            log::warn!("no riddle configured for levels {missing:?}");
        }
        Ok(Self {
            config,
            store,
            clock,
            validator,
            hints,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &HuntConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    #[must_use]
    pub const fn hints(&self) -> &HintCatalog {
        &self.hints
    }

    async fn load(&self, identity: &Identity) -> HuntResult<Option<StoredRecord>> {
        let stored = with_deadline(self.config.store_timeout(), self.store.load(identity)).await?;
        log::debug!(
            "loaded {identity}: {}",
            stored
                .as_ref()
                .map_or_else(|| "no record".to_string(), |s| format!("revision {}", s.revision))
        );
        Ok(stored)
    }

    async fn load_existing(&self, identity: &Identity) -> HuntResult<StoredRecord> {
        self.load(identity).await?.ok_or(HuntError::NoRecord)
    }

    fn build_snapshot(&self, identity: &Identity, record: &ParticipantRecord) -> HuntSnapshot {
        let progress = evaluate(record);
        let state = HuntState::of(record);
        let hint_text = matches!(state, HuntState::InProgress { .. })
            .then(|| self.hints.text_or_placeholder(progress.current_level).to_string());
        HuntSnapshot {
            identity: identity.clone(),
            user_name: record.name.clone(),
            state,
            current_level: progress.current_level,
            total_levels: record.total_levels(),
            completed: progress.completed,
            hint_text,
            signals_found: signals_found(record),
            timeline: timeline(record),
            started_at: record.start_time,
            time_taken: record.time_taken,
            elapsed_display: record.elapsed_display(),
        }
    }

    /// Create a fresh record for a newly signed-up participant.
    ///
    /// # Errors
    ///
    /// Returns [`HuntError::AlreadyRegistered`] if a record exists, or a
    /// store error.
    pub async fn register(
        &self,
        identity: Option<&Identity>,
        name: &str,
    ) -> HuntResult<HuntSnapshot> {
        let identity = require(identity)?;
        let record = ParticipantRecord::new(name.trim(), self.config.total_levels);
        let created = with_deadline(
            self.config.store_timeout(),
            self.store.create(identity, &record),
        )
        .await?;
        if !created {
            return Err(HuntError::AlreadyRegistered);
        }
        log::info!("registered {identity} as {:?}", record.name);
        self.snapshot(Some(identity)).await
    }

    /// Current lifecycle state, derived from the store.
    ///
    /// # Errors
    ///
    /// Returns [`HuntError::NotAuthenticated`] without an identity, or a
    /// store error.
    pub async fn state(&self, identity: Option<&Identity>) -> HuntResult<HuntState> {
        let identity = require(identity)?;
        Ok(self
            .load(identity)
            .await?
            .map_or(HuntState::Unregistered, |stored| HuntState::of(&stored.record)))
    }

    /// Server-confirmed view for the presentation layer.
    ///
    /// # Errors
    ///
    /// Returns [`HuntError::NoRecord`] for unregistered identities,
    /// [`HuntError::NotAuthenticated`] without one, or a store error.
    pub async fn snapshot(&self, identity: Option<&Identity>) -> HuntResult<HuntSnapshot> {
        let identity = require(identity)?;
        let stored = self.load_existing(identity).await?;
        Ok(self.build_snapshot(identity, &stored.record))
    }

    /// Start the hunt clock. Starting twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`HuntError::NoRecord`] for unregistered identities,
    /// [`HuntError::NotAuthenticated`] without one, or a store error.
    pub async fn begin_hunt(&self, identity: Option<&Identity>) -> HuntResult<BeginOutcome> {
        let identity = require(identity)?;
        let attempts = self.config.max_commit_retries.max(1);
        for _ in 0..attempts {
            let stored = self.load_existing(identity).await?;
            if let Some(at) = stored.record.start_time {
                log::debug!("{identity} already started at {at}");
                return Ok(BeginOutcome::AlreadyStarted { at });
            }
            let at = self.clock.now();
            let mut next = stored.record.clone();
            next.start_time = Some(at);
            let outcome = with_deadline(
                self.config.store_timeout(),
                self.store.commit(identity, stored.revision, &next),
            )
            .await?;
            if let CommitOutcome::Committed { .. } = outcome {
                log::info!("{identity} began the hunt at {at}");
                return Ok(BeginOutcome::Started { at });
            }
        }
        Err(StoreError::Unavailable(format!(
            "record for {identity} kept changing while starting the hunt"
        ))
        .into())
    }

    /// Handle one decoded scan payload.
    ///
    /// Mismatched and unreadable payloads change nothing. A match runs the
    /// advancement transaction unless one is already in flight for this
    /// participant. The returned snapshot is always re-read from the store.
    ///
    /// # Errors
    ///
    /// Returns [`HuntError::NotAuthenticated`], [`HuntError::NoRecord`], or a
    /// retryable store error. Sequence violations are reported as
    /// [`ScanOutcome::OutOfSequence`].
    pub async fn submit_scan(
        &self,
        identity: Option<&Identity>,
        payload: &str,
    ) -> HuntResult<ScanReport> {
        let identity = require(identity)?;
        let stored = self.load_existing(identity).await?;
        let snapshot = self.build_snapshot(identity, &stored.record);

        let expected = match snapshot.state {
            HuntState::InProgress { level } => level,
            HuntState::Completed => {
                return Ok(ScanReport {
                    outcome: ScanOutcome::AlreadyCompleted,
                    snapshot,
                });
            }
            HuntState::NotStarted | HuntState::Unregistered => {
                return Ok(ScanReport {
                    outcome: ScanOutcome::NotStarted,
                    snapshot,
                });
            }
        };

        match self.validator.validate(payload, expected) {
            ScanDecision::Unrecognized => {
                log::debug!("{identity}: unrecognized payload ignored");
                Ok(ScanReport {
                    outcome: ScanOutcome::Unrecognized,
                    snapshot,
                })
            }
            ScanDecision::Mismatch { scanned } => {
                log::debug!("{identity}: scanned level {scanned} while at level {expected}");
                Ok(ScanReport {
                    outcome: ScanOutcome::Mismatch { scanned },
                    snapshot,
                })
            }
            ScanDecision::Match => self.advance_matched(identity, expected, snapshot).await,
        }
    }

    async fn advance_matched(
        &self,
        identity: &Identity,
        level: u32,
        before: HuntSnapshot,
    ) -> HuntResult<ScanReport> {
        let Some(_guard) = InFlight::acquire(&self.in_flight, identity) else {
            log::debug!("{identity}: advancement already in flight, debouncing level {level}");
            return Ok(ScanReport {
                outcome: ScanOutcome::Debounced,
                snapshot: before,
            });
        };

        let outcome =
            match advance_level(&self.store, &self.clock, &self.config, identity, level).await {
                Ok(()) => None,
                Err(HuntError::SequenceViolation { .. }) => Some(ScanOutcome::OutOfSequence),
                Err(err) => return Err(err),
            };

        let snapshot = self.snapshot(Some(identity)).await?;
        let outcome = outcome.unwrap_or(if snapshot.completed {
            ScanOutcome::Completed
        } else {
            ScanOutcome::Advanced { cleared: level }
        });
        Ok(ScanReport { outcome, snapshot })
    }

    /// Drive the hunt from a stream of decoded scan payloads.
    ///
    /// Frames are handled one at a time. Unrecognized frames are skipped
    /// silently; every other result, including retryable store failures, is
    /// passed to `on_report`. After an advancement, frames already buffered
    /// with the same payload are dropped. Returns the final snapshot once the
    /// hunt completes or the stream closes.
    ///
    /// # Errors
    ///
    /// Returns any non-retryable error, e.g. [`HuntError::NoRecord`].
    pub async fn run_scanner<F>(
        &self,
        identity: &Identity,
        mut events: mpsc::Receiver<String>,
        mut on_report: F,
    ) -> HuntResult<HuntSnapshot>
    where
        F: FnMut(&HuntResult<ScanReport>),
    {
        let mut pending: VecDeque<String> = VecDeque::new();
        loop {
            let payload = match pending.pop_front() {
                Some(payload) => payload,
                None => match events.recv().await {
                    Some(payload) => payload,
                    None => break,
                },
            };

            let result = match self.submit_scan(Some(identity), &payload).await {
                Err(err) if !err.is_retryable() => return Err(err),
                other => other,
            };
            match &result {
                Ok(report) => {
                    if report.outcome == ScanOutcome::Unrecognized {
                        continue;
                    }
                    let advanced = matches!(
                        report.outcome,
                        ScanOutcome::Advanced { .. } | ScanOutcome::Completed
                    );
                    let finished = report.snapshot.completed;
                    on_report(&result);
                    if finished {
                        return Ok(report.snapshot.clone());
                    }
                    if advanced {
                        let dropped = drain_repeats(&mut events, &mut pending, &payload);
                        if dropped > 0 {
                            log::debug!("{identity}: dropped {dropped} repeated frames");
                        }
                    }
                }
                Err(err) => {
                    log::warn!("{identity}: scan not processed, store unavailable: {err}");
                    on_report(&result);
                }
            }
        }
        self.snapshot(Some(identity)).await
    }
}

/// Pull everything already buffered, discarding copies of `payload`.
fn drain_repeats(
    events: &mut mpsc::Receiver<String>,
    pending: &mut VecDeque<String>,
    payload: &str,
) -> usize {
    while let Ok(next) = events.try_recv() {
        pending.push_back(next);
    }
    let before = pending.len();
    pending.retain(|p| p != payload);
    before - pending.len()
}
