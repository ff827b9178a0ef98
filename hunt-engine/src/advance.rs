//! Level advancement: the only path that sets a level flag.
//!
//! The expected level is recomputed from the stored record on every attempt;
//! the caller's asserted level is only ever compared against it. The flag,
//! and on the last level the stop time and duration, are written in one
//! compare-and-swap.
use crate::clock::Clock;
use crate::config::HuntConfig;
use crate::constants::LOG_TARGET_SECURITY;
use crate::error::{HuntError, HuntResult, StoreError};
use crate::progress::expected_level;
use crate::record::Identity;
use crate::store::{CommitOutcome, ParticipantStore, with_deadline};

/// Mark `asserted` complete for `identity` if it is the participant's
/// current expected level.
///
/// Success carries no state; re-evaluate the record to see the new level.
///
/// # Errors
///
/// - [`HuntError::NoRecord`] if the identity has no record.
/// - [`HuntError::SequenceViolation`] if `asserted` is not the expected level,
///   including when a concurrent advancement got there first.
/// - [`HuntError::NotStarted`] if the hunt has no start time.
/// - [`HuntError::StoreUnavailable`] on store failure, stall, or persistent
///   write contention.
/// - [`HuntError::Config`] if the store decodes a different level count
///   than `config`.
///
/// The record is untouched on every error path.
pub async fn advance_level<S, C>(
    store: &S,
    clock: &C,
    config: &HuntConfig,
    identity: &Identity,
    asserted: u32,
) -> HuntResult<()>
where
    S: ParticipantStore + ?Sized,
    C: Clock + ?Sized,
{
    config.check_store_levels(store.total_levels())?;
    let limit = config.store_timeout();
    let attempts = config.max_commit_retries.max(1);

    for attempt in 1..=attempts {
        let stored = with_deadline(limit, store.load(identity))
            .await?
            .ok_or(HuntError::NoRecord)?;

        let expected = expected_level(&stored.record);
        if expected != Some(asserted) {
            log::warn!(
                target: LOG_TARGET_SECURITY,
                "sequence violation for {identity}: asserted level {asserted}, expected {expected:?}"
            );
            return Err(HuntError::SequenceViolation { asserted, expected });
        }

        let Some(start) = stored.record.start_time else {
            return Err(HuntError::NotStarted);
        };

        let mut next = stored.record.clone();
        next.set_flag(asserted);
        let finishing = asserted == next.total_levels();
        if finishing {
            next.stamp_completion(start, clock.now());
        }

        match with_deadline(limit, store.commit(identity, stored.revision, &next)).await? {
            CommitOutcome::Committed { revision } => {
                if finishing {
                    log::info!(
                        "{identity} completed the hunt in {:.2} minutes (revision {revision})",
                        next.time_taken.unwrap_or_default()
                    );
                } else {
                    log::info!("{identity} cleared level {asserted} (revision {revision})");
                }
                return Ok(());
            }
            CommitOutcome::Conflict => {
                log::debug!(
                    "commit conflict for {identity} at revision {} (attempt {attempt}/{attempts})",
                    stored.revision
                );
            }
        }
    }

    Err(StoreError::Unavailable(format!(
        "record for {identity} kept changing; gave up after {attempts} attempts"
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ConfigError;
    use crate::record::ParticipantRecord;
    use crate::store::{FlakyStore, MemoryStore};
    use chrono::{Duration, TimeZone, Utc};

    fn ident() -> Identity {
        Identity::parse("advance@example.com").unwrap()
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap())
    }

    async fn seeded(total: u32, cleared: u32, started: bool, clock: &ManualClock) -> MemoryStore {
        let store = MemoryStore::new(&HuntConfig::with_levels(total));
        let mut record = ParticipantRecord::new("Runner", total);
        for level in 1..=cleared {
            record.set_flag(level);
        }
        if started {
            record.start_time = Some(clock.now());
        }
        store.create(&ident(), &record).await.unwrap();
        store
    }

    async fn record_of(store: &MemoryStore) -> ParticipantRecord {
        store.load(&ident()).await.unwrap().unwrap().record
    }

    #[tokio::test]
    async fn advances_expected_level() {
        let clock = clock();
        let store = seeded(6, 0, true, &clock).await;
        advance_level(&store, &clock, &HuntConfig::default(), &ident(), 1)
            .await
            .unwrap();
        let record = record_of(&store).await;
        assert_eq!(record.flag(1), Some(true));
        assert!(record.stop_time.is_none());
        assert!(record.time_taken.is_none());
    }

    #[tokio::test]
    async fn skipping_ahead_is_a_violation_and_changes_nothing() {
        let clock = clock();
        let store = seeded(6, 2, true, &clock).await;
        let before = store.document(&ident()).await.unwrap();
        let err = advance_level(&store, &clock, &HuntConfig::default(), &ident(), 4)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HuntError::SequenceViolation {
                asserted: 4,
                expected: Some(3)
            }
        ));
        assert_eq!(store.document(&ident()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn replaying_a_cleared_level_is_a_violation() {
        let clock = clock();
        let store = seeded(6, 2, true, &clock).await;
        let err = advance_level(&store, &clock, &HuntConfig::default(), &ident(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, HuntError::SequenceViolation { asserted: 2, .. }));
    }

    #[tokio::test]
    async fn final_level_stamps_stop_and_duration_together() {
        let clock = clock();
        let store = seeded(6, 5, true, &clock).await;
        clock.advance(Duration::seconds(125));
        advance_level(&store, &clock, &HuntConfig::default(), &ident(), 6)
            .await
            .unwrap();
        let record = record_of(&store).await;
        assert!(record.all_flags_set());
        assert_eq!(record.stop_time, Some(clock.now()));
        assert_eq!(record.time_taken, Some(2.08));
    }

    #[tokio::test]
    async fn completed_hunt_rejects_further_levels() {
        let clock = clock();
        let store = seeded(3, 3, true, &clock).await;
        let err = advance_level(&store, &clock, &HuntConfig::with_levels(3), &ident(), 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HuntError::SequenceViolation {
                asserted: 3,
                expected: None
            }
        ));
    }

    #[tokio::test]
    async fn unstarted_hunt_cannot_advance() {
        let clock = clock();
        let store = seeded(2, 1, false, &clock).await;
        let err = advance_level(&store, &clock, &HuntConfig::with_levels(2), &ident(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, HuntError::NotStarted));
        let record = record_of(&store).await;
        assert_eq!(record.flag(2), Some(false));
        assert!(record.stop_time.is_none() && record.time_taken.is_none());
    }

    #[tokio::test]
    async fn store_level_count_must_match_config() {
        let clock = clock();
        let store = seeded(6, 2, true, &clock).await;
        let before = store.document(&ident()).await.unwrap();
        let err = advance_level(&store, &clock, &HuntConfig::with_levels(3), &ident(), 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HuntError::Config(ConfigError::StoreLevelMismatch {
                config: 3,
                store: 6
            })
        ));
        assert_eq!(store.document(&ident()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn missing_record_is_reported() {
        let clock = clock();
        let store = MemoryStore::new(&HuntConfig::with_levels(6));
        let err = advance_level(&store, &clock, &HuntConfig::default(), &ident(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, HuntError::NoRecord));
    }

    #[tokio::test]
    async fn store_outage_is_retryable_and_harmless() {
        let clock = clock();
        let store = FlakyStore::new(seeded(6, 0, true, &clock).await);
        store.fail_next(1);
        let err = advance_level(&store, &clock, &HuntConfig::default(), &ident(), 1)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(record_of(store.inner()).await.flag(1), Some(false));

        advance_level(&store, &clock, &HuntConfig::default(), &ident(), 1)
            .await
            .unwrap();
        assert_eq!(record_of(store.inner()).await.flag(1), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out() {
        let clock = clock();
        let store = FlakyStore::new(seeded(6, 0, true, &clock).await);
        store.stall(Some(std::time::Duration::from_secs(60)));
        let err = advance_level(&store, &clock, &HuntConfig::default(), &ident(), 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HuntError::StoreUnavailable(StoreError::Timeout(_))
        ));
    }
}
