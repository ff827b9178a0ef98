//! Progress evaluation: current level and completion derived from stored flags.
use serde::{Deserialize, Serialize};

use crate::record::ParticipantRecord;

/// Where a participant stands in the hunt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Level to display; clamped to the last level once completed.
    pub current_level: u32,
    pub completed: bool,
}

/// Result of evaluating an identity's stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// No record exists; this is not level 1.
    NoRecord,
    Progress(Progress),
}

/// Per-level marker for progress timelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStatus {
    Completed,
    Current,
    Locked,
}

/// Derive progress from a record's flags.
#[must_use]
pub fn evaluate(record: &ParticipantRecord) -> Progress {
    let total = record.total_levels();
    match first_open_level(record) {
        Some(level) => Progress {
            current_level: level,
            completed: false,
        },
        None => Progress {
            current_level: total.max(1),
            completed: true,
        },
    }
}

/// Evaluate an optional lookup, keeping "no record" distinct.
#[must_use]
pub fn evaluate_lookup(record: Option<&ParticipantRecord>) -> Evaluation {
    record.map_or(Evaluation::NoRecord, |r| Evaluation::Progress(evaluate(r)))
}

/// Level the next scan must match, `None` once every flag is set.
#[must_use]
pub fn expected_level(record: &ParticipantRecord) -> Option<u32> {
    first_open_level(record)
}

/// Number of levels cleared in sequence.
#[must_use]
pub fn signals_found(record: &ParticipantRecord) -> u32 {
    first_open_level(record).map_or_else(|| record.total_levels(), |level| level - 1)
}

/// Completed / current / locked marker for every level.
#[must_use]
pub fn timeline(record: &ParticipantRecord) -> Vec<LevelStatus> {
    let progress = evaluate(record);
    (1..=record.total_levels())
        .map(|level| {
            if progress.completed || level < progress.current_level {
                LevelStatus::Completed
            } else if level == progress.current_level {
                LevelStatus::Current
            } else {
                LevelStatus::Locked
            }
        })
        .collect()
}

fn first_open_level(record: &ParticipantRecord) -> Option<u32> {
    record
        .level_flags
        .iter()
        .position(|flag| !flag)
        .and_then(|idx| u32::try_from(idx + 1).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_prefix(total: u32, cleared: u32) -> ParticipantRecord {
        let mut record = ParticipantRecord::new("Prefix", total);
        for level in 1..=cleared {
            record.set_flag(level);
        }
        record
    }

    #[test]
    fn every_prefix_maps_to_next_level() {
        for total in 1..=10 {
            for cleared in 0..=total {
                let progress = evaluate(&with_prefix(total, cleared));
                assert_eq!(progress.completed, cleared == total, "n={total} k={cleared}");
                let expected_level = if cleared == total { total } else { cleared + 1 };
                assert_eq!(progress.current_level, expected_level, "n={total} k={cleared}");
            }
        }
    }

    #[test]
    fn gap_in_flags_stops_at_first_clear() {
        let mut record = ParticipantRecord::new("Gappy", 4);
        record.set_flag(1);
        record.set_flag(3);
        assert_eq!(
            evaluate(&record),
            Progress {
                current_level: 2,
                completed: false
            }
        );
        assert_eq!(signals_found(&record), 1);
    }

    #[test]
    fn missing_record_is_not_level_one() {
        assert_eq!(evaluate_lookup(None), Evaluation::NoRecord);
        let fresh = ParticipantRecord::new("Fresh", 6);
        assert_eq!(
            evaluate_lookup(Some(&fresh)),
            Evaluation::Progress(Progress {
                current_level: 1,
                completed: false
            })
        );
    }

    #[test]
    fn evaluation_is_idempotent() {
        let record = with_prefix(6, 3);
        let first = evaluate(&record);
        for _ in 0..5 {
            assert_eq!(evaluate(&record), first);
        }
    }

    #[test]
    fn expected_level_and_signals_found() {
        let record = with_prefix(6, 2);
        assert_eq!(expected_level(&record), Some(3));
        assert_eq!(signals_found(&record), 2);

        let done = with_prefix(6, 6);
        assert_eq!(expected_level(&done), None);
        assert_eq!(signals_found(&done), 6);
    }

    #[test]
    fn timeline_marks_completed_current_and_locked() {
        let record = with_prefix(4, 1);
        assert_eq!(
            timeline(&record),
            vec![
                LevelStatus::Completed,
                LevelStatus::Current,
                LevelStatus::Locked,
                LevelStatus::Locked
            ]
        );
        assert!(
            timeline(&with_prefix(3, 3))
                .iter()
                .all(|s| *s == LevelStatus::Completed)
        );
    }
}
