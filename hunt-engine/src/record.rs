//! Participant identity and the persisted per-participant record.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{
    DOC_FLAG_PREFIX, DOC_NAME, DOC_START_TIME, DOC_STOP_TIME, DOC_TIME_TAKEN, ELAPSED_PLACEHOLDER,
};

/// Scan flags indexed by `level - 1`.
pub type LevelFlags = SmallVec<[bool; 8]>;

/// Unique key (registered email) addressing a participant record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Accept an identity supplied by the identity collaborator.
    /// Surrounding whitespace is dropped; blank input yields `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable state for one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRecord {
    pub name: String,
    pub level_flags: LevelFlags,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    /// Minutes between start and stop, rounded to two decimals.
    pub time_taken: Option<f64>,
}

/// Store-side shape of a record: `name`, `qr1..qrN`, camelCase times.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    stop_time: Option<DateTime<Utc>>,
    #[serde(default)]
    time_taken: Option<f64>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl ParticipantRecord {
    /// Fresh registration: every flag clear, no times recorded.
    #[must_use]
    pub fn new(name: impl Into<String>, total_levels: u32) -> Self {
        Self {
            name: name.into(),
            level_flags: std::iter::repeat_n(false, total_levels as usize).collect(),
            start_time: None,
            stop_time: None,
            time_taken: None,
        }
    }

    #[must_use]
    pub fn total_levels(&self) -> u32 {
        u32::try_from(self.level_flags.len()).unwrap_or(u32::MAX)
    }

    /// Flag for a 1-based level, `None` when the level is out of range.
    #[must_use]
    pub fn flag(&self, level: u32) -> Option<bool> {
        let idx = usize::try_from(level.checked_sub(1)?).ok()?;
        self.level_flags.get(idx).copied()
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.start_time.is_some()
    }

    #[must_use]
    pub fn all_flags_set(&self) -> bool {
        !self.level_flags.is_empty() && self.level_flags.iter().all(|f| *f)
    }

    /// Completion time rendered as `MM:SS`, or `--:--` when not recorded.
    #[must_use]
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.time_taken)
    }

    pub(crate) fn set_flag(&mut self, level: u32) {
        if let Some(idx) = level.checked_sub(1).map(|i| i as usize)
            && let Some(flag) = self.level_flags.get_mut(idx)
        {
            *flag = true;
        }
    }

    pub(crate) fn stamp_completion(&mut self, start: DateTime<Utc>, stop: DateTime<Utc>) {
        self.stop_time = Some(stop);
        self.time_taken = Some(minutes_between(start, stop));
    }

    /// Encode as the store document.
    #[must_use]
    pub fn to_document(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(DOC_NAME.to_string(), self.name.clone().into());
        for (idx, flag) in self.level_flags.iter().enumerate() {
            map.insert(format!("{DOC_FLAG_PREFIX}{}", idx + 1), (*flag).into());
        }
        map.insert(DOC_START_TIME.to_string(), time_value(self.start_time));
        map.insert(DOC_STOP_TIME.to_string(), time_value(self.stop_time));
        map.insert(
            DOC_TIME_TAKEN.to_string(),
            self.time_taken
                .and_then(serde_json::Number::from_f64)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
        );
        serde_json::Value::Object(map)
    }

    /// Decode a store document for a hunt with `total_levels` stages.
    /// Absent or non-boolean `qrK` entries read as not scanned.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not an object or a time field
    /// is not a valid timestamp.
    pub fn from_document(
        doc: serde_json::Value,
        total_levels: u32,
    ) -> Result<Self, serde_json::Error> {
        let doc: RecordDocument = serde_json::from_value(doc)?;
        let level_flags = (1..=total_levels)
            .map(|level| {
                doc.rest
                    .get(&format!("{DOC_FLAG_PREFIX}{level}"))
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false)
            })
            .collect();
        Ok(Self {
            name: doc.name,
            level_flags,
            start_time: doc.start_time,
            stop_time: doc.stop_time,
            time_taken: doc.time_taken,
        })
    }
}

fn time_value(ts: Option<DateTime<Utc>>) -> serde_json::Value {
    ts.map_or(serde_json::Value::Null, |t| {
        serde_json::Value::String(t.to_rfc3339())
    })
}

/// Elapsed minutes from `start` to `stop`, rounded to two decimals.
/// A stop earlier than start (clock skew) counts as zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn minutes_between(start: DateTime<Utc>, stop: DateTime<Utc>) -> f64 {
    let millis = (stop - start).num_milliseconds().max(0);
    let minutes = millis as f64 / 60_000.0;
    (minutes * 100.0).round() / 100.0
}

/// Render a minute count as `MM:SS`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_elapsed(minutes: Option<f64>) -> String {
    match minutes {
        Some(m) if m > 0.0 && m.is_finite() => {
            let total_seconds = (m * 60.0).round() as u64;
            format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
        }
        _ => ELAPSED_PLACEHOLDER.to_string(),
    }
}
