use crate::error::SchedulerError;
use crate::interval_table::{IntervalTable, MAX_LEVEL, MIN_LEVEL, UNSEEN_LEVEL};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scope used when the caller does not name one
pub const DEFAULT_SCOPE: &str = "default";

/// Verdict on a single answered question, produced by the grading collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Correct,
    Incorrect,
}

impl Outcome {
    pub fn as_str(&self) -> &str {
        match self {
            Outcome::Correct => "correct",
            Outcome::Incorrect => "incorrect",
        }
    }

    pub fn from(s: &str) -> Option<Self> {
        match s {
            "correct" => Some(Outcome::Correct),
            "incorrect" => Some(Outcome::Incorrect),
            _ => None,
        }
    }
}

impl FromStr for Outcome {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Outcome::from(&s.to_ascii_lowercase()).ok_or_else(|| SchedulerError::UnknownOutcome(s.to_string()))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review state of one item in one scope.
///
/// `level` and `time_created` are optional because stored rows can be
/// incomplete; such records are never due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrsRecord {
    #[serde(rename = "itemId")]
    pub item_id: i64,
    pub scope: String,
    pub level: Option<i64>,
    pub time_created: Option<DateTime<Utc>>,
}

impl SrsRecord {
    pub fn new(item_id: i64, scope: &str, level: i64, time_created: DateTime<Utc>) -> Self {
        SrsRecord {
            item_id,
            scope: scope.to_string(),
            level: Some(level),
            time_created: Some(time_created),
        }
    }

    /// Level of a possibly absent record; absence and a missing level both
    /// read as unseen
    pub fn level_of(record: Option<&SrsRecord>) -> i64 {
        record.and_then(|r| r.level).unwrap_or(UNSEEN_LEVEL)
    }

    /// True when the record carries both fields and a level inside 0..=9
    pub fn is_well_formed(&self) -> bool {
        matches!(self.level, Some(level) if (UNSEEN_LEVEL..=MAX_LEVEL).contains(&level))
            && self.time_created.is_some()
    }

    pub fn is_unseen(&self) -> bool {
        self.level.unwrap_or(UNSEEN_LEVEL) == UNSEEN_LEVEL
    }
}

/// A level change computed for one answer, ready to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub item_id: i64,
    pub scope: String,
    pub previous_level: i64,
    pub new_level: i64,
    pub outcome: Outcome,
    pub occurred_at: DateTime<Utc>,
}

impl Transition {
    /// True when this transition moved the item out of the unseen level
    pub fn is_first_entry(&self) -> bool {
        self.previous_level == UNSEEN_LEVEL && self.new_level >= MIN_LEVEL
    }

    /// Record state after the transition; the clock restarts at `occurred_at`
    pub fn to_record(&self) -> SrsRecord {
        SrsRecord::new(self.item_id, &self.scope, self.new_level, self.occurred_at)
    }
}

/// Level-based review scheduling over an injected interval table
#[derive(Debug, Clone, Default)]
pub struct ReviewScheduler {
    intervals: IntervalTable,
}

impl ReviewScheduler {
    pub fn new(intervals: IntervalTable) -> Self {
        Self { intervals }
    }

    pub fn intervals(&self) -> &IntervalTable {
        &self.intervals
    }

    /// Decides whether a record is due for review at `now`.
    ///
    /// Absent or incomplete records, levels outside 1..=9 and timestamps
    /// in the future are never due.
    pub fn is_due(&self, record: Option<&SrsRecord>, now: DateTime<Utc>) -> bool {
        let Some(record) = record else {
            return false;
        };
        let (Some(level), Some(time_created)) = (record.level, record.time_created) else {
            return false;
        };
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return false;
        }
        if time_created > now {
            return false;
        }
        now.signed_duration_since(time_created) >= self.intervals.interval(level)
    }

    /// Moment the record becomes due, if it is in the review cycle at all
    pub fn next_due_at(&self, record: &SrsRecord) -> Option<DateTime<Utc>> {
        match (record.level, record.time_created) {
            (Some(level), Some(time_created)) if (MIN_LEVEL..=MAX_LEVEL).contains(&level) => {
                time_created.checked_add_signed(self.intervals.interval(level))
            }
            _ => None,
        }
    }

    /// Level after answering an item at `current`.
    ///
    /// Correct answers climb one level up to 9, incorrect ones drop one level
    /// but never below 1. Out-of-range inputs are pulled back into 1..=9.
    pub fn next_level(current: i64, outcome: Outcome) -> i64 {
        let next = match outcome {
            Outcome::Correct => current.saturating_add(1).min(MAX_LEVEL),
            Outcome::Incorrect => current.saturating_sub(1).max(MIN_LEVEL),
        };
        next.clamp(MIN_LEVEL, MAX_LEVEL)
    }

    /// Computes the transition for answering an item whose current state is
    /// `record` (absent meaning unseen)
    pub fn transition(
        &self,
        item_id: i64,
        scope: &str,
        record: Option<&SrsRecord>,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Transition {
        let previous_level = SrsRecord::level_of(record);
        Transition {
            item_id,
            scope: scope.to_string(),
            previous_level,
            new_level: Self::next_level(previous_level, outcome),
            outcome,
            occurred_at: now,
        }
    }
}
