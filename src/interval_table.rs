use crate::error::{Result, SchedulerError};
use chrono::Duration;

/// Highest mastery level an item can reach
pub const MAX_LEVEL: i64 = 9;

/// Lowest level of an item that has entered the review cycle
pub const MIN_LEVEL: i64 = 1;

/// Level of an item that has never been reviewed
pub const UNSEEN_LEVEL: i64 = 0;

const LEVEL_COUNT: usize = MAX_LEVEL as usize;

/// Review delay for every mastery level
///
/// Index 0 holds the delay for level 1, index 8 the delay for level 9.
/// Tables are immutable once built and are handed to whoever needs them,
/// so tests and environments can swap them freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalTable {
    intervals: [Duration; LEVEL_COUNT],
}

impl IntervalTable {
    /// Builds a table from one delay per level, validating that the delays
    /// are positive and strictly increasing
    pub fn new(intervals: &[Duration]) -> Result<Self> {
        if intervals.len() != LEVEL_COUNT {
            return Err(SchedulerError::InvalidIntervalTable(format!(
                "expected {} intervals, got {}",
                LEVEL_COUNT,
                intervals.len()
            )));
        }

        if intervals[0] <= Duration::zero() {
            return Err(SchedulerError::InvalidIntervalTable(
                "level 1 interval must be positive".to_string(),
            ));
        }

        for (index, pair) in intervals.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(SchedulerError::InvalidIntervalTable(format!(
                    "level {} interval must be longer than level {}",
                    index + 2,
                    index + 1
                )));
            }
        }

        let mut table = [Duration::zero(); LEVEL_COUNT];
        table.copy_from_slice(intervals);
        Ok(Self { intervals: table })
    }

    /// Delay before an item at `level` is due again.
    ///
    /// Levels outside 1..=9 fall back to the level 1 delay.
    pub fn interval(&self, level: i64) -> Duration {
        if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            self.intervals[(level - MIN_LEVEL) as usize]
        } else {
            self.intervals[0]
        }
    }

    pub fn levels(&self) -> impl Iterator<Item = (i64, Duration)> + '_ {
        self.intervals
            .iter()
            .enumerate()
            .map(|(index, interval)| (index as i64 + MIN_LEVEL, *interval))
    }
}

impl Default for IntervalTable {
    fn default() -> Self {
        Self {
            intervals: [
                Duration::minutes(10),
                Duration::days(1),
                Duration::days(3),
                Duration::days(7),
                Duration::days(14),
                Duration::days(30),
                Duration::days(60),
                Duration::days(120),
                Duration::days(180),
            ],
        }
    }
}
