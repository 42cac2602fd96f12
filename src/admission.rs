use crate::error::{Result, SchedulerError};
use crate::item::ItemKind;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use log::debug;
use serde::Serialize;
use std::str::FromStr;

/// Day-scoped counting query the admission controller depends on
pub trait FirstEntryCounter {
    /// Number of items of `kind` in the set that left the unseen level for
    /// `scope` within `[start, end)`
    fn count_first_entries(
        &self,
        set_id: i64,
        kind: ItemKind,
        scope: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;
}

/// One learn-new admission question
#[derive(Debug, Clone)]
pub struct AdmissionRequest<Tz: TimeZone> {
    pub set_id: i64,
    pub kind: ItemKind,
    pub scope: String,
    /// How many unseen items the caller would like to introduce; 0 only
    /// queries the quota
    pub requested_count: i64,
    /// Daily cap of first entries for this set and kind
    pub cap: i64,
    pub as_of: DateTime<Utc>,
    /// Zone whose calendar day "today" refers to
    pub timezone: Tz,
}

impl<Tz: TimeZone> AdmissionRequest<Tz> {
    /// Same request with "today" read in another zone
    pub fn in_timezone<Other: TimeZone>(self, timezone: Other) -> AdmissionRequest<Other> {
        AdmissionRequest {
            set_id: self.set_id,
            kind: self.kind,
            scope: self.scope,
            requested_count: self.requested_count,
            cap: self.cap,
            as_of: self.as_of,
            timezone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnNewQuota {
    pub learned_today: i64,
    pub remaining: i64,
    /// Number of items the caller may present now, `min(requested, remaining)`
    pub admitted: i64,
}

/// Quota left once `learned_today` entries have been used up
pub fn remaining_quota(cap: i64, learned_today: i64) -> i64 {
    cap.saturating_sub(learned_today).max(0)
}

/// UTC bounds `[start, end)` of the local calendar day containing `as_of`
pub fn local_day_bounds<Tz: TimeZone>(as_of: DateTime<Utc>, timezone: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_date = as_of.with_timezone(timezone).date_naive();
    let start = local_midnight(timezone, local_date);
    let end = local_date
        .succ_opt()
        .map(|next| local_midnight(timezone, next))
        .unwrap_or(start + Duration::days(1));
    (start, end)
}

// A midnight skipped by a DST jump resolves to the first local hour that exists
fn local_midnight<Tz: TimeZone>(timezone: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=3)
        .find_map(|hours| {
            timezone
                .from_local_datetime(&(midnight + Duration::hours(hours)))
                .earliest()
        })
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

/// Zone a learner's calendar day is read in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnerTimezone {
    /// IANA zone such as `Asia/Tokyo`, daylight saving included
    Named(chrono_tz::Tz),
    Fixed(FixedOffset),
}

impl FromStr for LearnerTimezone {
    type Err = SchedulerError;

    /// Accepts an IANA zone name, `Z`/`UTC`, or a `+HH:MM` / `+HHMM` offset
    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
            return Ok(LearnerTimezone::Fixed(Utc.fix()));
        }
        if let Ok(zone) = trimmed.parse::<chrono_tz::Tz>() {
            return Ok(LearnerTimezone::Named(zone));
        }
        trimmed
            .parse::<FixedOffset>()
            .map(LearnerTimezone::Fixed)
            .map_err(|_| SchedulerError::InvalidTimezone(raw.to_string()))
    }
}

/// Gates how many unseen items may enter the review cycle per local day
pub struct AdmissionController<'a, C: FirstEntryCounter + ?Sized> {
    counter: &'a C,
}

impl<'a, C: FirstEntryCounter + ?Sized> AdmissionController<'a, C> {
    pub fn new(counter: &'a C) -> Self {
        Self { counter }
    }

    /// Computes today's quota for the request.
    ///
    /// A non-positive cap or a negative requested count is a configuration
    /// bug in the caller and is rejected. Nothing is written.
    pub fn admit<Tz: TimeZone>(&self, request: &AdmissionRequest<Tz>) -> Result<LearnNewQuota> {
        if request.cap <= 0 {
            return Err(SchedulerError::InvalidCap(request.cap));
        }
        if request.requested_count < 0 {
            return Err(SchedulerError::InvalidRequestedCount(request.requested_count));
        }

        let (start, end) = local_day_bounds(request.as_of, &request.timezone);
        let learned_today = self.counter.count_first_entries(
            request.set_id,
            request.kind,
            &request.scope,
            start,
            end,
        )?;
        let remaining = remaining_quota(request.cap, learned_today);
        let admitted = request.requested_count.min(remaining);

        debug!(
            "Admission for set {} ({}): cap={}, learned today={}, remaining={}, admitted {} of {}",
            request.set_id, request.kind, request.cap, learned_today, remaining, admitted,
            request.requested_count
        );

        Ok(LearnNewQuota {
            learned_today,
            remaining,
            admitted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Counter answering from a fixed list of first-entry instants
    struct RecordingCounter {
        entries: Vec<DateTime<Utc>>,
        windows: RefCell<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl RecordingCounter {
        fn new(entries: Vec<DateTime<Utc>>) -> Self {
            Self {
                entries,
                windows: RefCell::new(Vec::new()),
            }
        }
    }

    impl FirstEntryCounter for RecordingCounter {
        fn count_first_entries(
            &self,
            _set_id: i64,
            _kind: ItemKind,
            _scope: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<i64> {
            self.windows.borrow_mut().push((start, end));
            Ok(self.entries.iter().filter(|at| **at >= start && **at < end).count() as i64)
        }
    }

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn request(requested_count: i64, cap: i64, as_of: DateTime<Utc>) -> AdmissionRequest<Utc> {
        AdmissionRequest {
            set_id: 1,
            kind: ItemKind::Vocabulary,
            scope: "default".to_string(),
            requested_count,
            cap,
            as_of,
            timezone: Utc,
        }
    }

    #[test]
    fn test_remaining_quota() {
        assert_eq!(remaining_quota(5, 0), 5);
        assert_eq!(remaining_quota(5, 3), 2);
        assert_eq!(remaining_quota(5, 5), 0);
        assert_eq!(remaining_quota(5, 9), 0);
    }

    #[test]
    fn test_cap_reached_admits_nothing() {
        let now = utc("2025-01-15T12:00:00Z");
        let counter = RecordingCounter::new(vec![now - Duration::hours(1); 5]);
        let quota = AdmissionController::new(&counter).admit(&request(3, 5, now)).unwrap();

        assert_eq!(
            quota,
            LearnNewQuota {
                learned_today: 5,
                remaining: 0,
                admitted: 0
            }
        );
    }

    #[test]
    fn test_admitted_is_bounded_by_request_and_remaining() {
        let now = utc("2025-01-15T12:00:00Z");
        let counter = RecordingCounter::new(vec![now - Duration::hours(2); 2]);
        let controller = AdmissionController::new(&counter);

        assert_eq!(controller.admit(&request(1, 5, now)).unwrap().admitted, 1);
        assert_eq!(controller.admit(&request(10, 5, now)).unwrap().admitted, 3);
    }

    #[test]
    fn test_zero_request_is_a_pure_query() {
        let now = utc("2025-01-15T12:00:00Z");
        let counter = RecordingCounter::new(vec![now]);
        let quota = AdmissionController::new(&counter).admit(&request(0, 4, now)).unwrap();

        assert_eq!(quota.learned_today, 1);
        assert_eq!(quota.remaining, 3);
        assert_eq!(quota.admitted, 0);
    }

    #[test]
    fn test_non_positive_cap_is_rejected() {
        let now = utc("2025-01-15T12:00:00Z");
        let counter = RecordingCounter::new(vec![]);
        let controller = AdmissionController::new(&counter);

        assert!(matches!(
            controller.admit(&request(1, 0, now)),
            Err(SchedulerError::InvalidCap(0))
        ));
        assert!(matches!(
            controller.admit(&request(1, -3, now)),
            Err(SchedulerError::InvalidCap(-3))
        ));
        assert!(counter.windows.borrow().is_empty());
    }

    #[test]
    fn test_negative_request_is_rejected() {
        let counter = RecordingCounter::new(vec![]);
        let result = AdmissionController::new(&counter).admit(&request(-1, 5, Utc::now()));
        assert!(matches!(result, Err(SchedulerError::InvalidRequestedCount(-1))));
    }

    #[test]
    fn test_local_day_bounds_utc() {
        let (start, end) = local_day_bounds(utc("2025-01-15T23:59:59Z"), &Utc);
        assert_eq!(start, utc("2025-01-15T00:00:00Z"));
        assert_eq!(end, utc("2025-01-16T00:00:00Z"));
    }

    #[test]
    fn test_local_day_bounds_follow_timezone() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        // 01:00 on the 16th in Tokyo
        let (start, end) = local_day_bounds(utc("2025-01-15T16:00:00Z"), &tokyo);
        assert_eq!(start, utc("2025-01-15T15:00:00Z"));
        assert_eq!(end, utc("2025-01-16T15:00:00Z"));

        let new_york = FixedOffset::west_opt(5 * 3600).unwrap();
        // 22:00 on the 14th in New York
        let (start, _) = local_day_bounds(utc("2025-01-15T03:00:00Z"), &new_york);
        assert_eq!(start, utc("2025-01-14T05:00:00Z"));
    }

    #[test]
    fn test_entry_late_yesterday_local_is_not_counted() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        // 23:30 on the 15th in Tokyo, same UTC date as `as_of`
        let yesterday_local = utc("2025-01-15T14:30:00Z");
        // 01:00 on the 16th in Tokyo
        let today_local = utc("2025-01-15T16:00:00Z");
        let counter = RecordingCounter::new(vec![yesterday_local, today_local]);

        let mut tokyo_request = AdmissionRequest {
            set_id: 1,
            kind: ItemKind::Grammar,
            scope: "default".to_string(),
            requested_count: 0,
            cap: 5,
            as_of: utc("2025-01-15T20:00:00Z"),
            timezone: tokyo,
        };
        let quota = AdmissionController::new(&counter).admit(&tokyo_request).unwrap();
        assert_eq!(quota.learned_today, 1);

        tokyo_request.timezone = Utc.fix();
        let quota = AdmissionController::new(&counter).admit(&tokyo_request).unwrap();
        assert_eq!(quota.learned_today, 2);
    }

    #[test]
    fn test_dst_change_shifts_day_bounds() {
        let new_york = chrono_tz::America::New_York;
        // the spring-forward day lasts 23 hours
        let (start, end) = local_day_bounds(utc("2025-03-09T20:00:00Z"), &new_york);
        assert_eq!(start, utc("2025-03-09T05:00:00Z"));
        assert_eq!(end, utc("2025-03-10T04:00:00Z"));

        // 00:30 on the 10th in New York, still the 9th at a fixed -05:00
        let after_midnight = utc("2025-03-10T04:30:00Z");
        let counter = RecordingCounter::new(vec![after_midnight]);
        let controller = AdmissionController::new(&counter);
        let base = request(0, 5, utc("2025-03-10T03:00:00Z"));

        let named = controller.admit(&base.clone().in_timezone(new_york)).unwrap();
        assert_eq!(named.learned_today, 0);
        let fixed = controller
            .admit(&base.in_timezone(FixedOffset::west_opt(5 * 3600).unwrap()))
            .unwrap();
        assert_eq!(fixed.learned_today, 1);
    }

    #[test]
    fn test_parse_learner_timezone() {
        assert_eq!(
            "Asia/Tokyo".parse::<LearnerTimezone>().unwrap(),
            LearnerTimezone::Named(chrono_tz::Asia::Tokyo)
        );
        assert_eq!(
            "Europe/Berlin".parse::<LearnerTimezone>().unwrap(),
            LearnerTimezone::Named(chrono_tz::Europe::Berlin)
        );
        assert_eq!("utc".parse::<LearnerTimezone>().unwrap(), LearnerTimezone::Fixed(Utc.fix()));
        assert_eq!("Z".parse::<LearnerTimezone>().unwrap(), LearnerTimezone::Fixed(Utc.fix()));
        assert_eq!(
            "+09:00".parse::<LearnerTimezone>().unwrap(),
            LearnerTimezone::Fixed(FixedOffset::east_opt(9 * 3600).unwrap())
        );
        assert_eq!(
            "-03:30".parse::<LearnerTimezone>().unwrap(),
            LearnerTimezone::Fixed(FixedOffset::west_opt(3 * 3600 + 1800).unwrap())
        );
    }

    #[test]
    fn test_parse_learner_timezone_rejects_garbage() {
        for raw in ["", "09:00", "Mars/Olympus", "+ab:cd", "+25:00"] {
            assert!(
                matches!(raw.parse::<LearnerTimezone>(), Err(SchedulerError::InvalidTimezone(_))),
                "{} should be rejected",
                raw
            );
        }
    }
}
