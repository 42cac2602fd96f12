use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};

/// Source of "now" for the host layer.
///
/// Scheduling functions never read a clock themselves; callers ask a
/// provider once and pass the instant down explicitly.
pub trait DateProvider: Send + Sync {
    fn get_current_time(&self) -> DateTime<Utc>;
}

/// Reads the system clock
pub struct SystemDateProvider;

impl DateProvider for SystemDateProvider {
    fn get_current_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Uses an overridden calendar date while keeping the current time of day
pub struct OverrideDateProvider {
    override_date: NaiveDate,
}

impl OverrideDateProvider {
    pub fn new(override_date: NaiveDate) -> Self {
        Self { override_date }
    }
}

impl DateProvider for OverrideDateProvider {
    fn get_current_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let time_of_day = NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second())
            .unwrap_or(NaiveTime::MIN);
        self.override_date.and_time(time_of_day).and_utc()
    }
}

/// Always returns the same instant; used for reproducible runs
pub struct FixedDateProvider {
    instant: DateTime<Utc>,
}

impl FixedDateProvider {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }
}

impl DateProvider for FixedDateProvider {
    fn get_current_time(&self) -> DateTime<Utc> {
        self.instant
    }
}
