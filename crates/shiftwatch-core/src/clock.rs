//! Time sources and local wall-clock conversion.
//!
//! Every component reads "now" through a [`Clock`] so tests can drive the
//! engine with a [`ManualClock`] instead of sleeping. Persisted timestamps
//! are UTC; schedule boundaries are local times of day interpreted through
//! [`LocalZone`].

use std::sync::Mutex;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Simulated time. Only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.lock() = at;
    }

    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        let mut guard = self.lock();
        *guard += by;
        *guard
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

/// The site's fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalZone {
    offset: FixedOffset,
}

impl LocalZone {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Returns `None` when the offset is outside ±24h.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.with_timezone(&self.offset).naive_local()
    }

    pub fn today(&self, at: DateTime<Utc>) -> NaiveDate {
        self.local(at).date()
    }

    pub fn time_of_day(&self, at: DateTime<Utc>) -> NaiveTime {
        self.local(at).time()
    }

    /// UTC instant of a local date and time of day.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        let shift = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&(local - shift))
    }

    /// `[start, end)` of a local calendar day, in UTC.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.at(date, NaiveTime::MIN);
        (start, start + Duration::days(1))
    }
}

impl Default for LocalZone {
    fn default() -> Self {
        Self::utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        let later = clock.advance(Duration::minutes(5));
        assert_eq!(later, start + Duration::minutes(5));
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn local_zone_shifts_wall_time() {
        let zone = LocalZone::from_offset_minutes(8 * 60).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 20, 30, 0).unwrap();
        assert_eq!(zone.today(at), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(zone.time_of_day(at), NaiveTime::from_hms_opt(4, 30, 0).unwrap());
    }

    #[test]
    fn at_inverts_local() {
        let zone = LocalZone::from_offset_minutes(-300).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let utc = zone.at(date, nine);
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap());
        assert_eq!(zone.local(utc), date.and_time(nine));
    }

    #[test]
    fn rejects_absurd_offset() {
        assert!(LocalZone::from_offset_minutes(25 * 60).is_none());
    }
}
