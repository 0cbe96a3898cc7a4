//! Weekly work schedules.
//!
//! The schedule is read-only to the engine: it only answers "is today a
//! workday, and when does the shift start and end". Boundaries are local
//! times of day ("9:00 AM") resolved against a concrete date through
//! [`LocalZone`].

mod time_of_day;

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::clock::LocalZone;
use crate::error::Result;

pub use time_of_day::{format_time_of_day, parse_time_of_day, serde_time, serde_time_opt};

/// One day of a weekly schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    #[serde(default)]
    pub is_workday: bool,
    #[serde(default, with = "serde_time_opt", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "serde_time_opt", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
}

impl DaySchedule {
    pub fn workday(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            is_workday: true,
            start_time: Some(start),
            end_time: Some(end),
        }
    }

    pub fn off() -> Self {
        Self::default()
    }

    /// Resolve the shift window on `date`. `None` on days off or when a
    /// boundary is missing.
    pub fn window(&self, date: NaiveDate, zone: &LocalZone) -> Option<ShiftWindow> {
        if !self.is_workday {
            return None;
        }
        let (start_time, end_time) = (self.start_time?, self.end_time?);
        let start = zone.at(date, start_time);
        let mut end = zone.at(date, end_time);
        // Overnight shift.
        if end <= start {
            end += Duration::days(1);
        }
        Some(ShiftWindow { date, start, end })
    }
}

/// Per-weekday schedule for one staff member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    #[serde(default)]
    pub monday: DaySchedule,
    #[serde(default)]
    pub tuesday: DaySchedule,
    #[serde(default)]
    pub wednesday: DaySchedule,
    #[serde(default)]
    pub thursday: DaySchedule,
    #[serde(default)]
    pub friday: DaySchedule,
    #[serde(default)]
    pub saturday: DaySchedule,
    #[serde(default)]
    pub sunday: DaySchedule,
}

impl WeeklySchedule {
    /// Monday to Friday, same hours every day.
    pub fn standard(start: NaiveTime, end: NaiveTime) -> Self {
        let day = DaySchedule::workday(start, end);
        Self {
            monday: day.clone(),
            tuesday: day.clone(),
            wednesday: day.clone(),
            thursday: day.clone(),
            friday: day,
            saturday: DaySchedule::off(),
            sunday: DaySchedule::off(),
        }
    }

    /// Every day of the week is a workday.
    pub fn every_day(start: NaiveTime, end: NaiveTime) -> Self {
        let day = DaySchedule::workday(start, end);
        Self {
            monday: day.clone(),
            tuesday: day.clone(),
            wednesday: day.clone(),
            thursday: day.clone(),
            friday: day.clone(),
            saturday: day.clone(),
            sunday: day,
        }
    }

    pub fn day(&self, weekday: Weekday) -> &DaySchedule {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    pub fn day_mut(&mut self, weekday: Weekday) -> &mut DaySchedule {
        match weekday {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        }
    }

    pub fn window_on(&self, date: NaiveDate, zone: &LocalZone) -> Option<ShiftWindow> {
        self.day(date.weekday()).window(date, zone)
    }
}

/// A resolved shift: concrete UTC start and end for one local date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ShiftWindow {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Read-only access to staff schedules.
pub trait ScheduleStore: Send + Sync {
    fn weekly_schedule(&self, staff_id: &str) -> Result<Option<WeeklySchedule>>;
}

/// In-memory schedule store, with an optional fallback applied to staff
/// without an explicit entry.
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    schedules: RwLock<HashMap<String, WeeklySchedule>>,
    fallback: Option<WeeklySchedule>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(schedule: WeeklySchedule) -> Self {
        Self {
            schedules: RwLock::new(HashMap::new()),
            fallback: Some(schedule),
        }
    }

    pub fn insert(&self, staff_id: impl Into<String>, schedule: WeeklySchedule) {
        let mut guard = match self.schedules.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(staff_id.into(), schedule);
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn weekly_schedule(&self, staff_id: &str) -> Result<Option<WeeklySchedule>> {
        let guard = match self.schedules.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.get(staff_id).cloned().or_else(|| self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn standard_week_has_weekends_off() {
        let week = WeeklySchedule::standard(t(9, 0), t(18, 0));
        assert!(week.day(Weekday::Wed).is_workday);
        assert!(!week.day(Weekday::Sat).is_workday);
        assert!(!week.day(Weekday::Sun).is_workday);
    }

    #[test]
    fn window_resolves_against_date() {
        let week = WeeklySchedule::standard(t(9, 0), t(18, 0));
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let window = week.window_on(monday, &LocalZone::utc()).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap());
        assert_eq!(window.duration(), Duration::hours(9));
    }

    #[test]
    fn overnight_shift_ends_next_day() {
        let day = DaySchedule::workday(t(22, 0), t(6, 0));
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let window = day.window(date, &LocalZone::utc()).unwrap();
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 3, 5, 6, 0, 0).unwrap());
    }

    #[test]
    fn day_off_has_no_window() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let week = WeeklySchedule::standard(t(9, 0), t(18, 0));
        assert!(week.window_on(date, &LocalZone::utc()).is_none());
    }

    #[test]
    fn toml_uses_boundary_strings() {
        let raw = r#"
            [monday]
            is_workday = true
            start_time = "9:00 AM"
            end_time = "6:00 PM"
        "#;
        let week: WeeklySchedule = toml::from_str(raw).unwrap();
        assert_eq!(week.monday.start_time, Some(t(9, 0)));
        assert_eq!(week.monday.end_time, Some(t(18, 0)));
        assert!(!week.tuesday.is_workday);

        let rendered = toml::to_string(&week).unwrap();
        assert!(rendered.contains("\"6:00 PM\""));
    }

    #[test]
    fn fallback_applies_to_unknown_staff() {
        let store = MemoryScheduleStore::with_fallback(WeeklySchedule::standard(t(8, 0), t(17, 0)));
        store.insert("night-owl", WeeklySchedule::every_day(t(22, 0), t(6, 0)));
        let known = store.weekly_schedule("night-owl").unwrap().unwrap();
        assert_eq!(known.sunday.start_time, Some(t(22, 0)));
        let unknown = store.weekly_schedule("someone").unwrap().unwrap();
        assert_eq!(unknown.monday.start_time, Some(t(8, 0)));
    }
}
