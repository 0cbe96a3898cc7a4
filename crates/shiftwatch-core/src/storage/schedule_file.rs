//! TOML-backed schedule store.
//!
//! ```toml
//! [default.monday]
//! is_workday = true
//! start_time = "9:00 AM"
//! end_time = "6:00 PM"
//!
//! [staff.alice.saturday]
//! is_workday = true
//! start_time = "10:00 AM"
//! end_time = "2:00 PM"
//! ```
//!
//! The file is re-read on every lookup so edits made by another process
//! are picked up without restarting the engine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::schedule::{ScheduleStore, WeeklySchedule};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleFile {
    /// Applied to staff without an explicit entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<WeeklySchedule>,
    #[serde(default)]
    pub staff: BTreeMap<String, WeeklySchedule>,
}

#[derive(Debug, Clone)]
pub struct FileScheduleStore {
    path: PathBuf,
}

impl FileScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file. A missing file is an empty schedule set.
    pub fn load(&self) -> Result<ScheduleFile> {
        if !self.path.exists() {
            return Ok(ScheduleFile::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| {
            ConfigError::LoadFailed {
                path: self.path.clone(),
                message: e.to_string(),
            }
            .into()
        })
    }

    pub fn save(&self, file: &ScheduleFile) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: self.path.clone(),
            message,
        };
        let content = toml::to_string_pretty(file).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Replace one staff member's schedule, or the default when `staff_id` is `None`.
    pub fn set(&self, staff_id: Option<&str>, schedule: WeeklySchedule) -> Result<()> {
        let mut file = self.load()?;
        match staff_id {
            Some(id) => {
                file.staff.insert(id.to_string(), schedule);
            }
            None => file.default = Some(schedule),
        }
        self.save(&file)
    }
}

impl ScheduleStore for FileScheduleStore {
    fn weekly_schedule(&self, staff_id: &str) -> Result<Option<WeeklySchedule>> {
        let mut file = self.load()?;
        Ok(file.staff.remove(staff_id).or(file.default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn missing_file_has_no_schedules() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileScheduleStore::new(dir.path().join("schedules.toml"));
        assert!(store.weekly_schedule("alice").unwrap().is_none());
    }

    #[test]
    fn staff_entry_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileScheduleStore::new(dir.path().join("schedules.toml"));
        store
            .set(None, WeeklySchedule::standard(t(9, 0), t(18, 0)))
            .unwrap();
        store
            .set(Some("alice"), WeeklySchedule::every_day(t(7, 0), t(15, 0)))
            .unwrap();

        let alice = store.weekly_schedule("alice").unwrap().unwrap();
        assert_eq!(alice.day(Weekday::Sat).start_time, Some(t(7, 0)));
        let bob = store.weekly_schedule("bob").unwrap().unwrap();
        assert!(!bob.day(Weekday::Sat).is_workday);
        assert_eq!(bob.day(Weekday::Mon).end_time, Some(t(18, 0)));
    }

    #[test]
    fn reads_hand_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.toml");
        std::fs::write(
            &path,
            "[staff.carol.tuesday]\nis_workday = true\nstart_time = \"8:30 AM\"\nend_time = \"5:00 PM\"\n",
        )
        .unwrap();
        let store = FileScheduleStore::new(&path);
        let carol = store.weekly_schedule("carol").unwrap().unwrap();
        assert_eq!(carol.day(Weekday::Tue).start_time, Some(t(8, 30)));
        assert!(!carol.day(Weekday::Mon).is_workday);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.toml");
        std::fs::write(&path, "[staff.dave.monday]\nstart_time = \"noon\"\n").unwrap();
        let store = FileScheduleStore::new(&path);
        assert!(store.weekly_schedule("dave").is_err());
    }
}
