//! TOML-based engine configuration.
//!
//! Stores:
//! - The site's UTC offset for interpreting schedule boundaries
//! - Scan interval
//! - Shift-end warning thresholds
//! - Default break lengths and plan placement
//! - Storage file names
//!
//! Configuration is stored at `~/.config/shiftwatch/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::clock::LocalZone;
use crate::error::{ConfigError, Result};
use crate::models::BreakType;

/// Default break lengths and where the proposed plan puts them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakDefaults {
    #[serde(default = "default_morning_minutes")]
    pub morning_minutes: i64,
    #[serde(default = "default_lunch_minutes")]
    pub lunch_minutes: i64,
    #[serde(default = "default_afternoon_minutes")]
    pub afternoon_minutes: i64,
    /// Morning break starts this long after shift start.
    #[serde(default = "default_morning_offset")]
    pub morning_offset_minutes: i64,
    /// Afternoon break starts this long before shift end.
    #[serde(default = "default_afternoon_lead")]
    pub afternoon_lead_minutes: i64,
}

impl BreakDefaults {
    /// Planned minutes for a break type. Away breaks have no planned length.
    pub fn minutes_for(&self, break_type: BreakType) -> i64 {
        match break_type {
            BreakType::Morning => self.morning_minutes,
            BreakType::Lunch => self.lunch_minutes,
            BreakType::Afternoon => self.afternoon_minutes,
            BreakType::Away => 0,
        }
    }
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/shiftwatch/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Offset of the site's local time from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// How often the background tick runs (break auto-start, shift clock).
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Shift-end warning thresholds, in minutes before the end.
    #[serde(default = "default_warning_minutes")]
    pub warning_minutes: Vec<u32>,
    /// Failed background writes tolerated before raising an alert.
    #[serde(default = "default_auto_retry_limit")]
    pub auto_retry_limit: u32,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
    #[serde(default)]
    pub breaks: BreakDefaults,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_schedule_file")]
    pub schedule_file: String,
}

// Default functions
fn default_morning_minutes() -> i64 {
    15
}
fn default_lunch_minutes() -> i64 {
    60
}
fn default_afternoon_minutes() -> i64 {
    15
}
fn default_morning_offset() -> i64 {
    120
}
fn default_afternoon_lead() -> i64 {
    120
}
fn default_scan_interval() -> u64 {
    15
}
fn default_warning_minutes() -> Vec<u32> {
    vec![15, 5]
}
fn default_auto_retry_limit() -> u32 {
    3
}
fn default_bus_capacity() -> usize {
    1024
}
fn default_command_queue_capacity() -> usize {
    64
}
fn default_database_file() -> String {
    "shiftwatch.db".into()
}
fn default_schedule_file() -> String {
    "schedules.toml".into()
}

impl Default for BreakDefaults {
    fn default() -> Self {
        Self {
            morning_minutes: default_morning_minutes(),
            lunch_minutes: default_lunch_minutes(),
            afternoon_minutes: default_afternoon_minutes(),
            morning_offset_minutes: default_morning_offset(),
            afternoon_lead_minutes: default_afternoon_lead(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            scan_interval_secs: default_scan_interval(),
            warning_minutes: default_warning_minutes(),
            auto_retry_limit: default_auto_retry_limit(),
            bus_capacity: default_bus_capacity(),
            command_queue_capacity: default_command_queue_capacity(),
            breaks: BreakDefaults::default(),
            database_file: default_database_file(),
            schedule_file: default_schedule_file(),
        }
    }
}

impl EngineConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(root: &mut serde_json::Value, key: &str, value: &str) -> Result<()> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown().into());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<i64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown().into())
    }

    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            Ok(cfg)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: EngineConfig = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: EngineConfig = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if LocalZone::from_offset_minutes(self.utc_offset_minutes).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "utc_offset_minutes".into(),
                message: format!("{} is outside ±24h", self.utc_offset_minutes),
            }
            .into());
        }
        if self.scan_interval_secs == 0 || self.scan_interval_secs > 60 {
            return Err(ConfigError::InvalidValue {
                key: "scan_interval_secs".into(),
                message: "must be between 1 and 60 so every minute is scanned".into(),
            }
            .into());
        }
        Ok(())
    }

    pub fn zone(&self) -> LocalZone {
        LocalZone::from_offset_minutes(self.utc_offset_minutes).unwrap_or_default()
    }

    pub fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scan_interval_secs.max(1))
    }

    /// Warning thresholds, largest first, without duplicates.
    pub fn warning_thresholds(&self) -> Vec<u32> {
        let mut levels = self.warning_minutes.clone();
        levels.sort_unstable_by(|a, b| b.cmp(a));
        levels.dedup();
        levels
    }
}
