use clap::Subcommand;
use serde::Serialize;
use shiftwatch_core::{ConfigError, EngineConfig};

use super::{print_json, CliResult};

/// Engine settings and what each one controls.
const SETTINGS: &[(&str, &str)] = &[
    ("utc_offset_minutes", "site offset from UTC used to read shift and break times"),
    ("scan_interval_secs", "seconds between background ticks in `watch`"),
    ("warning_minutes", "shift-end warnings, in minutes before the end"),
    ("auto_retry_limit", "failed auto-start or auto clock-out writes before an alert"),
    ("bus_capacity", "events buffered for a slow subscriber"),
    ("command_queue_capacity", "commands queued per staff member"),
    ("breaks.morning_minutes", "length of a morning break"),
    ("breaks.lunch_minutes", "length of a lunch break"),
    ("breaks.afternoon_minutes", "length of an afternoon break"),
    ("breaks.morning_offset_minutes", "proposed morning break, minutes after shift start"),
    ("breaks.afternoon_lead_minutes", "proposed afternoon break, minutes before shift end"),
    ("database_file", "SQLite file inside the data directory"),
    ("schedule_file", "weekly schedule file inside the data directory"),
];

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one setting (e.g. "scan_interval_secs", "breaks.lunch_minutes")
    Get { key: String },
    /// Change a setting; the value is validated before it is saved
    Set { key: String, value: String },
    /// Every setting with its current value and what it controls
    List,
    /// Restore default intervals, retry limit and break lengths
    Reset,
    /// Print where config.toml lives
    Path,
}

#[derive(Serialize)]
struct Setting<'a> {
    key: &'a str,
    value: Option<serde_json::Value>,
    about: &'a str,
}

fn settings(config: &EngineConfig) -> Vec<Setting<'static>> {
    SETTINGS
        .iter()
        .map(|&(key, about)| Setting {
            key,
            value: config
                .get(key)
                .map(|raw| serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))),
            about,
        })
        .collect()
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let config = EngineConfig::load()?;
            let value = config.get(&key).ok_or(ConfigError::UnknownKey(key))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = EngineConfig::load()?;
            config.set(&key, &value)?;
            config.save()?;
            let stored = config.get(&key).ok_or(ConfigError::UnknownKey(key.clone()))?;
            println!("{key} = {stored}");
        }
        ConfigAction::List => print_json(&settings(&EngineConfig::load()?))?,
        ConfigAction::Reset => {
            EngineConfig::default().save()?;
            println!("settings restored to defaults");
        }
        ConfigAction::Path => {
            println!("{}", EngineConfig::path()?.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_setting_resolves() {
        let listed = settings(&EngineConfig::default());
        assert_eq!(listed.len(), SETTINGS.len());
        for setting in &listed {
            assert!(setting.value.is_some(), "{} has no value", setting.key);
        }
    }

    #[test]
    fn numbers_and_lists_keep_their_json_type() {
        let listed = settings(&EngineConfig::default());
        let find = |key: &str| {
            listed
                .iter()
                .find(|s| s.key == key)
                .and_then(|s| s.value.clone())
                .unwrap()
        };
        assert_eq!(find("scan_interval_secs"), serde_json::json!(15));
        assert_eq!(find("warning_minutes"), serde_json::json!([15, 5]));
        assert_eq!(find("breaks.lunch_minutes"), serde_json::json!(60));
    }
}
