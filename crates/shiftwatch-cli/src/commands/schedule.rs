use chrono::{NaiveDate, NaiveTime, Utc, Weekday};
use clap::Subcommand;
use shiftwatch_core::schedule::parse_time_of_day;
use shiftwatch_core::{DaySchedule, EngineConfig, ScheduleStore, WeeklySchedule};

use super::{print_json, schedule_store, CliResult};

const WORKWEEK: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Set working hours for a staff member, or the default for everyone
    Set {
        /// Staff ID; omit to set the default schedule
        #[arg(long)]
        staff: Option<String>,
        /// Shift start, e.g. "9:00 AM" or 09:00
        #[arg(long, value_parser = parse_time)]
        start: NaiveTime,
        /// Shift end, e.g. "6:00 PM" or 18:00
        #[arg(long, value_parser = parse_time)]
        end: NaiveTime,
        /// Workdays (mon,tue,...); other days are off
        #[arg(long, value_delimiter = ',', value_parser = parse_weekday)]
        days: Vec<Weekday>,
    },
    /// Print the schedule that applies to a staff member, or the whole file
    Show {
        #[arg(long)]
        staff: Option<String>,
    },
    /// Print the resolved shift window for a date (default today)
    Window {
        staff: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    parse_time_of_day(value).map_err(|e| e.to_string())
}

fn parse_weekday(value: &str) -> Result<Weekday, String> {
    value
        .parse::<Weekday>()
        .map_err(|_| format!("unknown weekday: {value}"))
}

fn weekly(start: NaiveTime, end: NaiveTime, days: &[Weekday]) -> WeeklySchedule {
    let days = if days.is_empty() { &WORKWEEK[..] } else { days };
    let mut schedule = WeeklySchedule::default();
    for day in days {
        *schedule.day_mut(*day) = DaySchedule::workday(start, end);
    }
    schedule
}

pub fn run(action: ScheduleAction) -> CliResult {
    let config = EngineConfig::load()?;
    let store = schedule_store(&config)?;
    match action {
        ScheduleAction::Set {
            staff,
            start,
            end,
            days,
        } => {
            let schedule = weekly(start, end, &days);
            store.set(staff.as_deref(), schedule.clone())?;
            print_json(&schedule)?;
        }
        ScheduleAction::Show { staff: Some(staff) } => match store.weekly_schedule(&staff)? {
            Some(schedule) => print_json(&schedule)?,
            None => {
                eprintln!("no schedule for {staff}");
                std::process::exit(1);
            }
        },
        ScheduleAction::Show { staff: None } => print_json(&store.load()?)?,
        ScheduleAction::Window { staff, date } => {
            let zone = config.zone();
            let date = date.unwrap_or_else(|| zone.today(Utc::now()));
            let window = store
                .weekly_schedule(&staff)?
                .and_then(|s| s.window_on(date, &zone));
            print_json(&window)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn defaults_to_the_workweek() {
        let schedule = weekly(t(9), t(17), &[]);
        assert!(schedule.day(Weekday::Fri).is_workday);
        assert!(!schedule.day(Weekday::Sat).is_workday);
    }

    #[test]
    fn explicit_days_replace_the_workweek() {
        let schedule = weekly(t(10), t(14), &[Weekday::Sat, Weekday::Sun]);
        assert!(schedule.day(Weekday::Sun).is_workday);
        assert!(!schedule.day(Weekday::Mon).is_workday);
        assert_eq!(schedule.day(Weekday::Sat).start_time, Some(t(10)));
    }

    #[test]
    fn weekday_names_parse() {
        assert_eq!(parse_weekday("mon"), Ok(Weekday::Mon));
        assert_eq!(parse_weekday("Friday"), Ok(Weekday::Fri));
        assert!(parse_weekday("someday").is_err());
    }
}
