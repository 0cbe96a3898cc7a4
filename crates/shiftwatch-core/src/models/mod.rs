//! Persisted entities: time entries and breaks.

mod break_entry;
mod time_entry;

pub use break_entry::{Break, BreakAction, BreakState, BreakType};
pub use time_entry::{BreakPlanStatus, ClockOutReason, TimeEntry};

/// Whole minutes between two instants, rounded up from milliseconds, so any
/// positive span counts as at least one minute. Zero or negative spans
/// yield zero.
pub(crate) fn minutes_ceil(span: chrono::Duration) -> i64 {
    let millis = span.num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis + 59_999) / 60_000
    }
}

#[cfg(test)]
mod tests {
    use super::minutes_ceil;
    use chrono::Duration;

    #[test]
    fn minutes_round_up() {
        assert_eq!(minutes_ceil(Duration::seconds(0)), 0);
        assert_eq!(minutes_ceil(Duration::seconds(-30)), 0);
        assert_eq!(minutes_ceil(Duration::seconds(1)), 1);
        assert_eq!(minutes_ceil(Duration::minutes(5)), 5);
        assert_eq!(minutes_ceil(Duration::seconds(301)), 6);
        assert_eq!(minutes_ceil(Duration::milliseconds(500)), 1);
        assert_eq!(minutes_ceil(Duration::milliseconds(60_001)), 2);
    }
}
