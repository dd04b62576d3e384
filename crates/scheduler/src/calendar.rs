use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// The tee sheet a run targets, with the labels the event list shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDay {
    pub date: NaiveDate,
    /// e.g. "Sat"
    pub weekday_label: String,
    /// e.g. "25 Oct"
    pub date_label: String,
}

/// `weeks_ahead` weeks past the next occurrence of `weekday` strictly after
/// `today`. With `weeks_ahead = 1` a Thursday run targets the Saturday after
/// next.
pub fn target_day(today: NaiveDate, weekday: Weekday, weeks_ahead: u32) -> TargetDay {
    let wanted = weekday.num_days_from_monday() as i64;
    let current = today.weekday().num_days_from_monday() as i64;
    let mut days = (wanted - current + 7) % 7;
    if days == 0 {
        days = 7;
    }
    let date = today + Duration::days(days + 7 * weeks_ahead as i64);
    TargetDay {
        date,
        weekday_label: date.format("%a").to_string(),
        date_label: date.format("%-d %b").to_string(),
    }
}
