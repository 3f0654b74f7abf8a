use chrono::{DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::ClockodoError;

const API_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Yesterday,
    Week,
    Month,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Today, Period::Yesterday, Period::Week, Period::Month];

    pub fn parse(value: &str) -> Result<Self, ClockodoError> {
        match value.trim().to_lowercase().as_str() {
            "today" => Ok(Period::Today),
            "yesterday" => Ok(Period::Yesterday),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            _ => Err(ClockodoError::validation(format!(
                "Invalid period '{value}'. Use: today, yesterday, week, month"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Yesterday => "yesterday",
            Period::Week => "week",
            Period::Month => "month",
        }
    }

    /// Calendar range of the period containing `today`. Weeks run Monday
    /// to Sunday.
    pub fn range(self, today: NaiveDate) -> DateRange {
        match self {
            Period::Today => DateRange::from_bounds(today, today),
            Period::Yesterday => {
                let day = today - Duration::days(1);
                DateRange::from_bounds(day, day)
            }
            Period::Week => {
                let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                DateRange::from_bounds(monday, monday + Duration::days(6))
            }
            Period::Month => {
                let first = today.with_day(1).unwrap_or(today);
                let next_month = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
                };
                let last = next_month
                    .and_then(|date| date.pred_opt())
                    .unwrap_or(first);
                DateRange::from_bounds(first, last)
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct DateRange {
    start: DateTime<Local>,
    end: DateTime<Local>,
}

impl DateRange {
    pub fn from_bounds(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        let start = local_datetime(start_date, NaiveTime::MIN);
        let end = local_datetime(end_date, NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN));
        Self { start, end }
    }

    /// Range bounds in Clockodo's UTC timestamp format.
    pub fn as_api(&self) -> (String, String) {
        (to_api(self.start), to_api(self.end))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let instant = instant.with_timezone(&Local);
        instant >= self.start && instant <= self.end
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ClockodoError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ClockodoError::validation(format!("Invalid date '{value}'. Use YYYY-MM-DD.")))
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_clock_time(value: &str) -> Result<NaiveTime, ClockodoError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ClockodoError::validation(format!("Invalid time '{value}'. Use HH:MM.")))
}

pub fn parse_api_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Local wall-clock time on `date`, formatted for the API. Times skipped by
/// a daylight-saving jump are rejected; repeated times take the earlier one.
pub fn local_to_api(date: NaiveDate, time: NaiveTime) -> Result<String, ClockodoError> {
    let local = existing_time(Local.from_local_datetime(&date.and_time(time)), date, time)?;
    Ok(to_api(local))
}

fn existing_time<Tz: TimeZone>(
    result: LocalResult<DateTime<Tz>>,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<DateTime<Tz>, ClockodoError> {
    result.earliest().ok_or_else(|| ClockodoError::Validation {
        message: format!(
            "{date} {} does not exist in the local time zone",
            time.format("%H:%M")
        ),
        fields: vec!["start_time".to_string(), "end_time".to_string()],
    })
}

fn to_api<Tz: TimeZone>(value: DateTime<Tz>) -> String {
    value.with_timezone(&Utc).format(API_FORMAT).to_string()
}

fn local_datetime(date: NaiveDate, time: NaiveTime) -> DateTime<Local> {
    let result = Local.from_local_datetime(&date.and_time(time));
    result
        .earliest()
        .or_else(|| result.latest())
        .unwrap_or_else(|| date.and_time(time).and_utc().with_timezone(&Local))
}
