//! Limit periods and their time windows.
//!
//! Windows are half-open `[start, end)` in UTC. A monthly window always
//! starts on day 1 of the month containing the reference instant, so the
//! length of the month never matters.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recurring window over which a spending cap accumulates usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl LimitPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitPeriod::Daily => "daily",
            LimitPeriod::Weekly => "weekly",
            LimitPeriod::Monthly => "monthly",
        }
    }
}

impl fmt::Display for LimitPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(LimitPeriod::Daily),
            "weekly" => Ok(LimitPeriod::Weekly),
            "monthly" => Ok(LimitPeriod::Monthly),
            other => Err(format!("unknown limit period '{}'", other)),
        }
    }
}

/// Time window of a limit period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub start: DateTime<Utc>,
    /// Exclusive
    pub end: DateTime<Utc>,
}

impl PeriodWindow {
    /// Window of `period` that contains `reference`.
    pub fn containing(reference: DateTime<Utc>, period: LimitPeriod) -> Self {
        let date = reference.date_naive();

        let (start, end) = match period {
            LimitPeriod::Daily => (date, date + Duration::days(1)),
            LimitPeriod::Weekly => {
                let monday =
                    date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
                (monday, monday + Duration::days(7))
            }
            LimitPeriod::Monthly => {
                let first = first_of_month(date);
                (first, first_of_month(first + Duration::days(32)))
            }
        };

        Self {
            start: midnight(start),
            end: midnight(end),
        }
    }

    /// `start <= instant < end`
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// True once `now` has reached the exclusive end.
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.end
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}
