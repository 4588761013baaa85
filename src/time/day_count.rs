//! Day-count conventions
//!
//! Converts a date interval into a fraction of a year. Only the date part
//! of a date-time participates in the count.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::calendar::Calendar;

/// Named day-count basis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayCountConvention {
    /// Actual/Actual ISDA
    ActualActualIsda,
    /// Actual/360
    Actual360,
    /// Actual/365 fixed
    Actual365,
    /// 30E/360 (Eurobond)
    ThirtyE360,
    /// 30E/360 ISDA
    ThirtyE360Isda,
    /// 28/336
    TwentyEight336,
    /// Business days/252
    Business252,
}

impl FromStr for DayCountConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace(['/', ' '], "").as_str() {
            "AA" | "AAISDA" | "ACTACT" => Ok(DayCountConvention::ActualActualIsda),
            "A360" | "ACT360" => Ok(DayCountConvention::Actual360),
            "A365" | "ACT365" => Ok(DayCountConvention::Actual365),
            "30E360" => Ok(DayCountConvention::ThirtyE360),
            "30E360ISDA" => Ok(DayCountConvention::ThirtyE360Isda),
            "28E336" | "28336" => Ok(DayCountConvention::TwentyEight336),
            "B252" => Ok(DayCountConvention::Business252),
            other => Err(format!("unknown day count convention `{other}`")),
        }
    }
}

/// Day-count calculator bound to a convention and the context some bases need
#[derive(Debug, Clone, PartialEq)]
pub struct DayCounter {
    pub convention: DayCountConvention,
    /// Maturity date, used by 30E/360 ISDA for the February end rule
    pub maturity: Option<NaiveDateTime>,
    /// Calendar, used by B/252
    pub calendar: Calendar,
}

impl DayCounter {
    pub fn new(convention: DayCountConvention) -> Self {
        Self {
            convention,
            maturity: None,
            calendar: Calendar::NoHolidays,
        }
    }

    pub fn with_maturity(mut self, maturity: Option<NaiveDateTime>) -> Self {
        self.maturity = maturity;
        self
    }

    pub fn with_calendar(mut self, calendar: Calendar) -> Self {
        self.calendar = calendar;
        self
    }

    /// Year fraction between `start` and `end`
    pub fn fraction(&self, start: NaiveDateTime, end: NaiveDateTime) -> f64 {
        let (s, e) = (start.date(), end.date());
        match self.convention {
            DayCountConvention::Actual360 => actual_days(s, e) as f64 / 360.0,
            DayCountConvention::Actual365 => actual_days(s, e) as f64 / 365.0,
            DayCountConvention::ActualActualIsda => actual_actual_isda(s, e),
            DayCountConvention::ThirtyE360 => {
                let d1 = s.day().min(30);
                let d2 = e.day().min(30);
                thirty_360(s, e, d1, d2, 30.0, 360.0)
            }
            DayCountConvention::ThirtyE360Isda => {
                let d1 = if is_last_day_of_month(s) { 30 } else { s.day() };
                let is_maturity_february =
                    e.month() == 2 && self.maturity.map(|m| m.date() == e).unwrap_or(false);
                let d2 = if is_last_day_of_month(e) && !is_maturity_february {
                    30
                } else {
                    e.day().min(30)
                };
                thirty_360(s, e, d1, d2, 30.0, 360.0)
            }
            DayCountConvention::TwentyEight336 => {
                let d1 = s.day().min(28);
                let d2 = e.day().min(28);
                thirty_360(s, e, d1, d2, 28.0, 336.0)
            }
            DayCountConvention::Business252 => {
                if e <= s {
                    -(self.calendar.business_days_between(e, s) as f64) / 252.0
                } else {
                    self.calendar.business_days_between(s, e) as f64 / 252.0
                }
            }
        }
    }
}

fn actual_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

fn days_in_year(year: i32) -> f64 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366.0
    } else {
        365.0
    }
}

fn actual_actual_isda(start: NaiveDate, end: NaiveDate) -> f64 {
    if end < start {
        return -actual_actual_isda(end, start);
    }
    if start.year() == end.year() {
        return actual_days(start, end) as f64 / days_in_year(start.year());
    }
    let year_start = |y: i32| NaiveDate::from_ymd_opt(y, 1, 1).unwrap_or(start);
    let first = actual_days(start, year_start(start.year() + 1)) as f64 / days_in_year(start.year());
    let last = actual_days(year_start(end.year()), end) as f64 / days_in_year(end.year());
    first + f64::from(end.year() - start.year() - 1) + last
}

fn thirty_360(s: NaiveDate, e: NaiveDate, d1: u32, d2: u32, month_days: f64, year_days: f64) -> f64 {
    let years = f64::from(e.year() - s.year());
    let months = f64::from(e.month() as i32 - s.month() as i32);
    let days = f64::from(d2 as i32 - d1 as i32);
    (years * year_days + months * month_days + days) / year_days
}

/// True when `date` is the last calendar day of its month
pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.succ_opt().map(|next| next.month() != date.month()).unwrap_or(true)
}
