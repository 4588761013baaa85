//! Business-day calendars

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Calendar deciding which dates are business days
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Calendar {
    /// Every day is a business day
    #[default]
    NoHolidays,
    /// Monday to Friday
    MondayToFriday,
    /// Monday to Friday, excluding an explicit holiday set
    MondayToFridayWithHolidays(BTreeSet<NaiveDate>),
}

impl Calendar {
    /// Parse the calendar tag; holidays only apply to `MFH`
    pub fn from_tag(tag: &str, holidays: BTreeSet<NaiveDate>) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "NC" | "NOCALENDAR" | "NOHOLIDAYS" => Some(Calendar::NoHolidays),
            "MF" | "MONDAYTOFRIDAY" => Some(Calendar::MondayToFriday),
            "MFH" | "MONDAYTOFRIDAYWITHHOLIDAYS" => {
                Some(Calendar::MondayToFridayWithHolidays(holidays))
            }
            _ => None,
        }
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        match self {
            Calendar::NoHolidays => true,
            Calendar::MondayToFriday => !is_weekend(date),
            Calendar::MondayToFridayWithHolidays(holidays) => {
                !is_weekend(date) && !holidays.contains(&date)
            }
        }
    }

    /// Business days in `[start, end)`
    pub fn business_days_between(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        start
            .iter_days()
            .take_while(|d| *d < end)
            .filter(|d| self.is_business_day(*d))
            .count() as i64
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_weekend_calendar() {
        let cal = Calendar::MondayToFriday;
        assert!(cal.is_business_day(d(2025, 1, 3))); // Friday
        assert!(!cal.is_business_day(d(2025, 1, 4)));
        assert!(!cal.is_business_day(d(2025, 1, 5)));
    }

    #[test]
    fn test_holiday_calendar() {
        let holidays: BTreeSet<_> = [d(2025, 12, 25)].into_iter().collect();
        let cal = Calendar::from_tag("MFH", holidays).unwrap();
        assert!(!cal.is_business_day(d(2025, 12, 25)));
        assert!(cal.is_business_day(d(2025, 12, 24)));
    }

    #[test]
    fn test_business_days_between() {
        let cal = Calendar::MondayToFriday;
        // Mon 6 Jan .. Mon 13 Jan 2025
        assert_eq!(cal.business_days_between(d(2025, 1, 6), d(2025, 1, 13)), 5);
        assert_eq!(Calendar::NoHolidays.business_days_between(d(2025, 1, 6), d(2025, 1, 13)), 7);
    }

    #[test]
    fn test_unknown_tag() {
        assert!(Calendar::from_tag("XYZ", BTreeSet::new()).is_none());
    }
}
