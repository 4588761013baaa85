//! Cycle and period notation (`P1ML1`, `P3M`, `P0D`, legacy `1M-`)

use chrono::{Duration, Months, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScheduleError;

/// Calendar unit of a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Quarter,
    HalfYear,
    Year,
}

impl PeriodUnit {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'D' => Some(PeriodUnit::Day),
            'W' => Some(PeriodUnit::Week),
            'M' => Some(PeriodUnit::Month),
            'Q' => Some(PeriodUnit::Quarter),
            'H' => Some(PeriodUnit::HalfYear),
            'Y' => Some(PeriodUnit::Year),
            _ => None,
        }
    }

    fn as_char(&self) -> char {
        match self {
            PeriodUnit::Day => 'D',
            PeriodUnit::Week => 'W',
            PeriodUnit::Month => 'M',
            PeriodUnit::Quarter => 'Q',
            PeriodUnit::HalfYear => 'H',
            PeriodUnit::Year => 'Y',
        }
    }

    /// Whether the unit is month-based (end-of-month snapping applies)
    pub fn is_month_based(&self) -> bool {
        !matches!(self, PeriodUnit::Day | PeriodUnit::Week)
    }
}

/// A signed step of `count` units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub count: i32,
    pub unit: PeriodUnit,
}

impl Period {
    pub const ZERO: Period = Period { count: 0, unit: PeriodUnit::Day };

    pub fn new(count: i32, unit: PeriodUnit) -> Self {
        Self { count, unit }
    }

    pub fn days(count: i32) -> Self {
        Self::new(count, PeriodUnit::Day)
    }

    pub fn months(count: i32) -> Self {
        Self::new(count, PeriodUnit::Month)
    }

    pub fn years(count: i32) -> Self {
        Self::new(count, PeriodUnit::Year)
    }

    pub fn is_positive(&self) -> bool {
        self.count > 0
    }

    /// Period repeated `n` times
    pub fn times(&self, n: i32) -> Result<Self, ScheduleError> {
        self.count
            .checked_mul(n)
            .map(|count| Self::new(count, self.unit))
            .ok_or_else(|| ScheduleError::OutOfRange(format!("{self} x {n}")))
    }

    fn month_count(&self) -> Option<Option<i32>> {
        let factor = match self.unit {
            PeriodUnit::Month => 1,
            PeriodUnit::Quarter => 3,
            PeriodUnit::HalfYear => 6,
            PeriodUnit::Year => 12,
            PeriodUnit::Day | PeriodUnit::Week => return None,
        };
        Some(self.count.checked_mul(factor))
    }

    /// Add the period to a date-time. Month arithmetic clamps to the last
    /// valid day of the target month (Jan 31 + 1M = Feb 28/29).
    pub fn add_to(&self, time: NaiveDateTime) -> Result<NaiveDateTime, ScheduleError> {
        let shifted = match self.month_count() {
            Some(Some(m)) if m >= 0 => time.checked_add_months(Months::new(m.unsigned_abs())),
            Some(Some(m)) => time.checked_sub_months(Months::new(m.unsigned_abs())),
            Some(None) => None,
            None => {
                let days = match self.unit {
                    PeriodUnit::Week => 7 * i64::from(self.count),
                    _ => i64::from(self.count),
                };
                time.checked_add_signed(Duration::days(days))
            }
        };
        shifted.ok_or_else(|| ScheduleError::OutOfRange(format!("{time} + {self}")))
    }

    /// Subtract the period from a date-time
    pub fn sub_from(&self, time: NaiveDateTime) -> Result<NaiveDateTime, ScheduleError> {
        self.times(-1)?.add_to(time)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}{}", self.count, self.unit.as_char())
    }
}

impl FromStr for Period {
    type Err = ScheduleError;

    /// Parse `PnU`, `nU`, with an optional stub suffix that is ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cycle::from_str(s).map(|c| c.period)
    }
}

/// Stub handling when the end date is not on the cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stub {
    /// Last regular period is merged with the irregular remainder (`L0`)
    Long,
    /// Irregular remainder forms its own short period (`L1`)
    Short,
}

/// A recurrence: step period plus stub flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cycle {
    pub period: Period,
    pub stub: Stub,
}

impl Cycle {
    pub fn new(period: Period, stub: Stub) -> Self {
        Self { period, stub }
    }

    /// Reject cycles that would never advance
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.period.is_positive() {
            Ok(())
        } else {
            Err(ScheduleError::DegenerateCycle(self.to_string()))
        }
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stub = match self.stub {
            Stub::Long => 0,
            Stub::Short => 1,
        };
        write!(f, "{}L{}", self.period, stub)
    }
}

impl FromStr for Cycle {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidCycle(s.to_string());
        let text = s.trim();
        let text = text.strip_prefix('P').or_else(|| text.strip_prefix('p')).unwrap_or(text);

        let digits_end = text
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && *c == '-')))
            .map(|(i, _)| i)
            .ok_or_else(invalid)?;
        let count: i32 = text[..digits_end].parse().map_err(|_| invalid())?;

        let mut rest = text[digits_end..].chars();
        let unit = rest.next().and_then(PeriodUnit::from_char).ok_or_else(invalid)?;
        let suffix: String = rest.collect();

        let stub = match suffix.as_str() {
            "" | "L1" | "-" => Stub::Short,
            "L0" | "+" => Stub::Long,
            _ => return Err(invalid()),
        };

        Ok(Cycle::new(Period::new(count, unit), stub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_actus_notation() {
        let c: Cycle = "P1ML1".parse().unwrap();
        assert_eq!(c.period, Period::months(1));
        assert_eq!(c.stub, Stub::Short);

        let c: Cycle = "P3ML0".parse().unwrap();
        assert_eq!(c.period, Period::months(3));
        assert_eq!(c.stub, Stub::Long);

        let c: Cycle = "P1Y".parse().unwrap();
        assert_eq!(c.period, Period::years(1));
        assert_eq!(c.stub, Stub::Short);
    }

    #[test]
    fn test_parse_legacy_notation() {
        let c: Cycle = "6M+".parse().unwrap();
        assert_eq!(c.period, Period::months(6));
        assert_eq!(c.stub, Stub::Long);
        assert_eq!("1Q-".parse::<Cycle>().unwrap().period.unit, PeriodUnit::Quarter);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("P1X".parse::<Cycle>().is_err());
        assert!("monthly".parse::<Cycle>().is_err());
        assert!("P1ML7".parse::<Cycle>().is_err());
    }

    #[test]
    fn test_zero_period_parses_but_fails_validation() {
        let c: Cycle = "P0D".parse().unwrap();
        assert!(matches!(c.validate(), Err(ScheduleError::DegenerateCycle(_))));
        assert_eq!("P0D".parse::<Period>().unwrap(), Period::ZERO);
    }

    #[test]
    fn test_month_addition_clamps() {
        assert_eq!(Period::months(1).add_to(dt(2025, 1, 31)).unwrap(), dt(2025, 2, 28));
        assert_eq!(Period::months(1).add_to(dt(2024, 1, 31)).unwrap(), dt(2024, 2, 29));
        assert_eq!(Period::years(1).add_to(dt(2024, 2, 29)).unwrap(), dt(2025, 2, 28));
    }

    #[test]
    fn test_multiplied_and_subtracted() {
        let p = Period::months(3);
        assert_eq!(p.times(4).unwrap().add_to(dt(2025, 1, 15)).unwrap(), dt(2026, 1, 15));
        assert_eq!(p.sub_from(dt(2025, 4, 15)).unwrap(), dt(2025, 1, 15));
        assert_eq!(
            Period::new(2, PeriodUnit::Week).add_to(dt(2025, 1, 1)).unwrap(),
            dt(2025, 1, 15)
        );
    }

    #[test]
    fn test_out_of_range_arithmetic_is_an_error() {
        let huge: Period = "P100000Y".parse().unwrap();
        assert!(matches!(huge.times(100_000), Err(ScheduleError::OutOfRange(_))));
        assert!(matches!(
            huge.times(3).unwrap().add_to(dt(2025, 1, 1)),
            Err(ScheduleError::OutOfRange(_))
        ));
        assert!(matches!(
            Period::new(i32::MAX, PeriodUnit::Year).add_to(dt(2025, 1, 1)),
            Err(ScheduleError::OutOfRange(_))
        ));
        assert!(matches!(
            Period::new(i32::MAX, PeriodUnit::Day).sub_from(dt(2025, 1, 1)),
            Err(ScheduleError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        let c: Cycle = "P6ML0".parse().unwrap();
        assert_eq!(c.to_string(), "P6ML0");
    }
}
