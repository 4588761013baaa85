//! Business-day shifting of event times

use chrono::{Datelike, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::calendar::Calendar;

/// Shift rule applied to event dates falling on non-business days.
///
/// `SC*` variants shift first and calculate on the shifted date; `CS*`
/// variants calculate on the unshifted date and only move the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BusinessDayConvention {
    /// No shift
    #[default]
    NOS,
    /// Shift/calculate following
    SCF,
    /// Shift/calculate modified following
    SCMF,
    /// Calculate/shift following
    CSF,
    /// Calculate/shift modified following
    CSMF,
    /// Shift/calculate preceding
    SCP,
    /// Shift/calculate modified preceding
    SCMP,
    /// Calculate/shift preceding
    CSP,
    /// Calculate/shift modified preceding
    CSMP,
}

impl FromStr for BusinessDayConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NOS" | "NS" => Ok(Self::NOS),
            "SCF" => Ok(Self::SCF),
            "SCMF" => Ok(Self::SCMF),
            "CSF" => Ok(Self::CSF),
            "CSMF" => Ok(Self::CSMF),
            "SCP" => Ok(Self::SCP),
            "SCMP" => Ok(Self::SCMP),
            "CSP" => Ok(Self::CSP),
            "CSMP" => Ok(Self::CSMP),
            other => Err(format!("unknown business day convention `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Following,
    ModifiedFollowing,
    Preceding,
    ModifiedPreceding,
}

impl BusinessDayConvention {
    fn direction(&self) -> Option<Direction> {
        match self {
            Self::NOS => None,
            Self::SCF | Self::CSF => Some(Direction::Following),
            Self::SCMF | Self::CSMF => Some(Direction::ModifiedFollowing),
            Self::SCP | Self::CSP => Some(Direction::Preceding),
            Self::SCMP | Self::CSMP => Some(Direction::ModifiedPreceding),
        }
    }

    fn calculates_on_shifted(&self) -> bool {
        matches!(self, Self::SCF | Self::SCMF | Self::SCP | Self::SCMP)
    }
}

/// Calendar plus shift rule
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BusinessDayAdjuster {
    pub convention: BusinessDayConvention,
    pub calendar: Calendar,
}

impl BusinessDayAdjuster {
    pub fn new(convention: BusinessDayConvention, calendar: Calendar) -> Self {
        Self { convention, calendar }
    }

    /// Payment date of an event scheduled at `time`
    pub fn shift_event_time(&self, time: NaiveDateTime) -> NaiveDateTime {
        match self.convention.direction() {
            None => time,
            Some(direction) => self.shift(time, direction),
        }
    }

    /// Date used for accrual calculations of an event scheduled at `time`
    pub fn shift_calc_time(&self, time: NaiveDateTime) -> NaiveDateTime {
        if self.convention.calculates_on_shifted() {
            self.shift_event_time(time)
        } else {
            time
        }
    }

    fn shift(&self, time: NaiveDateTime, direction: Direction) -> NaiveDateTime {
        match direction {
            Direction::Following => self.roll(time, 1),
            Direction::Preceding => self.roll(time, -1),
            Direction::ModifiedFollowing => {
                let shifted = self.roll(time, 1);
                if shifted.month() != time.month() {
                    self.roll(time, -1)
                } else {
                    shifted
                }
            }
            Direction::ModifiedPreceding => {
                let shifted = self.roll(time, -1);
                if shifted.month() != time.month() {
                    self.roll(time, 1)
                } else {
                    shifted
                }
            }
        }
    }

    fn roll(&self, time: NaiveDateTime, step: i64) -> NaiveDateTime {
        let mut shifted = time;
        while !self.calendar.is_business_day(shifted.date()) {
            shifted += Duration::days(step);
        }
        shifted
    }
}
