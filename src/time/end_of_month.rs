//! End-of-month snapping for month-based cycles

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::cycle::Cycle;
use super::day_count::is_last_day_of_month;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EndOfMonthConvention {
    /// Same day: keep the anchor's day-of-month
    #[default]
    SD,
    /// End of month: snap to month end when the anchor is a month end
    EOM,
}

impl FromStr for EndOfMonthConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SD" => Ok(Self::SD),
            "EOM" => Ok(Self::EOM),
            other => Err(format!("unknown end of month convention `{other}`")),
        }
    }
}

/// Decides once per schedule whether generated dates snap to month end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfMonthAdjuster {
    active: bool,
}

impl EndOfMonthAdjuster {
    /// Snapping applies only for the EOM convention, a month-end anchor and a
    /// month-based cycle
    pub fn new(convention: EndOfMonthConvention, anchor: NaiveDateTime, cycle: &Cycle) -> Self {
        let active = convention == EndOfMonthConvention::EOM
            && is_last_day_of_month(anchor.date())
            && cycle.period.unit.is_month_based();
        Self { active }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn shift(&self, time: NaiveDateTime) -> NaiveDateTime {
        if !self.active {
            return time;
        }
        let (year, month) = if time.month() == 12 {
            (time.year() + 1, 1)
        } else {
            (time.year(), time.month() + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|first| first.pred_opt())
            .map(|last| last.and_time(time.time()))
            .unwrap_or(time)
    }
}
