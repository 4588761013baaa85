//! Temporal conventions and the schedule factory

mod business_day;
mod calendar;
mod cycle;
mod day_count;
mod end_of_month;
mod schedule;

pub use business_day::{BusinessDayAdjuster, BusinessDayConvention};
pub use calendar::Calendar;
pub use cycle::{Cycle, Period, PeriodUnit, Stub};
pub use day_count::{is_last_day_of_month, DayCountConvention, DayCounter};
pub use end_of_month::{EndOfMonthAdjuster, EndOfMonthConvention};
pub use schedule::{create_array_schedule, create_schedule};
