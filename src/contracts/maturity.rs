//! Maturity back-solve for amortizing contracts
//!
//! LAM, NAM, ANN and LAX without a stated maturity all reduce to the same
//! question: walking a sequence of redemption legs, on which date is the
//! outstanding notional exhausted?

use chrono::NaiveDateTime;

use crate::error::ScheduleError;
use crate::terms::IncreaseDecrease;
use crate::time::{Cycle, EndOfMonthAdjuster, EndOfMonthConvention};

/// Tolerance below which a remaining notional counts as repaid
const EPSILON: f64 = 1e-9;

/// Bound on the dates walked inside a bounded leg
const MAX_LEG_DATES: i32 = 100_000;

/// One amortization leg: `amount` per date from `anchor` on `cycle`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmortizationLeg {
    pub anchor: NaiveDateTime,
    pub cycle: Option<Cycle>,
    /// Unsigned amount per date
    pub amount: f64,
    pub direction: IncreaseDecrease,
}

impl AmortizationLeg {
    pub fn decreasing(anchor: NaiveDateTime, cycle: Option<Cycle>, amount: f64) -> Self {
        Self {
            anchor,
            cycle,
            amount,
            direction: IncreaseDecrease::DEC,
        }
    }

    /// Signed change of the outstanding amount per date
    fn delta(&self) -> f64 {
        match self.direction {
            IncreaseDecrease::INC => self.amount,
            IncreaseDecrease::DEC => -self.amount,
        }
    }

    fn date(&self, eom: EndOfMonthConvention, k: i32) -> Result<NaiveDateTime, ScheduleError> {
        match &self.cycle {
            Some(cycle) => {
                let date = cycle.period.times(k)?.add_to(self.anchor)?;
                Ok(EndOfMonthAdjuster::new(eom, self.anchor, cycle).shift(date))
            }
            None => Ok(self.anchor),
        }
    }
}

/// First date on which `notional` (unsigned, outstanding at `status_date`)
/// is exhausted by `legs`.
///
/// Legs run from their anchor up to the next leg's anchor; the last leg is
/// open-ended and its closing date is computed directly. Dates before the
/// status date are already reflected in `notional` and are skipped.
pub fn back_solve(
    legs: &[AmortizationLeg],
    notional: f64,
    status_date: NaiveDateTime,
    eom: EndOfMonthConvention,
) -> Result<NaiveDateTime, ScheduleError> {
    let mut legs = legs.to_vec();
    legs.sort_by_key(|l| l.anchor);
    let Some((last, bounded)) = legs.split_last() else {
        return Err(ScheduleError::NonAmortizing(0.0));
    };

    let mut remaining = notional.abs();
    for (i, leg) in bounded.iter().enumerate() {
        if let Some(cycle) = &leg.cycle {
            cycle.validate()?;
        }
        let next_anchor = legs[i + 1].anchor;
        let mut k = 0;
        loop {
            let date = leg.date(eom, k)?;
            if date >= next_anchor || k > MAX_LEG_DATES {
                break;
            }
            if date >= status_date {
                remaining += leg.delta();
                if remaining <= EPSILON {
                    log::debug!("back-solved maturity {} inside leg {}", date, i);
                    return Ok(date);
                }
            }
            if leg.cycle.is_none() {
                break;
            }
            k += 1;
        }
    }

    if last.delta() >= 0.0 {
        return Err(ScheduleError::NonAmortizing(last.delta()));
    }
    let Some(cycle) = &last.cycle else {
        let date = last.anchor;
        if date >= status_date && remaining + last.delta() <= EPSILON {
            return Ok(date);
        }
        return Err(ScheduleError::NonAmortizing(last.delta()));
    };
    cycle.validate()?;

    let mut first = 0;
    while last.date(eom, first)? < status_date {
        if first >= MAX_LEG_DATES {
            return Err(ScheduleError::OutOfRange(format!("{} + {} x {}", last.anchor, first, cycle)));
        }
        first += 1;
    }
    let periods = (remaining / last.amount - EPSILON).ceil().max(1.0);
    let Some(offset) = bounded_offset(first, periods) else {
        return Err(ScheduleError::OutOfRange(format!("{} + {} x {}", last.anchor, periods, cycle)));
    };
    let maturity = last.date(eom, offset)?;
    log::debug!(
        "back-solved maturity {} ({} periods of {} from {})",
        maturity,
        periods,
        last.amount,
        last.anchor
    );
    Ok(maturity)
}

/// Index of the last redemption date, `first + periods - 1`, if it fits
fn bounded_offset(first: i32, periods: f64) -> Option<i32> {
    if !periods.is_finite() || periods > f64::from(i32::MAX) {
        return None;
    }
    first.checked_add(periods as i32)?.checked_sub(1)
}
