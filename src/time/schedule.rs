//! Schedule factory: candidate event dates from anchor, end and cycle
//!
//! Results are `BTreeSet`s, so output is ordered and de-duplicated
//! independent of insertion order.

use chrono::NaiveDateTime;
use std::collections::BTreeSet;

use super::cycle::{Cycle, Stub};
use super::end_of_month::{EndOfMonthAdjuster, EndOfMonthConvention};
use crate::error::ScheduleError;

/// Dates from `anchor` stepping by `cycle` while before `end`.
///
/// Without a cycle the schedule is just the anchor (and `end` when
/// `include_end`). With a long stub the last regular date before an
/// off-cycle `end` is dropped so the final period absorbs the remainder.
pub fn create_schedule(
    anchor: NaiveDateTime,
    end: NaiveDateTime,
    cycle: Option<&Cycle>,
    eom: EndOfMonthConvention,
    include_end: bool,
) -> Result<BTreeSet<NaiveDateTime>, ScheduleError> {
    if end < anchor {
        return Err(ScheduleError::EndBeforeAnchor { anchor, end });
    }

    let mut dates = BTreeSet::new();
    let Some(cycle) = cycle else {
        dates.insert(anchor);
        if include_end {
            dates.insert(end);
        }
        return Ok(dates);
    };
    cycle.validate()?;

    let shifter = EndOfMonthAdjuster::new(eom, anchor, cycle);
    let mut counter = 0;
    let mut next = anchor;
    while next < end {
        dates.insert(next);
        counter += 1;
        next = shifter.shift(cycle.period.times(counter)?.add_to(anchor)?);
    }

    if cycle.stub == Stub::Long && next != end {
        let regular: Vec<_> = dates.iter().copied().collect();
        if regular.len() > 1 {
            if let Some(last) = regular.last() {
                dates.remove(last);
            }
        }
    }

    if include_end {
        dates.insert(end);
    }
    Ok(dates)
}

/// Segmented schedule: segment `i` runs from `anchors[i]` up to (excluding)
/// `anchors[i + 1]` with `cycles[i]`; the last segment runs to `end`.
pub fn create_array_schedule(
    anchors: &[NaiveDateTime],
    cycles: &[Option<Cycle>],
    end: NaiveDateTime,
    eom: EndOfMonthConvention,
    include_end: bool,
) -> Result<BTreeSet<NaiveDateTime>, ScheduleError> {
    if anchors.len() != cycles.len() {
        return Err(ScheduleError::ArrayLengthMismatch {
            anchors: anchors.len(),
            cycles: cycles.len(),
        });
    }
    if anchors.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ScheduleError::UnorderedAnchors);
    }

    let mut dates = BTreeSet::new();
    for (i, (anchor, cycle)) in anchors.iter().zip(cycles).enumerate() {
        let is_last = i + 1 == anchors.len();
        let segment_end = if is_last { end } else { anchors[i + 1] };
        dates.extend(create_schedule(
            *anchor,
            segment_end,
            cycle.as_ref(),
            eom,
            is_last && include_end,
        )?);
    }
    Ok(dates)
}
