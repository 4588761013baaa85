//! Event generation shared across contract kinds
//!
//! Helpers here produce the raw events of the optional features (rate
//! reset, fees, scaling, capitalization) and apply the cross-cutting cuts:
//! purchase and termination, status date and horizon.

use chrono::NaiveDateTime;
use std::collections::BTreeSet;

use crate::error::ActusError;
use crate::events::{sort_events, ContractEvent, EventFunction, EventType};
use crate::terms::{CommonTerms, FeeTerms, RateResetTerms, Recurrence, ScalingTerms};
use crate::time::{create_schedule, Cycle};

/// Dates of a recurrence up to `end`; empty when the anchor is missing or
/// lies beyond `end`
pub(crate) fn recurrence_dates(
    common: &CommonTerms,
    recurrence: &Recurrence,
    end: NaiveDateTime,
    include_end: bool,
) -> Result<BTreeSet<NaiveDateTime>, ActusError> {
    match recurrence.anchor {
        Some(anchor) => dates(common, anchor, end, recurrence.cycle.as_ref(), include_end),
        None => Ok(BTreeSet::new()),
    }
}

pub(crate) fn dates(
    common: &CommonTerms,
    anchor: NaiveDateTime,
    end: NaiveDateTime,
    cycle: Option<&Cycle>,
    include_end: bool,
) -> Result<BTreeSet<NaiveDateTime>, ActusError> {
    if anchor > end {
        return Ok(BTreeSet::new());
    }
    create_schedule(anchor, end, cycle, common.conventions.end_of_month, include_end)
        .map_err(|e| ActusError::schedule(&common.contract_id, e))
}

/// Business-day shifted events of one type at `dates`
pub(crate) fn events_at<'a>(
    dates: impl IntoIterator<Item = &'a NaiveDateTime>,
    event_type: EventType,
    common: &CommonTerms,
) -> Vec<ContractEvent> {
    dates
        .into_iter()
        .map(|t| ContractEvent::shifted(*t, event_type, common))
        .collect()
}

/// Interest payments at `dates`; those up to the capitalization end date
/// become capitalization events, with one at the end date itself
pub(crate) fn interest_events(
    dates: &BTreeSet<NaiveDateTime>,
    capitalization_end: Option<NaiveDateTime>,
    common: &CommonTerms,
) -> Vec<ContractEvent> {
    let Some(ipced) = capitalization_end else {
        return events_at(dates, EventType::IP, common);
    };
    let mut events: Vec<ContractEvent> = dates
        .iter()
        .filter(|t| **t != ipced)
        .map(|t| {
            let event_type = if *t < ipced { EventType::IPCI } else { EventType::IP };
            ContractEvent::shifted(*t, event_type, common)
        })
        .collect();
    events.push(ContractEvent::shifted(ipced, EventType::IPCI, common));
    events
}

/// RR events on the reset cycle; the first reset after the status date
/// becomes an RRF when the next rate is already fixed
pub(crate) fn rate_reset_events(
    common: &CommonTerms,
    terms: &RateResetTerms,
    end: NaiveDateTime,
) -> Result<Vec<ContractEvent>, ActusError> {
    let mut events = events_at(
        &recurrence_dates(common, &terms.recurrence, end, false)?,
        EventType::RR,
        common,
    );
    if let Some(rate) = terms.next_reset_rate {
        match events.iter_mut().find(|e| e.event_time > common.status_date) {
            Some(event) => {
                event.event_type = EventType::RRF;
                event.function = EventFunction::FixedRate(rate);
            }
            None => log::warn!(
                "{}: nextResetRate given but no reset after {}",
                common.contract_id,
                common.status_date
            ),
        }
    }
    Ok(events)
}

pub(crate) fn fee_events(
    common: &CommonTerms,
    fee: &FeeTerms,
    end: NaiveDateTime,
) -> Result<Vec<ContractEvent>, ActusError> {
    if fee.recurrence.cycle.is_none() {
        return Ok(Vec::new());
    }
    Ok(events_at(
        &recurrence_dates(common, &fee.recurrence, end, true)?,
        EventType::FP,
        common,
    ))
}

pub(crate) fn scaling_events(
    common: &CommonTerms,
    scaling: &ScalingTerms,
    end: NaiveDateTime,
) -> Result<Vec<ContractEvent>, ActusError> {
    if !scaling.effect.is_active() {
        return Ok(Vec::new());
    }
    Ok(events_at(
        &recurrence_dates(common, &scaling.recurrence, end, false)?,
        EventType::SC,
        common,
    ))
}

/// PRD at the purchase date, preceded by the accrued-interest settlement
/// for interest-bearing kinds
pub(crate) fn purchase_events(common: &CommonTerms, interest_bearing: bool) -> Vec<ContractEvent> {
    let Some(purchase) = common.purchase else {
        return Vec::new();
    };
    let mut events = Vec::with_capacity(2);
    if interest_bearing {
        events.push(
            ContractEvent::unshifted(purchase.date, EventType::IP, common)
                .with_function(EventFunction::AccruedAtPurchase),
        );
    }
    events.push(ContractEvent::unshifted(purchase.date, EventType::PRD, common));
    events
}

/// Schedule end: stated or computed maturity, else the query horizon
pub(crate) fn end_date(
    common: &CommonTerms,
    maturity: Option<NaiveDateTime>,
    horizon: Option<NaiveDateTime>,
) -> Result<NaiveDateTime, ActusError> {
    maturity.or(horizon).ok_or_else(|| ActusError::MissingHorizon {
        contract_id: common.contract_id.clone(),
    })
}

/// Termination, status-date and horizon cuts, then ordering
pub(crate) fn finalize(
    mut events: Vec<ContractEvent>,
    common: &CommonTerms,
    horizon: Option<NaiveDateTime>,
    interest_bearing: bool,
) -> Vec<ContractEvent> {
    if let Some(termination) = common.termination {
        let td = ContractEvent::unshifted(termination.date, EventType::TD, common);
        events.retain(|e| e.sort_key() <= td.sort_key());
        if interest_bearing {
            events.push(
                ContractEvent::unshifted(termination.date, EventType::IP, common)
                    .with_function(EventFunction::AccruedAtTermination),
            );
        }
        events.push(td);
    }

    let status = common.status_date.date();
    events.retain(|e| e.event_time.date() >= status);
    if let Some(to) = horizon {
        events.retain(|e| e.event_time.date() <= to.date());
    }
    sort_events(&mut events);
    events
}

/// Drop everything before the purchase date except analysis dates
pub(crate) fn truncate_at_purchase(events: &mut Vec<ContractEvent>, common: &CommonTerms) {
    if let Some(purchase) = common.purchase {
        events.retain(|e| e.event_type == EventType::AD || e.event_time >= purchase.date);
    }
}
