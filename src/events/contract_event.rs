//! Dated contract events

use chrono::NaiveDateTime;

use super::event_type::EventType;
use crate::projection::StateSpace;
use crate::terms::CommonTerms;

/// Selects the payoff/state-transition pair of an event beyond its type.
///
/// Most events are fully described by their type; the remaining variants
/// carry the parameter that distinguishes them.
#[derive(Debug, Clone, PartialEq)]
pub enum EventFunction {
    Standard,
    /// Accrued interest settled at purchase
    AccruedAtPurchase,
    /// Accrued interest settled at termination
    AccruedAtTermination,
    /// Principal leg payment with its own amount
    PrincipalLeg(f64),
    /// Reset to a given rate (already fixed or leg-defined)
    FixedRate(f64),
    /// Reset observed from the market with a leg-specific spread
    VariableRate(f64),
    /// Event registered by a behavior model; carries the model id
    Callout(String),
}

/// One dated, typed occurrence in a contract's life
#[derive(Debug, Clone, PartialEq)]
pub struct ContractEvent {
    /// Payment time after business-day shifting
    pub event_time: NaiveDateTime,
    /// Unadjusted schedule time
    pub schedule_time: NaiveDateTime,
    /// Time used for accrual calculations
    pub calc_time: NaiveDateTime,
    pub event_type: EventType,
    pub currency: String,
    pub contract_id: String,
    pub function: EventFunction,
    /// Evaluated cash flow, set by `apply`
    pub payoff: f64,
    /// Post-event state, set by `apply`
    pub state: Option<StateSpace>,
}

impl ContractEvent {
    /// Event at `time` without business-day shifting
    pub fn new(time: NaiveDateTime, event_type: EventType, currency: &str, contract_id: &str) -> Self {
        Self {
            event_time: time,
            schedule_time: time,
            calc_time: time,
            event_type,
            currency: currency.to_string(),
            contract_id: contract_id.to_string(),
            function: EventFunction::Standard,
            payoff: 0.0,
            state: None,
        }
    }

    /// Event at `time` shifted by the contract's business-day convention
    pub fn shifted(time: NaiveDateTime, event_type: EventType, common: &CommonTerms) -> Self {
        let adjuster = &common.conventions.business_day;
        Self {
            event_time: adjuster.shift_event_time(time),
            calc_time: adjuster.shift_calc_time(time),
            ..Self::new(time, event_type, &common.currency, &common.contract_id)
        }
    }

    /// Event at `time` without shifting, owned by `common`'s contract
    pub fn unshifted(time: NaiveDateTime, event_type: EventType, common: &CommonTerms) -> Self {
        Self::new(time, event_type, &common.currency, &common.contract_id)
    }

    pub fn with_function(mut self, function: EventFunction) -> Self {
        self.function = function;
        self
    }

    /// Sort key: time, then type priority
    pub fn sort_key(&self) -> (NaiveDateTime, u8) {
        (self.event_time, self.event_type.priority())
    }

    /// Notional after the event, once evaluated
    pub fn notional(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.notional_principal)
    }
}

/// Stable sort by (time, priority)
pub fn sort_events(events: &mut [ContractEvent]) {
    events.sort_by_key(ContractEvent::sort_key);
}

/// True when every adjacent pair is ordered by (time, priority)
pub fn is_ordered(events: &[ContractEvent]) -> bool {
    events.windows(2).all(|w| w[0].sort_key() <= w[1].sort_key())
}
