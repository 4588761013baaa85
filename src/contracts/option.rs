//! Options on a market-observed underlying

use chrono::NaiveDateTime;

use super::common;
use super::functions::Step;
use super::StateMachine;
use crate::error::{ActusError, ObservationError, ScheduleError};
use crate::events::{ContractEvent, EventFunction, EventType};
use crate::projection::StateSpace;
use crate::risk::{Callout, CalloutKind};
use crate::terms::{CommonTerms, OptionExerciseType, OptionTerms, OptionType};

impl OptionTerms {
    /// Intrinsic value at underlying price `spot`
    pub fn exercise_value(&self, spot: f64) -> f64 {
        let call = |k: f64| (spot - k).max(0.0);
        let put = |k: f64| (k - spot).max(0.0);
        match self.option_type {
            OptionType::C => call(self.strike1),
            OptionType::P => put(self.strike1),
            OptionType::CP => call(self.strike1) + put(self.strike2.unwrap_or(self.strike1)),
        }
    }

    fn settlement(&self, exercise: NaiveDateTime) -> Result<ContractEvent, ScheduleError> {
        let time = self.settlement_period.add_to(exercise)?;
        Ok(ContractEvent::shifted(time, EventType::STD, &self.common))
    }

    fn already_exercised(&self) -> Option<(NaiveDateTime, f64)> {
        self.exercise_date.zip(self.exercise_amount)
    }
}

impl StateMachine for OptionTerms {
    fn common(&self) -> &CommonTerms {
        &self.common
    }

    fn interest_bearing(&self) -> bool {
        false
    }

    fn maturity(&self) -> Result<Option<NaiveDateTime>, ActusError> {
        Ok(self.maturity_date.or(self.exercise_date))
    }

    fn events(
        &self,
        maturity: Option<NaiveDateTime>,
        horizon: Option<NaiveDateTime>,
    ) -> Result<Vec<ContractEvent>, ActusError> {
        if let Some((exercised, _)) = self.already_exercised() {
            let settlement = self
                .settlement(exercised)
                .map_err(|e| ActusError::schedule(&self.common.contract_id, e))?;
            return Ok(vec![settlement]);
        }
        let expiry = self
            .exercise_date
            .map_or_else(|| common::end_date(&self.common, maturity, horizon), Ok)?;
        let mut events = vec![
            ContractEvent::shifted(expiry, EventType::XD, &self.common),
            self.settlement(expiry).map_err(|e| ActusError::schedule(&self.common.contract_id, e))?,
        ];
        if let Some(md) = self.maturity_date {
            events.push(ContractEvent::shifted(md, EventType::MD, &self.common));
        }
        Ok(events)
    }

    fn init_state(&self, maturity: Option<NaiveDateTime>) -> Result<StateSpace, ActusError> {
        let mut state = StateSpace::new(self.common.status_date);
        state.maturity_date = maturity;
        state.contract_performance = self.common.contract_performance;
        if let Some((date, amount)) = self.already_exercised() {
            state.exercise_date = Some(date);
            state.exercise_amount = Some(amount);
        }
        Ok(state)
    }

    fn transition(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError> {
        let r = step.role_sign();
        let payoff = match step.event.event_type {
            EventType::XD => {
                let spot = step.observe(&self.underlying, step.time(), state)?;
                state.exercise_amount = Some(self.exercise_value(spot));
                state.exercise_date = Some(step.time());
                0.0
            }
            EventType::STD => {
                let payoff = r * state.exercise_amount.unwrap_or(0.0);
                state.exercise_amount = Some(0.0);
                payoff
            }
            EventType::PRD => -r * self.common.purchase.map_or(0.0, |p| p.price),
            EventType::TD => {
                state.exercise_amount = None;
                r * self.common.termination.map_or(0.0, |t| t.price)
            }
            _ => 0.0,
        };
        state.status_date = step.time();
        Ok(payoff)
    }

    /// Early exercise replaces the scheduled exercise and settlement
    fn register_callout(&self, events: &mut Vec<ContractEvent>, callout: &Callout) -> bool {
        if callout.kind != CalloutKind::Exercise
            || self.exercise_type == OptionExerciseType::E
            || self.already_exercised().is_some()
        {
            return false;
        }
        let settlement = match self.settlement(callout.time) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("{}: exercise at {} ignored: {}", self.common.contract_id, callout.time, e);
                return false;
            }
        };
        events.retain(|e| !matches!(e.event_type, EventType::XD | EventType::STD));
        events.push(
            ContractEvent::unshifted(callout.time, EventType::XD, &self.common)
                .with_function(EventFunction::Callout(callout.model_id.clone())),
        );
        events.push(settlement);
        true
    }
}
