//! Plain vanilla interest rate swap
//!
//! One notional, never exchanged. The first rate is the fixed leg, the
//! second the floating leg reset from the market. Legs are paid gross
//! (IPFX and IPFL) under delivery, or netted into one IP under settlement.

use chrono::NaiveDateTime;
use std::collections::BTreeSet;

use super::common::{self, recurrence_dates};
use super::functions::{accrue, clear, reset_target, Step};
use super::StateMachine;
use crate::error::{ActusError, ObservationError};
use crate::events::{ContractEvent, EventFunction, EventType};
use crate::projection::StateSpace;
use crate::terms::{CommonTerms, DeliverySettlement, SwapTerms};

impl SwapTerms {
    fn interest_dates(&self) -> Result<BTreeSet<NaiveDateTime>, ActusError> {
        let mut dates = recurrence_dates(&self.common, &self.payment, self.maturity_date, true)?;
        dates.retain(|t| *t > self.initial_exchange_date);
        Ok(dates)
    }

    /// Notional, rates and accrued interest of both legs at `time`
    fn open(&self, state: &mut StateSpace, time: NaiveDateTime, interest_dates: &BTreeSet<NaiveDateTime>) {
        let r = self.common.role_sign();
        state.notional_principal = r * self.notional_principal;
        state.interest_calculation_base_amount = state.notional_principal;
        state.nominal_interest_rate = self.nominal_interest_rate;
        state.nominal_interest_rate2 = self.nominal_interest_rate2;

        let last = interest_dates
            .range(..time)
            .next_back()
            .copied()
            .map_or(self.initial_exchange_date, |d| d.max(self.initial_exchange_date));
        let conventions = &self.common.conventions;
        let from = conventions.business_day.shift_calc_time(last);
        let to = conventions.business_day.shift_calc_time(time);
        let y = if to > from { conventions.day_counter.fraction(from, to) } else { 0.0 };
        state.accrued_interest = self
            .accrued_interest
            .map_or(y * state.nominal_interest_rate * state.notional_principal, |a| r * a);
        state.accrued_interest2 = self
            .accrued_interest2
            .map_or(y * state.nominal_interest_rate2 * state.notional_principal, |a| r * a);
    }

    fn fixed_leg_due(step: &Step<'_>, state: &StateSpace) -> f64 {
        state.accrued_interest + step.year_fraction(state) * state.nominal_interest_rate * state.notional_principal
    }

    fn floating_leg_due(step: &Step<'_>, state: &StateSpace) -> f64 {
        state.accrued_interest2 + step.year_fraction(state) * state.nominal_interest_rate2 * state.notional_principal
    }
}

impl StateMachine for SwapTerms {
    fn common(&self) -> &CommonTerms {
        &self.common
    }

    fn maturity(&self) -> Result<Option<NaiveDateTime>, ActusError> {
        Ok(Some(self.maturity_date))
    }

    fn events(
        &self,
        _maturity: Option<NaiveDateTime>,
        _horizon: Option<NaiveDateTime>,
    ) -> Result<Vec<ContractEvent>, ActusError> {
        let c = &self.common;
        let md = self.maturity_date;
        let mut events = vec![
            ContractEvent::shifted(self.initial_exchange_date, EventType::IED, c),
            ContractEvent::shifted(md, EventType::MD, c),
        ];
        let dates = self.interest_dates()?;
        match self.delivery {
            DeliverySettlement::D => {
                events.extend(common::events_at(&dates, EventType::IPFX, c));
                events.extend(common::events_at(&dates, EventType::IPFL, c));
            }
            DeliverySettlement::S => events.extend(common::events_at(&dates, EventType::IP, c)),
        }
        events.extend(common::rate_reset_events(c, &self.rate_reset, md)?);
        Ok(events)
    }

    fn init_state(&self, maturity: Option<NaiveDateTime>) -> Result<StateSpace, ActusError> {
        let mut state = StateSpace::new(self.common.status_date);
        state.maturity_date = maturity;
        state.contract_performance = self.common.contract_performance;
        if self.initial_exchange_date <= self.common.status_date {
            self.open(&mut state, self.common.status_date, &self.interest_dates()?);
        }
        Ok(state)
    }

    fn transition(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError> {
        let payoff = match step.event.event_type {
            EventType::IED => {
                self.open(state, step.time(), &BTreeSet::new());
                state.status_date = step.time();
                0.0
            }
            EventType::IPFX => {
                let due = Self::fixed_leg_due(step, state);
                accrue(step, state, None);
                state.accrued_interest = 0.0;
                due
            }
            EventType::IPFL => {
                let due = Self::floating_leg_due(step, state);
                accrue(step, state, None);
                state.accrued_interest2 = 0.0;
                -due
            }
            EventType::IP => {
                let net = Self::fixed_leg_due(step, state) - Self::floating_leg_due(step, state);
                accrue(step, state, None);
                if step.event.function == EventFunction::AccruedAtPurchase {
                    return Ok(-net);
                }
                state.accrued_interest = 0.0;
                state.accrued_interest2 = 0.0;
                net
            }
            EventType::RR | EventType::RRF => {
                let target = reset_target(step, state, &self.rate_reset, state.nominal_interest_rate2)?;
                accrue(step, state, None);
                state.nominal_interest_rate2 = target;
                0.0
            }
            EventType::PRD => {
                accrue(step, state, None);
                -step.role_sign() * self.common.purchase.map_or(0.0, |p| p.price)
            }
            EventType::TD => {
                accrue(step, state, None);
                clear(state);
                step.role_sign() * self.common.termination.map_or(0.0, |t| t.price)
            }
            EventType::MD => {
                accrue(step, state, None);
                clear(state);
                0.0
            }
            _ => {
                accrue(step, state, None);
                0.0
            }
        };
        Ok(payoff)
    }
}
