//! Boundary controlled switch
//!
//! The parent contract only monitors an index against a boundary. When the
//! boundary is crossed, legs are knocked in or out at that time: a knocked-in
//! leg is acquired at the crossing, a knocked-out leg is terminated there.
//! The parent terminates at the crossing, or at the end of monitoring when
//! the crossing knocks in the first leg or never happens. The parent's
//! events and the legs' events are returned as one ordered list.

use chrono::NaiveDateTime;

use super::common::{self, recurrence_dates};
use super::functions::Step;
use super::{apply_with, ContractAlgorithm, Evaluation, StateMachine};
use crate::error::{ActusError, ObservationError};
use crate::events::{sort_events, ContractEvent, EventType};
use crate::projection::StateSpace;
use crate::risk::{Callout, ContractStart, RiskFactorObserver};
use crate::terms::{BoundaryEffect, CommonTerms, Contract, LegRole, Settlement, SwitchTerms};

/// How a leg takes part in the evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
enum LegRun {
    Full,
    Until(NaiveDateTime),
    From(NaiveDateTime),
}

impl SwitchTerms {
    fn leg(&self, role: LegRole) -> Option<&Contract> {
        match role {
            LegRole::FIL => Some(self.first_leg.as_ref()),
            LegRole::SEL => self.second_leg.as_deref(),
        }
    }

    fn knocks_in(&self, role: LegRole) -> bool {
        matches!(
            (self.effect, role),
            (BoundaryEffect::INFIL, LegRole::FIL) | (BoundaryEffect::INSEL, LegRole::SEL)
        )
    }

    /// Part a leg plays given the crossing time, if any
    fn plan(&self, role: LegRole, crossing: Option<NaiveDateTime>) -> Option<LegRun> {
        let initially_active = self.leg_initially_active == Some(role);
        match crossing {
            None => initially_active.then_some(LegRun::Full),
            Some(_) if initially_active && self.knocks_in(role) => Some(LegRun::Full),
            Some(t) if self.knocks_in(role) => Some(LegRun::From(t)),
            Some(t) if initially_active => Some(LegRun::Until(t)),
            Some(_) => None,
        }
    }

    /// Start of the parent. Referenced models include the legs' own, so a
    /// scenario activates everything the legs observe.
    pub(super) fn start(&self) -> ContractStart {
        let mut referenced_models: Vec<String> = Vec::new();
        let legs = [LegRole::FIL, LegRole::SEL].into_iter().filter_map(|role| self.leg(role));
        for id in self
            .common
            .behavior_models()
            .chain(legs.flat_map(|leg| leg.common().behavior_models()))
        {
            if !referenced_models.contains(id) {
                referenced_models.push(id.clone());
            }
        }
        ContractStart {
            contract_id: self.common.contract_id.clone(),
            contract_type: self.common.contract_type,
            status_date: self.common.status_date,
            initial_exchange_date: None,
            maturity_date: Some(self.monitoring_end_date),
            notional_principal: 0.0,
            referenced_models,
        }
    }

    fn termination_payoff(&self) -> f64 {
        self.common.role_sign() * self.common.termination.map_or(0.0, |t| t.price)
    }

    /// Parent TD at the crossing, carrying the post-crossing state
    fn terminated_at(&self, crossing: &ContractEvent) -> ContractEvent {
        let mut td = ContractEvent::unshifted(crossing.event_time, EventType::TD, &self.common);
        td.payoff = self.termination_payoff();
        td.state = crossing.state.clone().map(|mut state| {
            state.boundary.monitored = false;
            state
        });
        td
    }
}

/// Leg acquired at `time`; a leg that has not started by then runs as is
fn knocked_in(leg: &Contract, time: NaiveDateTime) -> Contract {
    let mut leg = leg.clone();
    if leg.initial_exchange_date().map_or(false, |ied| ied >= time) {
        return leg;
    }
    let price = match leg.loan() {
        Some(loan) => loan.notional_principal,
        None => leg.common().purchase.map_or(0.0, |p| p.price),
    };
    leg.common_mut().purchase = Some(Settlement { date: time, price });
    leg
}

/// Leg terminated at `time`, settling the balance it carries then. `None`
/// when the leg only starts after `time`.
fn knocked_out(
    leg: &Contract,
    time: NaiveDateTime,
    horizon: Option<NaiveDateTime>,
    observer: &dyn RiskFactorObserver,
) -> Result<Option<Contract>, ActusError> {
    if leg.initial_exchange_date().map_or(false, |ied| ied > time) {
        return Ok(None);
    }
    let ended = leg.contract_start().maturity_date.map_or(false, |md| md < time)
        || leg.common().termination.map_or(false, |t| t.date <= time);
    if ended {
        return Ok(Some(leg.clone()));
    }

    let price = match leg.loan() {
        Some(_) => {
            let td = ContractEvent::unshifted(time, EventType::TD, leg.common());
            let until = horizon.map_or(time, |h| h.min(time));
            leg.simulate(Some(until), observer)?
                .events
                .iter()
                .take_while(|e| e.sort_key() <= td.sort_key())
                .filter_map(|e| e.state.as_ref())
                .last()
                .map_or(0.0, |s| (s.notional_scaling_multiplier * s.notional_principal).abs())
        }
        None => leg.common().termination.map_or(0.0, |t| t.price),
    };
    let mut leg = leg.clone();
    leg.common_mut().termination = Some(Settlement { date: time, price });
    Ok(Some(leg))
}

impl StateMachine for SwitchTerms {
    fn common(&self) -> &CommonTerms {
        &self.common
    }

    fn interest_bearing(&self) -> bool {
        false
    }

    fn maturity(&self) -> Result<Option<NaiveDateTime>, ActusError> {
        Ok(Some(self.monitoring_end_date))
    }

    fn events(
        &self,
        _maturity: Option<NaiveDateTime>,
        _horizon: Option<NaiveDateTime>,
    ) -> Result<Vec<ContractEvent>, ActusError> {
        let dates = recurrence_dates(&self.common, &self.monitoring, self.monitoring_end_date, true)?;
        let mut events = common::events_at(&dates, EventType::ME, &self.common);
        if self.common.termination.is_none() {
            events.push(ContractEvent::unshifted(self.monitoring_end_date, EventType::TD, &self.common));
        }
        Ok(events)
    }

    fn init_state(&self, maturity: Option<NaiveDateTime>) -> Result<StateSpace, ActusError> {
        let mut state = StateSpace::new(self.common.status_date);
        state.maturity_date = maturity;
        state.contract_performance = self.common.contract_performance;
        state.boundary.monitored = true;
        state.boundary.first_leg_active = self.leg_initially_active == Some(LegRole::FIL);
        state.boundary.second_leg_active = self.leg_initially_active == Some(LegRole::SEL);
        Ok(state)
    }

    fn transition(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError> {
        let r = step.role_sign();
        let payoff = match step.event.event_type {
            EventType::ME if state.boundary.monitored => {
                let observed = step.observe(&self.reference_index, step.time(), state)?;
                if self.direction.crossed(observed, self.boundary_value) {
                    let boundary = &mut state.boundary;
                    boundary.crossed = true;
                    boundary.monitored = false;
                    boundary.first_leg_active = self.knocks_in(LegRole::FIL);
                    boundary.second_leg_active = self.knocks_in(LegRole::SEL);
                }
                0.0
            }
            EventType::PRD => -r * self.common.purchase.map_or(0.0, |p| p.price),
            EventType::TD => {
                state.boundary.monitored = false;
                r * self.common.termination.map_or(0.0, |t| t.price)
            }
            _ => 0.0,
        };
        state.status_date = step.time();
        Ok(payoff)
    }

    /// Callouts belong to the legs; the monitoring parent carries no balance
    fn register_callout(&self, _events: &mut Vec<ContractEvent>, _callout: &Callout) -> bool {
        false
    }
}

/// Evaluate the monitoring parent, then each leg per the crossing outcome
pub(super) fn apply(
    terms: &SwitchTerms,
    events: Vec<ContractEvent>,
    observer: &dyn RiskFactorObserver,
    horizon: Option<NaiveDateTime>,
) -> Result<Evaluation, ActusError> {
    let parent = apply_with(terms, events, observer, &terms.start(), horizon)?;
    let mut state = parent.state;
    let mut events = parent.events;
    let position = events
        .iter()
        .position(|e| e.event_type == EventType::ME && e.state.as_ref().map_or(false, |s| s.boundary.crossed));
    let crossing = position.map(|i| events[i].event_time);

    if let Some(i) = position {
        let t = events[i].event_time;
        log::debug!("{}: boundary {} crossed at {}", terms.common.contract_id, terms.boundary_value, t);
        if terms.effect == BoundaryEffect::INFIL {
            events.retain(|e| e.event_type != EventType::ME || e.event_time <= t);
        } else {
            let td = terms.terminated_at(&events[i]);
            events.truncate(i + 1);
            if let Some(terminated) = &td.state {
                state = terminated.clone();
            }
            events.push(td);
        }
    }

    for role in [LegRole::FIL, LegRole::SEL] {
        let (Some(leg), Some(run)) = (terms.leg(role), terms.plan(role, crossing)) else {
            continue;
        };
        log::trace!("{}: leg {} runs {:?}", terms.common.contract_id, leg.contract_id(), run);
        let evaluation = match run {
            LegRun::Full => leg.simulate(horizon, observer)?,
            LegRun::Until(t) => match knocked_out(leg, t, horizon, observer)? {
                Some(leg) => leg.simulate(horizon, observer)?,
                None => continue,
            },
            LegRun::From(t) => knocked_in(leg, t).simulate(horizon, observer)?,
        };
        events.extend(evaluation.events);
    }

    sort_events(&mut events);
    Ok(Evaluation { events, state })
}
