//! Exotic linear amortizer
//!
//! Principal, interest and rate-reset schedules are given as arrays of
//! anchors with one cycle each. A segment runs from its anchor to the next
//! anchor; the last one runs to maturity.

use chrono::NaiveDateTime;
use std::collections::BTreeSet;

use super::common::{self, dates, recurrence_dates};
use super::functions::{LoanRules, Step};
use super::maturity::{back_solve, AmortizationLeg};
use super::StateMachine;
use crate::error::{ActusError, ObservationError};
use crate::events::{ContractEvent, EventFunction, EventType};
use crate::projection::StateSpace;
use crate::terms::{
    CommonTerms, ExoticAmortizerTerms, FixedVariable, IncreaseDecrease, InterestCalculationBase,
};
use crate::time::{create_array_schedule, Cycle};

impl ExoticAmortizerTerms {
    fn rules(&self) -> LoanRules<'_> {
        LoanRules::new(&self.loan).with_base(&self.interest_base)
    }

    /// Dates of each segment `(anchor, cycle)`, bounded by the next anchor
    /// and by maturity (both exclusive)
    fn segments<T>(
        &self,
        legs: &[T],
        key: impl Fn(&T) -> (NaiveDateTime, Option<Cycle>),
        maturity: NaiveDateTime,
    ) -> Result<Vec<(usize, NaiveDateTime)>, ActusError> {
        let mut order: Vec<usize> = (0..legs.len()).collect();
        order.sort_by_key(|i| key(&legs[*i]).0);

        let mut out = Vec::new();
        for (pos, i) in order.iter().enumerate() {
            let (anchor, cycle) = key(&legs[*i]);
            let end = order
                .get(pos + 1)
                .map_or(maturity, |next| key(&legs[*next]).0.min(maturity));
            let segment = dates(&self.common, anchor, end, cycle.as_ref(), false)?;
            out.extend(segment.into_iter().filter(|t| *t < end).map(|t| (*i, t)));
        }
        Ok(out)
    }

    fn interest_dates(&self, maturity: NaiveDateTime) -> Result<BTreeSet<NaiveDateTime>, ActusError> {
        let mut out = if self.interest_anchors.is_empty() {
            [maturity].into_iter().collect()
        } else {
            create_array_schedule(
                &self.interest_anchors,
                &self.interest_cycles,
                maturity,
                self.common.conventions.end_of_month,
                true,
            )
            .map_err(|e| ActusError::schedule(&self.common.contract_id, e))?
        };
        out.retain(|t| *t > self.loan.initial_exchange_date && *t <= maturity);
        Ok(out)
    }

    fn principal_change(&self, step: &Step<'_>, state: &mut StateSpace, amount: f64) -> f64 {
        let rules = self.rules();
        rules.accrue(step, state);
        let r = step.role_sign();
        let change = match step.event.event_type {
            EventType::PI => -r * amount,
            _ => r * amount.min(state.notional_principal.abs()),
        };
        state.notional_principal -= change;
        rules.sync_base(state);
        state.notional_scaling_multiplier * change
    }
}

impl StateMachine for ExoticAmortizerTerms {
    fn common(&self) -> &CommonTerms {
        &self.common
    }

    fn maturity(&self) -> Result<Option<NaiveDateTime>, ActusError> {
        if let Some(stated) = self.maturity_date {
            return Ok(Some(stated));
        }
        let legs: Vec<_> = self
            .principal_legs
            .iter()
            .map(|leg| AmortizationLeg {
                anchor: leg.anchor,
                cycle: leg.cycle,
                amount: leg.amount,
                direction: leg.direction,
            })
            .collect();
        back_solve(
            &legs,
            self.loan.notional_principal,
            self.common.status_date,
            self.common.conventions.end_of_month,
        )
        .map(Some)
        .map_err(|e| ActusError::schedule(&self.common.contract_id, e))
    }

    fn events(
        &self,
        maturity: Option<NaiveDateTime>,
        horizon: Option<NaiveDateTime>,
    ) -> Result<Vec<ContractEvent>, ActusError> {
        let md = common::end_date(&self.common, maturity, horizon)?;
        let c = &self.common;
        let mut events = vec![
            ContractEvent::shifted(self.loan.initial_exchange_date, EventType::IED, c),
            ContractEvent::shifted(md, EventType::MD, c),
        ];

        for (i, t) in self.segments(&self.principal_legs, |l| (l.anchor, l.cycle), md)? {
            let leg = &self.principal_legs[i];
            let event_type = match leg.direction {
                IncreaseDecrease::INC => EventType::PI,
                IncreaseDecrease::DEC => EventType::PR,
            };
            events.push(ContractEvent::shifted(t, event_type, c).with_function(EventFunction::PrincipalLeg(leg.amount)));
        }

        events.extend(common::interest_events(
            &self.interest_dates(md)?,
            self.loan.interest.capitalization_end_date,
            c,
        ));

        for (i, t) in self.segments(&self.rate_legs, |l| (l.anchor, l.cycle), md)? {
            let leg = &self.rate_legs[i];
            let (event_type, function) = match leg.kind {
                FixedVariable::FIX => (EventType::RRF, EventFunction::FixedRate(leg.rate)),
                FixedVariable::VAR => (EventType::RR, EventFunction::VariableRate(leg.rate)),
            };
            events.push(ContractEvent::shifted(t, event_type, c).with_function(function));
        }

        events.extend(common::fee_events(c, &self.loan.fee, md)?);
        events.extend(common::scaling_events(c, &self.loan.scaling, md)?);
        if self.interest_base.base == InterestCalculationBase::NTL {
            events.extend(common::events_at(
                &recurrence_dates(c, &self.interest_base.recurrence, md, false)?,
                EventType::IPCB,
                c,
            ));
        }
        Ok(events)
    }

    fn init_state(&self, maturity: Option<NaiveDateTime>) -> Result<StateSpace, ActusError> {
        let md = common::end_date(&self.common, maturity, None)?;
        Ok(self.rules().init_state(&self.common, maturity, &self.interest_dates(md)?))
    }

    fn transition(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError> {
        if let EventFunction::PrincipalLeg(amount) = step.event.function {
            return Ok(self.principal_change(step, state, amount));
        }
        let rules = self.rules();
        rules.evaluate(step, state).unwrap_or_else(|| {
            rules.accrue(step, state);
            Ok(0.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::contracts::ContractAlgorithm;
    use crate::events::EventType;
    use crate::risk::{MarketModel, TimeSeries};
    use crate::terms::{Contract, RawTerms};
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn terms() -> serde_json::Value {
        json!({
            "contractType": "LAX",
            "contractID": "lax01",
            "statusDate": "2025-01-01",
            "contractRole": "RPA",
            "currency": "USD",
            "dayCountConvention": "30E360",
            "initialExchangeDate": "2025-01-01",
            "notionalPrincipal": 1000,
            "nominalInterestRate": 0.04,
            "arrayCycleAnchorDateOfPrincipalRedemption": ["2025-04-01", "2025-10-01"],
            "arrayCycleOfPrincipalRedemption": ["P3ML1", "P3ML1"],
            "arrayNextPrincipalRedemptionPayment": [100, 300],
            "arrayIncreaseDecrease": ["DEC", "DEC"],
            "arrayCycleAnchorDateOfInterestPayment": ["2025-04-01"],
            "arrayCycleOfInterestPayment": ["P3ML1"],
            "arrayCycleAnchorDateOfRateReset": ["2025-07-01"],
            "arrayCycleOfRateReset": ["P1YL1"],
            "arrayRate": [0.06],
            "arrayFixedVariable": ["FIX"]
        })
    }

    fn contract(value: serde_json::Value) -> Contract {
        serde_json::from_value::<RawTerms>(value).unwrap().to_contract().unwrap()
    }

    #[test]
    fn test_piecewise_redemptions_and_fixed_reset() {
        let result = contract(terms()).simulate(None, &MarketModel::new()).unwrap();
        let md = result.events.last().unwrap();
        assert_eq!((md.event_time, md.event_type), (dt(2026, 4, 1), EventType::MD));
        assert_relative_eq!(md.payoff, 200.0, epsilon = 1e-9);

        let redemptions: Vec<_> = result
            .events
            .iter()
            .filter(|e| e.event_type == EventType::PR)
            .map(|e| (e.event_time, e.payoff))
            .collect();
        assert_eq!(
            redemptions,
            vec![
                (dt(2025, 4, 1), 100.0),
                (dt(2025, 7, 1), 100.0),
                (dt(2025, 10, 1), 300.0),
                (dt(2026, 1, 1), 300.0),
            ]
        );

        let interest: Vec<_> = result.events.iter().filter(|e| e.event_type == EventType::IP).collect();
        assert_relative_eq!(interest[0].payoff, 1000.0 * 0.01, epsilon = 1e-9);
        assert_relative_eq!(interest[1].payoff, 900.0 * 0.01, epsilon = 1e-9);
        // fixed reset to 6% on 2025-07-01
        assert_relative_eq!(interest[2].payoff, 800.0 * 0.015, epsilon = 1e-9);
    }

    #[test]
    fn test_increase_leg_draws_down() {
        let mut t = terms();
        t["maturityDate"] = json!("2026-01-01");
        t["arrayIncreaseDecrease"] = json!(["INC", "DEC"]);
        t["arrayNextPrincipalRedemptionPayment"] = json!([50, 100]);
        let result = contract(t).simulate(None, &MarketModel::new()).unwrap();
        let draws: Vec<_> = result.events.iter().filter(|e| e.event_type == EventType::PI).collect();
        assert_eq!(draws.len(), 2);
        assert_relative_eq!(draws[0].payoff, -50.0);
        assert_relative_eq!(draws[1].notional().unwrap(), 1100.0);
        // 1100 - 100 at 2025-10-01, rest at maturity
        assert_relative_eq!(result.events.last().unwrap().payoff, 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_variable_leg_observes_market() {
        let mut t = terms();
        t["arrayFixedVariable"] = json!(["VAR"]);
        t["arrayRate"] = json!([0.01]);
        t["marketObjectCodeOfRateReset"] = json!("SOFR");
        let market = MarketModel::new().with_series("SOFR", TimeSeries::from_points([(dt(2025, 1, 1), 0.03)]));
        let result = contract(t).simulate(None, &market).unwrap();
        let reset = result.events.iter().find(|e| e.event_type == EventType::RR).unwrap();
        assert_relative_eq!(reset.state.as_ref().unwrap().nominal_interest_rate, 0.04, epsilon = 1e-12);
    }
}
