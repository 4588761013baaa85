//! Linear, negative and annuity amortizers
//!
//! The three kinds share a schedule: principal redemptions on a cycle up to
//! maturity, interest on its own cycle (or with each redemption) and the
//! loan features. They differ in what a redemption pays. LAM redeems a fixed
//! principal amount. NAM and ANN pay a fixed installment of which interest
//! takes its share first; ANN recomputes the installment whenever the rate
//! resets.

use chrono::NaiveDateTime;
use std::collections::BTreeSet;

use super::annuity::annuity_amount;
use super::common::{self, dates, recurrence_dates};
use super::functions::{LoanRules, Step};
use super::maturity::{back_solve, AmortizationLeg};
use super::pam::loan_feature_events;
use super::StateMachine;
use crate::error::{ActusError, ObservationError};
use crate::events::{ContractEvent, EventFunction, EventType};
use crate::projection::StateSpace;
use crate::terms::{AmortizerTerms, CommonTerms, ContractType, InterestCalculationBase};
use crate::time::Period;

impl AmortizerTerms {
    fn kind(&self) -> ContractType {
        self.common.contract_type
    }

    fn rules(&self) -> LoanRules<'_> {
        LoanRules::new(&self.loan).with_base(&self.interest_base)
    }

    fn redemption_anchor(&self) -> Result<NaiveDateTime, ActusError> {
        self.principal_redemption
            .anchor
            .ok_or_else(|| ActusError::missing(&self.common.contract_id, "cycleAnchorDateOfPrincipalRedemption"))
    }

    /// Redemption dates, maturity excluded
    fn redemption_dates(&self, maturity: NaiveDateTime) -> Result<BTreeSet<NaiveDateTime>, ActusError> {
        recurrence_dates(&self.common, &self.principal_redemption, maturity, false)
    }

    /// Interest dates. Without an interest cycle interest is paid with each
    /// redemption. For NAM and ANN an interest cycle that differs from the
    /// redemption cycle only runs until the period before the first
    /// redemption; from there interest follows the redemptions.
    fn interest_dates(&self, maturity: NaiveDateTime) -> Result<BTreeSet<NaiveDateTime>, ActusError> {
        let payment = &self.loan.interest.payment;
        let ied = self.loan.initial_exchange_date;
        let mut out = if !payment.is_defined() {
            let mut d = self.redemption_dates(maturity)?;
            d.insert(maturity);
            d
        } else if self.kind() == ContractType::LAM || *payment == self.principal_redemption {
            recurrence_dates(&self.common, payment, maturity, true)?
        } else {
            let anchor = self.redemption_anchor()?;
            let step = self.principal_redemption.cycle.map(|c| c.period);
            let boundary = match step {
                Some(p) => p.sub_from(anchor).map_err(|e| ActusError::schedule(&self.common.contract_id, e))?,
                None => anchor,
            };
            let mut d = recurrence_dates(&self.common, payment, boundary, false)?;
            d.extend(dates(
                &self.common,
                boundary,
                maturity,
                self.principal_redemption.cycle.as_ref(),
                true,
            )?);
            d
        };
        out.retain(|t| *t > ied);
        Ok(out)
    }

    /// Installment net of one cycle of interest on the initial notional
    fn net_installment(&self, installment: f64, anchor: NaiveDateTime) -> Result<f64, ActusError> {
        if self.kind() == ContractType::LAM {
            return Ok(installment);
        }
        let Some(cycle) = &self.principal_redemption.cycle else {
            return Ok(installment);
        };
        let conventions = &self.common.conventions;
        let next = cycle
            .period
            .add_to(anchor)
            .map_err(|e| ActusError::schedule(&self.common.contract_id, e))?;
        let from = conventions.business_day.shift_calc_time(anchor);
        let to = conventions.business_day.shift_calc_time(next);
        Ok(installment
            - self.loan.notional_principal
                * self.loan.interest.nominal_interest_rate
                * conventions.day_counter.fraction(from, to))
    }

    /// Redemption dates still ahead of `start`, plus maturity
    fn remaining_dates(&self, start: NaiveDateTime, maturity: NaiveDateTime) -> Result<Vec<NaiveDateTime>, ActusError> {
        let mut d: Vec<_> = self.redemption_dates(maturity)?.into_iter().filter(|t| *t > start).collect();
        d.push(maturity);
        Ok(d)
    }

    /// Installment that amortizes the outstanding balance by maturity
    fn annuity_for(
        &self,
        start: NaiveDateTime,
        maturity: NaiveDateTime,
        notional: f64,
        accrued: f64,
        rate: f64,
    ) -> Result<f64, ActusError> {
        let remaining = self.remaining_dates(start, maturity)?;
        Ok(annuity_amount(&self.common, start, &remaining, notional, accrued, rate))
    }

    fn redeem(&self, rules: &LoanRules<'_>, step: &Step<'_>, state: &mut StateSpace) -> f64 {
        rules.accrue(step, state);
        let amount = match self.kind() {
            ContractType::LAM => {
                step.role_sign()
                    * state
                        .next_principal_redemption_payment
                        .abs()
                        .min(state.notional_principal.abs())
            }
            _ => {
                let net = state.next_principal_redemption_payment - state.accrued_interest;
                if net.abs() > state.notional_principal.abs() && net.signum() == state.notional_principal.signum() {
                    state.notional_principal
                } else {
                    net
                }
            }
        };
        state.notional_principal -= amount;
        rules.sync_base(state);
        state.notional_scaling_multiplier * amount
    }

    /// Recompute the annuity installment on the outstanding balance
    fn refix_installment(&self, rules: &LoanRules<'_>, step: &Step<'_>, state: &mut StateSpace) {
        rules.accrue(step, state);
        let Some(maturity) = state.maturity_date else {
            return;
        };
        let remaining: Vec<_> = match self.remaining_dates(step.time(), maturity) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("{}: installment not refixed: {}", self.common.contract_id, e);
                return;
            }
        };
        let amount = annuity_amount(
            step.common,
            step.time(),
            &remaining,
            state.notional_principal.abs(),
            state.accrued_interest.abs(),
            state.nominal_interest_rate,
        );
        state.next_principal_redemption_payment = step.role_sign() * amount;
    }
}

impl StateMachine for AmortizerTerms {
    fn common(&self) -> &CommonTerms {
        &self.common
    }

    fn maturity(&self) -> Result<Option<NaiveDateTime>, ActusError> {
        if let Some(stated) = self.amortization_date.or(self.maturity_date) {
            return Ok(Some(stated));
        }
        let installment = self
            .next_principal_redemption_payment
            .ok_or_else(|| ActusError::missing(&self.common.contract_id, "maturityDate"))?;
        let anchor = self.redemption_anchor()?;
        let leg = AmortizationLeg::decreasing(
            anchor,
            self.principal_redemption.cycle,
            self.net_installment(installment, anchor)?,
        );
        back_solve(
            &[leg],
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
        let mut events = vec![
            ContractEvent::shifted(self.loan.initial_exchange_date, EventType::IED, &self.common),
            ContractEvent::shifted(md, EventType::MD, &self.common),
        ];
        events.extend(common::events_at(&self.redemption_dates(md)?, EventType::PR, &self.common));
        let features = loan_feature_events(&self.common, &self.loan, &self.interest_dates(md)?, md)?;

        if self.kind() == ContractType::ANN {
            let unfixed = self.principal_redemption.anchor.filter(|_| self.next_principal_redemption_payment.is_none());
            if let Some(anchor) = unfixed {
                let eve = Period::days(1)
                    .sub_from(anchor)
                    .map_err(|e| ActusError::schedule(&self.common.contract_id, e))?;
                if eve >= self.loan.initial_exchange_date {
                    events.push(ContractEvent::shifted(eve, EventType::PRF, &self.common));
                }
            }
            let refixes: Vec<_> = features
                .iter()
                .filter(|e| matches!(e.event_type, EventType::RR | EventType::RRF))
                .map(|e| ContractEvent::shifted(e.schedule_time, EventType::PRF, &self.common))
                .collect();
            events.extend(refixes);
        }
        events.extend(features);

        if self.interest_base.base == InterestCalculationBase::NTL {
            events.extend(common::events_at(
                &recurrence_dates(&self.common, &self.interest_base.recurrence, md, false)?,
                EventType::IPCB,
                &self.common,
            ));
        }
        Ok(events)
    }

    fn init_state(&self, maturity: Option<NaiveDateTime>) -> Result<StateSpace, ActusError> {
        let md = common::end_date(&self.common, maturity, None)?;
        let mut state = self.rules().init_state(&self.common, maturity, &self.interest_dates(md)?);
        let r = self.common.role_sign();
        let start = self.common.status_date.max(self.loan.initial_exchange_date);

        let installment = match (self.next_principal_redemption_payment, self.kind()) {
            (Some(given), _) => given,
            (None, ContractType::ANN) => self.annuity_for(
                start,
                md,
                self.loan.notional_principal,
                state.accrued_interest.abs(),
                self.loan.interest.nominal_interest_rate,
            )?,
            (None, _) => {
                let periods = self.remaining_dates(start, md)?.len().max(1);
                self.loan.notional_principal / periods as f64
            }
        };
        state.next_principal_redemption_payment = r * installment;
        Ok(state)
    }

    fn transition(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError> {
        let rules = self.rules();
        match step.event.event_type {
            EventType::PR if !matches!(step.event.function, EventFunction::Callout(_)) => {
                Ok(self.redeem(&rules, step, state))
            }
            EventType::PRF => {
                self.refix_installment(&rules, step, state);
                Ok(0.0)
            }
            _ => rules.evaluate(step, state).unwrap_or_else(|| {
                rules.accrue(step, state);
                Ok(0.0)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::contracts::ContractAlgorithm;
    use crate::error::{ActusError, ScheduleError};
    use crate::events::{is_ordered, EventType};
    use crate::risk::{MarketModel, TimeSeries};
    use crate::terms::{Contract, RawTerms};
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn terms(kind: &str) -> serde_json::Value {
        json!({
            "contractType": kind,
            "contractID": "amort01",
            "statusDate": "2025-01-01",
            "contractRole": "RPA",
            "currency": "USD",
            "dayCountConvention": "30E360",
            "initialExchangeDate": "2025-01-01",
            "notionalPrincipal": 1000,
            "nominalInterestRate": 0.08,
            "cycleOfPrincipalRedemption": "P3ML1"
        })
    }

    fn contract(value: serde_json::Value) -> Contract {
        serde_json::from_value::<RawTerms>(value).unwrap().to_contract().unwrap()
    }

    fn payoffs(events: &[crate::events::ContractEvent], kind: EventType) -> Vec<f64> {
        events.iter().filter(|e| e.event_type == kind).map(|e| e.payoff).collect()
    }

    #[test]
    fn test_lam_back_solves_maturity() {
        let mut t = terms("LAM");
        t["nextPrincipalRedemptionPayment"] = json!(250);
        t["cycleOfInterestPayment"] = json!("P3ML1");
        let result = contract(t).simulate(None, &MarketModel::new()).unwrap();
        let last = result.events.last().unwrap();
        assert_eq!((last.event_time, last.event_type), (dt(2026, 1, 1), EventType::MD));
        assert_relative_eq!(last.payoff, 250.0, epsilon = 1e-9);

        let redemptions = payoffs(&result.events, EventType::PR);
        assert_eq!(redemptions.len(), 3);
        assert!(redemptions.iter().all(|p| (p - 250.0).abs() < 1e-9));

        // interest on the declining balance
        let interest = payoffs(&result.events, EventType::IP);
        assert_relative_eq!(interest[0], 1000.0 * 0.02, epsilon = 1e-9);
        assert_relative_eq!(interest[1], 750.0 * 0.02, epsilon = 1e-9);
        assert_relative_eq!(interest[3], 250.0 * 0.02, epsilon = 1e-9);
    }

    #[test]
    fn test_lam_splits_notional_without_amount() {
        let mut t = terms("LAM");
        t["maturityDate"] = json!("2026-01-01");
        let result = contract(t).simulate(None, &MarketModel::new()).unwrap();
        let redemptions = payoffs(&result.events, EventType::PR);
        assert!(redemptions.iter().all(|p| (p - 250.0).abs() < 1e-9));
        assert_relative_eq!(result.events.last().unwrap().payoff, 250.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nam_installment_covers_interest_first() {
        let mut t = terms("NAM");
        t["nextPrincipalRedemptionPayment"] = json!(300);
        let result = contract(t).simulate(None, &MarketModel::new()).unwrap();
        assert_eq!(result.events.last().unwrap().event_time, dt(2026, 1, 1));

        let redemptions = payoffs(&result.events, EventType::PR);
        assert_relative_eq!(redemptions[0], 280.0, epsilon = 1e-9);
        assert_relative_eq!(redemptions[1], 285.6, epsilon = 1e-9);
        assert_relative_eq!(redemptions[2], 291.312, epsilon = 1e-9);
        assert_relative_eq!(result.events.last().unwrap().payoff, 143.088, epsilon = 1e-9);
    }

    #[test]
    fn test_nam_interest_realigns_to_redemptions() {
        let mut t = terms("NAM");
        t["nextPrincipalRedemptionPayment"] = json!(300);
        t["cycleOfInterestPayment"] = json!("P1ML1");
        let schedule = contract(t).schedule(None).unwrap();
        let interest: Vec<_> = schedule
            .iter()
            .filter(|e| e.event_type == EventType::IP)
            .map(|e| e.event_time)
            .collect();
        assert_eq!(interest, vec![dt(2025, 4, 1), dt(2025, 7, 1), dt(2025, 10, 1), dt(2026, 1, 1)]);
    }

    #[test]
    fn test_ann_level_installment() {
        let mut t = terms("ANN");
        t["maturityDate"] = json!("2026-01-01");
        let result = contract(t).simulate(None, &MarketModel::new()).unwrap();
        let installment = 1000.0 * 0.02 / (1.0 - 1.02f64.powi(-4));

        let on = |date: NaiveDateTime| -> f64 {
            result
                .events
                .iter()
                .filter(|e| e.event_time == date && e.event_type != EventType::IED)
                .map(|e| e.payoff)
                .sum()
        };
        for date in [dt(2025, 4, 1), dt(2025, 7, 1), dt(2025, 10, 1), dt(2026, 1, 1)] {
            assert_relative_eq!(on(date), installment, epsilon = 1e-6);
        }
        assert_relative_eq!(result.state.notional_principal, 0.0);
    }

    #[test]
    fn test_ann_refixes_after_rate_reset() {
        let mut t = terms("ANN");
        t["maturityDate"] = json!("2026-01-01");
        t["cycleAnchorDateOfRateReset"] = json!("2025-07-01");
        t["cycleOfRateReset"] = json!("P1YL1");
        t["marketObjectCodeOfRateReset"] = json!("SOFR");
        let market = MarketModel::new().with_series("SOFR", TimeSeries::from_points([(dt(2025, 1, 1), 0.04)]));
        let result = contract(t).simulate(None, &market).unwrap();
        assert!(is_ordered(&result.events));

        let refixes: Vec<_> = result.events.iter().filter(|e| e.event_type == EventType::PRF).collect();
        assert_eq!(refixes.len(), 2);
        let refix = refixes[1];
        assert_eq!(refix.event_time, dt(2025, 7, 1));
        let state = refix.state.as_ref().unwrap();
        let balance = state.notional_principal;
        // two remaining quarters at 1%
        let expected = balance * 1.01 * 1.01 / (1.0 + 1.01);
        assert_relative_eq!(state.next_principal_redemption_payment, expected, epsilon = 1e-9);
        assert_relative_eq!(result.state.notional_principal, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ann_fixes_installment_before_first_redemption() {
        let mut t = terms("ANN");
        t["maturityDate"] = json!("2026-01-01");
        t["cycleAnchorDateOfPrincipalRedemption"] = json!("2025-04-01");
        t["cycleOfPrincipalRedemption"] = json!("P1ML1");
        let c = contract(t);

        let schedule = c.schedule(None).unwrap();
        let refixes: Vec<_> = schedule
            .iter()
            .filter(|e| e.event_type == EventType::PRF)
            .map(|e| e.event_time)
            .collect();
        assert_eq!(refixes, vec![dt(2025, 3, 31)]);

        let result = c.simulate(None, &MarketModel::new()).unwrap();
        assert!(is_ordered(&result.events));
        let refix = result.events.iter().find(|e| e.event_type == EventType::PRF).unwrap();
        let installment = refix.state.as_ref().unwrap().next_principal_redemption_payment;
        assert!(installment > 0.0);

        let mut paid = 0;
        for date in result.events.iter().filter(|e| e.event_type == EventType::IP).map(|e| e.event_time) {
            let total: f64 = result
                .events
                .iter()
                .filter(|e| e.event_time == date && e.event_type != EventType::PRF)
                .map(|e| e.payoff)
                .sum();
            assert_relative_eq!(total, installment, epsilon = 1e-6);
            paid += 1;
        }
        assert_eq!(paid, 10);
        assert_relative_eq!(result.state.notional_principal, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_lam_unreachable_maturity_is_a_schedule_error() {
        let mut t = terms("LAM");
        t["nextPrincipalRedemptionPayment"] = json!(0.01);
        t["notionalPrincipal"] = json!(1e9);
        t["cycleOfPrincipalRedemption"] = json!("P1ML1");
        let err = contract(t).schedule(Some(dt(2026, 1, 1))).unwrap_err();
        assert!(matches!(
            err,
            ActusError::Schedule { source: ScheduleError::OutOfRange(_), .. }
        ));

        let mut t = terms("LAM");
        t["nextPrincipalRedemptionPayment"] = json!(100);
        t["cycleOfPrincipalRedemption"] = json!("P100000Y");
        t["cycleAnchorDateOfPrincipalRedemption"] = json!("2025-04-01");
        assert!(matches!(
            contract(t).schedule(Some(dt(2026, 1, 1))),
            Err(ActusError::Schedule { .. })
        ));
    }

    #[test]
    fn test_payer_redemptions_are_negative() {
        let mut t = terms("LAM");
        t["contractRole"] = json!("RPL");
        t["nextPrincipalRedemptionPayment"] = json!(250);
        t["statusDate"] = json!("2025-05-01");
        let result = contract(t).simulate(None, &MarketModel::new()).unwrap();
        assert!(result.events.iter().all(|e| e.event_time >= dt(2025, 5, 1)));
        assert!(payoffs(&result.events, EventType::PR).iter().all(|p| *p < 0.0));
        assert!(result.events.last().unwrap().payoff < 0.0);
    }
}
