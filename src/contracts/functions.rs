//! Payoff and state-transition functions shared by the loan kinds
//!
//! Each function computes the payoff from the pre-event state and then
//! advances the state. Notional, accrued interest and the interest
//! calculation base carry the role sign set at initialization, so payoffs
//! derived from them need no further sign.

use chrono::NaiveDateTime;
use std::collections::BTreeSet;

use crate::error::ObservationError;
use crate::events::{ContractEvent, EventFunction, EventType};
use crate::projection::StateSpace;
use crate::risk::RiskFactorObserver;
use crate::terms::{
    CommonTerms, FeeBasis, FeeTerms, InterestBaseTerms, InterestCalculationBase, LoanTerms, RateResetTerms,
    ScalingTerms,
};

/// One event being evaluated, with what its functions may read
pub(crate) struct Step<'a> {
    pub event: &'a ContractEvent,
    pub common: &'a CommonTerms,
    pub observer: &'a dyn RiskFactorObserver,
}

impl Step<'_> {
    /// Unadjusted schedule time; becomes the new status date
    pub fn time(&self) -> NaiveDateTime {
        self.event.schedule_time
    }

    pub fn role_sign(&self) -> f64 {
        self.common.role_sign()
    }

    /// Day-count fraction from the state's status date to this event
    pub fn year_fraction(&self, state: &StateSpace) -> f64 {
        let conventions = &self.common.conventions;
        let from = conventions.business_day.shift_calc_time(state.status_date);
        let to = self.event.calc_time;
        if to <= from {
            0.0
        } else {
            conventions.day_counter.fraction(from, to)
        }
    }

    pub fn observe(&self, id: &str, time: NaiveDateTime, state: &StateSpace) -> Result<f64, ObservationError> {
        self.observer.observe(id, time, state)
    }
}

/// Market object code that the terms must carry for an event to be evaluated
pub(crate) fn required_code<'c>(code: &'c Option<String>, attribute: &str) -> Result<&'c str, ObservationError> {
    code.as_deref().ok_or_else(|| ObservationError::Model {
        id: attribute.to_string(),
        reason: "no market object code given".to_string(),
    })
}

/// Accrue interest (both legs) and fees up to the event, then move the
/// status date
pub(crate) fn accrue(step: &Step<'_>, state: &mut StateSpace, fee: Option<&FeeTerms>) {
    let y = step.year_fraction(state);
    state.accrued_interest += y * state.nominal_interest_rate * state.interest_calculation_base_amount;
    state.accrued_interest2 += y * state.nominal_interest_rate2 * state.interest_calculation_base_amount;
    if let Some(fee) = fee {
        if fee.basis == FeeBasis::N {
            state.fee_accrued += y * fee.rate * state.notional_principal;
        }
    }
    state.status_date = step.time();
}

/// Interest due at the event: accrued plus the running period
pub(crate) fn interest_due(step: &Step<'_>, state: &StateSpace) -> f64 {
    state.accrued_interest
        + step.year_fraction(state) * state.nominal_interest_rate * state.interest_calculation_base_amount
}

/// Rules every interest-bearing loan kind shares
pub(crate) struct LoanRules<'a> {
    pub loan: &'a LoanTerms,
    pub base: InterestCalculationBase,
    /// Fixed interest base for NTIED/NTL, unsigned
    pub base_amount: Option<f64>,
}

impl<'a> LoanRules<'a> {
    /// Interest accrues on the notional
    pub fn new(loan: &'a LoanTerms) -> Self {
        Self {
            loan,
            base: InterestCalculationBase::NT,
            base_amount: None,
        }
    }

    pub fn with_base(mut self, terms: &InterestBaseTerms) -> Self {
        self.base = terms.base;
        self.base_amount = terms.amount;
        self
    }

    fn fee(&self) -> Option<&FeeTerms> {
        Some(&self.loan.fee)
    }

    /// State at the status date. Before initial exchange only the
    /// multipliers are set; afterwards the balances are role-signed and
    /// missing accrued interest runs from the last interest date.
    pub fn init_state(
        &self,
        common: &CommonTerms,
        maturity: Option<NaiveDateTime>,
        interest_dates: &BTreeSet<NaiveDateTime>,
    ) -> StateSpace {
        let loan = self.loan;
        let mut state = StateSpace::new(common.status_date);
        state.maturity_date = maturity;
        state.contract_performance = common.contract_performance;
        state.notional_scaling_multiplier = loan.scaling.notional_multiplier;
        state.interest_scaling_multiplier = loan.scaling.interest_multiplier;
        if loan.initial_exchange_date > common.status_date {
            return state;
        }

        let r = common.role_sign();
        state.notional_principal = r * loan.notional_principal;
        state.nominal_interest_rate = loan.interest.nominal_interest_rate;
        state.interest_calculation_base_amount = match self.base {
            InterestCalculationBase::NT => state.notional_principal,
            _ => r * self.base_amount.unwrap_or(loan.notional_principal),
        };
        let live = maturity.map_or(true, |m| common.status_date < m);
        state.accrued_interest = match loan.interest.accrued_interest {
            Some(accrued) => r * accrued,
            None if live => {
                let last = interest_dates
                    .range(..common.status_date)
                    .next_back()
                    .copied()
                    .map_or(loan.initial_exchange_date, |d| d.max(loan.initial_exchange_date));
                let adjuster = &common.conventions.business_day;
                let from = adjuster.shift_calc_time(last);
                let to = adjuster.shift_calc_time(common.status_date);
                if to > from {
                    common.conventions.day_counter.fraction(from, to)
                        * state.nominal_interest_rate
                        * state.interest_calculation_base_amount
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        state.fee_accrued = r * loan.fee.accrued;
        state
    }

    /// Keep the interest base on the notional when the base tracks it
    pub fn sync_base(&self, state: &mut StateSpace) {
        if self.base == InterestCalculationBase::NT {
            state.interest_calculation_base_amount = state.notional_principal;
        }
    }

    pub fn accrue(&self, step: &Step<'_>, state: &mut StateSpace) {
        accrue(step, state, self.fee());
    }

    /// Dispatch on event type. `None` marks a type the loan rules do not own.
    pub fn evaluate(&self, step: &Step<'_>, state: &mut StateSpace) -> Option<Result<f64, ObservationError>> {
        let payoff = match step.event.event_type {
            EventType::AD | EventType::CE => {
                self.accrue(step, state);
                Ok(0.0)
            }
            EventType::IED => Ok(self.initial_exchange(step, state)),
            EventType::IP => Ok(self.interest_payment(step, state)),
            EventType::IPCI => Ok(self.capitalize(step, state)),
            EventType::RR | EventType::RRF => self.rate_reset(step, state, &self.loan.rate_reset),
            EventType::FP => Ok(self.fee_payment(step, state)),
            EventType::SC => self.scale(step, state, &self.loan.scaling),
            EventType::IPCB => {
                self.accrue(step, state);
                state.interest_calculation_base_amount = state.notional_principal;
                Ok(0.0)
            }
            EventType::PP => self.prepayment(step, state),
            EventType::PR if matches!(step.event.function, EventFunction::Callout(_)) => {
                self.funded_delta(step, state)
            }
            EventType::PRD => Ok(self.purchase(step, state)),
            EventType::TD => Ok(self.terminate(step, state)),
            EventType::MD => Ok(self.mature(step, state)),
            _ => return None,
        };
        Some(payoff)
    }

    pub fn initial_exchange(&self, step: &Step<'_>, state: &mut StateSpace) -> f64 {
        let r = step.role_sign();
        let loan = self.loan;
        let payoff = -r * (loan.notional_principal + loan.premium_discount_at_ied);

        state.notional_principal = r * loan.notional_principal;
        state.nominal_interest_rate = loan.interest.nominal_interest_rate;
        state.interest_calculation_base_amount = match self.base {
            InterestCalculationBase::NT => state.notional_principal,
            _ => r * self.base_amount.unwrap_or(loan.notional_principal),
        };
        state.accrued_interest = match (loan.interest.accrued_interest, loan.interest.payment.anchor) {
            (Some(accrued), _) => r * accrued,
            (None, Some(anchor)) if anchor < step.time() => {
                let conventions = &step.common.conventions;
                conventions.day_counter.fraction(
                    conventions.business_day.shift_calc_time(anchor),
                    step.event.calc_time,
                ) * state.nominal_interest_rate
                    * state.interest_calculation_base_amount
            }
            _ => 0.0,
        };
        state.status_date = step.time();
        payoff
    }

    /// Interest paid out. At a purchase the buyer pays the accrued amount
    /// and keeps it in the state to collect with the next coupon.
    pub fn interest_payment(&self, step: &Step<'_>, state: &mut StateSpace) -> f64 {
        let due = state.interest_scaling_multiplier * interest_due(step, state);
        self.accrue(step, state);
        match step.event.function {
            EventFunction::AccruedAtPurchase => -due,
            _ => {
                state.accrued_interest = 0.0;
                due
            }
        }
    }

    pub fn capitalize(&self, step: &Step<'_>, state: &mut StateSpace) -> f64 {
        self.accrue(step, state);
        state.notional_principal += state.accrued_interest;
        state.accrued_interest = 0.0;
        self.sync_base(state);
        0.0
    }

    /// Market-observed (RR) or fixed (RRF) reset of the nominal rate
    pub fn rate_reset(
        &self,
        step: &Step<'_>,
        state: &mut StateSpace,
        terms: &RateResetTerms,
    ) -> Result<f64, ObservationError> {
        let target = reset_target(step, state, terms, state.nominal_interest_rate)?;
        self.accrue(step, state);
        state.nominal_interest_rate = target;
        Ok(0.0)
    }

    pub fn fee_payment(&self, step: &Step<'_>, state: &mut StateSpace) -> f64 {
        let fee = &self.loan.fee;
        let payoff = match fee.basis {
            FeeBasis::A => step.role_sign() * fee.rate,
            FeeBasis::N => state.fee_accrued + step.year_fraction(state) * fee.rate * state.notional_principal,
        };
        self.accrue(step, state);
        state.fee_accrued = 0.0;
        payoff
    }

    pub fn scale(
        &self,
        step: &Step<'_>,
        state: &mut StateSpace,
        scaling: &ScalingTerms,
    ) -> Result<f64, ObservationError> {
        let code = required_code(&scaling.market_object_code, "marketObjectCodeOfScalingIndex")?;
        let index = step.observe(code, step.time(), state)?;
        self.accrue(step, state);
        let ratio = index / scaling.index_at_status_date;
        if scaling.effect.interest {
            state.interest_scaling_multiplier = ratio;
        }
        if scaling.effect.notional {
            state.notional_scaling_multiplier = ratio;
        }
        Ok(0.0)
    }

    /// Multiplicative notional reduction observed from a behavior model
    pub fn prepayment(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError> {
        let fraction = match &step.event.function {
            EventFunction::Callout(model) => step.observe(model, step.time(), state)?,
            _ => 0.0,
        };
        self.accrue(step, state);
        let amount = fraction * state.notional_principal;
        state.notional_principal -= amount;
        self.sync_base(state);
        Ok(state.notional_scaling_multiplier * amount)
    }

    /// Absolute notional change observed from a behavior model
    pub fn funded_delta(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError> {
        let delta = match &step.event.function {
            EventFunction::Callout(model) => step.observe(model, step.time(), state)?,
            _ => 0.0,
        };
        self.accrue(step, state);
        let r = step.role_sign();
        state.notional_principal += r * delta;
        self.sync_base(state);
        Ok(-r * delta)
    }

    pub fn purchase(&self, step: &Step<'_>, state: &mut StateSpace) -> f64 {
        let price = step.common.purchase.map_or(0.0, |p| p.price);
        self.accrue(step, state);
        -step.role_sign() * price
    }

    pub fn terminate(&self, step: &Step<'_>, state: &mut StateSpace) -> f64 {
        let price = step.common.termination.map_or(0.0, |t| t.price);
        self.accrue(step, state);
        clear(state);
        step.role_sign() * price
    }

    pub fn mature(&self, step: &Step<'_>, state: &mut StateSpace) -> f64 {
        let payoff = state.notional_scaling_multiplier * state.notional_principal;
        self.accrue(step, state);
        clear(state);
        payoff
    }
}

/// Zero the balances after maturity or termination
pub(crate) fn clear(state: &mut StateSpace) {
    state.notional_principal = 0.0;
    state.accrued_interest = 0.0;
    state.accrued_interest2 = 0.0;
    state.fee_accrued = 0.0;
    state.interest_calculation_base_amount = 0.0;
}

/// New rate after a reset event, bounded by caps and floors around `current`
pub(crate) fn reset_target(
    step: &Step<'_>,
    state: &StateSpace,
    terms: &RateResetTerms,
    current: f64,
) -> Result<f64, ObservationError> {
    match step.event.function {
        EventFunction::FixedRate(rate) => Ok(rate),
        ref function => {
            let spread = match function {
                EventFunction::VariableRate(spread) => *spread,
                _ => terms.spread,
            };
            let code = required_code(&terms.market_object_code, "marketObjectCodeOfRateReset")?;
            let fixing = terms.fixing_period.sub_from(step.time()).map_err(|e| ObservationError::Model {
                id: code.to_string(),
                reason: e.to_string(),
            })?;
            let observed = step.observe(code, fixing, state)?;
            Ok(terms.bound(current, terms.multiplier * observed + spread))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{MarketModel, TimeSeries};
    use crate::terms::RawTerms;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn pam() -> crate::terms::PamTerms {
        let raw: RawTerms = serde_json::from_value(serde_json::json!({
            "contractType": "PAM",
            "contractID": "f1",
            "statusDate": "2025-01-01",
            "contractRole": "RPA",
            "currency": "USD",
            "dayCountConvention": "A360",
            "initialExchangeDate": "2025-01-01",
            "maturityDate": "2026-01-01",
            "notionalPrincipal": 1000,
            "nominalInterestRate": 0.036,
            "cycleOfRateReset": "P6ML1",
            "marketObjectCodeOfRateReset": "SOFR",
            "periodCap": 0.01
        }))
        .unwrap();
        match raw.to_contract().unwrap() {
            crate::terms::Contract::Pam(t) => t,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_interest_accrues_on_signed_base() {
        let terms = pam();
        let market = MarketModel::new();
        let rules = LoanRules::new(&terms.loan);
        let mut state = StateSpace::new(dt(2025, 1, 1));

        let ied = ContractEvent::unshifted(dt(2025, 1, 1), EventType::IED, &terms.common);
        let step = Step { event: &ied, common: &terms.common, observer: &market };
        assert_relative_eq!(rules.initial_exchange(&step, &mut state), -1000.0);

        let ip = ContractEvent::unshifted(dt(2025, 7, 20), EventType::IP, &terms.common);
        let step = Step { event: &ip, common: &terms.common, observer: &market };
        // 200 days on A/360
        assert_relative_eq!(rules.interest_payment(&step, &mut state), 1000.0 * 0.036 * 200.0 / 360.0, epsilon = 1e-9);
        assert_relative_eq!(state.accrued_interest, 0.0);
        assert_eq!(state.status_date, dt(2025, 7, 20));
    }

    #[test]
    fn test_rate_reset_applies_period_cap() {
        let terms = pam();
        let market = MarketModel::new().with_series("SOFR", TimeSeries::from_points([(dt(2025, 1, 1), 0.09)]));
        let rules = LoanRules::new(&terms.loan);
        let mut state = StateSpace::new(dt(2025, 1, 1));
        state.nominal_interest_rate = 0.036;

        let rr = ContractEvent::unshifted(dt(2025, 7, 1), EventType::RR, &terms.common);
        let step = Step { event: &rr, common: &terms.common, observer: &market };
        rules.rate_reset(&step, &mut state, &terms.loan.rate_reset).unwrap();
        assert_relative_eq!(state.nominal_interest_rate, 0.046, epsilon = 1e-12);

        let rrf = rr.clone().with_function(EventFunction::FixedRate(0.02));
        let step = Step { event: &rrf, common: &terms.common, observer: &market };
        rules.rate_reset(&step, &mut state, &terms.loan.rate_reset).unwrap();
        assert_relative_eq!(state.nominal_interest_rate, 0.02);
    }

    #[test]
    fn test_missing_index_is_reported() {
        let terms = pam();
        let market = MarketModel::new();
        let rules = LoanRules::new(&terms.loan);
        let mut state = StateSpace::new(dt(2025, 1, 1));
        let rr = ContractEvent::unshifted(dt(2025, 7, 1), EventType::RR, &terms.common);
        let step = Step { event: &rr, common: &terms.common, observer: &market };
        let err = rules.rate_reset(&step, &mut state, &terms.loan.rate_reset).unwrap_err();
        assert_eq!(err.id(), "SOFR");
        assert_eq!(state.status_date, dt(2025, 1, 1));
    }
}
