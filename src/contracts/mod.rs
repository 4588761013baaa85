//! Contract type state machines
//!
//! Every kind follows the same two phases. `schedule` generates the raw
//! event list from the terms and a horizon; `apply` folds that list into a
//! state space, valuing each event and consulting the risk factor observer
//! where a payoff or transition depends on an external value.

mod amortizer;
mod annuity;
mod call_money;
mod common;
mod exotic;
mod functions;
pub mod maturity;
mod option;
mod pam;
mod stock;
mod swap;
mod switch;

use chrono::NaiveDateTime;

pub use maturity::{back_solve, AmortizationLeg};

use crate::error::{ActusError, ObservationError};
use crate::events::{sort_events, ContractEvent, EventFunction, EventType};
use crate::projection::StateSpace;
use crate::risk::{Callout, CalloutKind, ContractStart, RiskFactorObserver};
use crate::terms::{CommonTerms, Contract};
use functions::Step;

/// Evaluated events plus the state after the last one
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub events: Vec<ContractEvent>,
    pub state: StateSpace,
}

/// The schedule/apply capability every contract kind exposes
pub trait ContractAlgorithm {
    /// Ordered raw events up to `horizon`, or the full life when absent
    fn schedule(&self, horizon: Option<NaiveDateTime>) -> Result<Vec<ContractEvent>, ActusError>;

    /// Fold `events` (in any order) into the contract state
    fn apply(
        &self,
        events: Vec<ContractEvent>,
        observer: &dyn RiskFactorObserver,
    ) -> Result<Evaluation, ActusError>;

    /// Schedule and apply in one call
    fn simulate(
        &self,
        horizon: Option<NaiveDateTime>,
        observer: &dyn RiskFactorObserver,
    ) -> Result<Evaluation, ActusError>;
}

/// Per-kind behavior plugged into the shared schedule and apply pipeline
pub(crate) trait StateMachine {
    fn common(&self) -> &CommonTerms;

    /// Whether purchase and termination settle accrued interest
    fn interest_bearing(&self) -> bool {
        true
    }

    /// Stated or back-solved maturity
    fn maturity(&self) -> Result<Option<NaiveDateTime>, ActusError>;

    /// Raw events before purchase, termination and date cuts
    fn events(
        &self,
        maturity: Option<NaiveDateTime>,
        horizon: Option<NaiveDateTime>,
    ) -> Result<Vec<ContractEvent>, ActusError>;

    fn init_state(&self, maturity: Option<NaiveDateTime>) -> Result<StateSpace, ActusError>;

    /// Payoff of the event from the pre-event state, then the transition
    fn transition(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError>;

    /// Turn an observer callout into events. Returns false when the kind
    /// has no use for the callout.
    fn register_callout(&self, events: &mut Vec<ContractEvent>, callout: &Callout) -> bool {
        let common = self.common();
        let event_type = match callout.kind {
            CalloutKind::MultiplicativeReduction => EventType::PP,
            CalloutKind::AbsoluteFundedDelta => EventType::PR,
            CalloutKind::Exercise => return false,
        };
        events.push(
            ContractEvent::unshifted(callout.time, event_type, common)
                .with_function(EventFunction::Callout(callout.model_id.clone())),
        );
        true
    }
}

pub(crate) fn schedule_with(
    machine: &dyn StateMachine,
    horizon: Option<NaiveDateTime>,
) -> Result<Vec<ContractEvent>, ActusError> {
    let common = machine.common();
    let maturity = machine.maturity()?;
    let mut events = machine.events(maturity, horizon)?;
    events.extend(common::purchase_events(common, machine.interest_bearing()));
    let events = common::finalize(events, common, horizon, machine.interest_bearing());
    log::debug!("{}: scheduled {} events", common.contract_id, events.len());
    Ok(events)
}

pub(crate) fn apply_with(
    machine: &dyn StateMachine,
    mut events: Vec<ContractEvent>,
    observer: &dyn RiskFactorObserver,
    start: &ContractStart,
    horizon: Option<NaiveDateTime>,
) -> Result<Evaluation, ActusError> {
    let common = machine.common();
    let maturity = machine.maturity()?;

    let callouts = observer
        .on_contract_start(start)
        .map_err(|e| ActusError::from_observation(e, &common.contract_id, EventType::AD, common.status_date))?;
    if !callouts.is_empty() {
        let upper = match (maturity, horizon) {
            (Some(m), Some(h)) => Some(m.min(h)),
            (m, h) => m.or(h).or_else(|| events.iter().map(|e| e.event_time).max()),
        };
        for callout in &callouts {
            if !callout_in_window(callout, common, start, upper) {
                log::trace!("{}: ignoring callout {:?} outside the contract window", common.contract_id, callout);
                continue;
            }
            if machine.register_callout(&mut events, callout) {
                log::debug!(
                    "{}: registered {:?} callout from {} at {}",
                    common.contract_id,
                    callout.kind,
                    callout.model_id,
                    callout.time
                );
            }
        }
    }

    sort_events(&mut events);
    let mut state = machine.init_state(maturity)?;
    for event in events.iter_mut() {
        let payoff = {
            let step = Step {
                event: &*event,
                common,
                observer,
            };
            machine.transition(&step, &mut state).map_err(|e| {
                ActusError::from_observation(e, &common.contract_id, event.event_type, event.event_time)
            })?
        };
        event.payoff = payoff;
        event.state = Some(state.clone());
    }

    common::truncate_at_purchase(&mut events, common);
    Ok(Evaluation { events, state })
}

fn callout_in_window(
    callout: &Callout,
    common: &CommonTerms,
    start: &ContractStart,
    upper: Option<NaiveDateTime>,
) -> bool {
    let t = callout.time;
    t >= common.status_date
        && start.initial_exchange_date.map_or(true, |ied| t >= ied)
        && upper.map_or(true, |u| t <= u)
        && common.termination.map_or(true, |td| t <= td.date)
}

impl Contract {
    fn machine(&self) -> &dyn StateMachine {
        match self {
            Contract::Pam(t) => t,
            Contract::Lam(t) | Contract::Nam(t) | Contract::Ann(t) => t,
            Contract::Clm(t) | Contract::Ump(t) => t,
            Contract::Lax(t) => t,
            Contract::Swppv(t) => t,
            Contract::Optns(t) => t,
            Contract::Stk(t) => t,
            Contract::Bcs(t) => t,
        }
    }

    /// Snapshot handed to observers when evaluation starts
    pub fn contract_start(&self) -> ContractStart {
        if let Contract::Bcs(terms) = self {
            return terms.start();
        }
        let common = self.common();
        ContractStart {
            contract_id: common.contract_id.clone(),
            contract_type: common.contract_type,
            status_date: common.status_date,
            initial_exchange_date: self.initial_exchange_date(),
            maturity_date: self.machine().maturity().ok().flatten(),
            notional_principal: self.notional_principal(),
            referenced_models: common.behavior_models().cloned().collect(),
        }
    }

    fn apply_within(
        &self,
        events: Vec<ContractEvent>,
        observer: &dyn RiskFactorObserver,
        horizon: Option<NaiveDateTime>,
    ) -> Result<Evaluation, ActusError> {
        match self {
            Contract::Bcs(terms) => switch::apply(terms, events, observer, horizon),
            _ => apply_with(self.machine(), events, observer, &self.contract_start(), horizon),
        }
    }
}

impl ContractAlgorithm for Contract {
    fn schedule(&self, horizon: Option<NaiveDateTime>) -> Result<Vec<ContractEvent>, ActusError> {
        schedule_with(self.machine(), horizon)
    }

    fn apply(
        &self,
        events: Vec<ContractEvent>,
        observer: &dyn RiskFactorObserver,
    ) -> Result<Evaluation, ActusError> {
        self.apply_within(events, observer, None)
    }

    fn simulate(
        &self,
        horizon: Option<NaiveDateTime>,
        observer: &dyn RiskFactorObserver,
    ) -> Result<Evaluation, ActusError> {
        let events = self.schedule(horizon)?;
        self.apply_within(events, observer, horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{MarketModel, TimeSeries};
    use crate::terms::RawTerms;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use serde_json::json;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn contract(value: serde_json::Value) -> Contract {
        serde_json::from_value::<RawTerms>(value).unwrap().to_contract().unwrap()
    }

    fn market() -> MarketModel {
        MarketModel::new().with_series("SOFR", TimeSeries::from_points([(dt(2025, 1, 1), 0.04)]))
    }

    /// One contract of each family, some with a status date mid-life
    fn portfolio() -> Vec<Contract> {
        let base = |kind: &str, role: &str, status: &str| {
            json!({
                "contractType": kind,
                "contractID": format!("{}-{}", kind, role),
                "statusDate": status,
                "contractRole": role,
                "currency": "USD",
                "dayCountConvention": "30E360",
                "initialExchangeDate": "2025-01-01",
                "notionalPrincipal": 1000,
                "nominalInterestRate": 0.05
            })
        };

        let mut pam = base("PAM", "RPL", "2025-03-15");
        pam["maturityDate"] = json!("2026-01-01");
        pam["cycleOfInterestPayment"] = json!("P3ML1");
        pam["cycleOfRateReset"] = json!("P6ML1");
        pam["marketObjectCodeOfRateReset"] = json!("SOFR");

        let mut lam = base("LAM", "RPA", "2025-01-01");
        lam["cycleOfPrincipalRedemption"] = json!("P3ML1");
        lam["nextPrincipalRedemptionPayment"] = json!(250);

        let mut nam = base("NAM", "RPL", "2025-05-01");
        nam["cycleOfPrincipalRedemption"] = json!("P3ML1");
        nam["nextPrincipalRedemptionPayment"] = json!(300);

        let mut ann = base("ANN", "RPA", "2025-01-01");
        ann["cycleOfPrincipalRedemption"] = json!("P3ML1");
        ann["maturityDate"] = json!("2026-01-01");

        let mut clm = base("CLM", "RPL", "2025-01-01");
        clm["maturityDate"] = json!("2026-01-01");
        clm["cycleOfInterestPayment"] = json!("P6ML1");

        let mut swap = base("SWPPV", "PFL", "2025-01-01");
        swap["maturityDate"] = json!("2026-01-01");
        swap["nominalInterestRate2"] = json!(0.03);
        swap["cycleOfInterestPayment"] = json!("P6ML1");
        swap["cycleOfRateReset"] = json!("P6ML1");
        swap["marketObjectCodeOfRateReset"] = json!("SOFR");
        swap["deliverySettlement"] = json!("D");

        let stk = json!({
            "contractType": "STK",
            "contractID": "STK-RPL",
            "statusDate": "2025-01-01",
            "contractRole": "RPL",
            "currency": "USD",
            "dayCountConvention": "AA",
            "quantity": 5,
            "cycleAnchorDateOfDividendPayment": "2025-06-30",
            "cycleOfDividendPayment": "P6ML1",
            "nextDividendPaymentAmount": 1.0,
            "terminationDate": "2026-06-30",
            "priceAtTerminationDate": 50
        });

        [pam, lam, nam, ann, clm, swap, stk].into_iter().map(contract).collect()
    }

    #[test]
    fn test_schedule_is_deterministic() {
        for c in portfolio() {
            let first = c.schedule(None).unwrap();
            let second = c.schedule(None).unwrap();
            assert!(!first.is_empty(), "{}", c.contract_id());
            assert_eq!(first, second, "{}", c.contract_id());
        }
    }

    #[test]
    fn test_events_are_ordered() {
        for c in portfolio() {
            assert!(crate::events::is_ordered(&c.schedule(None).unwrap()), "{}", c.contract_id());
            let result = c.simulate(None, &market()).unwrap();
            assert!(crate::events::is_ordered(&result.events), "{}", c.contract_id());
        }
    }

    #[test]
    fn test_no_event_before_status_date() {
        for c in portfolio() {
            let status = c.common().status_date;
            let result = c.simulate(None, &market()).unwrap();
            assert!(result.events.iter().all(|e| e.event_time >= status), "{}", c.contract_id());
        }
    }

    #[test]
    fn test_notional_keeps_role_sign() {
        for c in portfolio() {
            let sign = c.common().role_sign();
            let result = c.simulate(None, &market()).unwrap();
            for event in &result.events {
                let notional = event.notional().unwrap();
                assert!(
                    sign * notional >= -1e-9,
                    "{} {:?} at {}: notional {}",
                    c.contract_id(),
                    event.event_type,
                    event.event_time,
                    notional
                );
            }
        }
    }

    #[test]
    fn test_apply_sorts_its_input() {
        for c in portfolio() {
            let mut events = c.schedule(None).unwrap();
            events.reverse();
            let applied = c.apply(events, &market()).unwrap();
            let simulated = c.simulate(None, &market()).unwrap();
            assert_eq!(applied.events, simulated.events, "{}", c.contract_id());
        }
    }

    /// Prepays 10% at mid-year, plus one callout after maturity
    struct Prepayment;

    impl RiskFactorObserver for Prepayment {
        fn observe(&self, id: &str, _time: NaiveDateTime, _state: &StateSpace) -> Result<f64, ObservationError> {
            match id {
                "PPM" => Ok(0.1),
                other => Err(ObservationError::NotFound {
                    id: other.to_string(),
                    available: vec!["PPM".to_string()],
                }),
            }
        }

        fn on_contract_start(&self, _contract: &ContractStart) -> Result<Vec<Callout>, ObservationError> {
            Ok([dt(2025, 7, 1), dt(2027, 1, 1)]
                .into_iter()
                .map(|time| Callout {
                    model_id: "PPM".to_string(),
                    time,
                    kind: CalloutKind::MultiplicativeReduction,
                })
                .collect())
        }
    }

    #[test]
    fn test_prepayment_callout_reduces_notional() {
        let pam = contract(json!({
            "contractType": "PAM",
            "contractID": "pam01",
            "statusDate": "2025-01-01",
            "contractRole": "RPA",
            "currency": "USD",
            "dayCountConvention": "30E360",
            "initialExchangeDate": "2025-01-01",
            "maturityDate": "2026-01-01",
            "notionalPrincipal": 1000,
            "nominalInterestRate": 0.05
        }));
        let result = pam.simulate(None, &Prepayment).unwrap();
        let prepayments: Vec<_> = result.events.iter().filter(|e| e.event_type == EventType::PP).collect();
        assert_eq!(prepayments.len(), 1);
        assert_eq!(prepayments[0].function, EventFunction::Callout("PPM".to_string()));
        assert_relative_eq!(prepayments[0].payoff, 100.0, epsilon = 1e-9);

        let interest = result.events.iter().find(|e| e.event_type == EventType::IP).unwrap();
        assert_relative_eq!(interest.payoff, 1000.0 * 0.025 + 900.0 * 0.025, epsilon = 1e-9);
        let maturity = result.events.last().unwrap();
        assert_eq!(maturity.event_type, EventType::MD);
        assert_relative_eq!(maturity.payoff, 900.0, epsilon = 1e-9);
    }
}
