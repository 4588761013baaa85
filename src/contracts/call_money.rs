//! Call money and undefined maturity profile

use chrono::NaiveDateTime;
use std::collections::BTreeSet;

use super::common::{self, recurrence_dates};
use super::functions::{LoanRules, Step};
use super::StateMachine;
use crate::error::{ActusError, ObservationError};
use crate::events::{ContractEvent, EventType};
use crate::projection::StateSpace;
use crate::terms::{CallMoneyTerms, CommonTerms, ContractType};

impl CallMoneyTerms {
    /// Capitalization dates before `end`
    fn capitalization_dates(&self, end: NaiveDateTime) -> Result<BTreeSet<NaiveDateTime>, ActusError> {
        let mut dates = recurrence_dates(&self.common, &self.loan.interest.payment, end, false)?;
        dates.retain(|t| *t > self.loan.initial_exchange_date);
        Ok(dates)
    }
}

impl StateMachine for CallMoneyTerms {
    fn common(&self) -> &CommonTerms {
        &self.common
    }

    fn maturity(&self) -> Result<Option<NaiveDateTime>, ActusError> {
        Ok(self.maturity_date)
    }

    fn events(
        &self,
        maturity: Option<NaiveDateTime>,
        horizon: Option<NaiveDateTime>,
    ) -> Result<Vec<ContractEvent>, ActusError> {
        let end = common::end_date(&self.common, maturity, horizon)?;
        let mut events = vec![ContractEvent::shifted(
            self.loan.initial_exchange_date,
            EventType::IED,
            &self.common,
        )];
        // interest capitalizes until it is paid out with the principal
        events.extend(common::events_at(&self.capitalization_dates(end)?, EventType::IPCI, &self.common));
        // call money without a maturity is called at the horizon
        let payout = match self.common.contract_type {
            ContractType::CLM => Some(end),
            _ => maturity,
        };
        if let Some(md) = payout {
            events.push(ContractEvent::shifted(md, EventType::IP, &self.common));
            events.push(ContractEvent::shifted(md, EventType::MD, &self.common));
        }
        events.extend(common::rate_reset_events(&self.common, &self.loan.rate_reset, end)?);
        events.extend(common::fee_events(&self.common, &self.loan.fee, end)?);
        events.extend(common::scaling_events(&self.common, &self.loan.scaling, end)?);
        Ok(events)
    }

    fn init_state(&self, maturity: Option<NaiveDateTime>) -> Result<StateSpace, ActusError> {
        let dates = match maturity {
            Some(md) => self.capitalization_dates(md)?,
            None => recurrence_dates(&self.common, &self.loan.interest.payment, self.common.status_date, true)?,
        };
        Ok(LoanRules::new(&self.loan).init_state(&self.common, maturity, &dates))
    }

    fn transition(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError> {
        let rules = LoanRules::new(&self.loan);
        rules.evaluate(step, state).unwrap_or_else(|| {
            rules.accrue(step, state);
            Ok(0.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::contracts::ContractAlgorithm;
    use crate::error::{ActusError, ObservationError};
    use crate::events::{EventFunction, EventType};
    use crate::projection::StateSpace;
    use crate::risk::{Callout, CalloutKind, ContractStart, RiskFactorObserver};
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
            "contractID": "cm01",
            "statusDate": "2025-01-01",
            "contractRole": "RPA",
            "currency": "USD",
            "dayCountConvention": "30E360",
            "initialExchangeDate": "2025-01-01",
            "notionalPrincipal": 1000,
            "nominalInterestRate": 0.04,
            "cycleOfInterestPayment": "P6ML1"
        })
    }

    fn contract(value: serde_json::Value) -> Contract {
        serde_json::from_value::<RawTerms>(value).unwrap().to_contract().unwrap()
    }

    /// Deposits 500 at 2025-04-01
    struct Deposit;

    impl RiskFactorObserver for Deposit {
        fn observe(&self, id: &str, _time: NaiveDateTime, _state: &StateSpace) -> Result<f64, ObservationError> {
            match id {
                "DEP" => Ok(500.0),
                other => Err(ObservationError::NotFound {
                    id: other.to_string(),
                    available: vec!["DEP".to_string()],
                }),
            }
        }

        fn on_contract_start(&self, _contract: &ContractStart) -> Result<Vec<Callout>, ObservationError> {
            Ok(vec![
                Callout {
                    model_id: "DEP".to_string(),
                    time: dt(2025, 4, 1),
                    kind: CalloutKind::AbsoluteFundedDelta,
                },
                Callout {
                    model_id: "DEP".to_string(),
                    time: dt(2024, 6, 1),
                    kind: CalloutKind::AbsoluteFundedDelta,
                },
            ])
        }
    }

    #[test]
    fn test_clm_capitalizes_until_maturity() {
        let mut t = terms("CLM");
        t["maturityDate"] = json!("2026-01-01");
        let result = contract(t).simulate(None, &Deposit).unwrap();
        let kinds: Vec<_> = result
            .events
            .iter()
            .filter(|e| e.event_type != EventType::PR)
            .map(|e| (e.event_time, e.event_type))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (dt(2025, 1, 1), EventType::IED),
                (dt(2025, 7, 1), EventType::IPCI),
                (dt(2026, 1, 1), EventType::IP),
                (dt(2026, 1, 1), EventType::MD),
            ]
        );
    }

    #[test]
    fn test_clm_without_deposits() {
        let mut t = terms("CLM");
        t["maturityDate"] = json!("2026-01-01");
        let result = contract(t).simulate(None, &crate::risk::MarketModel::new()).unwrap();
        assert_relative_eq!(result.events[1].notional().unwrap(), 1020.0, epsilon = 1e-9);
        assert_relative_eq!(result.events[2].payoff, 20.4, epsilon = 1e-9);
        assert_relative_eq!(result.events[3].payoff, 1020.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clm_called_at_horizon_without_maturity() {
        let clm = contract(terms("CLM"));
        let result = clm
            .simulate(Some(dt(2026, 1, 1)), &crate::risk::MarketModel::new())
            .unwrap();
        let kinds: Vec<_> = result.events.iter().map(|e| (e.event_time, e.event_type)).collect();
        assert_eq!(
            kinds,
            vec![
                (dt(2025, 1, 1), EventType::IED),
                (dt(2025, 7, 1), EventType::IPCI),
                (dt(2026, 1, 1), EventType::IP),
                (dt(2026, 1, 1), EventType::MD),
            ]
        );
        assert_relative_eq!(result.events[1].notional().unwrap(), 1020.0, epsilon = 1e-9);
        assert_relative_eq!(result.events[2].payoff, 20.4, epsilon = 1e-9);
        assert_relative_eq!(result.events[3].payoff, 1020.0, epsilon = 1e-9);
        assert_relative_eq!(result.state.notional_principal, 0.0);

        assert!(matches!(clm.schedule(None), Err(ActusError::MissingHorizon { .. })));
    }

    #[test]
    fn test_ump_requires_horizon() {
        let ump = contract(terms("UMP"));
        assert_eq!(
            ump.schedule(None).unwrap_err(),
            ActusError::MissingHorizon {
                contract_id: "cm01".to_string()
            }
        );
    }

    #[test]
    fn test_ump_deposit_callout() {
        let ump = contract(terms("UMP"));
        let result = ump.simulate(Some(dt(2025, 12, 31)), &Deposit).unwrap();

        // the callout before the status date is ignored
        let deposits: Vec<_> = result.events.iter().filter(|e| e.event_type == EventType::PR).collect();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].event_time, dt(2025, 4, 1));
        assert_eq!(deposits[0].function, EventFunction::Callout("DEP".to_string()));
        assert_relative_eq!(deposits[0].payoff, -500.0);
        assert_relative_eq!(deposits[0].notional().unwrap(), 1500.0);

        let ipci = result.events.iter().find(|e| e.event_type == EventType::IPCI).unwrap();
        assert_eq!(ipci.event_time, dt(2025, 7, 1));
        assert_relative_eq!(ipci.notional().unwrap(), 1525.0, epsilon = 1e-9);
        assert!(result.events.iter().all(|e| e.event_type != EventType::MD));
    }
}
