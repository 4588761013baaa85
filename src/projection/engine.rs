//! Contract simulation engine: schedule, apply, collect

use chrono::NaiveDateTime;

use super::cashflows::SimulationResult;
use crate::contracts::ContractAlgorithm;
use crate::error::ActusError;
use crate::events::ContractEvent;
use crate::risk::RiskFactorObserver;
use crate::terms::Contract;

/// Configuration for a simulation run
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Query horizon. `None` runs each contract to its maturity.
    pub horizon: Option<NaiveDateTime>,
}

impl EngineConfig {
    pub fn until(horizon: NaiveDateTime) -> Self {
        Self { horizon: Some(horizon) }
    }
}

/// Main simulation engine
#[derive(Debug, Clone, Default)]
pub struct ContractEngine {
    config: EngineConfig,
}

impl ContractEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Raw schedule of a contract up to the configured horizon
    pub fn schedule(&self, contract: &Contract) -> Result<Vec<ContractEvent>, ActusError> {
        contract.schedule(self.config.horizon)
    }

    /// Run one contract against `observer`
    pub fn simulate(
        &self,
        contract: &Contract,
        observer: &dyn RiskFactorObserver,
    ) -> Result<SimulationResult, ActusError> {
        log::debug!(
            "simulating {} ({:?}) to {}",
            contract.contract_id(),
            contract.contract_type(),
            self.config
                .horizon
                .map_or_else(|| "maturity".to_string(), |h| h.to_string())
        );
        let evaluation = contract.simulate(self.config.horizon, observer)?;
        log::trace!("{}: {} events evaluated", contract.contract_id(), evaluation.events.len());

        Ok(SimulationResult {
            contract_id: contract.contract_id().to_string(),
            contract_type: contract.contract_type(),
            events: evaluation.events,
            state: evaluation.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActusError;
    use crate::events::{is_ordered, EventType};
    use crate::risk::MarketModel;
    use crate::terms::RawTerms;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use serde_json::json;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn pam() -> Contract {
        let raw: RawTerms = serde_json::from_value(json!({
            "contractType": "PAM",
            "contractID": "pam01",
            "statusDate": "2025-01-01",
            "contractRole": "RPA",
            "currency": "USD",
            "dayCountConvention": "30E360",
            "initialExchangeDate": "2025-01-01",
            "maturityDate": "2027-01-01",
            "notionalPrincipal": 1000,
            "nominalInterestRate": 0.05,
            "cycleOfInterestPayment": "P1YL1"
        }))
        .unwrap();
        raw.to_contract().unwrap()
    }

    #[test]
    fn test_full_life() {
        let engine = ContractEngine::default();
        let result = engine.simulate(&pam(), &MarketModel::new()).unwrap();
        assert_eq!(result.contract_id, "pam01");
        assert_eq!(result.events.len(), 4);
        assert!(is_ordered(&result.events));

        let summary = result.summary();
        assert_relative_eq!(summary.total_interest, 100.0, epsilon = 1e-9);
        assert_relative_eq!(summary.net_cashflow, 100.0, epsilon = 1e-9);
        assert_relative_eq!(summary.final_notional, 0.0);
    }

    #[test]
    fn test_horizon_cuts_schedule() {
        let engine = ContractEngine::new(EngineConfig::until(dt(2026, 6, 1)));
        let schedule = engine.schedule(&pam()).unwrap();
        let types: Vec<_> = schedule.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::IED, EventType::IP]);

        let result = engine.simulate(&pam(), &MarketModel::new()).unwrap();
        assert_relative_eq!(result.state.notional_principal, 1000.0);
    }

    #[test]
    fn test_observer_failure_propagates() {
        let raw: RawTerms = serde_json::from_value(json!({
            "contractType": "PAM",
            "contractID": "pam02",
            "statusDate": "2025-01-01",
            "contractRole": "RPA",
            "currency": "USD",
            "dayCountConvention": "30E360",
            "initialExchangeDate": "2025-01-01",
            "maturityDate": "2027-01-01",
            "notionalPrincipal": 1000,
            "nominalInterestRate": 0.05,
            "cycleOfInterestPayment": "P1YL1",
            "cycleOfRateReset": "P1YL1",
            "marketObjectCodeOfRateReset": "LIBOR_3M"
        }))
        .unwrap();
        let err = ContractEngine::default()
            .simulate(&raw.to_contract().unwrap(), &MarketModel::new())
            .unwrap_err();
        assert!(matches!(err, ActusError::ReferenceNotFound { ref id, .. } if id == "LIBOR_3M"));
    }
}
