//! Scenario runner for batch contract simulations
//!
//! A scenario fixes the market data and behavior models contracts are
//! evaluated against. Each contract activates the behavior models it
//! references; observations resolve through the market first, then through
//! those activated models.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::path::Path;

use crate::error::{ActusError, ObservationError};
use crate::projection::{ContractEngine, EngineConfig, SimulationResult, StateSpace};
use crate::risk::{
    load_market_directory, BehaviorInput, BehaviorModel, BehaviorRegistry, Callout, ContractStart, MarketModel,
    RiskFactorObserver,
};
use crate::terms::Contract;

/// Market and behavior state of one scenario
#[derive(Debug, Default)]
pub struct SimulationContext {
    pub scenario_id: String,
    pub market: MarketModel,
    pub behavior: BehaviorRegistry,
}

impl SimulationContext {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            ..Self::default()
        }
    }

    /// Create context by loading every `<code>.csv` in `dir` as a market series
    pub fn from_market_dir(scenario_id: impl Into<String>, dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            scenario_id: scenario_id.into(),
            market: load_market_directory(dir)?,
            behavior: BehaviorRegistry::new(),
        })
    }

    pub fn with_market(mut self, market: MarketModel) -> Self {
        self.market = market;
        self
    }

    pub fn with_behavior(mut self, behavior: BehaviorRegistry) -> Self {
        self.behavior = behavior;
        self
    }

    /// Observer for one contract, with the behavior models it references
    /// activated. Fails on a reference the scenario does not register.
    pub fn activate(&self, contract: &Contract) -> Result<ActiveSimulation<'_>, ActusError> {
        let start = contract.contract_start();
        let mut models = Vec::with_capacity(start.referenced_models.len());
        for id in &start.referenced_models {
            let model = self.behavior.get(id).ok_or_else(|| ActusError::ModelNotActivated {
                contract_id: start.contract_id.clone(),
                scenario_id: self.scenario_id.clone(),
                id: id.clone(),
            })?;
            models.push(model);
        }
        if !models.is_empty() {
            log::debug!(
                "{}: activated {} behavior model(s) in scenario {}",
                start.contract_id,
                models.len(),
                self.scenario_id
            );
        }
        Ok(ActiveSimulation {
            market: &self.market,
            contract: start,
            models,
        })
    }
}

/// Per-contract view of a scenario
#[derive(Debug)]
pub struct ActiveSimulation<'a> {
    market: &'a MarketModel,
    contract: ContractStart,
    models: Vec<&'a dyn BehaviorModel>,
}

impl ActiveSimulation<'_> {
    fn model(&self, id: &str) -> Option<&dyn BehaviorModel> {
        self.models.iter().copied().find(|m| m.id() == id)
    }

    /// Market object codes and activated model ids, sorted
    pub fn available(&self) -> Vec<String> {
        let mut ids = self.market.keys();
        ids.extend(self.models.iter().map(|m| m.id().to_string()));
        ids.sort();
        ids
    }
}

impl RiskFactorObserver for ActiveSimulation<'_> {
    fn observe(&self, id: &str, time: NaiveDateTime, state: &StateSpace) -> Result<f64, ObservationError> {
        if self.market.contains(id) {
            return self.market.state_at(id, time);
        }
        match self.model(id) {
            Some(model) => model.state_at(&BehaviorInput {
                contract: &self.contract,
                time,
                state,
                market: self.market,
            }),
            None => Err(ObservationError::NotFound {
                id: id.to_string(),
                available: self.available(),
            }),
        }
    }

    fn on_contract_start(&self, contract: &ContractStart) -> Result<Vec<Callout>, ObservationError> {
        Ok(self
            .models
            .iter()
            .filter(|m| contract.referenced_models.iter().any(|id| id == m.id()))
            .flat_map(|m| m.contract_start(contract))
            .collect())
    }
}

/// Pre-loaded scenario runner for batch simulations
///
/// # Example
/// ```ignore
/// let context = SimulationContext::from_market_dir("base", Path::new("market"))?;
/// let runner = ScenarioRunner::new(context);
/// let results = runner.run_batch(&contracts, &EngineConfig::default());
/// ```
#[derive(Debug, Default)]
pub struct ScenarioRunner {
    context: SimulationContext,
}

impl ScenarioRunner {
    pub fn new(context: SimulationContext) -> Self {
        Self { context }
    }

    /// Run a single contract
    pub fn run(&self, contract: &Contract, config: &EngineConfig) -> Result<SimulationResult, ActusError> {
        let observer = self.context.activate(contract)?;
        ContractEngine::new(config.clone()).simulate(contract, &observer)
    }

    /// Run many contracts in parallel. Results keep the input order; one
    /// contract failing does not stop the others.
    pub fn run_batch(
        &self,
        contracts: &[Contract],
        config: &EngineConfig,
    ) -> Vec<Result<SimulationResult, ActusError>> {
        log::debug!(
            "scenario {}: running {} contracts",
            self.context.scenario_id,
            contracts.len()
        );
        contracts.par_iter().map(|c| self.run(c, config)).collect()
    }

    /// Run one contract to several horizons
    pub fn run_horizons(
        &self,
        contract: &Contract,
        horizons: &[NaiveDateTime],
    ) -> Result<Vec<SimulationResult>, ActusError> {
        horizons
            .iter()
            .map(|h| self.run(contract, &EngineConfig::until(*h)))
            .collect()
    }

    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::risk::{DepositTransactionModel, Surface, TimeSeries, TwoDimensionalPrepaymentModel};
    use crate::terms::RawTerms;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use serde_json::json;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn pam(id: &str, extra: serde_json::Value) -> Contract {
        let mut terms = json!({
            "contractType": "PAM",
            "contractID": id,
            "statusDate": "2025-01-01",
            "contractRole": "RPA",
            "currency": "USD",
            "dayCountConvention": "30E360",
            "initialExchangeDate": "2025-01-01",
            "maturityDate": "2026-01-01",
            "notionalPrincipal": 1000,
            "nominalInterestRate": 0.05
        });
        if let (Some(base), Some(extra)) = (terms.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value::<RawTerms>(terms).unwrap().to_contract().unwrap()
    }

    fn prepayment_model() -> TwoDimensionalPrepaymentModel {
        TwoDimensionalPrepaymentModel {
            id: "ppm01".to_string(),
            reference_rate_id: "UST5Y".to_string(),
            surface: Surface::new(vec![0.0], vec![0.0], vec![vec![0.1]]).unwrap(),
            event_times: vec![dt(2025, 7, 1)],
        }
    }

    fn context() -> SimulationContext {
        SimulationContext::new("base")
            .with_market(MarketModel::new().with_series("UST5Y", TimeSeries::from_points([(dt(2025, 1, 1), 0.04)])))
            .with_behavior(BehaviorRegistry::new().with_model(prepayment_model()))
    }

    #[test]
    fn test_unregistered_model_is_not_activated() {
        let contract = pam("c1", json!({ "prepaymentModels": ["ppm02"] }));
        let err = context().activate(&contract).unwrap_err();
        match err {
            ActusError::ModelNotActivated { contract_id, scenario_id, id } => {
                assert_eq!(contract_id, "c1");
                assert_eq!(scenario_id, "base");
                assert_eq!(id, "ppm02");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_observe_resolution_order() {
        let ctx = context();
        let referencing = pam("c1", json!({ "prepaymentModels": ["ppm01"] }));
        let active = ctx.activate(&referencing).unwrap();
        let mut state = StateSpace::new(dt(2025, 7, 1));
        state.nominal_interest_rate = 0.05;
        assert_relative_eq!(active.observe("UST5Y", dt(2025, 7, 1), &state).unwrap(), 0.04);
        assert_relative_eq!(active.observe("ppm01", dt(2025, 7, 1), &state).unwrap(), 0.1);
        assert_eq!(
            active.observe("LIBOR_3M", dt(2025, 7, 1), &state).unwrap_err(),
            ObservationError::NotFound {
                id: "LIBOR_3M".to_string(),
                available: vec!["UST5Y".to_string(), "ppm01".to_string()],
            }
        );

        // a registered model the contract does not reference stays inactive
        let plain = ctx.activate(&pam("c2", json!({}))).unwrap();
        assert!(plain.observe("ppm01", dt(2025, 7, 1), &state).is_err());
    }

    #[test]
    fn test_prepayment_callout() {
        let runner = ScenarioRunner::new(context());
        let contract = pam("c1", json!({ "prepaymentModels": ["ppm01"] }));
        let result = runner.run(&contract, &EngineConfig::default()).unwrap();

        let prepayment = result.events.iter().find(|e| e.event_type == EventType::PP).unwrap();
        assert_eq!(prepayment.event_time, dt(2025, 7, 1));
        assert_relative_eq!(prepayment.payoff, 100.0, epsilon = 1e-9);
        assert_relative_eq!(prepayment.notional().unwrap(), 900.0, epsilon = 1e-9);

        let maturity = result.events.last().unwrap();
        assert_eq!(maturity.event_type, EventType::MD);
        assert_relative_eq!(maturity.payoff, 900.0, epsilon = 1e-9);
    }

    fn switch_with_leg_models(models: serde_json::Value) -> Contract {
        let raw: RawTerms = serde_json::from_value(json!({
            "contractType": "BCS",
            "contractID": "bcs01",
            "statusDate": "2025-01-01",
            "contractRole": "RPA",
            "currency": "USD",
            "dayCountConvention": "AA",
            "boundaryValue": 1.2,
            "boundaryDirection": "INCR",
            "boundaryEffect": "OUT",
            "boundaryLegInitiallyActive": "FIL",
            "boundaryMonitoringAnchorDate": "2025-01-01",
            "boundaryMonitoringCycle": "P3ML1",
            "boundaryMonitoringEndDate": "2025-10-01",
            "contractStructure": [
                {
                    "referenceRole": "FIL",
                    "referenceType": "CNT",
                    "object": {
                        "contractType": "PAM",
                        "contractID": "leg1",
                        "contractRole": "RPA",
                        "currency": "USD",
                        "dayCountConvention": "30E360",
                        "initialExchangeDate": "2025-01-01",
                        "maturityDate": "2026-01-01",
                        "notionalPrincipal": 1000,
                        "nominalInterestRate": 0.05,
                        "prepaymentModels": models
                    }
                },
                { "referenceRole": "externalReferenceIndex", "referenceType": "MOC", "object": "EURUSD" }
            ]
        }))
        .unwrap();
        raw.to_contract().unwrap()
    }

    #[test]
    fn test_switch_leg_models_are_activated() {
        let market = MarketModel::new()
            .with_series("UST5Y", TimeSeries::from_points([(dt(2025, 1, 1), 0.04)]))
            .with_series("EURUSD", TimeSeries::from_points([(dt(2025, 1, 1), 1.1)]));
        let ctx = SimulationContext::new("base")
            .with_market(market)
            .with_behavior(BehaviorRegistry::new().with_model(prepayment_model()));
        let runner = ScenarioRunner::new(ctx);

        let result = runner
            .run(&switch_with_leg_models(json!(["ppm01"])), &EngineConfig::default())
            .unwrap();
        let prepayments: Vec<_> = result.events.iter().filter(|e| e.event_type == EventType::PP).collect();
        assert_eq!(prepayments.len(), 1);
        assert_eq!(prepayments[0].contract_id, "leg1");
        assert_eq!(prepayments[0].event_time, dt(2025, 7, 1));
        assert_relative_eq!(prepayments[0].payoff, 100.0, epsilon = 1e-9);

        let err = runner
            .run(&switch_with_leg_models(json!(["ppm02"])), &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, ActusError::ModelNotActivated { ref id, .. } if id == "ppm02"));
    }

    #[test]
    fn test_deposit_callouts_through_context() {
        let model = DepositTransactionModel::new("dep01").with_transaction("ump01", dt(2025, 4, 1), 500.0);
        let ctx = SimulationContext::new("deposits").with_behavior(BehaviorRegistry::new().with_model(model));
        let raw: RawTerms = serde_json::from_value(json!({
            "contractType": "UMP",
            "contractID": "ump01",
            "statusDate": "2025-01-01",
            "contractRole": "RPL",
            "currency": "USD",
            "dayCountConvention": "30E360",
            "initialExchangeDate": "2025-01-01",
            "notionalPrincipal": 1000,
            "nominalInterestRate": 0.0,
            "depositTrxModels": ["dep01"]
        }))
        .unwrap();
        let contract = raw.to_contract().unwrap();
        let result = ScenarioRunner::new(ctx)
            .run(&contract, &EngineConfig::until(dt(2025, 12, 31)))
            .unwrap();
        let deposit = result.events.iter().find(|e| e.event_type == EventType::PR).unwrap();
        assert_relative_eq!(deposit.payoff, 500.0, epsilon = 1e-9);
        assert_relative_eq!(result.state.notional_principal, -1500.0, epsilon = 1e-9);
    }

    #[test]
    fn test_run_batch_keeps_order() {
        let runner = ScenarioRunner::new(context());
        let contracts = vec![
            pam("a", json!({})),
            pam("b", json!({ "prepaymentModels": ["missing"] })),
            pam("c", json!({ "notionalPrincipal": 2000 })),
        ];
        let results = runner.run_batch(&contracts, &EngineConfig::default());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().contract_id, "a");
        assert!(matches!(results[1], Err(ActusError::ModelNotActivated { .. })));
        let c = results[2].as_ref().unwrap().summary();
        assert_eq!(c.contract_id, "c");
        assert_relative_eq!(c.total_interest, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_run_horizons() {
        let runner = ScenarioRunner::default();
        let results = runner
            .run_horizons(&pam("c1", json!({})), &[dt(2025, 6, 1), dt(2026, 1, 1)])
            .unwrap();
        assert_eq!(results[0].events.len(), 1);
        assert_eq!(results[1].events.len(), 3);
    }
}
