//! Cash flow output structures for contract simulations

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::state::StateSpace;
use crate::events::{ContractEvent, EventType};
use crate::terms::ContractType;

/// A single evaluated event, flattened for CSV/JSON output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub contract_id: String,
    pub event_time: NaiveDateTime,
    pub event_type: EventType,
    pub currency: String,
    pub payoff: f64,

    // Post-event state
    pub notional_principal: f64,
    pub nominal_interest_rate: f64,
    pub accrued_interest: f64,
    pub fee_accrued: f64,
}

impl From<&ContractEvent> for EventRow {
    fn from(event: &ContractEvent) -> Self {
        let state = event.state.as_ref();
        Self {
            contract_id: event.contract_id.clone(),
            event_time: event.event_time,
            event_type: event.event_type,
            currency: event.currency.clone(),
            payoff: event.payoff,
            notional_principal: state.map_or(0.0, |s| s.notional_principal),
            nominal_interest_rate: state.map_or(0.0, |s| s.nominal_interest_rate),
            accrued_interest: state.map_or(0.0, |s| s.accrued_interest),
            fee_accrued: state.map_or(0.0, |s| s.fee_accrued),
        }
    }
}

/// Complete simulation result for one contract
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub contract_id: String,
    pub contract_type: ContractType,

    /// Evaluated events in (time, priority) order
    pub events: Vec<ContractEvent>,

    /// State after the last event
    pub state: StateSpace,
}

impl SimulationResult {
    /// Output rows, one per event
    pub fn rows(&self) -> Vec<EventRow> {
        self.events.iter().map(EventRow::from).collect()
    }

    /// Get summary statistics
    pub fn summary(&self) -> SimulationSummary {
        let total_inflow: f64 = self.events.iter().map(|e| e.payoff).filter(|p| *p > 0.0).sum();
        let total_outflow: f64 = self.events.iter().map(|e| e.payoff).filter(|p| *p < 0.0).sum();
        let total_interest: f64 = self
            .events
            .iter()
            .filter(|e| matches!(e.event_type, EventType::IP | EventType::IPFX | EventType::IPFL))
            .map(|e| e.payoff)
            .sum();

        SimulationSummary {
            contract_id: self.contract_id.clone(),
            contract_type: self.contract_type,
            total_events: self.events.len(),
            first_event: self.events.first().map(|e| e.event_time),
            last_event: self.events.last().map(|e| e.event_time),
            total_inflow,
            total_outflow,
            net_cashflow: total_inflow + total_outflow,
            total_interest,
            final_notional: self.state.notional_principal,
        }
    }
}

/// Summary statistics for a simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub contract_id: String,
    pub contract_type: ContractType,
    pub total_events: usize,
    pub first_event: Option<NaiveDateTime>,
    pub last_event: Option<NaiveDateTime>,
    pub total_inflow: f64,
    pub total_outflow: f64,
    pub net_cashflow: f64,
    pub total_interest: f64,
    pub final_notional: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn event(time: NaiveDateTime, event_type: EventType, payoff: f64, notional: f64) -> ContractEvent {
        let mut state = StateSpace::new(time);
        state.notional_principal = notional;
        let mut e = ContractEvent::new(time, event_type, "USD", "c1");
        e.payoff = payoff;
        e.state = Some(state);
        e
    }

    fn result() -> SimulationResult {
        let events = vec![
            event(dt(2025, 1, 1), EventType::IED, -1000.0, 1000.0),
            event(dt(2026, 1, 1), EventType::IP, 50.0, 1000.0),
            event(dt(2026, 1, 1), EventType::MD, 1000.0, 0.0),
        ];
        SimulationResult {
            contract_id: "c1".to_string(),
            contract_type: ContractType::PAM,
            state: events[2].state.clone().unwrap(),
            events,
        }
    }

    #[test]
    fn test_rows_flatten_state() {
        let rows = result().rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].event_type, EventType::IED);
        assert_relative_eq!(rows[0].notional_principal, 1000.0);
        assert_relative_eq!(rows[2].notional_principal, 0.0);
    }

    #[test]
    fn test_summary() {
        let summary = result().summary();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.first_event, Some(dt(2025, 1, 1)));
        assert_eq!(summary.last_event, Some(dt(2026, 1, 1)));
        assert_relative_eq!(summary.total_inflow, 1050.0);
        assert_relative_eq!(summary.total_outflow, -1000.0);
        assert_relative_eq!(summary.net_cashflow, 50.0);
        assert_relative_eq!(summary.total_interest, 50.0);
        assert_relative_eq!(summary.final_notional, 0.0);
    }

    #[test]
    fn test_row_serializes_to_csv() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in result().rows() {
            writer.serialize(row).unwrap();
        }
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("contract_id,event_time,event_type,currency,payoff,notional_principal,nominal_interest_rate,accrued_interest,fee_accrued")
        );
        assert!(lines.next().unwrap().starts_with("c1,2025-01-01T00:00:00,IED,USD,"));
    }
}
