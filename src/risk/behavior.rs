//! Behavioral risk models
//!
//! A behavior model is a risk factor whose value depends on the contract
//! being evaluated. It may register callout events when a contract starts.

use chrono::{Datelike, NaiveDateTime};
use std::collections::BTreeMap;
use std::fmt;

use super::market::MarketModel;
use super::observer::{Callout, CalloutKind, ContractStart};
use crate::error::ObservationError;
use crate::projection::StateSpace;

/// Everything a behavior model may read when observed
#[derive(Debug, Clone, Copy)]
pub struct BehaviorInput<'a> {
    pub contract: &'a ContractStart,
    pub time: NaiveDateTime,
    pub state: &'a StateSpace,
    pub market: &'a MarketModel,
}

pub trait BehaviorModel: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn state_at(&self, input: &BehaviorInput<'_>) -> Result<f64, ObservationError>;

    /// Callouts to register for a starting contract
    fn contract_start(&self, _contract: &ContractStart) -> Vec<Callout> {
        Vec::new()
    }
}

/// Two-dimensional lookup table with step semantics on both margins
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    rows: Vec<f64>,
    columns: Vec<f64>,
    values: Vec<Vec<f64>>,
}

impl Surface {
    /// Margins must be ascending; `values[i][j]` belongs to `(rows[i], columns[j])`
    pub fn new(rows: Vec<f64>, columns: Vec<f64>, values: Vec<Vec<f64>>) -> Result<Self, String> {
        if rows.is_empty() || columns.is_empty() {
            return Err("surface margins must not be empty".to_string());
        }
        if values.len() != rows.len() || values.iter().any(|r| r.len() != columns.len()) {
            return Err(format!(
                "surface values must be {}x{} to match the margins",
                rows.len(),
                columns.len()
            ));
        }
        if rows.windows(2).any(|w| w[0] >= w[1]) || columns.windows(2).any(|w| w[0] >= w[1]) {
            return Err("surface margins must be strictly ascending".to_string());
        }
        Ok(Self { rows, columns, values })
    }

    pub fn value_at(&self, row: f64, column: f64) -> f64 {
        let i = step_index(&self.rows, row);
        let j = step_index(&self.columns, column);
        self.values[i][j]
    }
}

fn step_index(margin: &[f64], x: f64) -> usize {
    margin.iter().rposition(|m| *m <= x).unwrap_or(0)
}

/// Whole months from `start` to `end`
fn months_between(start: NaiveDateTime, end: NaiveDateTime) -> i32 {
    let mut months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    if end.day() < start.day() {
        months -= 1;
    }
    months.max(0)
}

/// Prepayment rate from a (rate spread, loan age in months) surface.
///
/// The spread is the contract's current rate minus the reference rate
/// observed in the market. Each event time becomes a multiplicative
/// reduction callout.
#[derive(Debug, Clone)]
pub struct TwoDimensionalPrepaymentModel {
    pub id: String,
    pub reference_rate_id: String,
    pub surface: Surface,
    pub event_times: Vec<NaiveDateTime>,
}

impl BehaviorModel for TwoDimensionalPrepaymentModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn state_at(&self, input: &BehaviorInput<'_>) -> Result<f64, ObservationError> {
        let reference = input.market.state_at(&self.reference_rate_id, input.time)?;
        let spread = input.state.nominal_interest_rate - reference;
        let origination = input.contract.initial_exchange_date.unwrap_or(input.contract.status_date);
        let age = months_between(origination, input.time);
        Ok(self.surface.value_at(spread, age as f64))
    }

    fn contract_start(&self, contract: &ContractStart) -> Vec<Callout> {
        self.event_times
            .iter()
            .filter(|t| contract.initial_exchange_date.map_or(true, |ied| **t >= ied))
            .map(|t| Callout {
                model_id: self.id.clone(),
                time: *t,
                kind: CalloutKind::MultiplicativeReduction,
            })
            .collect()
    }
}

/// Scheduled deposits (positive) and withdrawals (negative) per contract
#[derive(Debug, Clone, Default)]
pub struct DepositTransactionModel {
    pub id: String,
    transactions: BTreeMap<String, BTreeMap<NaiveDateTime, f64>>,
}

impl DepositTransactionModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transactions: BTreeMap::new(),
        }
    }

    pub fn with_transaction(mut self, contract_id: &str, time: NaiveDateTime, amount: f64) -> Self {
        self.transactions
            .entry(contract_id.to_string())
            .or_default()
            .insert(time, amount);
        self
    }
}

impl BehaviorModel for DepositTransactionModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn state_at(&self, input: &BehaviorInput<'_>) -> Result<f64, ObservationError> {
        self.transactions
            .get(&input.contract.contract_id)
            .and_then(|by_time| by_time.get(&input.time))
            .copied()
            .ok_or_else(|| ObservationError::Model {
                id: self.id.clone(),
                reason: format!(
                    "no transaction for contract {} at {}",
                    input.contract.contract_id, input.time
                ),
            })
    }

    fn contract_start(&self, contract: &ContractStart) -> Vec<Callout> {
        self.transactions
            .get(&contract.contract_id)
            .map(|by_time| {
                by_time
                    .keys()
                    .map(|t| Callout {
                        model_id: self.id.clone(),
                        time: *t,
                        kind: CalloutKind::AbsoluteFundedDelta,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Behavior models of one scenario, keyed by model id
#[derive(Debug, Default)]
pub struct BehaviorRegistry {
    models: BTreeMap<String, Box<dyn BehaviorModel>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: Box<dyn BehaviorModel>) {
        self.models.insert(model.id().to_string(), model);
    }

    pub fn with_model(mut self, model: impl BehaviorModel + 'static) -> Self {
        self.register(Box::new(model));
        self
    }

    pub fn get(&self, id: &str) -> Option<&dyn BehaviorModel> {
        self.models.get(id).map(|m| m.as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn keys(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }
}
