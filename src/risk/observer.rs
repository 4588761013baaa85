//! Risk factor observation interface

use chrono::NaiveDateTime;

use crate::error::ObservationError;
use crate::projection::StateSpace;
use crate::terms::ContractType;

/// Snapshot of a contract handed to observers when its evaluation starts
#[derive(Debug, Clone, PartialEq)]
pub struct ContractStart {
    pub contract_id: String,
    pub contract_type: ContractType,
    pub status_date: NaiveDateTime,
    pub initial_exchange_date: Option<NaiveDateTime>,
    pub maturity_date: Option<NaiveDateTime>,
    pub notional_principal: f64,
    /// Behavior model ids the contract references
    pub referenced_models: Vec<String>,
}

/// Kind of event a callout registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalloutKind {
    /// Multiplicative reduction of notional (prepayment)
    MultiplicativeReduction,
    /// Absolute change of notional (deposit or withdrawal)
    AbsoluteFundedDelta,
    /// Option exercise
    Exercise,
}

impl CalloutKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "MRD" => Some(CalloutKind::MultiplicativeReduction),
            "AFD" => Some(CalloutKind::AbsoluteFundedDelta),
            "XD" => Some(CalloutKind::Exercise),
            _ => None,
        }
    }
}

/// Request from an observer to evaluate an extra event at `time`; the event
/// observes `model_id` when it is evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct Callout {
    pub model_id: String,
    pub time: NaiveDateTime,
    pub kind: CalloutKind,
}

/// Source of externally observed values.
///
/// Implementations may keep internal state, but must not rely on the engine
/// for it. Shared across threads by the batch runner, so they must be `Sync`.
pub trait RiskFactorObserver: Sync {
    /// Value of risk factor `id` at `time`, given the contract state
    fn observe(&self, id: &str, time: NaiveDateTime, state: &StateSpace) -> Result<f64, ObservationError>;

    /// Events to register for a contract about to be evaluated
    fn on_contract_start(&self, _contract: &ContractStart) -> Result<Vec<Callout>, ObservationError> {
        Ok(Vec::new())
    }
}
