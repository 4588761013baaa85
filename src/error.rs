//! Error taxonomy for attribute conversion, scheduling and evaluation

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::events::EventType;

/// Rejected schedule inputs. Raised instead of looping or producing
/// an ill-formed date set.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScheduleError {
    #[error("cycle `{0}` has a zero or negative period")]
    DegenerateCycle(String),

    #[error("cycle `{0}` cannot be parsed")]
    InvalidCycle(String),

    #[error("schedule end {end} precedes anchor {anchor}")]
    EndBeforeAnchor {
        anchor: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("array schedule anchors must be strictly increasing")]
    UnorderedAnchors,

    #[error("array schedule has {anchors} anchors but {cycles} cycles")]
    ArrayLengthMismatch { anchors: usize, cycles: usize },

    #[error("principal never amortizes (redemption per cycle {0})")]
    NonAmortizing(f64),

    #[error("date arithmetic `{0}` leaves the representable range")]
    OutOfRange(String),
}

/// Failure reported by a risk-factor observer
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ObservationError {
    #[error("risk factor `{id}` not found in active scenario (available: {})", available.join(", "))]
    NotFound { id: String, available: Vec<String> },

    #[error("risk factor `{id}`: {reason}")]
    Model { id: String, reason: String },
}

impl ObservationError {
    /// Identifier of the risk factor that failed
    pub fn id(&self) -> &str {
        match self {
            ObservationError::NotFound { id, .. } | ObservationError::Model { id, .. } => id,
        }
    }
}

/// Errors raised by the engine. All are fatal for the contract being evaluated;
/// no partial event list is returned alongside them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActusError {
    #[error("contract {contract_id}: attribute `{field}` {reason}")]
    AttributeConversion {
        contract_id: String,
        field: String,
        reason: String,
    },

    #[error("unknown contract type `{0}`")]
    ContractTypeUnknown(String),

    #[error("contract {contract_id}: reference `{id}` not found at {time} during {event_type} event")]
    ReferenceNotFound {
        contract_id: String,
        event_type: EventType,
        time: NaiveDateTime,
        id: String,
    },

    #[error("contract {contract_id}: behavior model `{id}` is not registered in scenario `{scenario_id}`")]
    ModelNotActivated {
        contract_id: String,
        scenario_id: String,
        id: String,
    },

    #[error("contract {contract_id}: observation of `{id}` failed at {time} during {event_type} event: {reason}")]
    Observation {
        contract_id: String,
        event_type: EventType,
        time: NaiveDateTime,
        id: String,
        reason: String,
    },

    #[error("contract {contract_id}: {source}")]
    Schedule {
        contract_id: String,
        #[source]
        source: ScheduleError,
    },

    #[error("contract {contract_id}: contract structure references an ancestor ({chain})")]
    ContractCycle { contract_id: String, chain: String },

    #[error("contract {contract_id}: no maturity and no horizon to bound the schedule")]
    MissingHorizon { contract_id: String },
}

impl ActusError {
    pub(crate) fn attribute(contract_id: &str, field: &str, reason: impl Into<String>) -> Self {
        ActusError::AttributeConversion {
            contract_id: contract_id.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(contract_id: &str, field: &str) -> Self {
        Self::attribute(contract_id, field, "is required but missing")
    }

    pub(crate) fn schedule(contract_id: &str, source: ScheduleError) -> Self {
        ActusError::Schedule {
            contract_id: contract_id.to_string(),
            source,
        }
    }

    /// Attach event context to an observer failure
    pub(crate) fn from_observation(
        err: ObservationError,
        contract_id: &str,
        event_type: EventType,
        time: NaiveDateTime,
    ) -> Self {
        match err {
            ObservationError::NotFound { id, .. } => ActusError::ReferenceNotFound {
                contract_id: contract_id.to_string(),
                event_type,
                time,
                id,
            },
            ObservationError::Model { id, reason } => ActusError::Observation {
                contract_id: contract_id.to_string(),
                event_type,
                time,
                id,
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_not_found_maps_to_reference_error() {
        let time = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let err = ObservationError::NotFound {
            id: "LIBOR_3M".to_string(),
            available: vec!["SOFR".to_string()],
        };
        let mapped = ActusError::from_observation(err, "c1", EventType::RR, time);
        match &mapped {
            ActusError::ReferenceNotFound { id, time: at, .. } => {
                assert_eq!(id, "LIBOR_3M");
                assert_eq!(*at, time);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(mapped.to_string().contains("LIBOR_3M"));
    }

    #[test]
    fn test_not_found_message_lists_available() {
        let err = ObservationError::NotFound {
            id: "X".to_string(),
            available: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(err.to_string(), "risk factor `X` not found in active scenario (available: A, B)");
    }
}
