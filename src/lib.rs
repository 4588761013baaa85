//! ACTUS Engine - Contract cash flow simulation following the ACTUS standard
//!
//! This library provides:
//! - Typed contract terms loaded from ACTUS-style JSON
//! - Schedule generation under day-count, business-day and end-of-month conventions
//! - Event-driven state machines for PAM, LAM, NAM, ANN, CLM, UMP, LAX, SWPPV, OPTNS, STK and BCS
//! - Risk factor observation through market series and behavior models
//! - Parallel batch simulation per scenario

pub mod contracts;
pub mod error;
pub mod events;
pub mod projection;
pub mod risk;
pub mod scenario;
pub mod terms;
pub mod time;

// Re-export commonly used types
pub use contracts::{ContractAlgorithm, Evaluation};
pub use error::{ActusError, ObservationError, ScheduleError};
pub use events::{ContractEvent, EventType};
pub use projection::{ContractEngine, EngineConfig, EventRow, SimulationResult, StateSpace};
pub use risk::{MarketModel, RiskFactorObserver};
pub use scenario::{ScenarioRunner, SimulationContext};
pub use terms::{Contract, RawTerms};
