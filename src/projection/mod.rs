//! Simulation engine: contract state, evaluation and cash flow output

mod cashflows;
mod engine;
mod state;

pub use cashflows::{EventRow, SimulationResult, SimulationSummary};
pub use engine::{ContractEngine, EngineConfig};
pub use state::{BoundaryState, StateSpace};
