//! Event model: typed, dated occurrences and their ordering

mod contract_event;
mod event_type;

pub use contract_event::{is_ordered, sort_events, ContractEvent, EventFunction};
pub use event_type::EventType;
