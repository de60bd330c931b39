pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, MaintenanceFlow};
pub use states::{MaintenanceEvent, MaintenanceState, TransitionOutcome};
