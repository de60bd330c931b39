use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent};
use crate::flows::states::{MaintenanceEvent, MaintenanceState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> MaintenanceState;
    fn transition(
        &self,
        current: MaintenanceState,
        event: MaintenanceEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Technician work order: `Submitted -> InProgress -> Completed`.
#[derive(Clone, Debug, Default)]
pub struct MaintenanceFlow;

impl FlowDefinition for MaintenanceFlow {
    fn initial_state(&self) -> MaintenanceState {
        MaintenanceState::Submitted
    }

    fn transition(
        &self,
        current: MaintenanceState,
        event: MaintenanceEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_maintenance(current, event)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> MaintenanceState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: MaintenanceState,
        event: MaintenanceEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }

    /// The single "advance" step offered to a technician, if the order is still open.
    pub fn next_event(&self, current: MaintenanceState) -> Option<MaintenanceEvent> {
        match current {
            MaintenanceState::Submitted => Some(MaintenanceEvent::WorkStarted),
            MaintenanceState::InProgress => Some(MaintenanceEvent::WorkCompleted),
            MaintenanceState::Completed => None,
        }
    }

    /// Applies `event` and returns the audit entry describing what happened,
    /// whether the transition was applied or refused.
    pub fn apply_audited(
        &self,
        current: MaintenanceState,
        event: MaintenanceEvent,
        audit: &AuditContext,
    ) -> (Result<TransitionOutcome, FlowTransitionError>, AuditEvent) {
        let result = self.apply(current, event);
        let entry = match &result {
            Ok(outcome) => audit
                .succeeded("maintenance.transition_applied", AuditCategory::Maintenance)
                .with_metadata("from", format!("{:?}", outcome.from))
                .with_metadata("to", format!("{:?}", outcome.to))
                .with_metadata("event", format!("{:?}", outcome.event)),
            Err(error) => audit.refused(
                "maintenance.transition_rejected",
                AuditCategory::Maintenance,
                error.to_string(),
            ),
        };
        (result, entry)
    }
}

impl Default for FlowEngine<MaintenanceFlow> {
    fn default() -> Self {
        Self::new(MaintenanceFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid maintenance transition from {state:?} using event {event:?}")]
    InvalidTransition { state: MaintenanceState, event: MaintenanceEvent },
}

fn transition_maintenance(
    current: MaintenanceState,
    event: MaintenanceEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use MaintenanceEvent::{WorkCompleted, WorkStarted};
    use MaintenanceState::{Completed, InProgress, Submitted};

    let to = match (current, event) {
        (Submitted, WorkStarted) => InProgress,
        (InProgress, WorkCompleted) => Completed,
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: current, event });
        }
    };

    Ok(TransitionOutcome { from: current, to, event })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, AuditOutcome};
    use crate::domain::request::RequestId;
    use crate::flows::engine::{FlowDefinition, FlowEngine, FlowTransitionError, MaintenanceFlow};
    use crate::flows::states::{MaintenanceEvent, MaintenanceState};
    use crate::session::{Role, Session};

    #[test]
    fn maintenance_flow_happy_path() {
        let engine = FlowEngine::new(MaintenanceFlow);
        let mut state = engine.initial_state();
        assert_eq!(state, MaintenanceState::Submitted);

        while let Some(event) = engine.next_event(state) {
            state = engine.apply(state, event).expect("advance work order").to;
        }

        assert_eq!(state, MaintenanceState::Completed);
        assert_eq!(MaintenanceFlow.initial_state(), MaintenanceState::Submitted);
    }

    #[test]
    fn completing_before_starting_is_rejected() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(MaintenanceState::Submitted, MaintenanceEvent::WorkCompleted)
            .expect_err("work must start first");

        assert_eq!(
            error,
            FlowTransitionError::InvalidTransition {
                state: MaintenanceState::Submitted,
                event: MaintenanceEvent::WorkCompleted,
            }
        );
    }

    #[test]
    fn completed_work_order_has_no_next_step() {
        let engine = FlowEngine::default();
        assert_eq!(engine.next_event(MaintenanceState::Completed), None);
        assert!(engine.apply(MaintenanceState::Completed, MaintenanceEvent::WorkStarted).is_err());
    }

    #[test]
    fn transitions_come_with_audit_entries_for_success_and_rejection() {
        let engine = FlowEngine::default();
        let technician = Session::new("tech-1", "Siva", Role::Technician);
        let audit = AuditContext::new(RequestId("REQ-7".to_owned()), "req-42", &technician);

        let (started, applied) = engine.apply_audited(
            MaintenanceState::Submitted,
            MaintenanceEvent::WorkStarted,
            &audit,
        );
        assert!(started.is_ok());
        assert_eq!(applied.event_type, "maintenance.transition_applied");
        assert_eq!(applied.correlation_id, "req-42");
        assert_eq!(applied.actor, "technician:tech-1");
        assert_eq!(applied.metadata.get("to").map(String::as_str), Some("InProgress"));

        let (finished, refused) = engine.apply_audited(
            MaintenanceState::Completed,
            MaintenanceEvent::WorkCompleted,
            &audit,
        );
        assert!(finished.is_err());
        assert_eq!(refused.event_type, "maintenance.transition_rejected");
        assert_eq!(refused.outcome, AuditOutcome::Rejected);
        assert!(refused.metadata.contains_key("error"));
    }
}
