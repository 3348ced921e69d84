use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{EventKind, LifecycleEvent, LifecycleState, TransitionOutcome};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("record is already terminal in state {state:?}")]
    AlreadyTerminal { state: LifecycleState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: LifecycleState, event: LifecycleEvent },
}

/// Created → Pending → Approved | Rejected. Terminal states accept nothing.
#[derive(Clone, Debug, Default)]
pub struct ApprovalLifecycle;

impl ApprovalLifecycle {
    pub fn initial_state(&self) -> LifecycleState {
        LifecycleState::Created
    }

    pub fn apply(
        &self,
        current: LifecycleState,
        event: LifecycleEvent,
    ) -> Result<TransitionOutcome, TransitionError> {
        use LifecycleEvent::{ApprovalDenied, ApprovalGranted, RowAppended};
        use LifecycleState::{Approved, Created, Pending, Rejected};

        if current.is_terminal() {
            return Err(TransitionError::AlreadyTerminal { state: current });
        }

        let (to, notification) = match (current, event) {
            (Created, RowAppended) => (Pending, EventKind::Created),
            (Pending, ApprovalGranted) => (Approved, EventKind::Approved),
            (Pending, ApprovalDenied) => (Rejected, EventKind::Rejected),
            _ => return Err(TransitionError::InvalidTransition { state: current, event }),
        };

        Ok(TransitionOutcome { from: current, to, event, notification })
    }

    pub fn apply_with_audit<S>(
        &self,
        current: LifecycleState,
        event: LifecycleEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, TransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "workflow.transition_applied",
                        AuditCategory::Workflow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "workflow.transition_rejected",
                        AuditCategory::Workflow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}
