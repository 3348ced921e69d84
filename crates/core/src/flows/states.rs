use serde::{Deserialize, Serialize};

use crate::domain::submission::SubmissionStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Created,
    Pending,
    Approved,
    Rejected,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl From<SubmissionStatus> for LifecycleState {
    fn from(value: SubmissionStatus) -> Self {
        match value {
            SubmissionStatus::Pending => Self::Pending,
            SubmissionStatus::Approved => Self::Approved,
            SubmissionStatus::Rejected => Self::Rejected,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    RowAppended,
    ApprovalGranted,
    ApprovalDenied,
}

impl LifecycleEvent {
    pub fn from_decision(decision: SubmissionStatus) -> Option<Self> {
        match decision {
            SubmissionStatus::Approved => Some(Self::ApprovalGranted),
            SubmissionStatus::Rejected => Some(Self::ApprovalDenied),
            SubmissionStatus::Pending => None,
        }
    }
}

/// Which message set a transition fans out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Approved,
    Rejected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Status shown in messages for this event.
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Created => SubmissionStatus::Pending.as_str(),
            Self::Approved => SubmissionStatus::Approved.as_str(),
            Self::Rejected => SubmissionStatus::Rejected.as_str(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub event: LifecycleEvent,
    pub notification: EventKind,
}
