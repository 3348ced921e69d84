pub mod engine;
pub mod states;

pub use engine::{ApprovalLifecycle, TransitionError};
pub use states::{EventKind, LifecycleEvent, LifecycleState, TransitionOutcome};
