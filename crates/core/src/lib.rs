pub mod audit;
pub mod clock;
pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod hierarchy;
pub mod notify;
pub mod roles;
pub mod routing;
pub mod store;
pub mod workflow;

pub use chrono;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use clock::{Clock, FixedClock, SystemClock};
pub use directory::{DirectoryService, EmployeeDirectory, ImportOutcome, ImportReport, LegacyEmployee};
pub use domain::employee::{
    Employee, EmployeeId, EmployeeLocation, EmployeeStatus, EmployeeUpdate, LocationAttribute,
    NewEmployee, Role,
};
pub use domain::location::{HierarchyLevel, LocationNode, LocationQuery};
pub use domain::submission::{Submission, SubmissionId, SubmissionStatus, WorkflowKind};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ApprovalLifecycle, EventKind, LifecycleEvent, LifecycleState, TransitionError};
pub use hierarchy::{HierarchyViolation, LocationMap};
pub use notify::{
    DeliveryError, DeliveryOutcome, DispatchReport, MessageRenderer, Messenger,
    NotificationDispatcher, RecordingMessenger, SubmitterContact,
};
pub use roles::{MissingLocationError, OrgPolicy, RoleLocationValidator, RolePolicy};
pub use routing::{ChainBuilder, ChainRequest, ChainResolution, NotificationChain, Recipient};
pub use store::{InMemoryStore, Row, Store, StoreError};
pub use workflow::catalog::{FieldSpec, WorkflowCatalog, WorkflowDefinition};
pub use workflow::events::InboundEvent;
pub use workflow::{
    EditOutcome, EventOutcome, ReviewDecision, StatusEdit, SubmissionReceipt, TransitionReceipt,
    WorkflowEngine,
};
