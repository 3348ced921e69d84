//! Submission workflow engine.
//!
//! A form submission becomes a Pending row and fans out `created` messages. A reviewer edit that
//! sets the status cell to `Approved` or `Rejected` records the decision in the Notified Status
//! column and fans out again. The write is authoritative; messaging afterwards is best effort and
//! never fails the call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::audit::{AuditContext, AuditSink};
use crate::clock::Clock;
use crate::directory::EmployeeDirectory;
use crate::domain::submission::{Submission, SubmissionId, SubmissionStatus, WorkflowKind};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::{ApprovalLifecycle, EventKind, LifecycleEvent, LifecycleState, TransitionError};
use crate::hierarchy::LocationMap;
use crate::notify::{DispatchReport, NotificationDispatcher, SubmitterContact};
use crate::roles::OrgPolicy;
use crate::routing::{ChainBuilder, ChainRequest, NotificationChain};
use crate::store::records::{employee_headers, location_map_headers};
use crate::store::{Store, StoreError, EMPLOYEES_TABLE, LOCATION_MAP_TABLE};

pub mod catalog;
pub mod events;
pub mod ids;
pub mod schema;

pub use catalog::{FieldSpec, WorkflowCatalog, WorkflowDefinition};
pub use events::{EventError, InboundEvent, SubmissionDraft};
pub use schema::SubmissionSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEdit {
    pub row: usize,
    pub column: usize,
    pub value: String,
    #[serde(default)]
    pub old_value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub status: SubmissionStatus,
    pub reviewer: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub row: usize,
    pub submission: Submission,
    pub chain: NotificationChain,
    pub dispatch: DispatchReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionReceipt {
    pub row: usize,
    pub status: SubmissionStatus,
    pub submission: Submission,
    pub chain: NotificationChain,
    pub dispatch: DispatchReport,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    NotStatusColumn,
    NotTerminalValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    Ignored { reason: IgnoreReason },
    AlreadyTerminal { submission_id: SubmissionId, status: SubmissionStatus },
    Transitioned(Box<TransitionReceipt>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventOutcome {
    Created(Box<SubmissionReceipt>),
    Edited(EditOutcome),
}

#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn Store>,
    catalog: Arc<WorkflowCatalog>,
    chains: ChainBuilder,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    lifecycle: ApprovalLifecycle,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<WorkflowCatalog>,
        policy: Arc<OrgPolicy>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            catalog,
            chains: ChainBuilder::new(policy),
            dispatcher,
            clock,
            audit,
            lifecycle: ApprovalLifecycle,
        }
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    /// Creates every table the engine reads or writes, leaving existing header rows alone.
    pub async fn ensure_tables(&self) -> Result<(), ApplicationError> {
        self.store.ensure_headers(EMPLOYEES_TABLE, &employee_headers()).await?;
        self.store.ensure_headers(LOCATION_MAP_TABLE, &location_map_headers()).await?;
        for definition in self.catalog.definitions() {
            let schema = SubmissionSchema::new(definition);
            self.store.ensure_headers(schema.table(), &schema.headers()).await?;
        }
        Ok(())
    }

    pub async fn handle(
        &self,
        event: InboundEvent,
        context: &AuditContext,
    ) -> Result<EventOutcome, ApplicationError> {
        match event {
            InboundEvent::FormSubmit { workflow, values } => self
                .create_submission(&workflow, &values, context)
                .await
                .map(|receipt| EventOutcome::Created(Box::new(receipt))),
            InboundEvent::CellEdit { workflow, row, column, value, old_value } => self
                .on_status_edit(&workflow, &StatusEdit { row, column, value, old_value }, context)
                .await
                .map(EventOutcome::Edited),
        }
    }

    pub async fn create_submission(
        &self,
        workflow: &WorkflowKind,
        values: &[String],
        context: &AuditContext,
    ) -> Result<SubmissionReceipt, ApplicationError> {
        let definition = events::resolve(&self.catalog, workflow)?;
        let draft = events::validate_form(definition, values)?;
        let schema = SubmissionSchema::new(definition);
        self.store.ensure_headers(schema.table(), &schema.headers()).await?;

        let now = self.clock.now();
        let rows = self.store.read(schema.table()).await?;
        let id = ids::next_submission_id(
            &definition.id_prefix,
            now.date_naive(),
            rows.iter().filter_map(|row| row.get(schema.id_column()).map(String::as_str)),
        )?;

        let context = context.clone().with_submission(id.clone()).with_workflow(definition.kind.clone());
        let transition = self
            .lifecycle
            .apply_with_audit(
                self.lifecycle.initial_state(),
                LifecycleEvent::RowAppended,
                self.audit.as_ref(),
                &context,
            )
            .map_err(DomainError::from)?;

        let cells = schema.encode_new(&id, now, &draft.submitter_email, &draft.values);
        let row = self.store.append(schema.table(), cells.clone()).await?;
        let submission = schema.decode(row, &cells)?;

        info!(
            event_name = "workflow.submission.created",
            correlation_id = %context.correlation_id,
            submission_id = %submission.id,
            workflow = %submission.workflow,
            row,
            location = %submission.location,
            "submission recorded as pending"
        );

        let (chain, dispatch) =
            self.fan_out(definition, &submission, transition.notification, &context).await;
        Ok(SubmissionReceipt { row, submission, chain, dispatch })
    }

    pub async fn on_status_edit(
        &self,
        workflow: &WorkflowKind,
        edit: &StatusEdit,
        context: &AuditContext,
    ) -> Result<EditOutcome, ApplicationError> {
        let definition = events::resolve(&self.catalog, workflow)?;
        let schema = SubmissionSchema::new(definition);
        let cells = self.read_record(&schema, edit.row, context).await?;

        if edit.column != schema.status_column() {
            return Ok(EditOutcome::Ignored { reason: IgnoreReason::NotStatusColumn });
        }
        let Some(decision) = SubmissionStatus::parse_terminal(&edit.value) else {
            return Ok(EditOutcome::Ignored { reason: IgnoreReason::NotTerminalValue });
        };

        let submission = schema.decode(edit.row, &cells)?;
        let previous = edit.old_value.as_deref().and_then(SubmissionStatus::parse_terminal);
        self.transition(definition, &schema, edit.row, submission, decision, previous, context).await
    }

    /// Writes a reviewer's decision into the status cell, then runs the same path as an edit.
    ///
    /// Notes go first and the Notified Status marker last, so a failed call leaves no marker and
    /// can be retried until the transition is recorded.
    pub async fn review(
        &self,
        workflow: &WorkflowKind,
        row: usize,
        decision: &ReviewDecision,
        context: &AuditContext,
    ) -> Result<TransitionReceipt, ApplicationError> {
        let definition = events::resolve(&self.catalog, workflow)?;
        let schema = SubmissionSchema::new(definition);
        if !decision.status.is_terminal() {
            return Err(DomainError::Validation(
                "review decision must be Approved or Rejected".to_owned(),
            )
            .into());
        }

        let mut context = context.clone();
        context.actor = decision.reviewer.clone();

        let cells = self.read_record(&schema, row, &context).await?;
        let submission = schema.decode(row, &cells)?;
        // Only the marker counts: a status cell whose transition never completed can be retried.
        if let Some(status) = submission.notified_status.filter(SubmissionStatus::is_terminal) {
            let context = context.with_submission(submission.id.clone()).with_workflow(definition.kind.clone());
            let event = LifecycleEvent::from_decision(decision.status).unwrap_or(LifecycleEvent::ApprovalGranted);
            let error = match self.lifecycle.apply_with_audit(
                LifecycleState::from(status),
                event,
                self.audit.as_ref(),
                &context,
            ) {
                Err(error) => error,
                Ok(_) => TransitionError::AlreadyTerminal { state: LifecycleState::from(status) },
            };
            return Err(DomainError::from(error).into());
        }

        let notes = decision.notes.as_deref().map(str::trim).filter(|notes| !notes.is_empty());
        let mut submission = submission;
        if let Some(notes) = notes {
            self.store.write_cell(schema.table(), row, schema.notes_column(), notes).await?;
            submission.notes = notes.to_owned();
        }
        self.store
            .write_cell(schema.table(), row, schema.status_column(), decision.status.as_str())
            .await?;
        submission.status_value = decision.status.as_str().to_owned();

        match self.transition(definition, &schema, row, submission, decision.status, None, &context).await? {
            EditOutcome::Transitioned(receipt) => Ok(*receipt),
            EditOutcome::AlreadyTerminal { status, .. } => Err(DomainError::from(
                TransitionError::AlreadyTerminal { state: LifecycleState::from(status) },
            )
            .into()),
            EditOutcome::Ignored { .. } => Err(DomainError::Validation(
                "review decision must be Approved or Rejected".to_owned(),
            )
            .into()),
        }
    }

    pub async fn preview_chain(&self, request: &ChainRequest) -> Result<NotificationChain, ApplicationError> {
        let (directory, map) = self.routing_inputs().await?;
        Ok(self.chains.build(&directory, &map, request))
    }

    /// Chain request for a workflow's location level and role subset.
    pub fn workflow_chain_request(
        &self,
        workflow: &WorkflowKind,
        location: &str,
        business_unit: Option<&str>,
    ) -> Result<ChainRequest, ApplicationError> {
        let definition = events::resolve(&self.catalog, workflow)?;
        Ok(definition.chain_request(location, business_unit))
    }

    async fn read_record(
        &self,
        schema: &SubmissionSchema,
        row: usize,
        context: &AuditContext,
    ) -> Result<Vec<String>, ApplicationError> {
        match self.store.read_row(schema.table(), row).await? {
            Some(cells) => Ok(cells),
            None => {
                warn!(
                    event_name = "workflow.record.missing",
                    correlation_id = %context.correlation_id,
                    table = schema.table(),
                    row,
                    "edited row could not be re-read, skipping transition"
                );
                Err(DomainError::RecordNotFound { table: schema.table().to_owned(), row }.into())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn transition(
        &self,
        definition: &WorkflowDefinition,
        schema: &SubmissionSchema,
        row: usize,
        mut submission: Submission,
        decision: SubmissionStatus,
        previous: Option<SubmissionStatus>,
        context: &AuditContext,
    ) -> Result<EditOutcome, ApplicationError> {
        let context = context.clone().with_submission(submission.id.clone()).with_workflow(definition.kind.clone());
        let Some(event) = LifecycleEvent::from_decision(decision) else {
            return Ok(EditOutcome::Ignored { reason: IgnoreReason::NotTerminalValue });
        };

        let already = submission.notified_status.filter(SubmissionStatus::is_terminal).or(previous);
        let current = already.map_or(LifecycleState::Pending, LifecycleState::from);
        let outcome = match self.lifecycle.apply_with_audit(current, event, self.audit.as_ref(), &context) {
            Ok(outcome) => outcome,
            Err(TransitionError::AlreadyTerminal { .. }) => {
                let status = already.unwrap_or(decision);
                info!(
                    event_name = "workflow.edit.already_terminal",
                    correlation_id = %context.correlation_id,
                    submission_id = %submission.id,
                    workflow = %submission.workflow,
                    status = status.as_str(),
                    attempted = decision.as_str(),
                    "record already terminal, not notifying again"
                );
                return Ok(EditOutcome::AlreadyTerminal { submission_id: submission.id, status });
            }
            Err(error) => return Err(DomainError::from(error).into()),
        };

        if let Err(store_error) = self
            .store
            .write_cell(schema.table(), row, schema.notified_column(), decision.as_str())
            .await
        {
            error!(
                event_name = "workflow.transition.persist_failed",
                correlation_id = %context.correlation_id,
                submission_id = %submission.id,
                workflow = %submission.workflow,
                error = %store_error,
                "could not record transition, no notifications sent"
            );
            return Err(store_error.into());
        }

        submission.status_value = decision.as_str().to_owned();
        submission.notified_status = Some(decision);
        info!(
            event_name = "workflow.submission.transitioned",
            correlation_id = %context.correlation_id,
            submission_id = %submission.id,
            workflow = %submission.workflow,
            status = decision.as_str(),
            actor = %context.actor,
            "submission reached terminal status"
        );

        let (chain, dispatch) = self.fan_out(definition, &submission, outcome.notification, &context).await;
        Ok(EditOutcome::Transitioned(Box::new(TransitionReceipt {
            row,
            status: decision,
            submission,
            chain,
            dispatch,
        })))
    }

    /// Resolves recipients from the record as stored and sends. Never fails.
    async fn fan_out(
        &self,
        definition: &WorkflowDefinition,
        submission: &Submission,
        event: EventKind,
        context: &AuditContext,
    ) -> (NotificationChain, DispatchReport) {
        let request = definition.chain_request(&submission.location, submission.business_unit.as_deref());
        let (chain, directory) = match self.routing_inputs().await {
            Ok((directory, map)) => (self.chains.build(&directory, &map, &request), Some(directory)),
            Err(store_error) => {
                warn!(
                    event_name = "routing.inputs.unavailable",
                    correlation_id = %context.correlation_id,
                    submission_id = %submission.id,
                    error = %store_error,
                    "directory or location map unreadable, notifying submitter only"
                );
                (NotificationChain::unavailable(&request), None)
            }
        };

        let submitter = submitter_contact(definition, submission, directory.as_ref());
        let dispatch = self.dispatcher.notify(submission, event, &chain, &submitter, context).await;
        (chain, dispatch)
    }

    async fn routing_inputs(&self) -> Result<(EmployeeDirectory, LocationMap), StoreError> {
        let directory = EmployeeDirectory::load(self.store.as_ref()).await?;
        let map = LocationMap::load(self.store.as_ref()).await?;
        Ok((directory, map))
    }
}

/// The form's contact field when filled in, otherwise the active employee with the submitter email.
fn submitter_contact(
    definition: &WorkflowDefinition,
    submission: &Submission,
    directory: Option<&EmployeeDirectory>,
) -> SubmitterContact {
    let from_form = definition
        .submitter_contact_field
        .as_deref()
        .and_then(|field| submission.field(field))
        .filter(|address| !address.is_empty());
    if let Some(address) = from_form {
        return SubmitterContact { name: None, address: Some(address.to_owned()) };
    }

    directory
        .and_then(|directory| directory.find_by_email(&submission.submitter_email))
        .map(|employee| SubmitterContact {
            name: Some(employee.name.clone()),
            address: employee.messaging_address().map(str::to_owned),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::DateTime;

    use super::{EditOutcome, EventOutcome, IgnoreReason, ReviewDecision, StatusEdit, WorkflowEngine};
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::clock::FixedClock;
    use crate::domain::employee::{
        Employee, EmployeeId, EmployeeLocation, EmployeeStatus, LocationAttribute, Role,
    };
    use crate::domain::location::LocationNode;
    use crate::domain::submission::{SubmissionStatus, WorkflowKind};
    use crate::errors::{ApplicationError, DomainError};
    use crate::flows::TransitionError;
    use crate::notify::{MessageRenderer, NotificationDispatcher, RecordingMessenger};
    use crate::roles::OrgPolicy;
    use crate::routing::ChainResolution;
    use crate::store::records::{
        employee_headers, encode_employee, encode_location_node, location_map_headers,
    };
    use crate::store::{InMemoryStore, Row, Store, StoreError, EMPLOYEES_TABLE, LOCATION_MAP_TABLE};
    use crate::workflow::catalog::WorkflowCatalog;
    use crate::workflow::events::InboundEvent;
    use crate::workflow::schema::SubmissionSchema;

    /// Delegates to an in-memory store, optionally failing cell writes or reads of one table.
    struct FlakyStore {
        inner: InMemoryStore,
        fail_writes: bool,
        failing_column: Mutex<Option<usize>>,
        unreadable: Option<&'static str>,
    }

    impl FlakyStore {
        fn new(inner: InMemoryStore) -> Self {
            Self { inner, fail_writes: false, failing_column: Mutex::new(None), unreadable: None }
        }

        fn fail_column(&self, column: Option<usize>) {
            *self.failing_column.lock().expect("lock") = column;
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn read(&self, table: &str) -> Result<Vec<Row>, StoreError> {
            if self.unreadable == Some(table) {
                return Err(StoreError::Backend(format!("`{table}` is offline")));
            }
            self.inner.read(table).await
        }

        async fn append(&self, table: &str, row: Row) -> Result<usize, StoreError> {
            self.inner.append(table, row).await
        }

        async fn write_cell(
            &self,
            table: &str,
            row: usize,
            column: usize,
            value: &str,
        ) -> Result<(), StoreError> {
            let failing = *self.failing_column.lock().expect("lock");
            if self.fail_writes || failing == Some(column) {
                return Err(StoreError::Backend("quota exceeded".to_owned()));
            }
            self.inner.write_cell(table, row, column, value).await
        }

        async fn ensure_headers(&self, table: &str, headers: &[String]) -> Result<(), StoreError> {
            self.inner.ensure_headers(table, headers).await
        }
    }

    fn employee(id: &str, role: &str, attribute: LocationAttribute, value: &str, phone: &str) -> Employee {
        Employee {
            id: EmployeeId(id.to_owned()),
            name: format!("Employee {id}"),
            role: Role::new(role),
            email: format!("{}@example.com", id.to_ascii_lowercase()),
            contact_number: phone.to_owned(),
            whatsapp_number: None,
            status: EmployeeStatus::Active,
            location: EmployeeLocation::default().with(attribute, value),
            business_unit: Some("ACL".to_owned()),
        }
    }

    async fn seeded_store() -> InMemoryStore {
        use LocationAttribute::{Area, BdTerritory, CroTerritory, District, Territory};

        let store = InMemoryStore::new();
        let employees = [
            employee("SR001", "SR", Territory, "Kushtia-01", "8801711000001"),
            employee("ASM001", "ASM", Area, "Kushtia", "8801711000002"),
            employee("ZSM001", "ZSM", District, "Jhenaidah", "8801711000003"),
            employee("BDO001", "BDO", BdTerritory, "BD1", "8801711000004"),
            employee("CRO001", "CRO", CroTerritory, "CRO1", "8801711000005"),
        ];
        store
            .seed(EMPLOYEES_TABLE, employee_headers(), employees.iter().map(encode_employee).collect())
            .await;

        let node = LocationNode {
            zone: "Khulna".to_owned(),
            district: "Jhenaidah".to_owned(),
            area: "Kushtia".to_owned(),
            territory: "Kushtia-01".to_owned(),
            bd_territory: "BD1".to_owned(),
            cro_territory: "CRO1".to_owned(),
            business_unit: "ACL".to_owned(),
            ..LocationNode::default()
        };
        store.seed(LOCATION_MAP_TABLE, location_map_headers(), vec![encode_location_node(&node)]).await;
        store
    }

    struct Harness {
        engine: WorkflowEngine,
        messenger: RecordingMessenger,
        audit: InMemoryAuditSink,
        store: Arc<dyn Store>,
    }

    fn harness(store: Arc<dyn Store>) -> Harness {
        let catalog = Arc::new(WorkflowCatalog::standard());
        let messenger = RecordingMessenger::new();
        let audit = InMemoryAuditSink::default();
        let renderer = Arc::new(MessageRenderer::new(&catalog).expect("templates compile"));
        let dispatcher =
            NotificationDispatcher::new(Arc::new(messenger.clone()), renderer, Arc::new(audit.clone()));
        let clock = FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T10:00:00+06:00").expect("timestamp"),
        );

        let engine = WorkflowEngine::new(
            store.clone(),
            catalog,
            Arc::new(OrgPolicy::standard()),
            dispatcher,
            Arc::new(clock),
            Arc::new(audit.clone()),
        );
        Harness { engine, messenger, audit, store }
    }

    fn point_request_values() -> Vec<String> {
        ["sr001@example.com", "D-100", "250", "", "Kushtia-01", "ACL"]
            .iter()
            .map(|value| (*value).to_owned())
            .collect()
    }

    fn point_request_status_column() -> usize {
        let catalog = WorkflowCatalog::standard();
        SubmissionSchema::new(catalog.get("point_request").expect("defined")).status_column()
    }

    fn context() -> AuditContext {
        AuditContext::new("req-1", "form")
    }

    #[tokio::test]
    async fn submissions_get_daily_ids_and_notify_submitter_then_chain() {
        let h = harness(Arc::new(seeded_store().await));
        let workflow = WorkflowKind::new("point_request");

        let first = h
            .engine
            .create_submission(&workflow, &point_request_values(), &context())
            .await
            .expect("created");
        let second = h
            .engine
            .create_submission(&workflow, &point_request_values(), &context())
            .await
            .expect("created");

        assert_eq!(first.submission.id.0, "PNT-20250101-001");
        assert_eq!(second.submission.id.0, "PNT-20250101-002");
        assert_eq!((first.row, second.row), (0, 1));
        assert_eq!(first.submission.status(), Some(SubmissionStatus::Pending));

        let roles: Vec<&str> = first.chain.tiers.iter().map(|tier| tier.role.as_str()).collect();
        assert_eq!(roles, vec!["SR", "ASM", "BDO"]);
        assert_eq!(first.dispatch.sent(), 4);

        let addresses: Vec<String> =
            h.messenger.sent().into_iter().take(4).map(|message| message.address).collect();
        assert_eq!(
            addresses,
            vec!["8801711000001", "8801711000001", "8801711000002", "8801711000004"]
        );

        let stored = h.store.read("Point Requests").await.expect("readable");
        assert_eq!(stored[0][point_request_status_column()], "Pending");
        assert_eq!(h.audit.events_of_type("workflow.transition_applied").len(), 2);
    }

    #[tokio::test]
    async fn terminal_records_are_never_notified_twice() {
        let h = harness(Arc::new(seeded_store().await));
        let workflow = WorkflowKind::new("point_request");
        h.engine.create_submission(&workflow, &point_request_values(), &context()).await.expect("created");
        let after_create = h.messenger.sent().len();
        let column = point_request_status_column();

        let approve = StatusEdit { row: 0, column, value: "Approved".to_owned(), old_value: None };
        let outcome = h.engine.on_status_edit(&workflow, &approve, &context()).await.expect("handled");
        let receipt = match outcome {
            EditOutcome::Transitioned(receipt) => receipt,
            other => panic!("expected a transition, got {other:?}"),
        };
        assert_eq!(receipt.status, SubmissionStatus::Approved);
        assert_eq!(receipt.dispatch.sent(), 4);
        let after_approve = h.messenger.sent().len();
        assert_eq!(after_approve, after_create + 4);

        let stored = h.store.read_row("Point Requests", 0).await.expect("readable").expect("row");
        assert_eq!(stored[column + 1], "Approved");

        let flip = StatusEdit {
            row: 0,
            column,
            value: "Rejected".to_owned(),
            old_value: Some("Approved".to_owned()),
        };
        let repeat = StatusEdit { row: 0, column, value: "Approved".to_owned(), old_value: None };
        for edit in [flip, repeat] {
            let outcome = h.engine.on_status_edit(&workflow, &edit, &context()).await.expect("handled");
            assert!(matches!(
                outcome,
                EditOutcome::AlreadyTerminal { status: SubmissionStatus::Approved, .. }
            ));
        }
        assert_eq!(h.messenger.sent().len(), after_approve);
    }

    #[tokio::test]
    async fn edits_outside_the_status_column_or_value_are_ignored() {
        let h = harness(Arc::new(seeded_store().await));
        let workflow = WorkflowKind::new("point_request");
        h.engine.create_submission(&workflow, &point_request_values(), &context()).await.expect("created");
        let column = point_request_status_column();

        let notes_edit = StatusEdit { row: 0, column: 4, value: "Approved".to_owned(), old_value: None };
        let lowercase = StatusEdit { row: 0, column, value: "approved".to_owned(), old_value: None };

        assert_eq!(
            h.engine.on_status_edit(&workflow, &notes_edit, &context()).await,
            Ok(EditOutcome::Ignored { reason: IgnoreReason::NotStatusColumn })
        );
        assert_eq!(
            h.engine.on_status_edit(&workflow, &lowercase, &context()).await,
            Ok(EditOutcome::Ignored { reason: IgnoreReason::NotTerminalValue })
        );
    }

    #[tokio::test]
    async fn edits_to_missing_rows_are_reported() {
        let h = harness(Arc::new(seeded_store().await));
        let edit = StatusEdit {
            row: 42,
            column: point_request_status_column(),
            value: "Approved".to_owned(),
            old_value: None,
        };

        let result = h.engine.on_status_edit(&WorkflowKind::new("point_request"), &edit, &context()).await;
        assert_eq!(
            result,
            Err(ApplicationError::Domain(DomainError::RecordNotFound {
                table: "Point Requests".to_owned(),
                row: 42,
            }))
        );
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_marker_write_sends_nothing() {
        let store = FlakyStore { fail_writes: true, ..FlakyStore::new(seeded_store().await) };
        let h = harness(Arc::new(store));
        let workflow = WorkflowKind::new("point_request");
        h.engine.create_submission(&workflow, &point_request_values(), &context()).await.expect("created");
        let after_create = h.messenger.sent().len();

        let edit = StatusEdit {
            row: 0,
            column: point_request_status_column(),
            value: "Rejected".to_owned(),
            old_value: None,
        };
        let result = h.engine.on_status_edit(&workflow, &edit, &context()).await;

        assert!(matches!(result, Err(ApplicationError::Persistence(_))));
        assert_eq!(h.messenger.sent().len(), after_create);
    }

    #[tokio::test]
    async fn unreadable_directory_still_notifies_submitter_from_the_form() {
        let store = FlakyStore { unreadable: Some(EMPLOYEES_TABLE), ..FlakyStore::new(seeded_store().await) };
        let h = harness(Arc::new(store));
        let values: Vec<String> = [
            "sr001@example.com",
            "Rahim Traders",
            "Abdur Rahim",
            "8801799000000",
            "",
            "",
            "Kushtia-01",
            "ACL",
        ]
        .iter()
        .map(|value| (*value).to_owned())
        .collect();

        let receipt = h
            .engine
            .create_submission(&WorkflowKind::new("registration"), &values, &context())
            .await
            .expect("created despite routing failure");

        assert_eq!(receipt.chain.resolution, ChainResolution::Unavailable);
        assert!(receipt.chain.is_empty());
        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, "8801799000000");
        assert!(sent[0].text.contains("Abdur Rahim"));
    }

    #[tokio::test]
    async fn review_writes_decision_and_rejects_a_second_one() {
        let h = harness(Arc::new(seeded_store().await));
        let workflow = WorkflowKind::new("point_request");
        h.engine.create_submission(&workflow, &point_request_values(), &context()).await.expect("created");
        let column = point_request_status_column();

        let decision = ReviewDecision {
            status: SubmissionStatus::Approved,
            reviewer: "asm001@example.com".to_owned(),
            notes: Some(" looks fine ".to_owned()),
        };
        let receipt = h.engine.review(&workflow, 0, &decision, &context()).await.expect("reviewed");
        assert_eq!(receipt.status, SubmissionStatus::Approved);
        assert_eq!(receipt.submission.notes, "looks fine");

        let stored = h.store.read_row("Point Requests", 0).await.expect("readable").expect("row");
        assert_eq!(stored[column], "Approved");
        assert_eq!(stored[column + 1], "Approved");
        assert_eq!(stored[column + 2], "looks fine");

        let second = ReviewDecision { status: SubmissionStatus::Rejected, ..decision };
        let result = h.engine.review(&workflow, 0, &second, &context()).await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::Transition(TransitionError::AlreadyTerminal { .. })))
        ));
        let rejected = h.audit.events_of_type("workflow.transition_rejected");
        assert_eq!(rejected.last().map(|event| event.actor.as_str()), Some("asm001@example.com"));
    }

    #[tokio::test]
    async fn interrupted_review_can_be_retried_until_the_marker_is_written() {
        let store = Arc::new(FlakyStore::new(seeded_store().await));
        let h = harness(store.clone());
        let workflow = WorkflowKind::new("point_request");
        h.engine.create_submission(&workflow, &point_request_values(), &context()).await.expect("created");
        let after_create = h.messenger.sent().len();
        let column = point_request_status_column();
        let decision = ReviewDecision {
            status: SubmissionStatus::Approved,
            reviewer: "asm001@example.com".to_owned(),
            notes: Some("ok".to_owned()),
        };

        store.fail_column(Some(column + 2));
        let result = h.engine.review(&workflow, 0, &decision, &context()).await;
        assert!(matches!(result, Err(ApplicationError::Persistence(_))));
        let stored = h.store.read_row("Point Requests", 0).await.expect("readable").expect("row");
        assert_eq!(stored[column], "Pending");

        store.fail_column(Some(column + 1));
        let result = h.engine.review(&workflow, 0, &decision, &context()).await;
        assert!(matches!(result, Err(ApplicationError::Persistence(_))));
        let stored = h.store.read_row("Point Requests", 0).await.expect("readable").expect("row");
        assert_eq!(stored[column], "Approved");
        assert_eq!(stored[column + 1], "");
        assert_eq!(h.messenger.sent().len(), after_create);

        store.fail_column(None);
        let receipt = h.engine.review(&workflow, 0, &decision, &context()).await.expect("retried");
        assert_eq!(receipt.status, SubmissionStatus::Approved);
        assert_eq!(receipt.dispatch.sent(), 4);
        let stored = h.store.read_row("Point Requests", 0).await.expect("readable").expect("row");
        assert_eq!(stored[column + 1], "Approved");
        assert_eq!(stored[column + 2], "ok");
        assert_eq!(h.messenger.sent().len(), after_create + 4);

        let again = h.engine.review(&workflow, 0, &decision, &context()).await;
        assert!(matches!(
            again,
            Err(ApplicationError::Domain(DomainError::Transition(TransitionError::AlreadyTerminal { .. })))
        ));
        assert_eq!(h.messenger.sent().len(), after_create + 4);
    }

    #[tokio::test]
    async fn handle_routes_tagged_events() {
        let h = harness(Arc::new(seeded_store().await));
        let created = h
            .engine
            .handle(
                InboundEvent::FormSubmit {
                    workflow: WorkflowKind::new("point_request"),
                    values: point_request_values(),
                },
                &context(),
            )
            .await
            .expect("created");
        assert!(matches!(created, EventOutcome::Created(_)));

        let unknown = h
            .engine
            .handle(
                InboundEvent::FormSubmit { workflow: WorkflowKind::new("leave"), values: Vec::new() },
                &context(),
            )
            .await;
        assert!(matches!(unknown, Err(ApplicationError::Domain(DomainError::Validation(_)))));
    }
}
