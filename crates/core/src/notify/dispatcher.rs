use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::employee::{EmployeeId, Role};
use crate::domain::submission::{Submission, SubmissionId};
use crate::flows::EventKind;
use crate::routing::NotificationChain;

use super::templates::{Audience, MessageRenderer, RecipientContext};
use super::Messenger;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed { reason: String },
    SkippedNoAddress,
    TemplateFailed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryRecord {
    pub audience: Audience,
    pub role: Option<Role>,
    pub employee_id: Option<EmployeeId>,
    pub address: Option<String>,
    pub outcome: DeliveryOutcome,
}

/// Per-recipient results of one notification event. Failures live here, never in a `Result`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub submission_id: SubmissionId,
    pub event: EventKind,
    pub deliveries: Vec<DeliveryRecord>,
}

impl DispatchReport {
    pub fn empty(submission_id: SubmissionId, event: EventKind) -> Self {
        Self { submission_id, event, deliveries: Vec::new() }
    }

    pub fn sent(&self) -> usize {
        self.count(|outcome| matches!(outcome, DeliveryOutcome::Sent))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| {
            matches!(outcome, DeliveryOutcome::Failed { .. } | DeliveryOutcome::TemplateFailed { .. })
        })
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, DeliveryOutcome::SkippedNoAddress))
    }

    fn count(&self, predicate: impl Fn(&DeliveryOutcome) -> bool) -> usize {
        self.deliveries.iter().filter(|delivery| predicate(&delivery.outcome)).count()
    }
}

/// Where the submitter's copy goes, if anywhere.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitterContact {
    pub name: Option<String>,
    pub address: Option<String>,
}

struct Target<'a> {
    audience: Audience,
    role: Option<&'a Role>,
    employee_id: Option<&'a EmployeeId>,
    name: Option<&'a str>,
    address: Option<&'a str>,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    messenger: Arc<dyn Messenger>,
    renderer: Arc<MessageRenderer>,
    audit: Arc<dyn AuditSink>,
}

impl NotificationDispatcher {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        renderer: Arc<MessageRenderer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { messenger, renderer, audit }
    }

    /// Sends the submitter copy, then one message per chain recipient in chain order.
    pub async fn notify(
        &self,
        submission: &Submission,
        event: EventKind,
        chain: &NotificationChain,
        submitter: &SubmitterContact,
        audit: &AuditContext,
    ) -> DispatchReport {
        let mut report = DispatchReport::empty(submission.id.clone(), event);

        let submitter_target = Target {
            audience: Audience::Submitter,
            role: None,
            employee_id: None,
            name: submitter.name.as_deref(),
            address: submitter.address.as_deref(),
        };
        report.deliveries.push(self.deliver(submission, event, submitter_target, audit).await);

        for (role, recipient) in chain.recipients() {
            let target = Target {
                audience: Audience::Staff,
                role: Some(role),
                employee_id: Some(&recipient.employee_id),
                name: Some(recipient.name.as_str()),
                address: recipient.address.as_deref(),
            };
            report.deliveries.push(self.deliver(submission, event, target, audit).await);
        }

        info!(
            event_name = "notify.dispatch.completed",
            correlation_id = %audit.correlation_id,
            submission_id = %submission.id,
            workflow = %submission.workflow,
            event = event.as_str(),
            sent = report.sent(),
            failed = report.failed(),
            skipped = report.skipped(),
            "notification dispatch completed"
        );
        report
    }

    async fn deliver(
        &self,
        submission: &Submission,
        event: EventKind,
        target: Target<'_>,
        audit: &AuditContext,
    ) -> DeliveryRecord {
        let outcome = match target.address.map(str::trim).filter(|address| !address.is_empty()) {
            None => DeliveryOutcome::SkippedNoAddress,
            Some(address) => {
                let recipient = RecipientContext { name: target.name, role: target.role };
                match self.renderer.render(submission, event, target.audience, &recipient) {
                    Err(error) => DeliveryOutcome::TemplateFailed { reason: error.to_string() },
                    Ok(text) => match self.messenger.send(address, &text).await {
                        Ok(()) => DeliveryOutcome::Sent,
                        Err(error) => DeliveryOutcome::Failed { reason: error.to_string() },
                    },
                }
            }
        };

        let record = DeliveryRecord {
            audience: target.audience,
            role: target.role.cloned(),
            employee_id: target.employee_id.cloned(),
            address: target.address.map(str::to_owned),
            outcome,
        };
        self.record(submission, event, &record, audit);
        record
    }

    fn record(
        &self,
        submission: &Submission,
        event: EventKind,
        record: &DeliveryRecord,
        audit: &AuditContext,
    ) {
        let (event_type, outcome, reason) = match &record.outcome {
            DeliveryOutcome::Sent => ("notify.delivery.sent", AuditOutcome::Success, None),
            DeliveryOutcome::Failed { reason } => {
                ("notify.delivery.failed", AuditOutcome::Failed, Some(reason.as_str()))
            }
            DeliveryOutcome::TemplateFailed { reason } => {
                ("notify.delivery.template_failed", AuditOutcome::Failed, Some(reason.as_str()))
            }
            DeliveryOutcome::SkippedNoAddress => {
                ("notify.delivery.skipped", AuditOutcome::Skipped, None)
            }
        };

        let role = record.role.as_ref().map(Role::as_str).unwrap_or("");
        let employee_id = record.employee_id.as_ref().map(|id| id.0.as_str()).unwrap_or("");
        if let Some(reason) = reason {
            warn!(
                event_name = event_type,
                correlation_id = %audit.correlation_id,
                submission_id = %submission.id,
                workflow = %submission.workflow,
                audience = record.audience.as_str(),
                role,
                employee_id,
                reason,
                "notification not delivered"
            );
        }

        let mut audit_event =
            AuditEvent::from_context(audit, event_type, AuditCategory::Notification, outcome)
                .with_metadata("event", event.as_str())
                .with_metadata("audience", record.audience.as_str())
                .with_metadata("role", role)
                .with_metadata("employee_id", employee_id)
                .with_metadata("address", record.address.clone().unwrap_or_default());
        if let Some(reason) = reason {
            audit_event = audit_event.with_metadata("reason", reason);
        }
        self.audit.emit(audit_event);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::DateTime;

    use super::{DeliveryOutcome, NotificationDispatcher, SubmitterContact};
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::employee::{EmployeeId, Role};
    use crate::domain::location::LocationQuery;
    use crate::domain::submission::{Submission, SubmissionId, WorkflowKind};
    use crate::flows::EventKind;
    use crate::notify::{MessageRenderer, RecordingMessenger};
    use crate::routing::{ChainResolution, ChainTier, NotificationChain, Recipient};
    use crate::workflow::catalog::WorkflowCatalog;

    fn submission() -> Submission {
        Submission {
            id: SubmissionId("DSP-20250101-001".to_owned()),
            workflow: WorkflowKind::new("dispute"),
            timestamp: DateTime::parse_from_rfc3339("2025-01-01T10:15:00+06:00").expect("timestamp"),
            submitter_email: "dealer@example.com".to_owned(),
            fields: BTreeMap::new(),
            status_value: "Approved".to_owned(),
            notified_status: None,
            notes: "Credit note issued".to_owned(),
            location: "Kushtia-01".to_owned(),
            business_unit: None,
        }
    }

    fn recipient(id: &str, address: Option<&str>) -> Recipient {
        Recipient {
            employee_id: EmployeeId(id.to_owned()),
            name: id.to_owned(),
            address: address.map(str::to_owned),
        }
    }

    fn chain() -> NotificationChain {
        NotificationChain {
            trigger: LocationQuery::territory("Kushtia-01"),
            business_unit: None,
            resolution: ChainResolution::Fallback,
            tiers: vec![
                ChainTier {
                    role: Role::new("SR"),
                    matched_on: None,
                    recipients: vec![recipient("SR001", Some("8801711000001")), recipient("SR002", None)],
                },
                ChainTier {
                    role: Role::new("ASM"),
                    matched_on: None,
                    recipients: vec![recipient("ASM001", Some("8801711000002"))],
                },
            ],
        }
    }

    fn dispatcher(messenger: &RecordingMessenger, audit: &InMemoryAuditSink) -> NotificationDispatcher {
        let renderer = MessageRenderer::new(&WorkflowCatalog::standard()).expect("templates compile");
        NotificationDispatcher::new(Arc::new(messenger.clone()), Arc::new(renderer), Arc::new(audit.clone()))
    }

    #[tokio::test]
    async fn one_message_per_resolved_recipient_and_failures_are_isolated() {
        let messenger = RecordingMessenger::new();
        messenger.fail_for("8801711000001");
        let audit = InMemoryAuditSink::default();

        let report = dispatcher(&messenger, &audit)
            .notify(
                &submission(),
                EventKind::Approved,
                &chain(),
                &SubmitterContact { name: None, address: Some("8801999000000".to_owned()) },
                &AuditContext::new("req-1", "test"),
            )
            .await;

        assert_eq!((report.sent(), report.failed(), report.skipped()), (2, 1, 1));
        assert!(matches!(report.deliveries[1].outcome, DeliveryOutcome::Failed { .. }));
        assert_eq!(messenger.sent().len(), 2);
        assert!(messenger.sent_to("8801999000000")[0].text.contains("Credit note issued"));
        assert_eq!(audit.events_of_type("notify.delivery.failed").len(), 1);
        assert_eq!(audit.events_of_type("notify.delivery.skipped").len(), 1);
    }

    #[tokio::test]
    async fn address_in_two_tiers_gets_one_message_per_tier() {
        let messenger = RecordingMessenger::new();
        let audit = InMemoryAuditSink::default();
        let mut chain = chain();
        chain.tiers[1].recipients.push(recipient("SR001", Some("8801711000001")));

        let report = dispatcher(&messenger, &audit)
            .notify(
                &submission(),
                EventKind::Approved,
                &chain,
                &SubmitterContact::default(),
                &AuditContext::new("req-3", "test"),
            )
            .await;

        assert_eq!(report.sent(), 3);
        let repeated = messenger.sent_to("8801711000001");
        assert_eq!(repeated.len(), 2);
        assert_eq!(audit.events_of_type("notify.delivery.sent").len(), 3);
    }

    #[tokio::test]
    async fn submitter_without_address_is_skipped() {
        let messenger = RecordingMessenger::new();
        let audit = InMemoryAuditSink::default();

        let report = dispatcher(&messenger, &audit)
            .notify(
                &submission(),
                EventKind::Rejected,
                &chain(),
                &SubmitterContact::default(),
                &AuditContext::new("req-2", "test"),
            )
            .await;

        assert_eq!(report.deliveries[0].outcome, DeliveryOutcome::SkippedNoAddress);
        assert_eq!(report.sent(), 2);
    }
}
