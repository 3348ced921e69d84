//! Inbound events, validated at the boundary before they reach the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::submission::WorkflowKind;
use crate::errors::{ApplicationError, DomainError};

use super::catalog::{WorkflowCatalog, WorkflowDefinition};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// `values` holds the submitter email followed by each declared field in order.
    FormSubmit { workflow: WorkflowKind, values: Vec<String> },
    /// `row` is the zero-based data row, header excluded.
    CellEdit {
        workflow: WorkflowKind,
        row: usize,
        column: usize,
        value: String,
        #[serde(default)]
        old_value: Option<String>,
    },
}

impl InboundEvent {
    pub fn workflow(&self) -> &WorkflowKind {
        match self {
            Self::FormSubmit { workflow, .. } | Self::CellEdit { workflow, .. } => workflow,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("unknown workflow `{0}`")]
    UnknownWorkflow(String),
    #[error("workflow `{workflow}` expects {expected} values, got {actual}")]
    WrongValueCount { workflow: String, expected: usize, actual: usize },
    #[error("submitter email `{0}` is not valid")]
    InvalidSubmitter(String),
    #[error("required field `{0}` is blank")]
    MissingField(String),
}

impl From<EventError> for DomainError {
    fn from(value: EventError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<EventError> for ApplicationError {
    fn from(value: EventError) -> Self {
        Self::Domain(value.into())
    }
}

/// A form submission that passed validation and is ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionDraft {
    pub workflow: WorkflowKind,
    pub submitter_email: String,
    /// Field values in declared order, trimmed.
    pub values: Vec<String>,
    pub fields: BTreeMap<String, String>,
}

pub fn resolve<'a>(
    catalog: &'a WorkflowCatalog,
    workflow: &WorkflowKind,
) -> Result<&'a WorkflowDefinition, EventError> {
    catalog
        .get(workflow.as_str())
        .ok_or_else(|| EventError::UnknownWorkflow(workflow.to_string()))
}

pub fn validate_form(
    definition: &WorkflowDefinition,
    values: &[String],
) -> Result<SubmissionDraft, EventError> {
    let expected = definition.fields.len() + 1;
    if values.len() != expected {
        return Err(EventError::WrongValueCount {
            workflow: definition.kind.to_string(),
            expected,
            actual: values.len(),
        });
    }

    let submitter_email = values[0].trim();
    if submitter_email.is_empty() || !submitter_email.contains('@') {
        return Err(EventError::InvalidSubmitter(submitter_email.to_owned()));
    }

    let trimmed: Vec<String> = values[1..].iter().map(|value| value.trim().to_owned()).collect();
    for (field, value) in definition.fields.iter().zip(&trimmed) {
        if field.required && value.is_empty() {
            return Err(EventError::MissingField(field.name.clone()));
        }
    }
    // The chain needs a location even when the form marks the field optional.
    let location_blank = definition
        .field_position(&definition.location_field)
        .map_or(true, |position| trimmed[position].is_empty());
    if location_blank {
        return Err(EventError::MissingField(definition.location_field.clone()));
    }

    let fields = definition
        .fields
        .iter()
        .zip(&trimmed)
        .map(|(field, value)| (field.name.clone(), value.clone()))
        .collect();

    Ok(SubmissionDraft {
        workflow: definition.kind.clone(),
        submitter_email: submitter_email.to_owned(),
        values: trimmed,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::{resolve, validate_form, EventError, InboundEvent};
    use crate::domain::submission::WorkflowKind;
    use crate::workflow::catalog::WorkflowCatalog;

    fn values(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn events_deserialize_from_tagged_json() {
        let submit: InboundEvent = serde_json::from_str(
            r#"{"type":"form_submit","workflow":"order","values":["a@example.com","D-1"]}"#,
        )
        .expect("form submit");
        assert!(matches!(submit, InboundEvent::FormSubmit { ref values, .. } if values.len() == 2));

        let edit: InboundEvent = serde_json::from_str(
            r#"{"type":"cell_edit","workflow":"order","row":3,"column":9,"value":"Approved"}"#,
        )
        .expect("cell edit");
        assert!(matches!(edit, InboundEvent::CellEdit { row: 3, old_value: None, .. }));

        let malformed = serde_json::from_str::<InboundEvent>(r#"{"type":"cell_edit","workflow":"order"}"#);
        assert!(malformed.is_err());
    }

    #[test]
    fn form_values_are_checked_against_the_definition() {
        let catalog = WorkflowCatalog::standard();
        let definition = resolve(&catalog, &WorkflowKind::new("point_request")).expect("known");

        let draft = validate_form(
            definition,
            &values(&[" sr001@example.com ", "D-100", " 250 ", "", "Kushtia-01", ""]),
        )
        .expect("valid");
        assert_eq!(draft.submitter_email, "sr001@example.com");
        assert_eq!(draft.fields.get("points").map(String::as_str), Some("250"));

        assert_eq!(
            validate_form(definition, &values(&["sr001@example.com", "D-100"])),
            Err(EventError::WrongValueCount {
                workflow: "point_request".to_owned(),
                expected: 6,
                actual: 2,
            })
        );
        assert_eq!(
            validate_form(definition, &values(&["sr001@example.com", "D-100", " ", "", "Kushtia-01", ""])),
            Err(EventError::MissingField("points".to_owned()))
        );
        assert_eq!(
            validate_form(definition, &values(&["nobody", "D-100", "250", "", "Kushtia-01", ""])),
            Err(EventError::InvalidSubmitter("nobody".to_owned()))
        );
        assert_eq!(
            resolve(&catalog, &WorkflowKind::new("leave_request")),
            Err(EventError::UnknownWorkflow("leave_request".to_owned()))
        );
    }
}
