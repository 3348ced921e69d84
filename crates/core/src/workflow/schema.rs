//! Column layout of a workflow table:
//! `Submission ID | Timestamp | Submitter Email | <fields…> | Status | Notified Status | Notes`.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};

use crate::domain::submission::{Submission, SubmissionId, SubmissionStatus, WorkflowKind};
use crate::store::{Row, StoreError};

use super::catalog::WorkflowDefinition;

const ID_COLUMN: usize = 0;
const TIMESTAMP_COLUMN: usize = 1;
const SUBMITTER_COLUMN: usize = 2;
const FIRST_FIELD_COLUMN: usize = 3;

#[derive(Clone, Debug)]
pub struct SubmissionSchema {
    workflow: WorkflowKind,
    table: String,
    field_names: Vec<String>,
    field_labels: Vec<String>,
    location_field: String,
    business_unit_field: Option<String>,
}

impl SubmissionSchema {
    pub fn new(definition: &WorkflowDefinition) -> Self {
        Self {
            workflow: definition.kind.clone(),
            table: definition.table.clone(),
            field_names: definition.fields.iter().map(|field| field.name.clone()).collect(),
            field_labels: definition.fields.iter().map(|field| field.label.clone()).collect(),
            location_field: definition.location_field.clone(),
            business_unit_field: definition.business_unit_field.clone(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec![
            "Submission ID".to_owned(),
            "Timestamp".to_owned(),
            "Submitter Email".to_owned(),
        ];
        headers.extend(self.field_labels.iter().cloned());
        headers.extend(["Status", "Notified Status", "Notes"].map(str::to_owned));
        headers
    }

    pub fn id_column(&self) -> usize {
        ID_COLUMN
    }

    pub fn status_column(&self) -> usize {
        FIRST_FIELD_COLUMN + self.field_names.len()
    }

    pub fn notified_column(&self) -> usize {
        self.status_column() + 1
    }

    pub fn notes_column(&self) -> usize {
        self.status_column() + 2
    }

    pub fn field_column(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|field| field == name).map(|index| FIRST_FIELD_COLUMN + index)
    }

    /// A fresh Pending row; `values` follow the declared field order.
    pub fn encode_new(
        &self,
        id: &SubmissionId,
        timestamp: DateTime<FixedOffset>,
        submitter_email: &str,
        values: &[String],
    ) -> Row {
        let mut row = vec![id.0.clone(), timestamp.to_rfc3339(), submitter_email.to_owned()];
        row.extend(
            (0..self.field_names.len()).map(|index| values.get(index).cloned().unwrap_or_default()),
        );
        row.push(SubmissionStatus::Pending.as_str().to_owned());
        row.push(String::new());
        row.push(String::new());
        row
    }

    pub fn decode(&self, index: usize, row: &Row) -> Result<Submission, StoreError> {
        let cell = |column: usize| row.get(column).map(String::as_str).unwrap_or("");
        let decode_error = |message: String| StoreError::Decode {
            table: self.table.clone(),
            row: index,
            message,
        };

        let id = cell(ID_COLUMN).trim();
        if id.is_empty() {
            return Err(decode_error("submission id is blank".to_owned()));
        }
        let timestamp = DateTime::parse_from_rfc3339(cell(TIMESTAMP_COLUMN).trim()).map_err(|error| {
            decode_error(format!("timestamp `{}` is not RFC 3339: {error}", cell(TIMESTAMP_COLUMN)))
        })?;

        let fields: BTreeMap<String, String> = self
            .field_names
            .iter()
            .enumerate()
            .map(|(offset, name)| (name.clone(), cell(FIRST_FIELD_COLUMN + offset).trim().to_owned()))
            .collect();
        let location = fields.get(&self.location_field).cloned().unwrap_or_default();
        let business_unit = self
            .business_unit_field
            .as_ref()
            .and_then(|field| fields.get(field))
            .filter(|value| !value.is_empty())
            .cloned();

        Ok(Submission {
            id: SubmissionId(id.to_owned()),
            workflow: self.workflow.clone(),
            timestamp,
            submitter_email: cell(SUBMITTER_COLUMN).trim().to_owned(),
            fields,
            status_value: cell(self.status_column()).to_owned(),
            notified_status: SubmissionStatus::parse(cell(self.notified_column()).trim()),
            notes: cell(self.notes_column()).trim().to_owned(),
            location,
            business_unit,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::SubmissionSchema;
    use crate::domain::submission::{SubmissionId, SubmissionStatus};
    use crate::workflow::catalog::WorkflowCatalog;

    #[test]
    fn layout_wraps_fields_between_fixed_columns() {
        let catalog = WorkflowCatalog::standard();
        let schema = SubmissionSchema::new(catalog.get("point_request").expect("defined"));
        let headers = schema.headers();

        assert_eq!(&headers[..4], ["Submission ID", "Timestamp", "Submitter Email", "Dealer Code"]);
        assert_eq!(headers[schema.status_column()], "Status");
        assert_eq!(headers[schema.notified_column()], "Notified Status");
        assert_eq!(headers[schema.notes_column()], "Notes");
        assert_eq!(schema.field_column("territory"), Some(6));
    }

    #[test]
    fn new_row_decodes_back_to_a_pending_submission() {
        let catalog = WorkflowCatalog::standard();
        let schema = SubmissionSchema::new(catalog.get("point_request").expect("defined"));
        let timestamp = DateTime::parse_from_rfc3339("2025-01-01T10:15:00+06:00").expect("timestamp");
        let values: Vec<String> =
            ["D-100", "250", "", "Kushtia-01", "ACL"].iter().map(|v| (*v).to_owned()).collect();

        let row = schema.encode_new(
            &SubmissionId("PNT-20250101-001".to_owned()),
            timestamp,
            "sr001@example.com",
            &values,
        );
        let submission = schema.decode(0, &row).expect("decodes");

        assert_eq!(submission.status(), Some(SubmissionStatus::Pending));
        assert_eq!(submission.notified_status, None);
        assert_eq!(submission.location, "Kushtia-01");
        assert_eq!(submission.business_unit.as_deref(), Some("ACL"));
        assert_eq!(submission.field("points"), Some("250"));
        assert_eq!(submission.timestamp, timestamp);
    }

    #[test]
    fn rows_without_rfc3339_timestamp_fail_to_decode() {
        let catalog = WorkflowCatalog::standard();
        let schema = SubmissionSchema::new(catalog.get("order").expect("defined"));
        let row = vec!["ORD-20250101-001".to_owned(), "1/1/2025 10:15".to_owned()];
        assert!(schema.decode(3, &row).is_err());
    }
}
