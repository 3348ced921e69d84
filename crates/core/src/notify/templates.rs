use std::collections::HashMap;
use std::error::Error as _;
use std::fmt;

use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::employee::Role;
use crate::domain::submission::Submission;
use crate::flows::EventKind;
use crate::workflow::catalog::{WorkflowCatalog, WorkflowDefinition};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Submitter,
    Staff,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitter => "submitter",
            Self::Staff => "staff",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceTemplates {
    pub submitter: String,
    pub staff: String,
}

impl AudienceTemplates {
    pub fn get(&self, audience: Audience) -> &str {
        match audience {
            Audience::Submitter => &self.submitter,
            Audience::Staff => &self.staff,
        }
    }
}

/// Tera sources for one workflow, keyed by event kind and audience.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplates {
    pub created: AudienceTemplates,
    pub approved: AudienceTemplates,
    pub rejected: AudienceTemplates,
}

impl MessageTemplates {
    pub fn get(&self, event: EventKind, audience: Audience) -> &str {
        let templates = match event {
            EventKind::Created => &self.created,
            EventKind::Approved => &self.approved,
            EventKind::Rejected => &self.rejected,
        };
        templates.get(audience)
    }
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            created: AudienceTemplates {
                submitter: "Your {{ title }} {{ id }} was received on {{ timestamp }} and is pending review.".to_owned(),
                staff: "New {{ title }} {{ id }} from {{ submitter_email }} for {{ location | or_dash }}{% if business_unit %} ({{ business_unit }}){% endif %}. Status: {{ status }}.".to_owned(),
            },
            approved: AudienceTemplates {
                submitter: "Your {{ title }} {{ id }} has been approved.{% if notes %} Notes: {{ notes }}{% endif %}".to_owned(),
                staff: "{{ title }} {{ id }} for {{ location | or_dash }} was approved.".to_owned(),
            },
            rejected: AudienceTemplates {
                submitter: "Your {{ title }} {{ id }} was rejected.{% if notes %} Reason: {{ notes }}{% endif %}".to_owned(),
                staff: "{{ title }} {{ id }} for {{ location | or_dash }} was rejected.".to_owned(),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template `{name}` does not compile: {message}")]
    Compile { name: String, message: String },
    #[error("template `{name}` failed to render: {message}")]
    Render { name: String, message: String },
}

/// Per-recipient values interpolated alongside the submission.
#[derive(Clone, Debug, Default)]
pub struct RecipientContext<'a> {
    pub name: Option<&'a str>,
    pub role: Option<&'a Role>,
}

/// Compiled message templates for every workflow in the catalog.
#[derive(Clone, Debug)]
pub struct MessageRenderer {
    tera: Tera,
    titles: HashMap<String, String>,
}

impl MessageRenderer {
    pub fn new(catalog: &WorkflowCatalog) -> Result<Self, TemplateError> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        tera.register_filter("or_dash", or_dash_filter);

        let mut titles = HashMap::new();
        for definition in catalog.definitions() {
            register_workflow(&mut tera, definition)?;
            titles.insert(definition.kind.as_str().to_owned(), definition.title.clone());
        }

        Ok(Self { tera, titles })
    }

    pub fn template_name(workflow: &str, event: EventKind, audience: Audience) -> String {
        format!("{workflow}.{}.{audience}", event.as_str())
    }

    pub fn render(
        &self,
        submission: &Submission,
        event: EventKind,
        audience: Audience,
        recipient: &RecipientContext<'_>,
    ) -> Result<String, TemplateError> {
        let name = Self::template_name(submission.workflow.as_str(), event, audience);
        let title = self
            .titles
            .get(submission.workflow.as_str())
            .cloned()
            .unwrap_or_else(|| submission.workflow.to_string());

        let mut context = Context::new();
        context.insert("id", &submission.id.0);
        context.insert("title", &title);
        context.insert("workflow", submission.workflow.as_str());
        context.insert("status", event.status_label());
        context.insert("timestamp", &submission.timestamp.format("%Y-%m-%d %H:%M").to_string());
        context.insert("submitter_email", &submission.submitter_email);
        context.insert("location", &submission.location);
        context.insert("business_unit", &submission.business_unit);
        context.insert("notes", &submission.notes);
        context.insert("fields", &submission.fields);
        context.insert("recipient_name", &recipient.name.unwrap_or(""));
        context.insert("role", &recipient.role.map(Role::as_str).unwrap_or(""));

        self.tera
            .render(&name, &context)
            .map(|text| text.trim().to_owned())
            .map_err(|error| TemplateError::Render { name, message: error_chain(&error) })
    }
}

fn register_workflow(tera: &mut Tera, definition: &WorkflowDefinition) -> Result<(), TemplateError> {
    for event in [EventKind::Created, EventKind::Approved, EventKind::Rejected] {
        for audience in [Audience::Submitter, Audience::Staff] {
            let name = MessageRenderer::template_name(definition.kind.as_str(), event, audience);
            tera.add_raw_template(&name, definition.templates.get(event, audience))
                .map_err(|error| TemplateError::Compile { name, message: error_chain(&error) })?;
        }
    }
    Ok(())
}

fn error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Renders blank strings and nulls as `-`.
fn or_dash_filter(value: &tera::Value, _args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
    let text = match value {
        tera::Value::String(text) if !text.trim().is_empty() => text.clone(),
        tera::Value::Null | tera::Value::String(_) => "-".to_owned(),
        other => other.to_string(),
    };
    Ok(tera::Value::String(text))
}
