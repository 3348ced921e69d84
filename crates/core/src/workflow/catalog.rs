use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::employee::Role;
use crate::domain::location::{HierarchyLevel, LocationQuery};
use crate::domain::submission::WorkflowKind;
use crate::notify::templates::{AudienceTemplates, MessageTemplates};
use crate::roles::{is_id_prefix, OrgPolicy};
use crate::routing::ChainRequest;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: &str, label: &str) -> Self {
        Self { name: name.to_owned(), label: label.to_owned(), required: true }
    }

    pub fn optional(name: &str, label: &str) -> Self {
        Self { name: name.to_owned(), label: label.to_owned(), required: false }
    }
}

/// One business form: where its records live and who hears about them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub kind: WorkflowKind,
    pub title: String,
    pub table: String,
    pub id_prefix: String,
    pub fields: Vec<FieldSpec>,
    pub location_field: String,
    #[serde(default)]
    pub location_level: HierarchyLevel,
    #[serde(default)]
    pub business_unit_field: Option<String>,
    /// Subset of the chain order; empty notifies the whole chain.
    #[serde(default)]
    pub notify_roles: Vec<Role>,
    #[serde(default)]
    pub submitter_contact_field: Option<String>,
    #[serde(default)]
    pub templates: MessageTemplates,
}

impl WorkflowDefinition {
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn chain_request(&self, location: &str, business_unit: Option<&str>) -> ChainRequest {
        ChainRequest::new(
            LocationQuery::new(self.location_level, location),
            business_unit.map(str::to_owned),
        )
        .with_roles(self.notify_roles.clone())
    }

    fn validate(&self, policy: &OrgPolicy) -> Result<(), String> {
        let kind = &self.kind;
        if kind.as_str().trim().is_empty() {
            return Err("workflows entries need a non-empty kind".to_owned());
        }
        if self.title.trim().is_empty() || self.table.trim().is_empty() {
            return Err(format!("workflow `{kind}` needs a title and a table"));
        }
        if !is_id_prefix(&self.id_prefix) {
            return Err(format!(
                "workflow `{kind}` id_prefix `{}` must be 2-4 uppercase letters",
                self.id_prefix
            ));
        }
        if self.fields.is_empty() {
            return Err(format!("workflow `{kind}` declares no fields"));
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(format!("workflow `{kind}` has a field without a name"));
            }
            if !names.insert(field.name.as_str()) {
                return Err(format!("workflow `{kind}` declares field `{}` twice", field.name));
            }
        }

        let referenced = [
            ("location_field", Some(&self.location_field)),
            ("business_unit_field", self.business_unit_field.as_ref()),
            ("submitter_contact_field", self.submitter_contact_field.as_ref()),
        ];
        for (setting, field) in referenced {
            if let Some(field) = field {
                if !names.contains(field.as_str()) {
                    return Err(format!(
                        "workflow `{kind}` {setting} `{field}` is not one of its fields"
                    ));
                }
            }
        }

        for role in &self.notify_roles {
            if !policy.chain_order.contains(role) {
                return Err(format!(
                    "workflow `{kind}` notify_roles names `{role}`, which is not in the chain order"
                ));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowCatalog {
    definitions: Vec<WorkflowDefinition>,
}

impl Default for WorkflowCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl WorkflowCatalog {
    pub fn new(definitions: Vec<WorkflowDefinition>) -> Self {
        Self { definitions }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            registration(),
            registration_update(),
            order(),
            dispute(),
            point_request(),
            demand_generation(),
        ])
    }

    pub fn definitions(&self) -> &[WorkflowDefinition] {
        &self.definitions
    }

    pub fn definitions_mut(&mut self) -> &mut Vec<WorkflowDefinition> {
        &mut self.definitions
    }

    pub fn get(&self, kind: &str) -> Option<&WorkflowDefinition> {
        self.definitions.iter().find(|definition| definition.kind.as_str() == kind)
    }

    pub fn validate(&self, policy: &OrgPolicy) -> Result<(), String> {
        if self.definitions.is_empty() {
            return Err("workflows must define at least one workflow".to_owned());
        }

        let mut kinds = HashSet::new();
        let mut prefixes = HashSet::new();
        let mut tables = HashSet::new();
        for definition in &self.definitions {
            definition.validate(policy)?;
            if !kinds.insert(definition.kind.as_str()) {
                return Err(format!("workflow `{}` is defined twice", definition.kind));
            }
            if !prefixes.insert(definition.id_prefix.as_str()) {
                return Err(format!(
                    "workflow id_prefix `{}` is used by more than one workflow",
                    definition.id_prefix
                ));
            }
            if !tables.insert(definition.table.as_str()) {
                return Err(format!("workflow table `{}` is used more than once", definition.table));
            }
        }

        Ok(())
    }
}

fn roles(codes: &[&str]) -> Vec<Role> {
    codes.iter().map(Role::new).collect()
}

fn registration() -> WorkflowDefinition {
    WorkflowDefinition {
        kind: WorkflowKind::new("registration"),
        title: "Dealer Registration".to_owned(),
        table: "Dealer Registrations".to_owned(),
        id_prefix: "REG".to_owned(),
        fields: vec![
            FieldSpec::required("dealer_name", "Dealer Name"),
            FieldSpec::required("owner_name", "Owner Name"),
            FieldSpec::required("contact_number", "Contact Number"),
            FieldSpec::optional("address", "Address"),
            FieldSpec::optional("trade_license", "Trade License"),
            FieldSpec::required("territory", "Territory"),
            FieldSpec::required("business_unit", "Business Unit"),
        ],
        location_field: "territory".to_owned(),
        location_level: HierarchyLevel::Territory,
        business_unit_field: Some("business_unit".to_owned()),
        notify_roles: roles(&["SR", "ASM", "ZSM"]),
        submitter_contact_field: Some("contact_number".to_owned()),
        templates: MessageTemplates {
            created: AudienceTemplates {
                submitter: "Dear {{ fields.owner_name }}, your registration for {{ fields.dealer_name }} ({{ id }}) was received and is pending review.".to_owned(),
                staff: "New dealer registration {{ id }}: {{ fields.dealer_name }}, {{ location }} ({{ business_unit | or_dash }}). Contact {{ fields.contact_number }}.".to_owned(),
            },
            ..MessageTemplates::default()
        },
    }
}

fn registration_update() -> WorkflowDefinition {
    WorkflowDefinition {
        kind: WorkflowKind::new("registration_update"),
        title: "Registration Update".to_owned(),
        table: "Registration Updates".to_owned(),
        id_prefix: "UPD".to_owned(),
        fields: vec![
            FieldSpec::required("dealer_code", "Dealer Code"),
            FieldSpec::optional("dealer_name", "Dealer Name"),
            FieldSpec::required("field_changed", "Field Changed"),
            FieldSpec::required("new_value", "New Value"),
            FieldSpec::required("territory", "Territory"),
            FieldSpec::optional("business_unit", "Business Unit"),
        ],
        location_field: "territory".to_owned(),
        location_level: HierarchyLevel::Territory,
        business_unit_field: Some("business_unit".to_owned()),
        notify_roles: roles(&["SR", "ASM"]),
        submitter_contact_field: None,
        templates: MessageTemplates::default(),
    }
}

fn order() -> WorkflowDefinition {
    WorkflowDefinition {
        kind: WorkflowKind::new("order"),
        title: "Order".to_owned(),
        table: "Orders".to_owned(),
        id_prefix: "ORD".to_owned(),
        fields: vec![
            FieldSpec::required("dealer_code", "Dealer Code"),
            FieldSpec::required("product", "Product"),
            FieldSpec::required("quantity", "Quantity"),
            FieldSpec::optional("delivery_date", "Delivery Date"),
            FieldSpec::required("territory", "Territory"),
            FieldSpec::required("business_unit", "Business Unit"),
        ],
        location_field: "territory".to_owned(),
        location_level: HierarchyLevel::Territory,
        business_unit_field: Some("business_unit".to_owned()),
        notify_roles: roles(&["SR", "ASM", "ZSM", "CRO"]),
        submitter_contact_field: None,
        templates: MessageTemplates {
            created: AudienceTemplates {
                submitter: "Your order {{ id }} for {{ fields.quantity }} x {{ fields.product }} was received and is pending review.".to_owned(),
                staff: "New order {{ id }} from dealer {{ fields.dealer_code }}: {{ fields.quantity }} x {{ fields.product }} in {{ location }}.".to_owned(),
            },
            ..MessageTemplates::default()
        },
    }
}

fn dispute() -> WorkflowDefinition {
    WorkflowDefinition {
        kind: WorkflowKind::new("dispute"),
        title: "Dispute".to_owned(),
        table: "Disputes".to_owned(),
        id_prefix: "DSP".to_owned(),
        fields: vec![
            FieldSpec::required("dealer_code", "Dealer Code"),
            FieldSpec::required("dispute_type", "Dispute Type"),
            FieldSpec::required("description", "Description"),
            FieldSpec::optional("amount", "Amount"),
            FieldSpec::required("territory", "Territory"),
            FieldSpec::optional("business_unit", "Business Unit"),
        ],
        location_field: "territory".to_owned(),
        location_level: HierarchyLevel::Territory,
        business_unit_field: Some("business_unit".to_owned()),
        notify_roles: roles(&["SR", "ASM", "ZSM", "CRO"]),
        submitter_contact_field: None,
        templates: MessageTemplates::default(),
    }
}

fn point_request() -> WorkflowDefinition {
    WorkflowDefinition {
        kind: WorkflowKind::new("point_request"),
        title: "Point Request".to_owned(),
        table: "Point Requests".to_owned(),
        id_prefix: "PNT".to_owned(),
        fields: vec![
            FieldSpec::required("dealer_code", "Dealer Code"),
            FieldSpec::required("points", "Points"),
            FieldSpec::optional("reason", "Reason"),
            FieldSpec::required("territory", "Territory"),
            FieldSpec::optional("business_unit", "Business Unit"),
        ],
        location_field: "territory".to_owned(),
        location_level: HierarchyLevel::Territory,
        business_unit_field: Some("business_unit".to_owned()),
        notify_roles: roles(&["SR", "ASM", "BDO"]),
        submitter_contact_field: None,
        templates: MessageTemplates::default(),
    }
}

fn demand_generation() -> WorkflowDefinition {
    WorkflowDefinition {
        kind: WorkflowKind::new("demand_generation"),
        title: "Demand Generation Request".to_owned(),
        table: "Demand Generation Requests".to_owned(),
        id_prefix: "DGR".to_owned(),
        fields: vec![
            FieldSpec::required("requester_name", "Requester Name"),
            FieldSpec::required("activity", "Activity"),
            FieldSpec::optional("budget", "Budget"),
            FieldSpec::optional("bazaar", "Bazaar"),
            FieldSpec::optional("upazilla", "Upazilla"),
            FieldSpec::required("territory", "Territory"),
            FieldSpec::required("business_unit", "Business Unit"),
        ],
        location_field: "territory".to_owned(),
        location_level: HierarchyLevel::Territory,
        business_unit_field: Some("business_unit".to_owned()),
        notify_roles: Vec::new(),
        submitter_contact_field: None,
        templates: MessageTemplates {
            created: AudienceTemplates {
                submitter: "Your demand generation request {{ id }} ({{ fields.activity }}) was received and is pending review.".to_owned(),
                staff: "Demand generation request {{ id }} by {{ fields.requester_name }}: {{ fields.activity }} in {{ location }}, budget {{ fields.budget | or_dash }}.".to_owned(),
            },
            ..MessageTemplates::default()
        },
    }
}
