use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::employee::{Employee, EmployeeId, EmployeeStatus, NewEmployee};
use crate::domain::employee::EmployeeUpdate;
use crate::errors::{ApplicationError, DomainError};
use crate::roles::{OrgPolicy, RoleLocationValidator, RolePolicy};
use crate::store::records::{employee_headers, encode_employee, EMPLOYEE_STATUS_COLUMN};
use crate::store::{Store, EMPLOYEES_TABLE};

use super::EmployeeDirectory;

/// A row from a legacy approval sheet. Existing ids are kept when well formed and unused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyEmployee {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub employee: NewEmployee,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    Imported { index: usize, id: EmployeeId },
    Failed { index: usize, email: String, reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub outcomes: Vec<ImportOutcome>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ImportOutcome::Imported { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.imported()
    }
}

/// Directory maintenance against the Employees table.
#[derive(Clone)]
pub struct DirectoryService {
    store: Arc<dyn Store>,
    policy: Arc<OrgPolicy>,
    validator: RoleLocationValidator,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn Store>, policy: Arc<OrgPolicy>) -> Self {
        let validator = policy.validator();
        Self { store, policy, validator }
    }

    pub fn policy(&self) -> &OrgPolicy {
        &self.policy
    }

    pub async fn load(&self) -> Result<EmployeeDirectory, ApplicationError> {
        Ok(EmployeeDirectory::load(self.store.as_ref()).await?)
    }

    pub async fn add_employee(&self, input: NewEmployee) -> Result<Employee, ApplicationError> {
        let mut directory = self.load().await?;
        self.insert(&mut directory, None, input).await
    }

    /// Writes only the changed cells. The store has no multi-cell transaction, so a failed write
    /// restores the cells already written before the error is returned.
    pub async fn update_employee(
        &self,
        id: &EmployeeId,
        update: EmployeeUpdate,
    ) -> Result<Employee, ApplicationError> {
        let directory = self.load().await?;
        let (row, current) = directory
            .locate(id)
            .ok_or_else(|| DomainError::Validation(format!("unknown employee `{id}`")))?;

        let mut updated = current.clone();
        if let Some(name) = update.name {
            updated.name = name.trim().to_owned();
        }
        if let Some(email) = update.email {
            updated.email = email.trim().to_owned();
        }
        if let Some(contact_number) = update.contact_number {
            updated.contact_number = contact_number.trim().to_owned();
        }
        if let Some(whatsapp_number) = update.whatsapp_number {
            updated.whatsapp_number = non_blank(whatsapp_number);
        }
        if let Some(location) = update.location {
            updated.location = location;
        }
        if let Some(business_unit) = update.business_unit {
            updated.business_unit = non_blank(business_unit);
        }

        check_identity(&updated.name, &updated.email)?;
        self.validator.validate(&updated.role, &updated.location)?;

        let before = encode_employee(current);
        let after = encode_employee(&updated);
        let changed: Vec<(usize, &String, &String)> = before
            .iter()
            .zip(after.iter())
            .enumerate()
            .filter(|(_, (old, new))| old != new)
            .map(|(column, (old, new))| (column, old, new))
            .collect();
        for (written, (column, _, new)) in changed.iter().enumerate() {
            if let Err(error) = self.store.write_cell(EMPLOYEES_TABLE, row, *column, new).await {
                self.restore(row, &updated.id, &changed[..written]).await;
                return Err(error.into());
            }
        }

        info!(
            event_name = "directory.employee.updated",
            employee_id = %updated.id,
            role = %updated.role,
            "employee updated"
        );
        Ok(updated)
    }

    async fn restore(&self, row: usize, id: &EmployeeId, written: &[(usize, &String, &String)]) {
        for (column, old, _) in written {
            if let Err(error) = self.store.write_cell(EMPLOYEES_TABLE, row, *column, old).await {
                warn!(
                    event_name = "directory.employee.restore_failed",
                    employee_id = %id,
                    row,
                    column = *column,
                    error = %error,
                    "employee row left partially updated"
                );
            }
        }
    }

    /// Employees are never removed; deactivation only drops them from lookups.
    pub async fn deactivate_employee(&self, id: &EmployeeId) -> Result<Employee, ApplicationError> {
        let directory = self.load().await?;
        let (row, current) = directory
            .locate(id)
            .ok_or_else(|| DomainError::Validation(format!("unknown employee `{id}`")))?;

        let mut deactivated = current.clone();
        deactivated.status = EmployeeStatus::Inactive;
        self.store
            .write_cell(EMPLOYEES_TABLE, row, EMPLOYEE_STATUS_COLUMN, EmployeeStatus::Inactive.as_str())
            .await?;

        info!(
            event_name = "directory.employee.deactivated",
            employee_id = %deactivated.id,
            "employee deactivated"
        );
        Ok(deactivated)
    }

    /// Imports records one by one; a bad record is reported and does not stop the rest.
    pub async fn import_employees(
        &self,
        records: Vec<LegacyEmployee>,
    ) -> Result<ImportReport, ApplicationError> {
        let mut directory = self.load().await?;
        let mut report = ImportReport::default();

        for (index, record) in records.into_iter().enumerate() {
            let email = record.employee.email.clone();
            let outcome = match self.insert(&mut directory, record.id, record.employee).await {
                Ok(employee) => ImportOutcome::Imported { index, id: employee.id },
                Err(ApplicationError::Persistence(message)) => {
                    return Err(ApplicationError::Persistence(message));
                }
                Err(error) => ImportOutcome::Failed { index, email, reason: error.to_string() },
            };
            report.outcomes.push(outcome);
        }

        info!(
            event_name = "directory.import.completed",
            imported = report.imported(),
            failed = report.failed(),
            "employee import completed"
        );
        Ok(report)
    }

    async fn insert(
        &self,
        directory: &mut EmployeeDirectory,
        requested_id: Option<String>,
        input: NewEmployee,
    ) -> Result<Employee, ApplicationError> {
        let role_policy = self.role_policy(&input)?;
        check_identity(&input.name, &input.email)?;
        self.validator.validate(&input.role, &input.location)?;

        let id = match requested_id.map(|id| id.trim().to_owned()).filter(|id| !id.is_empty()) {
            Some(id) => reuse_id(directory, role_policy, id)?,
            None => directory.next_id(role_policy)?,
        };

        let employee = Employee {
            id,
            name: input.name.trim().to_owned(),
            role: input.role,
            email: input.email.trim().to_owned(),
            contact_number: input.contact_number.trim().to_owned(),
            whatsapp_number: input.whatsapp_number.and_then(non_blank),
            status: EmployeeStatus::Active,
            location: input.location,
            business_unit: input.business_unit.and_then(non_blank),
        };

        self.store.ensure_headers(EMPLOYEES_TABLE, &employee_headers()).await?;
        let row = self.store.append(EMPLOYEES_TABLE, encode_employee(&employee)).await?;
        directory.push(row, employee.clone());

        info!(
            event_name = "directory.employee.added",
            employee_id = %employee.id,
            role = %employee.role,
            "employee added"
        );
        Ok(employee)
    }

    fn role_policy(&self, input: &NewEmployee) -> Result<&RolePolicy, DomainError> {
        self.policy
            .role(&input.role)
            .ok_or_else(|| DomainError::Validation(format!("unknown role `{}`", input.role)))
    }
}

fn reuse_id(
    directory: &EmployeeDirectory,
    policy: &RolePolicy,
    raw: String,
) -> Result<EmployeeId, DomainError> {
    let id = EmployeeId(raw);
    match id.parts() {
        Some((prefix, _)) if prefix == policy.id_prefix => {}
        _ => {
            return Err(DomainError::Validation(format!(
                "employee id `{id}` does not match `{}` + three digits",
                policy.id_prefix
            )))
        }
    }
    if directory.locate(&id).is_some() {
        return Err(DomainError::Validation(format!("employee id `{id}` already exists")));
    }
    Ok(id)
}

fn check_identity(name: &str, email: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::Validation("employee name is required".to_owned()));
    }
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(DomainError::Validation(format!("employee email `{email}` is not valid")));
    }
    Ok(())
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
