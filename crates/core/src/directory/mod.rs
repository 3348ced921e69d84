//! Employee directory: an in-table-order snapshot with linear lookups over active employees.

use tracing::warn;

use crate::domain::employee::{Employee, EmployeeId, LocationAttribute, Role};
use crate::errors::DomainError;
use crate::roles::RolePolicy;
use crate::store::records::{decode_employee, is_blank};
use crate::store::{Store, StoreError, EMPLOYEES_TABLE};

pub mod service;

pub use service::{DirectoryService, ImportOutcome, ImportReport, LegacyEmployee};

const MAX_EMPLOYEE_SEQUENCE: u32 = 999;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    row: usize,
    employee: Employee,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmployeeDirectory {
    entries: Vec<Entry>,
}

impl EmployeeDirectory {
    /// Builds a snapshot whose row positions follow the vector order.
    pub fn new(employees: Vec<Employee>) -> Self {
        let entries = employees
            .into_iter()
            .enumerate()
            .map(|(row, employee)| Entry { row, employee })
            .collect();
        Self { entries }
    }

    pub async fn load(store: &dyn Store) -> Result<Self, StoreError> {
        let rows = store.read(EMPLOYEES_TABLE).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for (row, cells) in rows.iter().enumerate() {
            if is_blank(cells) {
                continue;
            }
            match decode_employee(row, cells) {
                Ok(employee) => entries.push(Entry { row, employee }),
                Err(error) => warn!(
                    event_name = "directory.row.skipped",
                    row,
                    error = %error,
                    "skipping undecodable employee row"
                ),
            }
        }
        Ok(Self { entries })
    }

    pub(crate) fn push(&mut self, row: usize, employee: Employee) {
        self.entries.push(Entry { row, employee });
    }

    /// Every employee, inactive ones included, in table order.
    pub fn all(&self) -> impl Iterator<Item = &Employee> {
        self.entries.iter().map(|entry| &entry.employee)
    }

    pub fn active(&self) -> impl Iterator<Item = &Employee> {
        self.all().filter(|employee| employee.is_active())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Table row and record for `id`, regardless of status.
    pub fn locate(&self, id: &EmployeeId) -> Option<(usize, &Employee)> {
        self.entries
            .iter()
            .find(|entry| &entry.employee.id == id)
            .map(|entry| (entry.row, &entry.employee))
    }

    pub fn find_by_id(&self, id: &EmployeeId) -> Option<&Employee> {
        self.active().find(|employee| &employee.id == id)
    }

    /// Case-insensitive on the trimmed address.
    pub fn find_by_email(&self, email: &str) -> Option<&Employee> {
        let wanted = email.trim();
        if wanted.is_empty() {
            return None;
        }
        self.active().find(|employee| employee.email.trim().eq_ignore_ascii_case(wanted))
    }

    pub fn find_by_role(&self, roles: &[Role]) -> Vec<&Employee> {
        self.active().filter(|employee| roles.contains(&employee.role)).collect()
    }

    /// Exact, case-sensitive match on the attribute value. An empty `roles` slice matches any role.
    pub fn find_by_location_attribute(
        &self,
        attribute: LocationAttribute,
        value: &str,
        roles: &[Role],
    ) -> Vec<&Employee> {
        self.active()
            .filter(|employee| roles.is_empty() || roles.contains(&employee.role))
            .filter(|employee| employee.location_value(attribute) == Some(value))
            .collect()
    }

    /// Highest existing sequence for the role's prefix plus one, or the role's start number.
    pub fn next_id(&self, policy: &RolePolicy) -> Result<EmployeeId, DomainError> {
        let highest = self
            .all()
            .filter_map(|employee| employee.id.parts())
            .filter(|(prefix, _)| *prefix == policy.id_prefix)
            .map(|(_, sequence)| sequence)
            .max();

        let next = highest.map_or(policy.sequence_start, |sequence| sequence + 1);
        if next > MAX_EMPLOYEE_SEQUENCE {
            return Err(DomainError::SequenceExhausted { prefix: policy.id_prefix.clone() });
        }
        Ok(EmployeeId::compose(&policy.id_prefix, next))
    }
}

#[cfg(test)]
mod tests {
    use super::EmployeeDirectory;
    use crate::domain::employee::{
        Employee, EmployeeId, EmployeeLocation, EmployeeStatus, LocationAttribute, Role,
    };
    use crate::errors::DomainError;
    use crate::roles::{OrgPolicy, RolePolicy};

    fn employee(id: &str, role: &str, email: &str, territory: &str, status: EmployeeStatus) -> Employee {
        Employee {
            id: EmployeeId(id.to_owned()),
            name: format!("Employee {id}"),
            role: Role::new(role),
            email: email.to_owned(),
            contact_number: "01711000000".to_owned(),
            whatsapp_number: None,
            status,
            location: EmployeeLocation::default().with(LocationAttribute::Territory, territory),
            business_unit: Some("ACL".to_owned()),
        }
    }

    fn directory() -> EmployeeDirectory {
        EmployeeDirectory::new(vec![
            employee("SR001", "SR", "first@example.com", "Kushtia-01", EmployeeStatus::Active),
            employee("SR002", "SR", "gone@example.com", "Kushtia-01", EmployeeStatus::Inactive),
            employee("SR003", "SR", "third@example.com", "Kushtia-01", EmployeeStatus::Active),
            employee("ASM001", "ASM", "Boss@Example.com", "", EmployeeStatus::Active),
        ])
    }

    #[test]
    fn lookups_exclude_inactive_employees_and_keep_table_order() {
        let directory = directory();

        assert!(directory.find_by_id(&EmployeeId("SR002".to_owned())).is_none());
        assert!(directory.locate(&EmployeeId("SR002".to_owned())).is_some());

        let ids: Vec<&str> = directory
            .find_by_location_attribute(LocationAttribute::Territory, "Kushtia-01", &[Role::new("SR")])
            .into_iter()
            .map(|employee| employee.id.0.as_str())
            .collect();
        assert_eq!(ids, vec!["SR001", "SR003"]);

        assert_eq!(directory.find_by_role(&[Role::new("SR"), Role::new("ASM")]).len(), 3);
    }

    #[test]
    fn location_lookup_is_exact_match_only() {
        let directory = directory();
        for value in ["kushtia-01", "Kushtia", "Kushtia-01 "] {
            assert!(directory
                .find_by_location_attribute(LocationAttribute::Territory, value, &[])
                .is_empty());
        }
    }

    #[test]
    fn email_lookup_ignores_case_and_surrounding_space() {
        let directory = directory();
        let found = directory.find_by_email("  boss@example.COM ").expect("found");
        assert_eq!(found.id.0, "ASM001");
        assert!(directory.find_by_email("gone@example.com").is_none());
        assert!(directory.find_by_email("").is_none());
    }

    #[test]
    fn next_id_continues_after_highest_sequence_including_inactive() {
        let policy = OrgPolicy::standard();
        let sr = policy.role(&Role::new("SR")).expect("SR policy");
        assert_eq!(directory().next_id(sr).expect("id").0, "SR004");

        let admin = policy.role(&Role::new("ADMIN")).expect("ADMIN policy");
        assert_eq!(directory().next_id(admin).expect("id").0, "ADM900");
    }

    #[test]
    fn next_id_fails_once_the_three_digit_space_is_used() {
        let directory = EmployeeDirectory::new(vec![employee(
            "CRO999",
            "CRO",
            "c@example.com",
            "",
            EmployeeStatus::Active,
        )]);
        let policy = RolePolicy::new("CRO", "CRO", None);
        assert_eq!(
            directory.next_id(&policy),
            Err(DomainError::SequenceExhausted { prefix: "CRO".to_owned() })
        );
    }
}
