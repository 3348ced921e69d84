use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::{EmployeeLocation, LocationAttribute, Role};
use crate::domain::location::LocationNode;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("role `{role}` requires location attribute `{required_attribute}`")]
pub struct MissingLocationError {
    pub role: Role,
    pub required_attribute: LocationAttribute,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    pub role: Role,
    pub id_prefix: String,
    #[serde(default = "default_sequence_start")]
    pub sequence_start: u32,
    #[serde(default)]
    pub required_attribute: Option<LocationAttribute>,
    #[serde(default = "default_true")]
    pub filter_by_business_unit: bool,
}

impl RolePolicy {
    pub fn new(role: &str, id_prefix: &str, required_attribute: Option<LocationAttribute>) -> Self {
        Self {
            role: Role::new(role),
            id_prefix: id_prefix.to_owned(),
            sequence_start: default_sequence_start(),
            required_attribute,
            filter_by_business_unit: true,
        }
    }
}

fn default_sequence_start() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Role table and notification order, loaded once at startup and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgPolicy {
    pub roles: Vec<RolePolicy>,
    pub chain_order: Vec<Role>,
}

impl Default for OrgPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl OrgPolicy {
    pub fn standard() -> Self {
        use LocationAttribute::{Area, BdTerritory, CroTerritory, District, Territory};

        let roles = vec![
            RolePolicy::new(Role::SR, "SR", Some(Territory)),
            RolePolicy::new(Role::ASM, "ASM", Some(Area)),
            RolePolicy::new(Role::ZSM, "ZSM", Some(District)),
            RolePolicy::new(Role::BDO, "BDO", Some(BdTerritory)),
            RolePolicy::new(Role::CRO, "CRO", Some(CroTerritory)),
            RolePolicy {
                sequence_start: 900,
                filter_by_business_unit: false,
                ..RolePolicy::new("ADMIN", "ADM", None)
            },
        ];
        let chain_order = [Role::SR, Role::ASM, Role::ZSM, Role::BDO, Role::CRO]
            .into_iter()
            .map(Role::new)
            .collect();

        Self { roles, chain_order }
    }

    pub fn role(&self, role: &Role) -> Option<&RolePolicy> {
        self.roles.iter().find(|policy| &policy.role == role)
    }

    pub fn validator(&self) -> RoleLocationValidator {
        RoleLocationValidator::from_policy(self)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.roles.is_empty() {
            return Err("organization.roles must define at least one role".to_string());
        }

        let mut seen_roles = HashSet::new();
        let mut seen_prefixes = HashSet::new();
        for policy in &self.roles {
            if policy.role.as_str().is_empty() {
                return Err("organization.roles entries need a non-empty role".to_string());
            }
            if !seen_roles.insert(policy.role.clone()) {
                return Err(format!("organization.roles defines `{}` twice", policy.role));
            }
            if !is_id_prefix(&policy.id_prefix) {
                return Err(format!(
                    "organization.roles `{}` id_prefix `{}` must be 2-4 uppercase letters",
                    policy.role, policy.id_prefix
                ));
            }
            if !seen_prefixes.insert(policy.id_prefix.clone()) {
                return Err(format!(
                    "organization.roles id_prefix `{}` is used by more than one role",
                    policy.id_prefix
                ));
            }
            if !(1..=999).contains(&policy.sequence_start) {
                return Err(format!(
                    "organization.roles `{}` sequence_start must be in range 1..=999",
                    policy.role
                ));
            }
        }

        for role in &self.chain_order {
            if self.role(role).is_none() {
                return Err(format!("organization.chain_order names unknown role `{role}`"));
            }
        }

        Ok(())
    }
}

pub(crate) fn is_id_prefix(prefix: &str) -> bool {
    (2..=4).contains(&prefix.len()) && prefix.bytes().all(|byte| byte.is_ascii_uppercase())
}

/// Enforces the role → required location attribute table.
#[derive(Clone, Debug, Default)]
pub struct RoleLocationValidator {
    requirements: HashMap<Role, LocationAttribute>,
}

impl RoleLocationValidator {
    pub fn from_policy(policy: &OrgPolicy) -> Self {
        let requirements = policy
            .roles
            .iter()
            .filter_map(|role| role.required_attribute.map(|attribute| (role.role.clone(), attribute)))
            .collect();
        Self { requirements }
    }

    pub fn required_attribute(&self, role: &Role) -> Option<LocationAttribute> {
        self.requirements.get(role).copied()
    }

    pub fn validate(
        &self,
        role: &Role,
        location: &EmployeeLocation,
    ) -> Result<(), MissingLocationError> {
        let Some(required_attribute) = self.required_attribute(role) else {
            return Ok(());
        };

        match location.get(required_attribute) {
            Some(_) => Ok(()),
            None => Err(MissingLocationError { role: role.clone(), required_attribute }),
        }
    }

    /// The attribute and value a chain tier for `role` is matched on, if the node carries it.
    pub fn routing_key<'a>(
        &self,
        role: &Role,
        node: &'a LocationNode,
    ) -> Option<(LocationAttribute, &'a str)> {
        let attribute = self.required_attribute(role)?;
        node.value(attribute).map(|value| (attribute, value))
    }
}
