//! Notification chain builder.
//!
//! Resolves a trigger location through the Location Map, then walks the chain order picking
//! employees whose required location attribute matches the resolved node. An unknown location
//! falls back to broadcasting every active employee of each role, filtered by business unit only.
//! A role with nobody at the resolved location is skipped, not broadcast.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::directory::EmployeeDirectory;
use crate::domain::employee::{Employee, EmployeeId, LocationAttribute, Role};
use crate::domain::location::{LocationNode, LocationQuery};
use crate::hierarchy::LocationMap;
use crate::roles::{OrgPolicy, RoleLocationValidator};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRequest {
    pub trigger: LocationQuery,
    #[serde(default)]
    pub business_unit: Option<String>,
    /// Roles to include; empty means the whole chain order.
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl ChainRequest {
    pub fn new(trigger: LocationQuery, business_unit: Option<String>) -> Self {
        Self { trigger, business_unit, roles: Vec::new() }
    }

    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainResolution {
    Hierarchy { node: LocationNode },
    Fallback,
    /// The directory or location map could not be read; nobody on staff is notified.
    Unavailable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub employee_id: EmployeeId,
    pub name: String,
    pub address: Option<String>,
}

impl From<&Employee> for Recipient {
    fn from(employee: &Employee) -> Self {
        Self {
            employee_id: employee.id.clone(),
            name: employee.name.clone(),
            address: employee.messaging_address().map(str::to_owned),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainTier {
    pub role: Role,
    /// Attribute and value the tier was matched on; `None` for fallback tiers.
    pub matched_on: Option<(LocationAttribute, String)>,
    pub recipients: Vec<Recipient>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotificationChain {
    pub trigger: LocationQuery,
    pub business_unit: Option<String>,
    pub resolution: ChainResolution,
    pub tiers: Vec<ChainTier>,
}

impl NotificationChain {
    pub fn unavailable(request: &ChainRequest) -> Self {
        Self {
            trigger: request.trigger.clone(),
            business_unit: request.business_unit.clone(),
            resolution: ChainResolution::Unavailable,
            tiers: Vec::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.resolution == ChainResolution::Fallback
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Recipients with their tier role, once per tier occurrence.
    pub fn recipients(&self) -> impl Iterator<Item = (&Role, &Recipient)> {
        self.tiers.iter().flat_map(|tier| tier.recipients.iter().map(move |recipient| (&tier.role, recipient)))
    }

    pub fn recipient_count(&self) -> usize {
        self.tiers.iter().map(|tier| tier.recipients.len()).sum()
    }

    pub fn tier(&self, role: &Role) -> Option<&ChainTier> {
        self.tiers.iter().find(|tier| &tier.role == role)
    }
}

#[derive(Clone, Debug)]
pub struct ChainBuilder {
    policy: Arc<OrgPolicy>,
    validator: RoleLocationValidator,
}

impl ChainBuilder {
    pub fn new(policy: Arc<OrgPolicy>) -> Self {
        let validator = policy.validator();
        Self { policy, validator }
    }

    /// Pure over its inputs: the same directory, map and request always yield the same chain.
    pub fn build(
        &self,
        directory: &EmployeeDirectory,
        map: &LocationMap,
        request: &ChainRequest,
    ) -> NotificationChain {
        let business_unit = request
            .business_unit
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let roles = self.roles_in_order(&request.roles);

        let (resolution, tiers) = match map.expand(&request.trigger) {
            Some(node) => {
                let tiers = roles
                    .iter()
                    .filter_map(|role| self.hierarchy_tier(directory, node, role, business_unit))
                    .collect();
                (ChainResolution::Hierarchy { node: node.clone() }, tiers)
            }
            None => {
                warn!(
                    event_name = "routing.chain.fallback",
                    trigger = %request.trigger,
                    business_unit = business_unit.unwrap_or(""),
                    "location not in location map, broadcasting by role"
                );
                let tiers = roles
                    .iter()
                    .filter_map(|role| self.fallback_tier(directory, role, business_unit))
                    .collect();
                (ChainResolution::Fallback, tiers)
            }
        };

        let chain = NotificationChain {
            trigger: request.trigger.clone(),
            business_unit: business_unit.map(str::to_owned),
            resolution,
            tiers,
        };
        info!(
            event_name = "routing.chain.built",
            trigger = %chain.trigger,
            fallback = chain.is_fallback(),
            tiers = chain.tiers.len(),
            recipients = chain.recipient_count(),
            "notification chain built"
        );
        chain
    }

    fn roles_in_order(&self, requested: &[Role]) -> Vec<Role> {
        self.policy
            .chain_order
            .iter()
            .filter(|role| requested.is_empty() || requested.contains(role))
            .cloned()
            .collect()
    }

    fn hierarchy_tier(
        &self,
        directory: &EmployeeDirectory,
        node: &LocationNode,
        role: &Role,
        business_unit: Option<&str>,
    ) -> Option<ChainTier> {
        let Some((attribute, value)) = self.validator.routing_key(role, node) else {
            debug!(
                event_name = "routing.tier.unresolvable",
                role = %role,
                territory = %node.territory,
                "role has no location value on the resolved node"
            );
            return None;
        };

        let recipients: Vec<Recipient> = directory
            .find_by_location_attribute(attribute, value, std::slice::from_ref(role))
            .into_iter()
            .filter(|employee| self.in_business_unit(employee, business_unit))
            .map(Recipient::from)
            .collect();

        if recipients.is_empty() {
            warn!(
                event_name = "routing.tier.vacant",
                role = %role,
                attribute = %attribute,
                value,
                business_unit = business_unit.unwrap_or(""),
                "no active employee holds this tier"
            );
            return None;
        }

        Some(ChainTier {
            role: role.clone(),
            matched_on: Some((attribute, value.to_owned())),
            recipients,
        })
    }

    fn fallback_tier(
        &self,
        directory: &EmployeeDirectory,
        role: &Role,
        business_unit: Option<&str>,
    ) -> Option<ChainTier> {
        let recipients: Vec<Recipient> = directory
            .find_by_role(std::slice::from_ref(role))
            .into_iter()
            .filter(|employee| self.in_business_unit(employee, business_unit))
            .map(Recipient::from)
            .collect();

        (!recipients.is_empty()).then(|| ChainTier { role: role.clone(), matched_on: None, recipients })
    }

    fn in_business_unit(&self, employee: &Employee, business_unit: Option<&str>) -> bool {
        let Some(business_unit) = business_unit else {
            return true;
        };
        let filtered = self.policy.role(&employee.role).map_or(true, |policy| policy.filter_by_business_unit);
        !filtered || employee.business_unit.as_deref() == Some(business_unit)
    }
}
