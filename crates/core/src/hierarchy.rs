use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::domain::employee::LocationAttribute;
use crate::domain::location::{LocationNode, LocationQuery};
use crate::store::records::{decode_location_node, is_blank};
use crate::store::{Store, StoreError, LOCATION_MAP_TABLE};

/// A child value mapped to more than one parent, breaking the territory tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HierarchyViolation {
    pub child_level: LocationAttribute,
    pub child: String,
    pub parent_level: LocationAttribute,
    pub parents: Vec<String>,
}

/// Flat Location Map snapshot. Expansion is a scan that returns the first matching row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationMap {
    nodes: Vec<LocationNode>,
}

impl LocationMap {
    pub fn new(nodes: Vec<LocationNode>) -> Self {
        Self { nodes }
    }

    pub async fn load(store: &dyn Store) -> Result<Self, StoreError> {
        let rows = store.read(LOCATION_MAP_TABLE).await?;
        let mut nodes = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            if is_blank(row) {
                continue;
            }
            match decode_location_node(index, row) {
                Ok(node) => nodes.push(node),
                Err(error) => warn!(
                    event_name = "hierarchy.row.skipped",
                    row = index,
                    error = %error,
                    "skipping undecodable location map row"
                ),
            }
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[LocationNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `None` means the hierarchy is unknown for this value; callers fall back rather than fail.
    pub fn expand(&self, query: &LocationQuery) -> Option<&LocationNode> {
        let attribute = query.level.attribute();
        self.nodes.iter().find(|node| node.value(attribute) == Some(query.value.as_str()))
    }

    pub fn violations(&self) -> Vec<HierarchyViolation> {
        use LocationAttribute::{Area, District, Territory, Zone};

        [(Territory, Area), (Area, District), (District, Zone)]
            .into_iter()
            .flat_map(|(child_level, parent_level)| self.conflicts(child_level, parent_level))
            .collect()
    }

    fn conflicts(
        &self,
        child_level: LocationAttribute,
        parent_level: LocationAttribute,
    ) -> Vec<HierarchyViolation> {
        let mut parents_by_child: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for node in &self.nodes {
            let (Some(child), Some(parent)) = (node.value(child_level), node.value(parent_level))
            else {
                continue;
            };
            let parents = parents_by_child.entry(child).or_default();
            if !parents.iter().any(|known| known == parent) {
                parents.push(parent.to_owned());
            }
        }

        parents_by_child
            .into_iter()
            .filter(|(_, parents)| parents.len() > 1)
            .map(|(child, parents)| HierarchyViolation {
                child_level,
                child: child.to_owned(),
                parent_level,
                parents,
            })
            .collect()
    }
}
