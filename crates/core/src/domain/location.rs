use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::employee::LocationAttribute;

/// One Location Map row: the territory tree plus the two parallel partitions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationNode {
    pub zone: String,
    pub district: String,
    pub area: String,
    pub territory: String,
    pub bazaar: String,
    pub upazilla: String,
    pub bd_territory: String,
    pub cro_territory: String,
    pub business_unit: String,
}

impl LocationNode {
    pub fn value(&self, attribute: LocationAttribute) -> Option<&str> {
        let value = match attribute {
            LocationAttribute::Zone => &self.zone,
            LocationAttribute::District => &self.district,
            LocationAttribute::Area => &self.area,
            LocationAttribute::Territory => &self.territory,
            LocationAttribute::Bazaar => &self.bazaar,
            LocationAttribute::Upazilla => &self.upazilla,
            LocationAttribute::BdTerritory => &self.bd_territory,
            LocationAttribute::CroTerritory => &self.cro_territory,
        };
        Some(value.as_str()).filter(|value| !value.trim().is_empty())
    }
}

/// Levels a caller may start hierarchy expansion from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    #[default]
    Territory,
    Area,
    District,
    Zone,
    BdTerritory,
    CroTerritory,
}

impl HierarchyLevel {
    pub fn attribute(&self) -> LocationAttribute {
        match self {
            Self::Territory => LocationAttribute::Territory,
            Self::Area => LocationAttribute::Area,
            Self::District => LocationAttribute::District,
            Self::Zone => LocationAttribute::Zone,
            Self::BdTerritory => LocationAttribute::BdTerritory,
            Self::CroTerritory => LocationAttribute::CroTerritory,
        }
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute().as_str())
    }
}

impl std::str::FromStr for HierarchyLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.parse::<LocationAttribute>()? {
            LocationAttribute::Territory => Ok(Self::Territory),
            LocationAttribute::Area => Ok(Self::Area),
            LocationAttribute::District => Ok(Self::District),
            LocationAttribute::Zone => Ok(Self::Zone),
            LocationAttribute::BdTerritory => Ok(Self::BdTerritory),
            LocationAttribute::CroTerritory => Ok(Self::CroTerritory),
            other => Err(format!("`{other}` is not a hierarchy level")),
        }
    }
}

/// A partial location descriptor: one value at one level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationQuery {
    pub level: HierarchyLevel,
    pub value: String,
}

impl LocationQuery {
    pub fn new(level: HierarchyLevel, value: impl Into<String>) -> Self {
        Self { level, value: value.into() }
    }

    pub fn territory(value: impl Into<String>) -> Self {
        Self::new(HierarchyLevel::Territory, value)
    }
}

impl fmt::Display for LocationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.level, self.value)
    }
}
