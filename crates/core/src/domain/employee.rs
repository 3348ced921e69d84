use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn compose(prefix: &str, sequence: u32) -> Self {
        Self(format!("{prefix}{sequence:03}"))
    }

    /// Splits `SR012` into `("SR", 12)`; `None` for anything outside `^[A-Z]{2,4}\d{3}$`.
    pub fn parts(&self) -> Option<(&str, u32)> {
        let split = self.0.find(|ch: char| ch.is_ascii_digit())?;
        let (prefix, digits) = self.0.split_at(split);
        let well_formed = (2..=4).contains(&prefix.len())
            && prefix.bytes().all(|byte| byte.is_ascii_uppercase())
            && digits.len() == 3
            && digits.bytes().all(|byte| byte.is_ascii_digit());
        if !well_formed {
            return None;
        }

        digits.parse().ok().map(|sequence| (prefix, sequence))
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Organisational role code such as `SR` or `ZSM`. Stored trimmed and upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Role(String);

impl Role {
    pub const SR: &'static str = "SR";
    pub const ASM: &'static str = "ASM";
    pub const ZSM: &'static str = "ZSM";
    pub const BDO: &'static str = "BDO";
    pub const CRO: &'static str = "CRO";

    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeStatus {
    Active,
    Inactive,
}

impl EmployeeStatus {
    /// Anything other than the literal `Active` counts as inactive.
    pub fn parse(raw: &str) -> Self {
        if raw.trim() == "Active" {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }
}

/// Location columns an employee can be routed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationAttribute {
    Zone,
    District,
    Area,
    Territory,
    Bazaar,
    Upazilla,
    BdTerritory,
    CroTerritory,
}

impl LocationAttribute {
    pub const ALL: [LocationAttribute; 8] = [
        Self::Zone,
        Self::District,
        Self::Area,
        Self::Territory,
        Self::Bazaar,
        Self::Upazilla,
        Self::BdTerritory,
        Self::CroTerritory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zone => "zone",
            Self::District => "district",
            Self::Area => "area",
            Self::Territory => "territory",
            Self::Bazaar => "bazaar",
            Self::Upazilla => "upazilla",
            Self::BdTerritory => "bdTerritory",
            Self::CroTerritory => "croTerritory",
        }
    }
}

impl fmt::Display for LocationAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LocationAttribute {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key: String = value
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .map(|ch| ch.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "zone" => Ok(Self::Zone),
            "district" => Ok(Self::District),
            "area" => Ok(Self::Area),
            "territory" => Ok(Self::Territory),
            "bazaar" => Ok(Self::Bazaar),
            "upazilla" => Ok(Self::Upazilla),
            "bdterritory" => Ok(Self::BdTerritory),
            "croterritory" => Ok(Self::CroTerritory),
            _ => Err(format!("unknown location attribute `{value}`")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeLocation {
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub territory: Option<String>,
    #[serde(default)]
    pub bazaar: Option<String>,
    #[serde(default)]
    pub upazilla: Option<String>,
    #[serde(default)]
    pub bd_territory: Option<String>,
    #[serde(default)]
    pub cro_territory: Option<String>,
}

impl EmployeeLocation {
    /// Blank values read as absent.
    pub fn get(&self, attribute: LocationAttribute) -> Option<&str> {
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
        value.as_deref().filter(|value| !value.trim().is_empty())
    }

    pub fn set(&mut self, attribute: LocationAttribute, value: Option<String>) {
        let slot = match attribute {
            LocationAttribute::Zone => &mut self.zone,
            LocationAttribute::District => &mut self.district,
            LocationAttribute::Area => &mut self.area,
            LocationAttribute::Territory => &mut self.territory,
            LocationAttribute::Bazaar => &mut self.bazaar,
            LocationAttribute::Upazilla => &mut self.upazilla,
            LocationAttribute::BdTerritory => &mut self.bd_territory,
            LocationAttribute::CroTerritory => &mut self.cro_territory,
        };
        *slot = value;
    }

    pub fn with(mut self, attribute: LocationAttribute, value: impl Into<String>) -> Self {
        self.set(attribute, Some(value.into()));
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub role: Role,
    pub email: String,
    pub contact_number: String,
    pub whatsapp_number: Option<String>,
    pub status: EmployeeStatus,
    pub location: EmployeeLocation,
    pub business_unit: Option<String>,
}

impl Employee {
    pub fn is_active(&self) -> bool {
        self.status == EmployeeStatus::Active
    }

    pub fn location_value(&self, attribute: LocationAttribute) -> Option<&str> {
        self.location.get(attribute)
    }

    /// WhatsApp number, falling back to the plain contact number.
    pub fn messaging_address(&self) -> Option<&str> {
        self.whatsapp_number
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| Some(self.contact_number.as_str()).filter(|value| !value.trim().is_empty()))
    }
}

/// Input for a directory insert; the id and status are assigned by the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmployee {
    pub name: String,
    pub role: Role,
    pub email: String,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub whatsapp_number: Option<String>,
    #[serde(flatten)]
    pub location: EmployeeLocation,
    #[serde(default)]
    pub business_unit: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub contact_number: Option<String>,
    pub whatsapp_number: Option<String>,
    pub location: Option<EmployeeLocation>,
    pub business_unit: Option<String>,
}
