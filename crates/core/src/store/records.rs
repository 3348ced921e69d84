//! Row codecs for the directory tables.

use crate::domain::employee::{
    Employee, EmployeeId, EmployeeLocation, EmployeeStatus, LocationAttribute, Role,
};
use crate::domain::location::LocationNode;

use super::{Row, StoreError, EMPLOYEES_TABLE, LOCATION_MAP_TABLE};

pub const EMPLOYEE_HEADERS: [&str; 16] = [
    "ID",
    "Name",
    "Role",
    "Email",
    "Contact Number",
    "WhatsApp Number",
    "Status",
    "Zone",
    "District",
    "Area",
    "Territory",
    "Bazaar",
    "Upazilla",
    "BD Territory",
    "CRO Territory",
    "Business Unit",
];

pub const EMPLOYEE_STATUS_COLUMN: usize = 6;
const EMPLOYEE_LOCATION_START: usize = 7;
const EMPLOYEE_BUSINESS_UNIT_COLUMN: usize = 15;

pub const LOCATION_MAP_HEADERS: [&str; 9] = [
    "Zone",
    "District",
    "Area",
    "Territory",
    "Bazaar",
    "Upazilla",
    "BD Territory",
    "CRO Territory",
    "Business Unit",
];

pub fn employee_headers() -> Vec<String> {
    EMPLOYEE_HEADERS.iter().map(|header| (*header).to_owned()).collect()
}

pub fn location_map_headers() -> Vec<String> {
    LOCATION_MAP_HEADERS.iter().map(|header| (*header).to_owned()).collect()
}

fn cell(row: &Row, column: usize) -> &str {
    row.get(column).map(|value| value.trim()).unwrap_or("")
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

/// Rows with every cell blank are padding left behind by sheet editors.
pub fn is_blank(row: &Row) -> bool {
    row.iter().all(|value| value.trim().is_empty())
}

pub fn decode_employee(index: usize, row: &Row) -> Result<Employee, StoreError> {
    let decode_error = |message: &str| StoreError::Decode {
        table: EMPLOYEES_TABLE.to_owned(),
        row: index,
        message: message.to_owned(),
    };

    let id = cell(row, 0);
    if id.is_empty() {
        return Err(decode_error("employee id is blank"));
    }
    let role = cell(row, 2);
    if role.is_empty() {
        return Err(decode_error("employee role is blank"));
    }

    let mut location = EmployeeLocation::default();
    for (offset, attribute) in LocationAttribute::ALL.into_iter().enumerate() {
        location.set(attribute, optional(cell(row, EMPLOYEE_LOCATION_START + offset)));
    }

    Ok(Employee {
        id: EmployeeId(id.to_owned()),
        name: cell(row, 1).to_owned(),
        role: Role::new(role),
        email: cell(row, 3).to_owned(),
        contact_number: cell(row, 4).to_owned(),
        whatsapp_number: optional(cell(row, 5)),
        status: EmployeeStatus::parse(cell(row, EMPLOYEE_STATUS_COLUMN)),
        location,
        business_unit: optional(cell(row, EMPLOYEE_BUSINESS_UNIT_COLUMN)),
    })
}

pub fn encode_employee(employee: &Employee) -> Row {
    let mut row = vec![
        employee.id.0.clone(),
        employee.name.clone(),
        employee.role.to_string(),
        employee.email.clone(),
        employee.contact_number.clone(),
        employee.whatsapp_number.clone().unwrap_or_default(),
        employee.status.as_str().to_owned(),
    ];
    row.extend(
        LocationAttribute::ALL
            .into_iter()
            .map(|attribute| employee.location.get(attribute).unwrap_or("").to_owned()),
    );
    row.push(employee.business_unit.clone().unwrap_or_default());
    row
}

pub fn decode_location_node(index: usize, row: &Row) -> Result<LocationNode, StoreError> {
    let node = LocationNode {
        zone: cell(row, 0).to_owned(),
        district: cell(row, 1).to_owned(),
        area: cell(row, 2).to_owned(),
        territory: cell(row, 3).to_owned(),
        bazaar: cell(row, 4).to_owned(),
        upazilla: cell(row, 5).to_owned(),
        bd_territory: cell(row, 6).to_owned(),
        cro_territory: cell(row, 7).to_owned(),
        business_unit: cell(row, 8).to_owned(),
    };
    if node.territory.is_empty() {
        return Err(StoreError::Decode {
            table: LOCATION_MAP_TABLE.to_owned(),
            row: index,
            message: "territory is blank".to_owned(),
        });
    }
    Ok(node)
}

pub fn encode_location_node(node: &LocationNode) -> Row {
    vec![
        node.zone.clone(),
        node.district.clone(),
        node.area.clone(),
        node.territory.clone(),
        node.bazaar.clone(),
        node.upazilla.clone(),
        node.bd_territory.clone(),
        node.cro_territory.clone(),
        node.business_unit.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::{decode_employee, decode_location_node, encode_employee, is_blank};
    use crate::domain::employee::{EmployeeStatus, LocationAttribute};
    use crate::store::StoreError;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| (*cell).to_owned()).collect()
    }

    #[test]
    fn employee_row_decodes_named_columns_and_tolerates_short_rows() {
        let employee = decode_employee(
            0,
            &row(&["SR001", "Rahim", "sr", "rahim@example.com", "01711000000", "", "Active", "Khulna", "", "", "Kushtia-01"]),
        )
        .expect("decodes");

        assert_eq!(employee.role.as_str(), "SR");
        assert_eq!(employee.status, EmployeeStatus::Active);
        assert_eq!(employee.whatsapp_number, None);
        assert_eq!(employee.location_value(LocationAttribute::Territory), Some("Kushtia-01"));
        assert_eq!(employee.location_value(LocationAttribute::Zone), Some("Khulna"));
        assert_eq!(employee.business_unit, None);

        let encoded = encode_employee(&employee);
        assert_eq!(encoded.len(), 16);
        assert_eq!(encoded[10], "Kushtia-01");
    }

    #[test]
    fn employee_row_without_id_is_a_decode_error() {
        let error = decode_employee(4, &row(&["", "Nobody", "SR"])).expect_err("blank id");
        assert!(matches!(error, StoreError::Decode { row: 4, .. }));
        assert!(is_blank(&row(&["", "  "])));
    }

    #[test]
    fn location_row_requires_territory() {
        let node = decode_location_node(
            0,
            &row(&["Khulna", "Jhenaidah", "Kushtia", "Kushtia-01", "", "", "BD1", "CRO1", "ACL"]),
        )
        .expect("decodes");
        assert_eq!(node.bd_territory, "BD1");
        assert_eq!(node.business_unit, "ACL");

        assert!(decode_location_node(1, &row(&["Khulna", "Jhenaidah"])).is_err());
    }
}
