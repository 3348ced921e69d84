//! Directory maintenance: `fieldrelay employee add` and `fieldrelay employee import`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use fieldrelay_core::store::records::employee_headers;
use fieldrelay_core::store::EMPLOYEES_TABLE;
use fieldrelay_core::{DirectoryService, LegacyEmployee, NewEmployee, Store};

use crate::commands::{load_config, open_store, runtime, to_data, CommandResult, Failure};

pub fn add(input: NewEmployee) -> CommandResult {
    with_directory("employee add", |directory| async move {
        let employee = directory
            .add_employee(input)
            .await
            .map_err(|error| ("employee_rejected", error.to_string(), 7u8))?;
        Ok((format!("added {} ({})", employee.id, employee.role), to_data(&employee)))
    })
}

/// Imports a JSON array of legacy sheet rows; a bad record is reported, never fatal.
pub fn import(path: &Path) -> CommandResult {
    let records = match read_legacy(path) {
        Ok(records) => records,
        Err(message) => {
            return CommandResult::failure("employee import", "invalid_input", message, 2)
        }
    };

    with_directory("employee import", |directory| async move {
        let report = directory
            .import_employees(records)
            .await
            .map_err(|error| ("store_write", error.to_string(), 6u8))?;
        Ok((
            format!("imported {}, failed {}", report.imported(), report.failed()),
            to_data(&report),
        ))
    })
}

fn read_legacy(path: &Path) -> Result<Vec<LegacyEmployee>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("failed to read `{}`: {error}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|error| format!("`{}` is not a JSON array of employees: {error}", path.display()))
}

fn with_directory<F, Fut>(command: &str, body: F) -> CommandResult
where
    F: FnOnce(DirectoryService) -> Fut,
    Fut: std::future::Future<Output = Result<(String, Option<serde_json::Value>), Failure>>,
{
    let config = match load_config(command) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime(command) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, store) = open_store(&config).await?;
        store
            .ensure_headers(EMPLOYEES_TABLE, &employee_headers())
            .await
            .map_err(|error| ("store_write", error.to_string(), 6u8))?;
        let directory =
            DirectoryService::new(Arc::new(store), Arc::new(config.organization.clone()));
        let outcome = body(directory).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok((message, data)) => CommandResult::success_with(command, message, data),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}
