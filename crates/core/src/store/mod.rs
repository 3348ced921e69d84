//! Tabular persistence port.
//!
//! Tables are named, carry one header row, and hold data rows of string cells addressed by
//! zero-based data-row index and column position. Row positions are stable: rows are appended,
//! never removed.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod records;

pub use memory::InMemoryStore;

pub type Row = Vec<String>;

pub const EMPLOYEES_TABLE: &str = "Employees";
pub const LOCATION_MAP_TABLE: &str = "Location Map";

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("row {row} does not exist in `{table}`")]
    RowOutOfRange { table: String, row: usize },
    #[error("could not decode `{table}` row {row}: {message}")]
    Decode { table: String, row: usize, message: String },
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Data rows in table order; an unknown table reads as empty.
    async fn read(&self, table: &str) -> Result<Vec<Row>, StoreError>;

    /// Appends a data row and returns its index.
    async fn append(&self, table: &str, row: Row) -> Result<usize, StoreError>;

    async fn write_cell(
        &self,
        table: &str,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<(), StoreError>;

    /// Creates the table with `headers` if missing; existing headers are left untouched.
    async fn ensure_headers(&self, table: &str, headers: &[String]) -> Result<(), StoreError>;

    async fn read_row(&self, table: &str, row: usize) -> Result<Option<Row>, StoreError> {
        Ok(self.read(table).await?.into_iter().nth(row))
    }
}
