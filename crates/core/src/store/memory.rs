use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Row, Store, StoreError};

#[derive(Clone, Debug, Default)]
struct Table {
    headers: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a table, replacing whatever it held.
    pub async fn seed(&self, table: &str, headers: Vec<String>, rows: Vec<Row>) {
        let mut tables = self.tables.write().await;
        tables.insert(table.to_owned(), Table { headers, rows });
    }

    pub async fn headers(&self, table: &str) -> Vec<String> {
        let tables = self.tables.read().await;
        tables.get(table).map(|table| table.headers.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn read(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).map(|table| table.rows.clone()).unwrap_or_default())
    }

    async fn append(&self, table: &str, row: Row) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        let entry = tables.entry(table.to_owned()).or_default();
        entry.rows.push(row);
        Ok(entry.rows.len() - 1)
    }

    async fn write_cell(
        &self,
        table: &str,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let cells = tables
            .get_mut(table)
            .and_then(|table| table.rows.get_mut(row))
            .ok_or_else(|| StoreError::RowOutOfRange { table: table.to_owned(), row })?;

        if cells.len() <= column {
            cells.resize(column + 1, String::new());
        }
        cells[column] = value.to_owned();
        Ok(())
    }

    async fn ensure_headers(&self, table: &str, headers: &[String]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let entry = tables.entry(table.to_owned()).or_default();
        if entry.headers.is_empty() {
            entry.headers = headers.to_vec();
        }
        Ok(())
    }
}
