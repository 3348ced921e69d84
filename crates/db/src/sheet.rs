//! SQLite-backed tabular store. Each logical table is a `sheet_table` entry holding its header row;
//! data rows live in `sheet_row` as JSON arrays of cells keyed by a dense zero-based index.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row as _};
use tracing::debug;

use fieldrelay_core::store::{Row, Store, StoreError};

use crate::DbPool;

#[derive(Clone)]
pub struct SqlSheetStore {
    pool: DbPool,
}

impl SqlSheetStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Header row of `table`, or `None` when the table was never created.
    pub async fn headers(&self, table: &str) -> Result<Option<Vec<String>>, StoreError> {
        let row = sqlx::query("SELECT headers_json FROM sheet_table WHERE name = ?")
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(|row| decode_cells(table, 0, row.get::<String, _>("headers_json"))).transpose()
    }

    /// Every table name with its data-row count, in name order.
    pub async fn tables(&self) -> Result<Vec<(String, usize)>, StoreError> {
        let rows = sqlx::query(
            "SELECT t.name AS name, COUNT(r.row_index) AS row_count
             FROM sheet_table t
             LEFT JOIN sheet_row r ON r.table_name = t.name
             GROUP BY t.name
             ORDER BY t.name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let count = row.get::<i64, _>("row_count");
                (row.get::<String, _>("name"), usize::try_from(count).unwrap_or(0))
            })
            .collect())
    }
}

#[async_trait]
impl Store for SqlSheetStore {
    async fn read(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let rows = sqlx::query(
            "SELECT row_index, cells_json FROM sheet_row WHERE table_name = ? ORDER BY row_index ASC",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(|row| row_cells(table, row)).collect()
    }

    async fn read_row(&self, table: &str, row: usize) -> Result<Option<Row>, StoreError> {
        let found = sqlx::query(
            "SELECT row_index, cells_json FROM sheet_row WHERE table_name = ? AND row_index = ?",
        )
        .bind(table)
        .bind(row_index(row)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        found.map(|found| row_cells(table, found)).transpose()
    }

    async fn append(&self, table: &str, row: Row) -> Result<usize, StoreError> {
        let now = Utc::now().to_rfc3339();
        let cells = encode_cells(&row)?;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO sheet_table (name, headers_json, created_at, updated_at)
             VALUES (?, '[]', ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(table)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let next: i64 = sqlx::query(
            "SELECT COALESCE(MAX(row_index) + 1, 0) AS next FROM sheet_row WHERE table_name = ?",
        )
        .bind(table)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?
        .get("next");

        sqlx::query(
            "INSERT INTO sheet_row (table_name, row_index, cells_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(table)
        .bind(next)
        .bind(cells)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;

        let index = usize::try_from(next)
            .map_err(|_| StoreError::Backend(format!("row index {next} out of range")))?;
        debug!(event_name = "store.row.appended", table, row = index, "row appended");
        Ok(index)
    }

    async fn write_cell(
        &self,
        table: &str,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<(), StoreError> {
        let index = row_index(row)?;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let current = sqlx::query(
            "SELECT cells_json FROM sheet_row WHERE table_name = ? AND row_index = ?",
        )
        .bind(table)
        .bind(index)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::RowOutOfRange { table: table.to_owned(), row })?;

        let mut cells = decode_cells(table, row, current.get::<String, _>("cells_json"))?;
        if cells.len() <= column {
            cells.resize(column + 1, String::new());
        }
        cells[column] = value.to_owned();

        sqlx::query(
            "UPDATE sheet_row SET cells_json = ?, updated_at = ?
             WHERE table_name = ? AND row_index = ?",
        )
        .bind(encode_cells(&cells)?)
        .bind(Utc::now().to_rfc3339())
        .bind(table)
        .bind(index)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        debug!(event_name = "store.cell.written", table, row, column, "cell written");
        Ok(())
    }

    async fn ensure_headers(&self, table: &str, headers: &[String]) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        // A table created implicitly by `append` has an empty header row; fill it in.
        sqlx::query(
            "INSERT INTO sheet_table (name, headers_json, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                headers_json = excluded.headers_json,
                updated_at = excluded.updated_at
             WHERE sheet_table.headers_json = '[]'",
        )
        .bind(table)
        .bind(encode_cells(headers)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

fn row_cells(table: &str, row: SqliteRow) -> Result<Row, StoreError> {
    let index = row.get::<i64, _>("row_index");
    decode_cells(table, usize::try_from(index).unwrap_or(0), row.get::<String, _>("cells_json"))
}

fn row_index(row: usize) -> Result<i64, StoreError> {
    i64::try_from(row).map_err(|_| StoreError::Backend(format!("row index {row} out of range")))
}

fn encode_cells(cells: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(cells).map_err(|error| StoreError::Backend(error.to_string()))
}

fn decode_cells(table: &str, row: usize, raw: String) -> Result<Row, StoreError> {
    serde_json::from_str::<Vec<String>>(&raw).map_err(|error| StoreError::Decode {
        table: table.to_owned(),
        row,
        message: format!("cells are not a JSON string array: {error}"),
    })
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

#[cfg(test)]
mod tests {
    use fieldrelay_core::store::{Store, StoreError};

    use super::SqlSheetStore;
    use crate::{connect_with_settings, migrations, DbPool};

    fn cells(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|cell| (*cell).to_owned()).collect()
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn appended_rows_keep_dense_indices_and_order() {
        let pool = setup_pool().await;
        let store = SqlSheetStore::new(pool.clone());
        store.ensure_headers("Orders", &cells(&["Submission ID", "Status"])).await.expect("headers");

        let first = store.append("Orders", cells(&["ORD-20250101-001", "Pending"])).await.expect("append");
        let second = store.append("Orders", cells(&["ORD-20250101-002", "Pending"])).await.expect("append");
        assert_eq!((first, second), (0, 1));

        let rows = store.read("Orders").await.expect("read");
        assert_eq!(rows[1][0], "ORD-20250101-002");
        assert_eq!(store.read("Unknown").await.expect("read"), Vec::<Vec<String>>::new());

        pool.close().await;
    }

    #[tokio::test]
    async fn write_cell_pads_short_rows_and_rejects_missing_ones() {
        let pool = setup_pool().await;
        let store = SqlSheetStore::new(pool.clone());
        store.append("Disputes", cells(&["DSP-20250101-001"])).await.expect("append");

        store.write_cell("Disputes", 0, 3, "Approved").await.expect("write");
        let row = store.read_row("Disputes", 0).await.expect("read").expect("row exists");
        assert_eq!(row, cells(&["DSP-20250101-001", "", "", "Approved"]));

        assert_eq!(
            store.write_cell("Disputes", 7, 0, "x").await,
            Err(StoreError::RowOutOfRange { table: "Disputes".to_owned(), row: 7 })
        );
        assert_eq!(store.read_row("Disputes", 7).await.expect("read"), None);

        pool.close().await;
    }

    #[tokio::test]
    async fn headers_are_set_once_even_after_implicit_creation() {
        let pool = setup_pool().await;
        let store = SqlSheetStore::new(pool.clone());
        store.append("Employees", cells(&["SR001"])).await.expect("append");

        store.ensure_headers("Employees", &cells(&["ID", "Name"])).await.expect("first");
        store.ensure_headers("Employees", &cells(&["Other"])).await.expect("second");

        assert_eq!(store.headers("Employees").await.expect("headers"), Some(cells(&["ID", "Name"])));
        assert_eq!(store.headers("Missing").await.expect("headers"), None);
        assert_eq!(store.tables().await.expect("tables"), vec![("Employees".to_owned(), 1)]);

        pool.close().await;
    }
}
