use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use signoff_core::store::{StoreError, Table, TabularStore};

use crate::DbPool;

/// [`TabularStore`] over the `sheet_*` tables. Rows and columns are numbered from zero
/// in append order; a missing cell reads back as an empty string.
#[derive(Clone)]
pub struct SqliteTable {
    pool: DbPool,
}

impl SqliteTable {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn header_count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM sheet_header")
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?
            .try_get("count")
            .map_err(unavailable)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn unavailable(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

fn to_index(value: i64) -> Option<usize> {
    usize::try_from(value).ok()
}

#[async_trait]
impl TabularStore for SqliteTable {
    async fn read_all(&self) -> Result<Table, StoreError> {
        let headers: Vec<String> =
            sqlx::query("SELECT name FROM sheet_header ORDER BY position")
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?
                .iter()
                .map(|row| row.try_get::<String, _>("name"))
                .collect::<Result<_, _>>()
                .map_err(unavailable)?;

        let row_count: i64 =
            sqlx::query("SELECT COALESCE(MAX(row_index) + 1, 0) AS count FROM sheet_row")
                .fetch_one(&self.pool)
                .await
                .map_err(unavailable)?
                .try_get("count")
                .map_err(unavailable)?;
        let mut rows = vec![vec![String::new(); headers.len()]; to_index(row_count).unwrap_or(0)];

        let cells = sqlx::query("SELECT row_index, column_index, value FROM sheet_cell")
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        for cell in cells {
            let row: i64 = cell.try_get("row_index").map_err(unavailable)?;
            let column: i64 = cell.try_get("column_index").map_err(unavailable)?;
            let value: String = cell.try_get("value").map_err(unavailable)?;
            let slot = to_index(row)
                .zip(to_index(column))
                .and_then(|(row, column)| rows.get_mut(row)?.get_mut(column));
            if let Some(slot) = slot {
                *slot = value;
            }
        }

        Ok(Table { headers, rows })
    }

    async fn write_cell(&self, row: usize, column: usize, value: &str) -> Result<(), StoreError> {
        if column >= self.header_count().await? {
            return Err(StoreError::OutOfRange { row, column });
        }
        let row_exists = sqlx::query("SELECT 1 FROM sheet_row WHERE row_index = ?")
            .bind(row as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?
            .is_some();
        if !row_exists {
            return Err(StoreError::OutOfRange { row, column });
        }

        sqlx::query(
            "INSERT INTO sheet_cell (row_index, column_index, value, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(row_index, column_index) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
        )
        .bind(row as i64)
        .bind(column as i64)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn append_columns(&self, headers: &[String]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let next: i64 =
            sqlx::query("SELECT COALESCE(MAX(position) + 1, 0) AS next FROM sheet_header")
                .fetch_one(&mut *tx)
                .await
                .map_err(unavailable)?
                .try_get("next")
                .map_err(unavailable)?;

        let now = Utc::now().to_rfc3339();
        for (offset, header) in headers.iter().enumerate() {
            sqlx::query("INSERT INTO sheet_header (position, name, created_at) VALUES (?, ?, ?)")
                .bind(next + offset as i64)
                .bind(header)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)
    }

    async fn append_row(&self, values: &[String]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let row: i64 =
            sqlx::query("SELECT COALESCE(MAX(row_index) + 1, 0) AS next FROM sheet_row")
                .fetch_one(&mut *tx)
                .await
                .map_err(unavailable)?
                .try_get("next")
                .map_err(unavailable)?;

        let now = Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO sheet_row (row_index, created_at) VALUES (?, ?)")
            .bind(row)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        for (column, value) in values.iter().enumerate().filter(|(_, value)| !value.is_empty()) {
            sqlx::query(
                "INSERT INTO sheet_cell (row_index, column_index, value, updated_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(row)
            .bind(column as i64)
            .bind(value)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        }

        tx.commit().await.map_err(unavailable)?;
        to_index(row).ok_or_else(|| StoreError::Unavailable(format!("invalid row index {row}")))
    }
}
