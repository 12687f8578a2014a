use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use signoff_core::counter::{CounterError, SequenceCounter};

use crate::DbPool;

pub const REQUEST_SEQUENCE: &str = "request_id";

/// Named counter row in `sequence_counter`. Each `next` is a single upsert, so the
/// increment is atomic within one database.
#[derive(Clone)]
pub struct SqliteSequenceCounter {
    pool: DbPool,
    name: String,
}

impl SqliteSequenceCounter {
    pub fn new(pool: DbPool, name: impl Into<String>) -> Self {
        Self { pool, name: name.into() }
    }

    pub fn for_requests(pool: DbPool) -> Self {
        Self::new(pool, REQUEST_SEQUENCE)
    }

    /// Last value handed out, or zero if the counter has never been used.
    pub async fn current(&self) -> Result<u64, CounterError> {
        let value: Option<i64> =
            sqlx::query("SELECT value FROM sequence_counter WHERE name = ?")
                .bind(&self.name)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?
                .map(|row| row.try_get("value"))
                .transpose()
                .map_err(unavailable)?;
        Ok(value.and_then(|value| u64::try_from(value).ok()).unwrap_or(0))
    }

    /// Raises the counter to at least `floor`, e.g. after importing rows minted elsewhere.
    /// Never lowers it.
    pub async fn ensure_at_least(&self, floor: u64) -> Result<u64, CounterError> {
        let floor = i64::try_from(floor)
            .map_err(|_| CounterError::Unavailable(format!("counter floor {floor} is too large")))?;
        let value: i64 = sqlx::query(
            "INSERT INTO sequence_counter (name, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                 value = MAX(sequence_counter.value, excluded.value),
                 updated_at = excluded.updated_at
             RETURNING value",
        )
        .bind(&self.name)
        .bind(floor)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?
        .try_get("value")
        .map_err(unavailable)?;
        Ok(u64::try_from(value).unwrap_or(0))
    }
}

fn unavailable(error: sqlx::Error) -> CounterError {
    CounterError::Unavailable(error.to_string())
}

#[async_trait]
impl SequenceCounter for SqliteSequenceCounter {
    async fn next(&self) -> Result<u64, CounterError> {
        let value: i64 = sqlx::query(
            "INSERT INTO sequence_counter (name, value, updated_at) VALUES (?, 1, ?)
             ON CONFLICT(name) DO UPDATE SET
                 value = sequence_counter.value + 1,
                 updated_at = excluded.updated_at
             RETURNING value",
        )
        .bind(&self.name)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?
        .try_get("value")
        .map_err(unavailable)?;

        u64::try_from(value)
            .map_err(|_| CounterError::Unavailable(format!("counter `{}` is negative", self.name)))
    }
}
