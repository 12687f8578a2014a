use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{StoreError, Table, TabularStore};

/// Table held in process memory, for tests.
#[derive(Default)]
pub struct InMemoryTable {
    table: Mutex<Table>,
    unavailable: AtomicBool,
}

impl InMemoryTable {
    pub fn with_table(table: Table) -> Self {
        Self { table: Mutex::new(table), unavailable: AtomicBool::new(false) }
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn table(&self) -> Table {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        match self.table.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory table marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TabularStore for InMemoryTable {
    async fn read_all(&self) -> Result<Table, StoreError> {
        self.check_available()?;
        Ok(self.lock().clone())
    }

    async fn write_cell(&self, row: usize, column: usize, value: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut table = self.lock();
        if column >= table.headers.len() {
            return Err(StoreError::OutOfRange { row, column });
        }
        let Some(cells) = table.rows.get_mut(row) else {
            return Err(StoreError::OutOfRange { row, column });
        };
        if cells.len() <= column {
            cells.resize(column + 1, String::new());
        }
        cells[column] = value.to_string();
        Ok(())
    }

    async fn append_columns(&self, headers: &[String]) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock().headers.extend(headers.iter().cloned());
        Ok(())
    }

    async fn append_row(&self, values: &[String]) -> Result<usize, StoreError> {
        self.check_available()?;
        let mut table = self.lock();
        table.rows.push(values.to_vec());
        Ok(table.rows.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryTable;
    use crate::store::{StoreError, Table, TabularStore};

    #[tokio::test]
    async fn writes_outside_the_table_are_refused() {
        let table = InMemoryTable::with_table(Table {
            headers: vec!["A".to_string(), "B".to_string()],
            rows: vec![vec!["1".to_string()]],
        });

        assert!(matches!(
            table.write_cell(0, 2, "x").await,
            Err(StoreError::OutOfRange { row: 0, column: 2 })
        ));
        assert!(matches!(table.write_cell(1, 0, "x").await, Err(StoreError::OutOfRange { .. })));

        table.write_cell(0, 1, "2").await.expect("ragged row grows to the written column");
        assert_eq!(table.table().rows[0], vec!["1".to_string(), "2".to_string()]);
    }
}
