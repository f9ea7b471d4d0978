use submission_model::{PhysicalTable, TableName};
use thiserror::Error;

use crate::query::RowQuery;
use crate::row::{EntityKey, RowKey, StoredRow};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table {0} has not been declared")]
    UnknownTable(TableName),
    #[error("no row {key} in {table}")]
    NotFound { table: TableName, key: RowKey },
    #[error("value for {table}.{column} is {length} long, capacity is {capacity}")]
    ColumnOverflow {
        table: TableName,
        column: String,
        length: usize,
        capacity: usize,
    },
    #[error("column {column} is not declared on {table}")]
    UnknownColumn { table: TableName, column: String },
    #[error("rows of {table} under {parent} expected ordinal {expected}, found {found:?}")]
    EnumeratedElement {
        table: TableName,
        parent: RowKey,
        expected: i64,
        found: Option<i64>,
    },
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Boundary to the backing relational store.
///
/// Each call is atomic on its own; callers get no multi-row transaction.
pub trait RelationalStore: Send + Sync {
    fn declare_table(&self, table: &PhysicalTable) -> Result<(), StoreError>;

    /// Allocates an unsaved row with a fresh key.
    fn new_row(&self, table: &TableName) -> Result<StoredRow, StoreError>;

    fn get_row(&self, table: &TableName, key: &RowKey) -> Result<StoredRow, StoreError>;

    fn query(&self, query: &RowQuery) -> Result<Vec<StoredRow>, StoreError>;

    fn upsert(&self, row: &StoredRow) -> Result<(), StoreError>;

    fn upsert_all(&self, rows: &[StoredRow]) -> Result<(), StoreError> {
        rows.iter().try_for_each(|row| self.upsert(row))
    }

    fn delete(&self, key: &EntityKey) -> Result<(), StoreError>;

    fn delete_all(&self, keys: &[EntityKey]) -> Result<(), StoreError> {
        keys.iter().try_for_each(|key| self.delete(key))
    }
}
