use std::collections::BTreeMap;

use dashmap::DashMap;
use submission_model::{ColumnType, PhysicalTable, TableName};
use time::OffsetDateTime;
use tracing::debug;

use crate::query::RowQuery;
use crate::row::{CellValue, EntityKey, RowKey, StoredRow};
use crate::store::{RelationalStore, StoreError};

/// Reference [`RelationalStore`] keeping every row in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: DashMap<TableName, PhysicalTable>,
    rows: DashMap<TableName, BTreeMap<RowKey, StoredRow>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, table: &TableName) -> usize {
        self.rows.get(table).map_or(0, |rows| rows.len())
    }

    pub fn total_rows(&self) -> usize {
        self.rows.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_declared(&self, table: &TableName) -> bool {
        self.tables.contains_key(table)
    }

    fn check_row(&self, row: &StoredRow) -> Result<(), StoreError> {
        let table = self
            .tables
            .get(&row.table)
            .ok_or_else(|| StoreError::UnknownTable(row.table.clone()))?;
        for (column, value) in &row.cells {
            let declared = table
                .column(column)
                .ok_or_else(|| StoreError::UnknownColumn {
                    table: row.table.clone(),
                    column: column.clone(),
                })?;
            let length = match (value, declared.column_type) {
                (CellValue::Text(text), ColumnType::Text) => text.chars().count(),
                (CellValue::Bytes(bytes), ColumnType::Bytes) => bytes.len(),
                _ => continue,
            };
            if let Some(capacity) = declared.max_length
                && length > capacity
            {
                return Err(StoreError::ColumnOverflow {
                    table: row.table.clone(),
                    column: column.clone(),
                    length,
                    capacity,
                });
            }
        }
        Ok(())
    }
}

impl RelationalStore for InMemoryStore {
    fn declare_table(&self, table: &PhysicalTable) -> Result<(), StoreError> {
        debug!(table = %table.name, columns = table.columns.len(), "declare table");
        self.tables.insert(table.name.clone(), table.clone());
        self.rows.entry(table.name.clone()).or_default();
        Ok(())
    }

    fn new_row(&self, table: &TableName) -> Result<StoredRow, StoreError> {
        if !self.is_declared(table) {
            return Err(StoreError::UnknownTable(table.clone()));
        }
        Ok(StoredRow::new(table.clone(), RowKey::generate()))
    }

    fn get_row(&self, table: &TableName, key: &RowKey) -> Result<StoredRow, StoreError> {
        let rows = self
            .rows
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.clone()))?;
        rows.get(key).cloned().ok_or_else(|| StoreError::NotFound {
            table: table.clone(),
            key: key.clone(),
        })
    }

    fn query(&self, query: &RowQuery) -> Result<Vec<StoredRow>, StoreError> {
        let rows = self
            .rows
            .get(&query.table)
            .ok_or_else(|| StoreError::UnknownTable(query.table.clone()))?;
        let mut matched: Vec<StoredRow> = rows
            .values()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        drop(rows);
        query.sort(&mut matched);
        Ok(matched)
    }

    fn upsert(&self, row: &StoredRow) -> Result<(), StoreError> {
        self.check_row(row)?;
        let mut stored = row.clone();
        stored.updated_at = OffsetDateTime::now_utc();
        self.rows
            .entry(row.table.clone())
            .or_default()
            .insert(stored.key.clone(), stored);
        Ok(())
    }

    fn delete(&self, key: &EntityKey) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .get_mut(&key.table)
            .ok_or_else(|| StoreError::UnknownTable(key.table.clone()))?;
        rows.remove(&key.key);
        Ok(())
    }
}
