use submission_model::schema::VALUE_COLUMN;
use submission_model::{FormElementId, TableName};
use submission_store::{
    CellValue, EntityKey, RelationalStore, RowKey, RowQuery, StoredRow, ordinal_gap,
};

use crate::error::EngineError;

/// Multiple-choice selections, one row per choice under the owning row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceValue {
    pub(crate) element: FormElementId,
    table: TableName,
    parent_key: RowKey,
    top_level_key: RowKey,
    values: Vec<String>,
    stored: Vec<EntityKey>,
    dirty: bool,
}

impl ChoiceValue {
    pub(crate) fn new(
        element: FormElementId,
        table: TableName,
        parent_key: RowKey,
        top_level_key: RowKey,
    ) -> Self {
        Self {
            element,
            table,
            parent_key,
            top_level_key,
            values: Vec::new(),
            stored: Vec::new(),
            dirty: false,
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn set(&mut self, values: Vec<String>) {
        self.values = values;
        self.dirty = true;
    }

    /// Space-separated selections; blank tokens are skipped.
    pub fn set_from_string(&mut self, raw: &str) {
        self.set(
            raw.split(' ')
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect(),
        );
    }

    fn rows(&self, store: &dyn RelationalStore) -> Result<Vec<StoredRow>, EngineError> {
        let rows = store.query(&RowQuery::children_of(self.table.clone(), &self.parent_key))?;
        if let Some(gap) = ordinal_gap(&rows) {
            return Err(EngineError::enumerated(&self.table, &self.parent_key, gap));
        }
        Ok(rows)
    }

    pub(crate) fn load(&mut self, store: &dyn RelationalStore) -> Result<(), EngineError> {
        let rows = self.rows(store)?;
        self.values = rows
            .iter()
            .filter_map(|row| row.text(VALUE_COLUMN).map(str::to_string))
            .collect();
        self.stored = rows.iter().map(StoredRow::entity_key).collect();
        self.dirty = false;
        Ok(())
    }

    pub(crate) fn persist(&mut self, store: &dyn RelationalStore) -> Result<(), EngineError> {
        if !self.dirty {
            return Ok(());
        }
        store.delete_all(&self.stored)?;
        self.stored.clear();
        for (index, value) in self.values.iter().enumerate() {
            let mut row = store.new_row(&self.table)?;
            row.parent_key = Some(self.parent_key.clone());
            row.top_level_key = Some(self.top_level_key.clone());
            row.ordinal = Some(index as i64 + 1);
            row.set(VALUE_COLUMN, CellValue::Text(value.clone()));
            store.upsert(&row)?;
            self.stored.push(row.entity_key());
        }
        self.dirty = false;
        Ok(())
    }

    pub(crate) fn collect_entity_keys(
        &self,
        store: &dyn RelationalStore,
        keys: &mut Vec<EntityKey>,
    ) -> Result<(), EngineError> {
        keys.extend(self.rows(store)?.iter().map(StoredRow::entity_key));
        Ok(())
    }
}
