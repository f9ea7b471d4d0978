//! Typed values held by a submission set, one per form element.

mod blob;
mod choice;
mod geopoint;
mod repeat;
mod scalar;

use std::collections::BTreeMap;
use std::sync::Arc;

use submission_model::{CompiledForm, FormElement, FormElementId, TableId};
use submission_store::{CellValue, EntityKey, RelationalStore, StoredRow};

use crate::error::EngineError;
use crate::format::{ElementFormatter, FormattedRow};

pub use blob::BlobValue;
pub use choice::ChoiceValue;
pub use geopoint::{GeoPoint, GeoPointValue};
pub use repeat::RepeatValue;
pub use scalar::{DateTimeData, DateTimeKind, DateTimeValue, ScalarKind, ScalarValue, StringValue};

pub(crate) use repeat::NestedContext;
pub(crate) use scalar::{OverflowTarget, StringSource};

/// The rows of one submission set, keyed by the table each belongs to.
pub(crate) type RowArena = BTreeMap<TableId, StoredRow>;

/// A single column of one of the set's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub table: TableId,
    pub column: String,
    pub max_length: Option<usize>,
}

impl ColumnBinding {
    fn row<'r>(&self, rows: &'r RowArena) -> Result<&'r StoredRow, EngineError> {
        rows.get(&self.table).ok_or_else(|| missing_row(self.table))
    }

    pub(crate) fn read<'r>(&self, rows: &'r RowArena) -> Result<&'r CellValue, EngineError> {
        Ok(self.row(rows)?.cell(&self.column))
    }

    pub(crate) fn write(&self, rows: &mut RowArena, value: CellValue) -> Result<(), EngineError> {
        let row = rows
            .get_mut(&self.table)
            .ok_or_else(|| missing_row(self.table))?;
        row.set(self.column.clone(), value);
        Ok(())
    }
}

fn missing_row(table: TableId) -> EngineError {
    EngineError::IllegalState(format!("submission set holds no row for table {table}"))
}

/// Value of one form element within a submission set.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionValue {
    String(StringValue),
    Long(ScalarValue<i64>),
    Decimal(ScalarValue<rust_decimal::Decimal>),
    Boolean(ScalarValue<bool>),
    DateTime(DateTimeValue),
    GeoPoint(GeoPointValue),
    Choice(ChoiceValue),
    Blob(BlobValue),
    Repeat(RepeatValue),
}

impl SubmissionValue {
    pub fn element(&self) -> FormElementId {
        match self {
            SubmissionValue::String(value) => value.element,
            SubmissionValue::Long(value) => value.element,
            SubmissionValue::Decimal(value) => value.element,
            SubmissionValue::Boolean(value) => value.element,
            SubmissionValue::DateTime(value) => value.element,
            SubmissionValue::GeoPoint(value) => value.element,
            SubmissionValue::Choice(value) => value.element,
            SubmissionValue::Blob(value) => value.element,
            SubmissionValue::Repeat(value) => value.element,
        }
    }

    /// True for values persisted in tables of their own ahead of the set's rows.
    pub(crate) fn persists_first(&self) -> bool {
        matches!(
            self,
            SubmissionValue::String(_)
                | SubmissionValue::Choice(_)
                | SubmissionValue::Blob(_)
                | SubmissionValue::Repeat(_)
        )
    }

    /// Parses `raw` as delivered by a submission document.
    pub fn set_from_string(&mut self, raw: &str) -> Result<(), EngineError> {
        match self {
            SubmissionValue::String(value) => value.set(Some(raw.to_string())),
            SubmissionValue::Long(value) => value.set_from_string(raw),
            SubmissionValue::Decimal(value) => value.set_from_string(raw),
            SubmissionValue::Boolean(value) => value.set_from_string(raw),
            SubmissionValue::DateTime(value) => value.set_from_string(raw),
            SubmissionValue::GeoPoint(value) => value.set_from_string(raw),
            SubmissionValue::Choice(value) => {
                value.set_from_string(raw);
                Ok(())
            }
            SubmissionValue::Blob(_) => Err(EngineError::conversion(
                raw,
                "binary",
                "attachments are added as files, not text",
            )),
            SubmissionValue::Repeat(_) => Err(EngineError::conversion(
                raw,
                "repeat",
                "repeat instances are added, not parsed",
            )),
        }
    }

    /// Reads the value out of the set's rows.
    pub(crate) fn load_cells(
        &mut self,
        rows: &RowArena,
        store: &dyn RelationalStore,
    ) -> Result<(), EngineError> {
        match self {
            SubmissionValue::String(value) => value.load(rows, store),
            SubmissionValue::Long(value) => value.load(rows),
            SubmissionValue::Decimal(value) => value.load(rows),
            SubmissionValue::Boolean(value) => value.load(rows),
            SubmissionValue::DateTime(value) => value.load(rows),
            SubmissionValue::GeoPoint(value) => value.load(rows),
            SubmissionValue::Choice(_) | SubmissionValue::Blob(_) | SubmissionValue::Repeat(_) => {
                Ok(())
            }
        }
    }

    /// Reads table-backed values from the store.
    pub(crate) fn load_owned(
        &mut self,
        form: &Arc<CompiledForm>,
        store: &dyn RelationalStore,
    ) -> Result<(), EngineError> {
        match self {
            SubmissionValue::Choice(value) => value.load(store),
            SubmissionValue::Blob(value) => value.load(store),
            SubmissionValue::Repeat(value) => value.load(form, store),
            _ => Ok(()),
        }
    }

    /// Copies the value back into the set's rows.
    pub(crate) fn write_cells(&self, rows: &mut RowArena) -> Result<(), EngineError> {
        match self {
            SubmissionValue::String(value) => value.write(rows),
            SubmissionValue::Long(value) => value.write(rows),
            SubmissionValue::Decimal(value) => value.write(rows),
            SubmissionValue::Boolean(value) => value.write(rows),
            SubmissionValue::DateTime(value) => value.write(rows),
            SubmissionValue::GeoPoint(value) => value.write(rows),
            SubmissionValue::Choice(_) | SubmissionValue::Blob(_) | SubmissionValue::Repeat(_) => {
                Ok(())
            }
        }
    }

    /// Writes rows this value owns outside the set's rows.
    pub(crate) fn persist(&mut self, store: &dyn RelationalStore) -> Result<(), EngineError> {
        match self {
            SubmissionValue::String(value) => value.persist(store),
            SubmissionValue::Choice(value) => value.persist(store),
            SubmissionValue::Blob(value) => value.persist(store),
            SubmissionValue::Repeat(value) => value.persist(store),
            _ => Ok(()),
        }
    }

    pub(crate) fn collect_entity_keys(
        &self,
        store: &dyn RelationalStore,
        keys: &mut Vec<EntityKey>,
    ) -> Result<(), EngineError> {
        match self {
            SubmissionValue::String(value) => value.collect_entity_keys(store, keys),
            SubmissionValue::Choice(value) => value.collect_entity_keys(store, keys),
            SubmissionValue::Blob(value) => value.collect_entity_keys(store, keys),
            SubmissionValue::Repeat(value) => value.collect_entity_keys(store, keys),
            _ => Ok(()),
        }
    }

    pub fn format(
        &self,
        element: &FormElement,
        formatter: &mut dyn ElementFormatter,
        ordinal: &str,
        row: &mut FormattedRow,
    ) {
        match self {
            SubmissionValue::String(value) => {
                formatter.format_string(value.value(), element, ordinal, row)
            }
            SubmissionValue::Long(value) => formatter.format_long(value.value(), element, ordinal, row),
            SubmissionValue::Decimal(value) => {
                formatter.format_decimal(value.value(), element, ordinal, row)
            }
            SubmissionValue::Boolean(value) => {
                formatter.format_boolean(value.value(), element, ordinal, row)
            }
            SubmissionValue::DateTime(value) => match value.kind() {
                DateTimeKind::Date => formatter.format_date(value.date(), element, ordinal, row),
                DateTimeKind::Time => formatter.format_time(value.time(), element, ordinal, row),
                DateTimeKind::DateTime => {
                    formatter.format_date_time(value.date_time(), element, ordinal, row)
                }
            },
            SubmissionValue::GeoPoint(value) => {
                formatter.format_geopoint(value.value(), element, ordinal, row)
            }
            SubmissionValue::Choice(value) => {
                formatter.format_choices(value.values(), element, ordinal, row)
            }
            SubmissionValue::Blob(value) => formatter.format_binary(value, element, ordinal, row),
            SubmissionValue::Repeat(value) => formatter.format_repeats(value, element, row),
        }
    }

    pub fn as_string(&self) -> Option<&StringValue> {
        match self {
            SubmissionValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<&ScalarValue<i64>> {
        match self {
            SubmissionValue::Long(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&ScalarValue<rust_decimal::Decimal>> {
        match self {
            SubmissionValue::Decimal(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<&ScalarValue<bool>> {
        match self {
            SubmissionValue::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<&DateTimeValue> {
        match self {
            SubmissionValue::DateTime(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_geopoint(&self) -> Option<&GeoPointValue> {
        match self {
            SubmissionValue::GeoPoint(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<&ChoiceValue> {
        match self {
            SubmissionValue::Choice(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&BlobValue> {
        match self {
            SubmissionValue::Blob(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_repeat(&self) -> Option<&RepeatValue> {
        match self {
            SubmissionValue::Repeat(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_repeat_mut(&mut self) -> Option<&mut RepeatValue> {
        match self {
            SubmissionValue::Repeat(value) => Some(value),
            _ => None,
        }
    }
}
