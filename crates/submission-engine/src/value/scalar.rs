use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use submission_model::schema::{COLUMN_NAME_COLUMN, VALUE_COLUMN};
use submission_model::{FormElementId, TableId, TableName};
use submission_store::{
    CellValue, EntityKey, FilterColumn, RelationalStore, RowKey, RowQuery, StoredRow, ordinal_gap,
};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use tracing::debug;

use super::{ColumnBinding, RowArena};
use crate::error::EngineError;

/// Where a string value is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StringSource {
    Column(ColumnBinding),
    /// The row key of the set's row in this table; read-only.
    RowKey(TableId),
}

/// Long-string rows receiving text that does not fit its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OverflowTarget {
    pub(crate) table: TableName,
    pub(crate) chunk_chars: usize,
    pub(crate) row_key: RowKey,
    pub(crate) top_level_key: RowKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringValue {
    pub(crate) element: FormElementId,
    source: StringSource,
    overflow: Option<OverflowTarget>,
    value: Option<String>,
    stored_overflow: Vec<EntityKey>,
    dirty: bool,
}

impl StringValue {
    pub(crate) fn new(
        element: FormElementId,
        source: StringSource,
        overflow: Option<OverflowTarget>,
    ) -> Self {
        Self {
            element,
            source,
            overflow,
            value: None,
            stored_overflow: Vec::new(),
            dirty: false,
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.source, StringSource::RowKey(_))
    }

    pub fn set(&mut self, value: Option<String>) -> Result<(), EngineError> {
        if self.is_read_only() {
            return Err(EngineError::IllegalState(
                "the instance id is the row key and cannot be reassigned".into(),
            ));
        }
        self.value = value;
        self.dirty = true;
        Ok(())
    }

    fn column_capacity(&self) -> Option<usize> {
        match &self.source {
            StringSource::Column(binding) => binding.max_length,
            StringSource::RowKey(_) => None,
        }
    }

    pub(crate) fn load(
        &mut self,
        rows: &RowArena,
        store: &dyn RelationalStore,
    ) -> Result<(), EngineError> {
        let binding = match &self.source {
            StringSource::RowKey(table) => {
                let row = rows.get(table).ok_or_else(|| {
                    EngineError::IllegalState(format!("submission set holds no row for table {table}"))
                })?;
                self.value = Some(row.key.to_string());
                return Ok(());
            }
            StringSource::Column(binding) => binding,
        };
        self.value = binding.read(rows)?.as_text().map(str::to_string);
        self.stored_overflow.clear();
        self.dirty = false;

        let (Some(text), Some(capacity), Some(overflow)) =
            (&self.value, binding.max_length, &self.overflow)
        else {
            return Ok(());
        };
        // Only a column filled to capacity can have spilled over.
        if text.chars().count() != capacity {
            return Ok(());
        }
        let parts = store.query(&overflow_query(overflow, &binding.column))?;
        if parts.is_empty() {
            return Ok(());
        }
        if let Some(gap) = ordinal_gap(&parts) {
            return Err(EngineError::enumerated(&overflow.table, &overflow.row_key, gap));
        }
        let full: String = parts
            .iter()
            .filter_map(|part| part.text(VALUE_COLUMN))
            .collect();
        self.stored_overflow = parts.iter().map(StoredRow::entity_key).collect();
        self.value = Some(full);
        Ok(())
    }

    pub(crate) fn write(&self, rows: &mut RowArena) -> Result<(), EngineError> {
        let StringSource::Column(binding) = &self.source else {
            return Ok(());
        };
        let cell = match (&self.value, binding.max_length) {
            (Some(text), Some(capacity)) => CellValue::Text(char_prefix(text, capacity).to_string()),
            (Some(text), None) => CellValue::Text(text.clone()),
            (None, _) => CellValue::Null,
        };
        binding.write(rows, cell)
    }

    pub(crate) fn persist(&mut self, store: &dyn RelationalStore) -> Result<(), EngineError> {
        if !self.dirty {
            return Ok(());
        }
        let (Some(overflow), StringSource::Column(binding)) = (&self.overflow, &self.source) else {
            self.dirty = false;
            return Ok(());
        };
        store.delete_all(&self.stored_overflow)?;
        self.stored_overflow.clear();

        if let (Some(text), Some(capacity)) = (&self.value, self.column_capacity())
            && text.chars().count() > capacity
        {
            let chars: Vec<char> = text.chars().collect();
            for (index, chunk) in chars.chunks(overflow.chunk_chars.max(1)).enumerate() {
                let mut row = store.new_row(&overflow.table)?;
                row.parent_key = Some(overflow.row_key.clone());
                row.top_level_key = Some(overflow.top_level_key.clone());
                row.ordinal = Some(index as i64 + 1);
                row.set(COLUMN_NAME_COLUMN, CellValue::Text(binding.column.clone()));
                row.set(VALUE_COLUMN, CellValue::Text(chunk.iter().collect()));
                store.upsert(&row)?;
                self.stored_overflow.push(row.entity_key());
            }
            debug!(
                column = %binding.column,
                parts = self.stored_overflow.len(),
                "stored long string overflow"
            );
        }
        self.dirty = false;
        Ok(())
    }

    pub(crate) fn collect_entity_keys(
        &self,
        store: &dyn RelationalStore,
        keys: &mut Vec<EntityKey>,
    ) -> Result<(), EngineError> {
        let (Some(overflow), StringSource::Column(binding)) = (&self.overflow, &self.source) else {
            return Ok(());
        };
        let parts = store.query(&overflow_query(overflow, &binding.column))?;
        keys.extend(parts.iter().map(StoredRow::entity_key));
        Ok(())
    }
}

fn overflow_query(overflow: &OverflowTarget, column: &str) -> RowQuery {
    RowQuery::children_of(overflow.table.clone(), &overflow.row_key).equal(
        FilterColumn::Column(COLUMN_NAME_COLUMN.into()),
        CellValue::Text(column.to_string()),
    )
}

fn char_prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Column-backed value types sharing one storage shape.
pub trait ScalarKind: Clone + PartialEq + fmt::Debug + Sized {
    const TARGET: &'static str;

    fn from_cell(cell: &CellValue) -> Option<Self>;

    fn to_cell(value: Option<&Self>) -> CellValue;

    /// `Ok(None)` clears the value.
    fn parse(raw: &str) -> Result<Option<Self>, EngineError>;
}

impl ScalarKind for i64 {
    const TARGET: &'static str = "integer";

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_integer()
    }

    fn to_cell(value: Option<&Self>) -> CellValue {
        CellValue::from(value.copied())
    }

    fn parse(raw: &str) -> Result<Option<Self>, EngineError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<i64>()
            .map(Some)
            .map_err(|err| EngineError::conversion(raw, Self::TARGET, err))
    }
}

impl ScalarKind for Decimal {
    const TARGET: &'static str = "decimal";

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_decimal()
    }

    fn to_cell(value: Option<&Self>) -> CellValue {
        CellValue::from(value.copied())
    }

    fn parse(raw: &str) -> Result<Option<Self>, EngineError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .map(Some)
            .map_err(|err| EngineError::conversion(raw, Self::TARGET, err))
    }
}

impl ScalarKind for bool {
    const TARGET: &'static str = "boolean";

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_boolean()
    }

    fn to_cell(value: Option<&Self>) -> CellValue {
        CellValue::from(value.copied())
    }

    /// Any token outside the accepted truthy set reads as `false`.
    fn parse(raw: &str) -> Result<Option<Self>, EngineError> {
        let token = raw.trim().to_ascii_lowercase();
        Ok(Some(matches!(
            token.as_str(),
            "true" | "t" | "ok" | "yes" | "y"
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarValue<T> {
    pub(crate) element: FormElementId,
    binding: ColumnBinding,
    value: Option<T>,
}

impl<T: ScalarKind> ScalarValue<T> {
    pub(crate) fn new(element: FormElementId, binding: ColumnBinding) -> Self {
        Self {
            element,
            binding,
            value: None,
        }
    }

    pub fn value(&self) -> Option<T>
    where
        T: Copy,
    {
        self.value
    }

    pub fn set(&mut self, value: Option<T>) {
        self.value = value;
    }

    pub fn set_from_string(&mut self, raw: &str) -> Result<(), EngineError> {
        self.value = T::parse(raw)?;
        Ok(())
    }

    pub(crate) fn load(&mut self, rows: &RowArena) -> Result<(), EngineError> {
        self.value = T::from_cell(self.binding.read(rows)?);
        Ok(())
    }

    pub(crate) fn write(&self, rows: &mut RowArena) -> Result<(), EngineError> {
        self.binding.write(rows, T::to_cell(self.value.as_ref()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeKind {
    Date,
    Time,
    DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeData {
    Date(Date),
    Time(Time),
    DateTime(OffsetDateTime),
}

impl DateTimeData {
    fn kind(&self) -> DateTimeKind {
        match self {
            DateTimeData::Date(_) => DateTimeKind::Date,
            DateTimeData::Time(_) => DateTimeKind::Time,
            DateTimeData::DateTime(_) => DateTimeKind::DateTime,
        }
    }
}

/// Date, time-of-day or instant value; offsets on time-of-day input are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeValue {
    pub(crate) element: FormElementId,
    kind: DateTimeKind,
    binding: ColumnBinding,
    value: Option<DateTimeData>,
}

impl DateTimeValue {
    pub(crate) fn new(element: FormElementId, kind: DateTimeKind, binding: ColumnBinding) -> Self {
        Self {
            element,
            kind,
            binding,
            value: None,
        }
    }

    pub fn kind(&self) -> DateTimeKind {
        self.kind
    }

    pub fn value(&self) -> Option<DateTimeData> {
        self.value
    }

    pub fn date(&self) -> Option<Date> {
        match self.value {
            Some(DateTimeData::Date(date)) => Some(date),
            _ => None,
        }
    }

    pub fn time(&self) -> Option<Time> {
        match self.value {
            Some(DateTimeData::Time(time)) => Some(time),
            _ => None,
        }
    }

    pub fn date_time(&self) -> Option<OffsetDateTime> {
        match self.value {
            Some(DateTimeData::DateTime(instant)) => Some(instant),
            _ => None,
        }
    }

    pub fn set(&mut self, value: Option<DateTimeData>) -> Result<(), EngineError> {
        if let Some(data) = &value
            && data.kind() != self.kind
        {
            return Err(EngineError::IllegalState(format!(
                "{:?} value assigned to a {:?} element",
                data.kind(),
                self.kind
            )));
        }
        self.value = value;
        Ok(())
    }

    pub fn set_from_string(&mut self, raw: &str) -> Result<(), EngineError> {
        let raw = raw.trim();
        if raw.is_empty() {
            self.value = None;
            return Ok(());
        }
        self.value = Some(match self.kind {
            DateTimeKind::Date => DateTimeData::Date(parse_date(raw)?),
            DateTimeKind::Time => DateTimeData::Time(parse_time(raw)?),
            DateTimeKind::DateTime => DateTimeData::DateTime(parse_date_time(raw)?),
        });
        Ok(())
    }

    pub(crate) fn load(&mut self, rows: &RowArena) -> Result<(), EngineError> {
        let cell = self.binding.read(rows)?;
        self.value = match self.kind {
            DateTimeKind::Date => cell.as_date().map(DateTimeData::Date),
            DateTimeKind::Time => cell.as_time().map(DateTimeData::Time),
            DateTimeKind::DateTime => cell.as_date_time().map(DateTimeData::DateTime),
        };
        Ok(())
    }

    pub(crate) fn write(&self, rows: &mut RowArena) -> Result<(), EngineError> {
        let cell = match self.value {
            None => CellValue::Null,
            Some(DateTimeData::Date(date)) => CellValue::Date(date),
            Some(DateTimeData::Time(time)) => CellValue::Time(time),
            Some(DateTimeData::DateTime(instant)) => CellValue::DateTime(instant),
        };
        self.binding.write(rows, cell)
    }
}

fn parse_date(raw: &str) -> Result<Date, EngineError> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|err| EngineError::conversion(raw, "date", err))
}

fn parse_time(raw: &str) -> Result<Time, EngineError> {
    let local = match raw.strip_suffix('Z') {
        Some(local) => local,
        None => raw
            .rfind(['+', '-'])
            .map_or(raw, |offset| &raw[..offset]),
    };
    Time::parse(
        local,
        format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .map_err(|err| EngineError::conversion(raw, "time", err))
}

fn parse_date_time(raw: &str) -> Result<OffsetDateTime, EngineError> {
    if let Ok(instant) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(instant);
    }
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|err| EngineError::conversion(raw, "date-time", err))
}
