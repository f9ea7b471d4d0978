use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use submission_model::TableName;
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

/// Primary key of a stored row, `uuid:<v4>` for generated keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(String);

impl RowKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn generate() -> Self {
        Self(format!("uuid:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one physical row, as handed to deletion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EntityKey {
    pub table: TableName,
    pub key: RowKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum CellValue {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Date(Date),
    Time(Time),
    DateTime(OffsetDateTime),
    Bytes(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            CellValue::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            CellValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            CellValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<Time> {
        match self {
            CellValue::Time(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<OffsetDateTime> {
        match self {
            CellValue::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CellValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(CellValue::Null, CellValue::Text)
    }
}

impl From<Option<i64>> for CellValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(CellValue::Null, CellValue::Integer)
    }
}

impl From<Option<Decimal>> for CellValue {
    fn from(value: Option<Decimal>) -> Self {
        value.map_or(CellValue::Null, CellValue::Decimal)
    }
}

impl From<Option<bool>> for CellValue {
    fn from(value: Option<bool>) -> Self {
        value.map_or(CellValue::Null, CellValue::Boolean)
    }
}

impl From<Option<OffsetDateTime>> for CellValue {
    fn from(value: Option<OffsetDateTime>) -> Self {
        value.map_or(CellValue::Null, CellValue::DateTime)
    }
}

/// One physical row: implicit linkage columns plus named data cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRow {
    pub table: TableName,
    pub key: RowKey,
    pub parent_key: Option<RowKey>,
    pub top_level_key: Option<RowKey>,
    pub ordinal: Option<i64>,
    pub cells: BTreeMap<String, CellValue>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl StoredRow {
    pub fn new(table: TableName, key: RowKey) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            table,
            key,
            parent_key: None,
            top_level_key: None,
            ordinal: None,
            cells: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn entity_key(&self) -> EntityKey {
        EntityKey {
            table: self.table.clone(),
            key: self.key.clone(),
        }
    }

    pub fn cell(&self, column: &str) -> &CellValue {
        const NULL: &CellValue = &CellValue::Null;
        self.cells.get(column).unwrap_or(NULL)
    }

    pub fn set(&mut self, column: impl Into<String>, value: CellValue) {
        let column = column.into();
        if value.is_null() {
            self.cells.remove(&column);
        } else {
            self.cells.insert(column, value);
        }
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.cell(column).as_text()
    }
}

/// First position where `rows` (already sorted by ordinal) stop counting `1..=n`.
///
/// Returns the expected ordinal and what was found there.
pub fn ordinal_gap(rows: &[StoredRow]) -> Option<(i64, Option<i64>)> {
    rows.iter().enumerate().find_map(|(index, row)| {
        let expected = index as i64 + 1;
        (row.ordinal != Some(expected)).then_some((expected, row.ordinal))
    })
}
