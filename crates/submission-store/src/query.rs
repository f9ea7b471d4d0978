use submission_model::TableName;

use crate::row::{CellValue, RowKey, StoredRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterColumn {
    ParentKey,
    TopLevelKey,
    Column(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortColumn {
    ParentKey,
    Ordinal,
}

/// Equality filter; the only comparison the engine issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: FilterColumn,
    pub value: CellValue,
}

impl RowFilter {
    pub fn matches(&self, row: &StoredRow) -> bool {
        match &self.column {
            FilterColumn::ParentKey => key_matches(row.parent_key.as_ref(), &self.value),
            FilterColumn::TopLevelKey => key_matches(row.top_level_key.as_ref(), &self.value),
            FilterColumn::Column(name) => row.cell(name) == &self.value,
        }
    }
}

fn key_matches(key: Option<&RowKey>, value: &CellValue) -> bool {
    match (key, value) {
        (Some(key), CellValue::Text(text)) => key.as_str() == text,
        (None, CellValue::Null) => true,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    pub table: TableName,
    pub filters: Vec<RowFilter>,
    /// Ascending sort keys, applied in order.
    pub sort: Vec<SortColumn>,
}

impl RowQuery {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            filters: Vec::new(),
            sort: Vec::new(),
        }
    }

    /// Rows whose parent pointer is `parent`, ascending by parent and ordinal.
    pub fn children_of(table: TableName, parent: &RowKey) -> Self {
        Self::new(table)
            .equal(FilterColumn::ParentKey, CellValue::Text(parent.to_string()))
            .sort_by(SortColumn::ParentKey)
            .sort_by(SortColumn::Ordinal)
    }

    pub fn equal(mut self, column: FilterColumn, value: CellValue) -> Self {
        self.filters.push(RowFilter { column, value });
        self
    }

    pub fn sort_by(mut self, column: SortColumn) -> Self {
        self.sort.push(column);
        self
    }

    pub fn matches(&self, row: &StoredRow) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }

    pub fn sort(&self, rows: &mut [StoredRow]) {
        rows.sort_by(|left, right| {
            self.sort
                .iter()
                .map(|column| match column {
                    SortColumn::ParentKey => left.parent_key.cmp(&right.parent_key),
                    SortColumn::Ordinal => left.ordinal.cmp(&right.ordinal),
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}
