use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::definition::FieldKind;

pub const MODEL_VERSION_COLUMN: &str = "_MODEL_VERSION";
pub const UI_VERSION_COLUMN: &str = "_UI_VERSION";
pub const SUBMISSION_DATE_COLUMN: &str = "_SUBMISSION_DATE";
pub const IS_COMPLETE_COLUMN: &str = "_IS_COMPLETE";
pub const MARKED_AS_COMPLETE_DATE_COLUMN: &str = "_MARKED_AS_COMPLETE_DATE";

/// Choice rows, raw-bytes rows and long-string rows keep their payload here.
pub const VALUE_COLUMN: &str = "VALUE";
pub const UNROOTED_FILE_PATH_COLUMN: &str = "UNROOTED_FILE_PATH";
pub const CONTENT_TYPE_COLUMN: &str = "CONTENT_TYPE";
pub const CONTENT_LENGTH_COLUMN: &str = "CONTENT_LENGTH";
pub const CONTENT_HASH_COLUMN: &str = "CONTENT_HASH";
/// Content-ref rows point at their raw-bytes row through this column.
pub const SUB_AURI_COLUMN: &str = "SUB_AURI";
/// Long-string rows record which column of the owning row they extend.
pub const COLUMN_NAME_COLUMN: &str = "COLUMN_NAME";

/// Row key, parent key, top-level key, ordinal, created and last-updated.
pub const IMPLICIT_COLUMN_COUNT: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("element `{element}` has no child at ordinal {ordinal}")]
    MissingOrdinal { element: String, ordinal: usize },
    #[error("element `{element}` already has a child at ordinal {ordinal}")]
    DuplicateOrdinal { element: String, ordinal: usize },
    #[error("field `{field}` does not fit into an empty table under the configured store limits")]
    LimitsTooSmall { field: String },
    #[error("unusable store limits: {0}")]
    InvalidLimits(String),
    #[error("invalid element name `{0}`")]
    InvalidName(String),
    #[error("element name `{0}` is declared twice under the same parent")]
    DuplicateName(String),
    #[error("top-level element `{0}` must be a group")]
    RootNotGroup(String),
    #[error("field `{0}` cannot declare children")]
    ChildrenNotAllowed(String),
    #[error("element `{0}` is internal to the storage layout and has no submission-facing form")]
    HiddenElement(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ElementId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Storage-level kind of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementType {
    String,
    DateTime,
    Date,
    Time,
    Integer,
    Decimal,
    GeoPoint,
    GeoTrace,
    GeoShape,
    Binary,
    Boolean,
    Select1,
    SelectN,
    Repeat,
    Group,
    Phantom,
    BinaryContentRefBlob,
    RefBlob,
}

impl ElementType {
    pub fn from_field(kind: FieldKind) -> Self {
        match kind {
            FieldKind::String => ElementType::String,
            FieldKind::DateTime => ElementType::DateTime,
            FieldKind::Date => ElementType::Date,
            FieldKind::Time => ElementType::Time,
            FieldKind::Integer => ElementType::Integer,
            FieldKind::Decimal => ElementType::Decimal,
            FieldKind::Geopoint => ElementType::GeoPoint,
            FieldKind::Geotrace => ElementType::GeoTrace,
            FieldKind::Geoshape => ElementType::GeoShape,
            FieldKind::Binary => ElementType::Binary,
            FieldKind::Boolean => ElementType::Boolean,
            FieldKind::Select1 => ElementType::Select1,
            FieldKind::SelectN => ElementType::SelectN,
            FieldKind::Repeat => ElementType::Repeat,
            FieldKind::Group => ElementType::Group,
        }
    }

    /// True when values of this kind live in the enclosing data table rather than a table of their own.
    pub fn is_stored_within_data_table(self) -> bool {
        match self {
            ElementType::String
            | ElementType::DateTime
            | ElementType::Date
            | ElementType::Time
            | ElementType::Integer
            | ElementType::Decimal
            | ElementType::GeoPoint
            | ElementType::GeoTrace
            | ElementType::GeoShape
            | ElementType::Boolean
            | ElementType::Select1
            | ElementType::Group
            | ElementType::Phantom => true,
            ElementType::Binary
            | ElementType::SelectN
            | ElementType::Repeat
            | ElementType::BinaryContentRefBlob
            | ElementType::RefBlob => false,
        }
    }
}

/// Where a schema node is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhysicalLocation {
    pub table: TableId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl PhysicalLocation {
    pub fn table(table: TableId) -> Self {
        Self {
            table,
            column: None,
        }
    }

    pub fn column(table: TableId, column: impl Into<String>) -> Self {
        Self {
            table,
            column: Some(column.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaElement {
    pub id: ElementId,
    pub element_type: ElementType,
    /// 1-based position among its siblings.
    pub ordinal: usize,
    pub element_name: Option<String>,
    pub parent: Option<ElementId>,
    pub children: Vec<Option<ElementId>>,
    pub location: PhysicalLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl SchemaElement {
    pub fn name(&self) -> Option<&str> {
        self.element_name.as_deref()
    }

    pub fn is_phantom(&self) -> bool {
        self.element_type == ElementType::Phantom
    }

    /// Nodes a submission set walks through when allocating or resolving its rows.
    pub fn is_part_of_enclosing_set(&self) -> bool {
        self.location.column.is_none()
            && matches!(
                self.element_type,
                ElementType::Phantom | ElementType::GeoPoint | ElementType::Group
            )
    }

    pub fn child_ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.children.iter().flatten().copied()
    }
}

/// Element fields supplied when inserting into a [`SchemaTree`].
#[derive(Debug, Clone)]
pub struct NewElement {
    pub element_type: ElementType,
    pub element_name: Option<String>,
    pub location: PhysicalLocation,
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    TopLevel,
    Repeat,
    Phantom,
    SelectChoice,
    BinaryContent,
    BinaryContentRef,
    RefBlob,
    LongString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    Time,
    DateTime,
    Bytes,
}

impl ColumnType {
    /// Estimated storage width, used when checking row-size ceilings.
    pub fn byte_width(self, max_length: Option<usize>) -> usize {
        match self {
            ColumnType::Text | ColumnType::Bytes => max_length.unwrap_or(0) + 2,
            ColumnType::Integer => 8,
            ColumnType::Decimal => 16,
            ColumnType::Boolean => 1,
            ColumnType::Date | ColumnType::Time | ColumnType::DateTime => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            max_length: None,
        }
    }

    pub fn text(name: impl Into<String>, max_length: usize) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Text,
            max_length: Some(max_length),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TableName {
    pub schema: String,
    pub table: String,
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhysicalTable {
    pub id: TableId,
    pub name: TableName,
    pub role: TableRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<TableId>,
    pub columns: Vec<ColumnDef>,
}

impl PhysicalTable {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_count(&self) -> usize {
        IMPLICIT_COLUMN_COUNT + self.columns.len()
    }
}

/// Compiled physical layout of one form version.
///
/// Elements and tables are arenas indexed by [`ElementId`] and [`TableId`]; both ids
/// are only minted by the tree itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaTree {
    pub form_id: String,
    pub schema: String,
    elements: Vec<SchemaElement>,
    tables: Vec<PhysicalTable>,
    root: ElementId,
    long_string_table: Option<TableId>,
}

impl SchemaTree {
    /// Starts a tree whose top-level group lives in `root_table`.
    pub fn new(
        form_id: impl Into<String>,
        schema: impl Into<String>,
        root_name: impl Into<String>,
        root_table: impl Into<String>,
    ) -> Self {
        let mut tree = Self {
            form_id: form_id.into(),
            schema: schema.into(),
            elements: Vec::new(),
            tables: Vec::new(),
            root: ElementId(0),
            long_string_table: None,
        };
        let table = tree.add_table(root_table, TableRole::TopLevel, None);
        tree.elements.push(SchemaElement {
            id: ElementId(0),
            element_type: ElementType::Group,
            ordinal: 1,
            element_name: Some(root_name.into()),
            parent: None,
            children: Vec::new(),
            location: PhysicalLocation::table(table),
            max_length: None,
        });
        tree
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn element(&self, id: ElementId) -> &SchemaElement {
        &self.elements[id.0 as usize]
    }

    pub fn elements(&self) -> &[SchemaElement] {
        &self.elements
    }

    pub fn table(&self, id: TableId) -> &PhysicalTable {
        &self.tables[id.0 as usize]
    }

    pub fn tables(&self) -> &[PhysicalTable] {
        &self.tables
    }

    pub fn top_level_table(&self) -> TableId {
        self.element(self.root).location.table
    }

    pub fn long_string_table(&self) -> Option<TableId> {
        self.long_string_table
    }

    pub fn set_long_string_table(&mut self, table: TableId) {
        self.long_string_table = Some(table);
    }

    pub fn add_table(
        &mut self,
        table: impl Into<String>,
        role: TableRole,
        parent: Option<TableId>,
    ) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(PhysicalTable {
            id,
            name: TableName {
                schema: self.schema.clone(),
                table: table.into(),
            },
            role,
            parent,
            columns: Vec::new(),
        });
        id
    }

    pub fn add_column(&mut self, table: TableId, column: ColumnDef) {
        self.tables[table.0 as usize].columns.push(column);
    }

    /// Places a new element at `ordinal` (1-based) under `parent`.
    pub fn insert_element(
        &mut self,
        parent: ElementId,
        ordinal: usize,
        element: NewElement,
    ) -> Result<ElementId, SchemaError> {
        let id = ElementId(self.elements.len() as u32);
        let slot = ordinal.checked_sub(1).ok_or_else(|| SchemaError::MissingOrdinal {
            element: self.display_name(parent),
            ordinal,
        })?;
        let parent_node = &mut self.elements[parent.0 as usize];
        if parent_node.children.len() <= slot {
            parent_node.children.resize(slot + 1, None);
        }
        if parent_node.children[slot].is_some() {
            return Err(SchemaError::DuplicateOrdinal {
                element: self.display_name(parent),
                ordinal,
            });
        }
        parent_node.children[slot] = Some(id);
        self.elements.push(SchemaElement {
            id,
            element_type: element.element_type,
            ordinal,
            element_name: element.element_name,
            parent: Some(parent),
            children: Vec::new(),
            location: element.location,
            max_length: element.max_length,
        });
        Ok(id)
    }

    /// Fails when any ordinal slot `1..=n` under `id` is unfilled.
    pub fn validate_children(&self, id: ElementId) -> Result<(), SchemaError> {
        let node = self.element(id);
        match node.children.iter().position(Option::is_none) {
            Some(slot) => Err(SchemaError::MissingOrdinal {
                element: self.display_name(id),
                ordinal: slot + 1,
            }),
            None => Ok(()),
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        self.elements
            .iter()
            .try_for_each(|element| self.validate_children(element.id))
    }

    /// Searches the children of `from`, descending through nameless phantom children.
    pub fn find_by_name(&self, from: ElementId, name: &str) -> Option<ElementId> {
        for child in self.element(from).child_ids() {
            let node = self.element(child);
            if node.name() == Some(name) {
                return Some(child);
            }
            if node.is_phantom()
                && let Some(found) = self.find_by_name(child, name)
            {
                return Some(found);
            }
        }
        None
    }

    /// Nearest ancestor that is not a phantom.
    pub fn real_parent(&self, id: ElementId) -> Option<ElementId> {
        let mut current = self.element(id).parent;
        while let Some(parent) = current {
            if !self.element(parent).is_phantom() {
                return Some(parent);
            }
            current = self.element(parent).parent;
        }
        None
    }

    /// Colon-joined path relative to the enclosing repeat or top-level group.
    pub fn group_qualified_name(&self, id: ElementId) -> Result<String, SchemaError> {
        self.qualified_name(id, false)
    }

    /// Slash-joined variant; elements directly under the top level render as `/top/element`.
    pub fn group_qualified_xpath_name(&self, id: ElementId) -> Result<String, SchemaError> {
        self.qualified_name(id, true)
    }

    fn qualified_name(&self, id: ElementId, xpath: bool) -> Result<String, SchemaError> {
        let node = self.element(id);
        match node.element_type {
            ElementType::Phantom => {
                return match node.parent {
                    Some(parent) => self.qualified_name(parent, xpath),
                    None => Err(SchemaError::HiddenElement(self.display_name(id))),
                };
            }
            ElementType::BinaryContentRefBlob | ElementType::RefBlob => {
                return Err(SchemaError::HiddenElement(self.display_name(id)));
            }
            _ => {}
        }
        let prefix = match self.real_parent(id) {
            None => String::new(),
            Some(parent) if self.element(parent).element_type == ElementType::Repeat => {
                String::new()
            }
            Some(parent) if self.element(parent).parent.is_none() => {
                if xpath {
                    format!("/{}/", self.qualified_name(parent, xpath)?)
                } else {
                    String::new()
                }
            }
            Some(parent) => {
                let separator = if xpath { '/' } else { ':' };
                format!("{}{separator}", self.qualified_name(parent, xpath)?)
            }
        };
        Ok(format!("{prefix}{}", node.name().unwrap_or_default()))
    }

    fn display_name(&self, id: ElementId) -> String {
        let node = self.element(id);
        match node.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}#{}", node.element_type, id.0),
        }
    }
}
