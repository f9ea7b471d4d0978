use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::definition::{FieldKind, FieldSpec, FormDefinition};
use crate::limits::StoreLimits;
use crate::schema::{
    COLUMN_NAME_COLUMN, CONTENT_HASH_COLUMN, CONTENT_LENGTH_COLUMN, CONTENT_TYPE_COLUMN,
    ColumnDef, ColumnType, ElementId, ElementType, IS_COMPLETE_COLUMN,
    MARKED_AS_COMPLETE_DATE_COLUMN, MODEL_VERSION_COLUMN, NewElement, PhysicalLocation,
    SUB_AURI_COLUMN, SUBMISSION_DATE_COLUMN, SchemaError, SchemaTree, TableId, TableRole,
    UI_VERSION_COLUMN, UNROOTED_FILE_PATH_COLUMN, VALUE_COLUMN,
};

/// Three key columns plus the ordinal and two timestamps.
const IMPLICIT_ROW_BYTES: usize = 3 * 80 + 8 + 2 * 8;
/// Width of columns that hold a row key.
pub const KEY_COLUMN_LENGTH: usize = 80;
/// Suffixes of the four decimal columns a geopoint expands into, in ordinal order.
pub const GEOPOINT_COLUMN_SUFFIXES: [&str; 4] = ["_LAT", "_LNG", "_ALT", "_ACC"];

/// Compiles a form definition into its physical table layout.
pub fn compile(definition: &FormDefinition, limits: &StoreLimits) -> Result<SchemaTree, SchemaError> {
    limits
        .check()
        .map_err(|err| SchemaError::InvalidLimits(err.to_string()))?;
    definition.validate()?;
    let prefix = sanitize(&definition.form_id);
    let core = format!("{prefix}_CORE");
    let tree = SchemaTree::new(
        definition.form_id.clone(),
        limits.schema.clone(),
        definition.root.name.clone(),
        core.clone(),
    );
    let mut compiler = Compiler {
        limits,
        prefix,
        table_names: BTreeSet::from([core.clone()]),
        row_bytes: vec![IMPLICIT_ROW_BYTES],
        tree,
    };
    let top = compiler.tree.top_level_table();
    compiler.declare_metadata_columns(top);
    compiler.declare_long_string_table();

    let root = compiler.tree.root();
    compiler.compile_fields(root, &definition.root.children, top, "", &core)?;
    compiler.tree.validate()?;
    info!(
        form_id = %definition.form_id,
        tables = compiler.tree.tables().len(),
        elements = compiler.tree.elements().len(),
        "compiled form layout"
    );
    Ok(compiler.tree)
}

struct Compiler<'a> {
    limits: &'a StoreLimits,
    prefix: String,
    table_names: BTreeSet<String>,
    /// Estimated row width per table, indexed by table id.
    row_bytes: Vec<usize>,
    tree: SchemaTree,
}

impl Compiler<'_> {
    fn declare_metadata_columns(&mut self, table: TableId) {
        for column in [
            ColumnDef::new(MODEL_VERSION_COLUMN, ColumnType::Integer),
            ColumnDef::new(UI_VERSION_COLUMN, ColumnType::Integer),
            ColumnDef::new(SUBMISSION_DATE_COLUMN, ColumnType::DateTime),
            ColumnDef::new(IS_COMPLETE_COLUMN, ColumnType::Boolean),
            ColumnDef::new(MARKED_AS_COMPLETE_DATE_COLUMN, ColumnType::DateTime),
        ] {
            self.push_column(table, column);
        }
    }

    fn declare_long_string_table(&mut self) {
        let top = self.tree.top_level_table();
        let name = self.unique_table_name(format!("{}_STRING_TXT", self.prefix));
        let table = self.new_table(name, TableRole::LongString, Some(top));
        self.push_column(table, ColumnDef::text(COLUMN_NAME_COLUMN, KEY_COLUMN_LENGTH));
        self.push_column(
            table,
            ColumnDef::text(VALUE_COLUMN, self.limits.default_string_length),
        );
        self.tree.set_long_string_table(table);
    }

    fn compile_fields(
        &mut self,
        container: ElementId,
        fields: &[FieldSpec],
        table: TableId,
        group_prefix: &str,
        base_name: &str,
    ) -> Result<(), SchemaError> {
        let mut container = container;
        let mut table = table;
        let mut ordinal = 1;
        for field in fields {
            if let Some((columns, bytes)) = self.inline_width(field)
                && !self.fits(table, columns, bytes)
            {
                if self.tree.table(table).columns.is_empty() {
                    return Err(SchemaError::LimitsTooSmall {
                        field: field.name.clone(),
                    });
                }
                let name = self.unique_table_name(base_name.to_string());
                let split = self.new_table(name, TableRole::Phantom, Some(table));
                container = self.tree.insert_element(
                    container,
                    ordinal,
                    NewElement {
                        element_type: ElementType::Phantom,
                        element_name: None,
                        location: PhysicalLocation::table(split),
                        max_length: None,
                    },
                )?;
                info!(
                    full = %self.tree.table(table).name,
                    split = %self.tree.table(split).name,
                    field = %field.name,
                    "table limits reached; continuing in phantom table"
                );
                table = split;
                ordinal = 1;
                if !self.fits(table, columns, bytes) {
                    return Err(SchemaError::LimitsTooSmall {
                        field: field.name.clone(),
                    });
                }
            }
            self.compile_field(container, ordinal, field, table, group_prefix)?;
            ordinal += 1;
        }
        Ok(())
    }

    fn compile_field(
        &mut self,
        container: ElementId,
        ordinal: usize,
        field: &FieldSpec,
        table: TableId,
        group_prefix: &str,
    ) -> Result<(), SchemaError> {
        let element_type = ElementType::from_field(field.kind);
        let qualified = format!("{group_prefix}{}", sanitize(&field.name));
        match field.kind {
            FieldKind::Group => {
                let group = self.tree.insert_element(
                    container,
                    ordinal,
                    named(element_type, field, PhysicalLocation::table(table)),
                )?;
                let base = self.tree.table(table).name.table.clone();
                self.compile_fields(group, &field.children, table, &format!("{qualified}_"), &base)
            }
            FieldKind::Repeat => {
                let name = self.unique_table_name(format!("{}_{qualified}", self.prefix));
                let repeat_table = self.new_table(name.clone(), TableRole::Repeat, Some(table));
                let repeat = self.tree.insert_element(
                    container,
                    ordinal,
                    named(element_type, field, PhysicalLocation::table(repeat_table)),
                )?;
                self.compile_fields(repeat, &field.children, repeat_table, "", &name)
            }
            FieldKind::SelectN => {
                let name = self.unique_table_name(format!("{}_{qualified}", self.prefix));
                let choices = self.new_table(name, TableRole::SelectChoice, Some(table));
                self.push_column(
                    choices,
                    ColumnDef::text(VALUE_COLUMN, self.limits.default_string_length),
                );
                self.tree.insert_element(
                    container,
                    ordinal,
                    named(element_type, field, PhysicalLocation::table(choices)),
                )?;
                Ok(())
            }
            FieldKind::Binary => self.compile_binary(container, ordinal, field, table, &qualified),
            FieldKind::Geopoint => {
                let point = self.tree.insert_element(
                    container,
                    ordinal,
                    named(element_type, field, PhysicalLocation::table(table)),
                )?;
                for (index, suffix) in GEOPOINT_COLUMN_SUFFIXES.iter().enumerate() {
                    let column = self.unique_column_name(table, format!("{qualified}{suffix}"));
                    self.push_column(table, ColumnDef::new(column.clone(), ColumnType::Decimal));
                    self.tree.insert_element(
                        point,
                        index + 1,
                        named(
                            ElementType::Decimal,
                            field,
                            PhysicalLocation::column(table, column),
                        ),
                    )?;
                }
                Ok(())
            }
            _ => {
                let (column_type, max_length) = self.column_shape(field);
                let column = self.unique_column_name(table, qualified);
                self.push_column(
                    table,
                    ColumnDef {
                        name: column.clone(),
                        column_type,
                        max_length,
                    },
                );
                let mut element = named(element_type, field, PhysicalLocation::column(table, column));
                element.max_length = max_length;
                self.tree.insert_element(container, ordinal, element)?;
                Ok(())
            }
        }
    }

    fn compile_binary(
        &mut self,
        container: ElementId,
        ordinal: usize,
        field: &FieldSpec,
        table: TableId,
        qualified: &str,
    ) -> Result<(), SchemaError> {
        let base = format!("{}_{qualified}", self.prefix);
        let content_name = self.unique_table_name(format!("{base}_BN"));
        let content = self.new_table(content_name, TableRole::BinaryContent, Some(table));
        let default_length = self.limits.default_string_length;
        self.push_column(content, ColumnDef::text(UNROOTED_FILE_PATH_COLUMN, default_length));
        self.push_column(content, ColumnDef::text(CONTENT_TYPE_COLUMN, default_length));
        self.push_column(content, ColumnDef::new(CONTENT_LENGTH_COLUMN, ColumnType::Integer));
        self.push_column(content, ColumnDef::text(CONTENT_HASH_COLUMN, KEY_COLUMN_LENGTH));

        let ref_name = self.unique_table_name(format!("{base}_REF"));
        let content_ref = self.new_table(ref_name, TableRole::BinaryContentRef, Some(content));
        self.push_column(content_ref, ColumnDef::text(SUB_AURI_COLUMN, KEY_COLUMN_LENGTH));

        let blob_name = self.unique_table_name(format!("{base}_BLB"));
        let blob = self.new_table(blob_name, TableRole::RefBlob, Some(content_ref));
        self.push_column(
            blob,
            ColumnDef {
                name: VALUE_COLUMN.to_string(),
                column_type: ColumnType::Bytes,
                max_length: Some(self.limits.blob_chunk_bytes),
            },
        );

        let binary = self.tree.insert_element(
            container,
            ordinal,
            named(ElementType::Binary, field, PhysicalLocation::table(content)),
        )?;
        let reference = self.tree.insert_element(
            binary,
            1,
            named(
                ElementType::BinaryContentRefBlob,
                field,
                PhysicalLocation::table(content_ref),
            ),
        )?;
        self.tree.insert_element(
            reference,
            1,
            named(ElementType::RefBlob, field, PhysicalLocation::table(blob)),
        )?;
        Ok(())
    }

    /// Columns and bytes a field adds to the current table, or `None` when it needs no check.
    fn inline_width(&self, field: &FieldSpec) -> Option<(usize, usize)> {
        match field.kind {
            FieldKind::Group | FieldKind::Repeat | FieldKind::SelectN | FieldKind::Binary => None,
            FieldKind::Geopoint => Some((4, 4 * ColumnType::Decimal.byte_width(None))),
            _ => {
                let (column_type, max_length) = self.column_shape(field);
                Some((1, column_type.byte_width(max_length)))
            }
        }
    }

    fn column_shape(&self, field: &FieldSpec) -> (ColumnType, Option<usize>) {
        let text = || {
            (
                ColumnType::Text,
                Some(field.max_length.unwrap_or(self.limits.default_string_length)),
            )
        };
        match field.kind {
            FieldKind::Integer => (ColumnType::Integer, None),
            FieldKind::Decimal => (ColumnType::Decimal, None),
            FieldKind::Boolean => (ColumnType::Boolean, None),
            FieldKind::Date => (ColumnType::Date, None),
            FieldKind::Time => (ColumnType::Time, None),
            FieldKind::DateTime => (ColumnType::DateTime, None),
            _ => text(),
        }
    }

    fn fits(&self, table: TableId, columns: usize, bytes: usize) -> bool {
        let current = self.tree.table(table);
        current.column_count() + columns <= self.limits.max_columns_per_table
            && self.row_bytes[table.0 as usize] + bytes <= self.limits.max_row_bytes
    }

    fn new_table(&mut self, name: String, role: TableRole, parent: Option<TableId>) -> TableId {
        let id = self.tree.add_table(name, role, parent);
        self.row_bytes.push(IMPLICIT_ROW_BYTES);
        debug!(table = %self.tree.table(id).name, ?role, "declared table");
        id
    }

    fn push_column(&mut self, table: TableId, column: ColumnDef) {
        self.row_bytes[table.0 as usize] += column.column_type.byte_width(column.max_length);
        self.tree.add_column(table, column);
    }

    fn unique_table_name(&mut self, candidate: String) -> String {
        let mut name = candidate.clone();
        let mut suffix = 2;
        while self.table_names.contains(&name) {
            name = format!("{candidate}{suffix}");
            suffix += 1;
        }
        self.table_names.insert(name.clone());
        name
    }

    fn unique_column_name(&self, table: TableId, candidate: String) -> String {
        let current = self.tree.table(table);
        let mut name = candidate.clone();
        let mut suffix = 2;
        while current.column(&name).is_some() {
            name = format!("{candidate}_{suffix}");
            suffix += 1;
        }
        name
    }
}

fn named(element_type: ElementType, field: &FieldSpec, location: PhysicalLocation) -> NewElement {
    NewElement {
        element_type,
        element_name: Some(field.name.clone()),
        location,
        max_length: None,
    }
}

/// Upper-cases and replaces anything outside `[A-Z0-9_]` with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
