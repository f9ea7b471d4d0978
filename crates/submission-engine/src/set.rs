use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use submission_model::schema::{MODEL_VERSION_COLUMN, UI_VERSION_COLUMN, VALUE_COLUMN};
use submission_model::schema::{
    IS_COMPLETE_COLUMN, MARKED_AS_COMPLETE_DATE_COLUMN, SUBMISSION_DATE_COLUMN,
};
use submission_model::{
    CompiledForm, ElementId, ElementSource, FormElement, FormElementId, FormElementNamespace,
    FormElementType, MetadataKind, SubmissionKey, SubmissionKeyPart, TableId,
};
use submission_store::{
    AttachmentOutcome, AttachmentTables, CellValue, EntityKey, NewAttachment, RelationalStore,
    RowKey, RowQuery, StoredRow,
};
use tracing::{debug, error};

use crate::error::EngineError;
use crate::format::{ElementFormatter, FormattedRow};
use crate::value::{
    BlobValue, ChoiceValue, ColumnBinding, DateTimeData, DateTimeKind, DateTimeValue, GeoPoint,
    GeoPointValue, NestedContext, OverflowTarget, RepeatValue, RowArena, ScalarValue,
    StringSource, StringValue, SubmissionValue,
};

/// Lifecycle of a [`SubmissionSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetState {
    Building,
    Populated,
    Persisting,
    Persisted,
}

/// Identity of the set enclosing a repeat instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingSet {
    pub key: SubmissionKey,
    pub row_key: RowKey,
    /// Element name of the enclosing group.
    pub property_name: String,
}

/// Target of a resolved [`SubmissionKey`].
#[derive(Debug, Clone, Copy)]
pub enum ResolvedElement<'a> {
    Set(&'a SubmissionSet),
    Repeat(&'a RepeatValue),
    Value(&'a SubmissionValue),
    Attachment { value: &'a BlobValue, ordinal: usize },
}

/// Which values a formatted row covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementSelection {
    All,
    Elements(Vec<FormElementId>),
    Namespaces(Vec<FormElementNamespace>),
}

/// Callback for [`SubmissionSet::depth_first`]; returning `true` stops the walk.
pub trait SubmissionVisitor {
    fn traverse_set(&mut self, _set: &SubmissionSet) -> bool {
        false
    }

    fn traverse_value(&mut self, _value: &SubmissionValue, _element: &FormElement) -> bool {
        false
    }
}

/// Values of one group instance: the top-level group or one repeat instance.
///
/// Owns its physical rows (the group row plus one row per phantom table)
/// and one [`SubmissionValue`] per non-group element, flattened through
/// nested groups.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionSet {
    form: Arc<CompiledForm>,
    group: FormElementId,
    key: SubmissionKey,
    row_key: RowKey,
    top_level_key: RowKey,
    ordinal: Option<i64>,
    enclosing: Option<EnclosingSet>,
    group_table: TableId,
    rows: RowArena,
    values: BTreeMap<FormElementId, SubmissionValue>,
    order: Vec<FormElementId>,
    state: SetState,
}

impl SubmissionSet {
    fn skeleton(
        form: Arc<CompiledForm>,
        group: FormElementId,
        key: SubmissionKey,
        row: StoredRow,
        group_table: TableId,
        enclosing: Option<EnclosingSet>,
    ) -> Self {
        let row_key = row.key.clone();
        let top_level_key = row.top_level_key.clone().unwrap_or_else(|| row.key.clone());
        let ordinal = enclosing.as_ref().and(row.ordinal);
        let mut rows = RowArena::new();
        rows.insert(group_table, row);
        Self {
            form,
            group,
            key,
            row_key,
            top_level_key,
            ordinal,
            enclosing,
            group_table,
            rows,
            values: BTreeMap::new(),
            order: Vec::new(),
            state: SetState::Building,
        }
    }

    fn group_schema(form: &CompiledForm, group: FormElementId) -> Result<(ElementId, TableId), EngineError> {
        let element = form.elements.element(group);
        let schema = element.schema_element().ok_or_else(|| {
            EngineError::IllegalState(format!("group `{}` has no schema element", element.name))
        })?;
        Ok((schema, form.schema.element(schema).location.table))
    }

    fn top_level_submission_key(form: &CompiledForm, row_key: &RowKey) -> SubmissionKey {
        SubmissionKey::from_parts(&[
            SubmissionKeyPart::form(form.form_id.clone(), form.version),
            SubmissionKeyPart::element(form.top_level_name()).with_auri(row_key.as_str()),
        ])
    }

    fn nested_submission_key(
        form: &CompiledForm,
        repeat: FormElementId,
        context: &NestedContext,
        ordinal: i64,
    ) -> SubmissionKey {
        let name = &form.elements.element(repeat).group_qualified_name;
        context
            .enclosing
            .key
            .child(&format!("{name}[@ordinal={ordinal}]"))
    }

    pub(crate) fn create_top_level(
        form: Arc<CompiledForm>,
        store: &dyn RelationalStore,
        instance_id: Option<RowKey>,
    ) -> Result<Self, EngineError> {
        let group = form.top_level_group();
        let (schema, table) = Self::group_schema(&form, group)?;
        let mut row = store.new_row(&form.schema.table(table).name)?;
        if let Some(instance_id) = instance_id {
            row.key = instance_id;
        }
        row.top_level_key = Some(row.key.clone());
        row.set(MODEL_VERSION_COLUMN, CellValue::from(form.version.model_version));
        row.set(UI_VERSION_COLUMN, CellValue::from(form.version.ui_version));
        let key = Self::top_level_submission_key(&form, &row.key);

        let mut set = Self::skeleton(Arc::clone(&form), group, key, row, table, None);
        set.create_rows(&form, store, schema, table)?;
        set.build_values(&form, store, false)?;
        Ok(set)
    }

    pub(crate) fn load_top_level(
        form: Arc<CompiledForm>,
        store: &dyn RelationalStore,
        instance_id: &RowKey,
    ) -> Result<Self, EngineError> {
        let group = form.top_level_group();
        let (schema, table) = Self::group_schema(&form, group)?;
        let row = store.get_row(&form.schema.table(table).name, instance_id)?;
        let key = Self::top_level_submission_key(&form, &row.key);

        let mut set = Self::skeleton(Arc::clone(&form), group, key, row, table, None);
        set.resolve_rows(&form, store, schema, table)?;
        set.build_values(&form, store, true)?;
        Ok(set)
    }

    pub(crate) fn create_nested(
        form: Arc<CompiledForm>,
        store: &dyn RelationalStore,
        repeat: FormElementId,
        context: &NestedContext,
        ordinal: i64,
    ) -> Result<Self, EngineError> {
        let (schema, table) = Self::group_schema(&form, repeat)?;
        let mut row = store.new_row(&context.table)?;
        row.parent_key = Some(context.parent_row.clone());
        row.top_level_key = Some(context.top_level_key.clone());
        row.ordinal = Some(ordinal);
        let key = Self::nested_submission_key(&form, repeat, context, ordinal);

        let mut set = Self::skeleton(
            Arc::clone(&form),
            repeat,
            key,
            row,
            table,
            Some(context.enclosing.clone()),
        );
        set.create_rows(&form, store, schema, table)?;
        set.build_values(&form, store, false)?;
        debug!(key = %set.key, "added repeat instance");
        Ok(set)
    }

    pub(crate) fn load_nested(
        form: Arc<CompiledForm>,
        store: &dyn RelationalStore,
        repeat: FormElementId,
        row: StoredRow,
        context: &NestedContext,
    ) -> Result<Self, EngineError> {
        let (schema, table) = Self::group_schema(&form, repeat)?;
        let ordinal = row.ordinal.ok_or_else(|| {
            EngineError::IllegalState(format!("repeat row {} has no ordinal", row.key))
        })?;
        let key = Self::nested_submission_key(&form, repeat, context, ordinal);

        let mut set = Self::skeleton(
            Arc::clone(&form),
            repeat,
            key,
            row,
            table,
            Some(context.enclosing.clone()),
        );
        set.resolve_rows(&form, store, schema, table)?;
        set.build_values(&form, store, true)?;
        Ok(set)
    }

    /// Allocates one row for every phantom table reachable without leaving this set.
    fn create_rows(
        &mut self,
        form: &CompiledForm,
        store: &dyn RelationalStore,
        from: ElementId,
        current: TableId,
    ) -> Result<(), EngineError> {
        for child in form.schema.element(from).child_ids() {
            let node = form.schema.element(child);
            if !node.is_part_of_enclosing_set() {
                continue;
            }
            let table = node.location.table;
            if table != current && !self.rows.contains_key(&table) {
                let parent_key = self.row_in(current)?.key.clone();
                let mut row = store.new_row(&form.schema.table(table).name)?;
                row.parent_key = Some(parent_key);
                row.top_level_key = Some(self.top_level_key.clone());
                row.ordinal = Some(1);
                self.rows.insert(table, row);
            }
            self.create_rows(form, store, child, table)?;
        }
        Ok(())
    }

    /// Finds the single phantom row of every table reachable without leaving this set.
    fn resolve_rows(
        &mut self,
        form: &CompiledForm,
        store: &dyn RelationalStore,
        from: ElementId,
        current: TableId,
    ) -> Result<(), EngineError> {
        for child in form.schema.element(from).child_ids() {
            let node = form.schema.element(child);
            if !node.is_part_of_enclosing_set() {
                continue;
            }
            let table = node.location.table;
            if table != current && !self.rows.contains_key(&table) {
                let parent_key = self.row_in(current)?.key.clone();
                let name = &form.schema.table(table).name;
                let mut rows = store.query(&RowQuery::children_of(name.clone(), &parent_key))?;
                if rows.len() != 1 {
                    error!(
                        table = %name,
                        parent_key = %parent_key,
                        found = rows.len(),
                        "expected exactly one phantom row"
                    );
                    return Err(EngineError::Reconstruction {
                        table: name.clone(),
                        parent_key,
                        found: rows.len(),
                    });
                }
                self.rows.insert(table, rows.remove(0));
            }
            self.resolve_rows(form, store, child, table)?;
        }
        Ok(())
    }

    fn row_in(&self, table: TableId) -> Result<&StoredRow, EngineError> {
        self.rows.get(&table).ok_or_else(|| {
            EngineError::IllegalState(format!("submission set {} holds no row for table {table}", self.key))
        })
    }

    /// Row of this set that owns the child table `table`.
    fn owning_row(&self, form: &CompiledForm, table: TableId) -> Result<&StoredRow, EngineError> {
        let parent = form.schema.table(table).parent.ok_or_else(|| {
            EngineError::IllegalState(format!("table {} has no parent table", form.schema.table(table).name))
        })?;
        self.row_in(parent)
    }

    fn build_values(
        &mut self,
        form: &Arc<CompiledForm>,
        store: &dyn RelationalStore,
        load: bool,
    ) -> Result<(), EngineError> {
        let children = &form.elements.element(self.group).children;
        self.add_values(form, store, children, load)?;
        self.state = SetState::Populated;
        Ok(())
    }

    fn add_values(
        &mut self,
        form: &Arc<CompiledForm>,
        store: &dyn RelationalStore,
        children: &[FormElementId],
        load: bool,
    ) -> Result<(), EngineError> {
        for &id in children {
            let element = form.elements.element(id);
            if element.element_type == FormElementType::Group {
                self.add_values(form, store, &element.children, load)?;
                continue;
            }
            let mut value = self.new_value(form, element)?;
            value.load_cells(&self.rows, store)?;
            if load {
                value.load_owned(form, store)?;
            }
            self.order.push(id);
            self.values.insert(id, value);
        }
        Ok(())
    }

    fn new_value(&self, form: &CompiledForm, element: &FormElement) -> Result<SubmissionValue, EngineError> {
        let schema_id = match element.source {
            ElementSource::Metadata(kind) => return self.metadata_value(form, element.id, kind),
            ElementSource::Schema(schema_id) => schema_id,
        };
        let id = element.id;
        let node = form.schema.element(schema_id);
        let column = || self.column_binding(form, schema_id);
        Ok(match element.element_type {
            FormElementType::String
            | FormElementType::Select1
            | FormElementType::GeoTrace
            | FormElementType::GeoShape => SubmissionValue::String(StringValue::new(
                id,
                StringSource::Column(column()?),
                self.overflow_target(form, node.location.table),
            )),
            FormElementType::Integer => SubmissionValue::Long(ScalarValue::new(id, column()?)),
            FormElementType::Decimal => SubmissionValue::Decimal(ScalarValue::new(id, column()?)),
            FormElementType::Boolean => SubmissionValue::Boolean(ScalarValue::new(id, column()?)),
            FormElementType::Date => {
                SubmissionValue::DateTime(DateTimeValue::new(id, DateTimeKind::Date, column()?))
            }
            FormElementType::Time => {
                SubmissionValue::DateTime(DateTimeValue::new(id, DateTimeKind::Time, column()?))
            }
            FormElementType::DateTime => {
                SubmissionValue::DateTime(DateTimeValue::new(id, DateTimeKind::DateTime, column()?))
            }
            FormElementType::GeoPoint => {
                let columns = node
                    .child_ids()
                    .map(|child| self.column_binding(form, child))
                    .collect::<Result<Vec<_>, _>>()?;
                let columns: [ColumnBinding; 4] = columns.try_into().map_err(|_| {
                    EngineError::IllegalState(format!("geopoint `{}` needs four columns", element.name))
                })?;
                SubmissionValue::GeoPoint(GeoPointValue::new(id, columns))
            }
            FormElementType::SelectN => {
                let table = node.location.table;
                let parent = self.owning_row(form, table)?;
                SubmissionValue::Choice(ChoiceValue::new(
                    id,
                    form.schema.table(table).name.clone(),
                    parent.key.clone(),
                    self.top_level_key.clone(),
                ))
            }
            FormElementType::Binary => {
                let tables =
                    AttachmentTables::for_element(&form.schema, schema_id, form.limits.blob_chunk_bytes)
                        .ok_or_else(|| {
                            EngineError::IllegalState(format!(
                                "binary `{}` has no attachment tables",
                                element.name
                            ))
                        })?;
                let parent = self.owning_row(form, node.location.table)?;
                SubmissionValue::Blob(BlobValue::new(
                    id,
                    self.construct_submission_key(Some(id)),
                    tables,
                    parent.key.clone(),
                    self.top_level_key.clone(),
                ))
            }
            FormElementType::Repeat => {
                let table = node.location.table;
                let parent = self.owning_row(form, table)?;
                let context = NestedContext {
                    enclosing: EnclosingSet {
                        key: self.key.clone(),
                        row_key: self.row_key.clone(),
                        property_name: form.elements.element(self.group).name.clone(),
                    },
                    parent_row: parent.key.clone(),
                    top_level_key: self.top_level_key.clone(),
                    table: form.schema.table(table).name.clone(),
                };
                SubmissionValue::Repeat(RepeatValue::new(
                    id,
                    self.construct_submission_key(Some(id)),
                    context,
                ))
            }
            FormElementType::Group => {
                return Err(EngineError::IllegalState(format!(
                    "group `{}` carries no value",
                    element.name
                )));
            }
        })
    }

    fn metadata_value(
        &self,
        form: &CompiledForm,
        id: FormElementId,
        kind: MetadataKind,
    ) -> Result<SubmissionValue, EngineError> {
        let table = form.schema.top_level_table();
        let binding = |column: &str| ColumnBinding {
            table,
            column: column.to_string(),
            max_length: None,
        };
        Ok(match kind {
            MetadataKind::InstanceId => {
                SubmissionValue::String(StringValue::new(id, StringSource::RowKey(table), None))
            }
            MetadataKind::ModelVersion => {
                SubmissionValue::Long(ScalarValue::new(id, binding(MODEL_VERSION_COLUMN)))
            }
            MetadataKind::UiVersion => {
                SubmissionValue::Long(ScalarValue::new(id, binding(UI_VERSION_COLUMN)))
            }
            MetadataKind::SubmissionDate => SubmissionValue::DateTime(DateTimeValue::new(
                id,
                DateTimeKind::DateTime,
                binding(SUBMISSION_DATE_COLUMN),
            )),
            MetadataKind::IsComplete => {
                SubmissionValue::Boolean(ScalarValue::new(id, binding(IS_COMPLETE_COLUMN)))
            }
            MetadataKind::DateMarkedAsComplete => SubmissionValue::DateTime(DateTimeValue::new(
                id,
                DateTimeKind::DateTime,
                binding(MARKED_AS_COMPLETE_DATE_COLUMN),
            )),
        })
    }

    fn column_binding(&self, form: &CompiledForm, schema_id: ElementId) -> Result<ColumnBinding, EngineError> {
        let node = form.schema.element(schema_id);
        let column = node.location.column.clone().ok_or_else(|| {
            EngineError::IllegalState(format!(
                "element `{}` is not column backed",
                node.name().unwrap_or_default()
            ))
        })?;
        let table = node.location.table;
        let max_length = form
            .schema
            .table(table)
            .column(&column)
            .and_then(|def| def.max_length);
        Ok(ColumnBinding {
            table,
            column,
            max_length,
        })
    }

    fn overflow_target(&self, form: &CompiledForm, table: TableId) -> Option<OverflowTarget> {
        let long = form.schema.long_string_table()?;
        let row = self.rows.get(&table)?;
        let long = form.schema.table(long);
        Some(OverflowTarget {
            table: long.name.clone(),
            chunk_chars: long
                .column(VALUE_COLUMN)
                .and_then(|def| def.max_length)
                .unwrap_or(form.limits.default_string_length),
            row_key: row.key.clone(),
            top_level_key: self.top_level_key.clone(),
        })
    }

    pub fn form(&self) -> &Arc<CompiledForm> {
        &self.form
    }

    /// The group or repeat element this set instantiates.
    pub fn group(&self) -> FormElementId {
        self.group
    }

    pub fn key(&self) -> &SubmissionKey {
        &self.key
    }

    pub fn row_key(&self) -> &RowKey {
        &self.row_key
    }

    pub fn top_level_key(&self) -> &RowKey {
        &self.top_level_key
    }

    /// 1-based position within the enclosing repeat; `None` at the top level.
    pub fn ordinal(&self) -> Option<i64> {
        self.ordinal
    }

    pub fn enclosing(&self) -> Option<&EnclosingSet> {
        self.enclosing.as_ref()
    }

    pub fn is_top_level(&self) -> bool {
        self.enclosing.is_none()
    }

    pub fn state(&self) -> SetState {
        self.state
    }

    pub fn rows(&self) -> impl Iterator<Item = &StoredRow> {
        self.rows.values()
    }

    /// Element of this set named by group-qualified name, falling back to the plain name.
    pub fn element_id(&self, name: &str) -> Option<FormElementId> {
        let tree = &self.form.elements;
        self.order
            .iter()
            .copied()
            .find(|id| tree.element(*id).group_qualified_name == name)
            .or_else(|| {
                self.order
                    .iter()
                    .copied()
                    .find(|id| tree.element(*id).name == name)
            })
    }

    pub fn get_value(&self, element: FormElementId) -> Option<&SubmissionValue> {
        self.values.get(&element)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&SubmissionValue> {
        self.element_id(name).and_then(|id| self.values.get(&id))
    }

    /// Values in form order; removed values are skipped.
    pub fn submission_values(&self) -> Vec<&SubmissionValue> {
        self.order
            .iter()
            .filter_map(|id| self.values.get(id))
            .collect()
    }

    /// Non-group elements of this set in form order.
    pub fn form_elements(&self) -> Vec<&FormElement> {
        self.order
            .iter()
            .map(|id| self.form.elements.element(*id))
            .collect()
    }

    /// Every value of `element` at or below this set, descending through repeats.
    pub fn find_element_value(&self, element: FormElementId) -> Result<Vec<&SubmissionValue>, EngineError> {
        if let Some(value) = self.values.get(&element) {
            return Ok(vec![value]);
        }
        let tree = &self.form.elements;
        let outside = || {
            EngineError::IllegalState(format!(
                "element `{}` is not within `{}`",
                tree.element(element).name,
                tree.element(self.group).name
            ))
        };
        let mut chain = Vec::new();
        let mut current = tree.element(element).parent;
        loop {
            match current {
                None => return Err(outside()),
                Some(id) if id == self.group => break,
                Some(id) => {
                    chain.push(id);
                    current = tree.element(id).parent;
                }
            }
        }
        for id in chain.into_iter().rev() {
            if tree.element(id).element_type == FormElementType::Group {
                continue;
            }
            return match self.values.get(&id) {
                Some(SubmissionValue::Repeat(repeat)) => repeat.find_element_value(element),
                _ => Err(EngineError::IllegalState(format!(
                    "expected a repeat above `{}`, found `{}`",
                    tree.element(element).name,
                    tree.element(id).name
                ))),
            };
        }
        Err(outside())
    }

    /// Key of this set, or of `element` within it.
    pub fn construct_submission_key(&self, element: Option<FormElementId>) -> SubmissionKey {
        match element {
            None => self.key.clone(),
            Some(id) => self
                .key
                .child(&self.form.elements.element(id).group_qualified_name),
        }
    }

    /// Resolves `parts` from `parts[index]`, the segment naming this set.
    pub fn resolve_submission_key_at(
        &self,
        index: usize,
        parts: &[SubmissionKeyPart],
    ) -> Result<ResolvedElement<'_>, EngineError> {
        let rendered = || SubmissionKey::from_parts(parts);
        let invalid = |reason: &str| EngineError::invalid_key(rendered(), reason.to_string());
        let part = parts
            .get(index)
            .ok_or_else(|| invalid("key ends before reaching this set"))?;
        let tree = &self.form.elements;
        let group = tree.element(self.group);
        let names_group = part.element_name == group.group_qualified_name
            || (group.element_type == FormElementType::Repeat && part.element_name == group.name);
        if !names_group {
            return Err(invalid("segment does not name this group"));
        }
        match (&part.auri, part.ordinal) {
            (Some(auri), _) if auri != self.row_key.as_str() => {
                return Err(invalid("key does not match this instance"));
            }
            (Some(_), _) => {}
            (None, Some(ordinal)) if Some(ordinal) != self.ordinal => {
                return Err(invalid("ordinal does not match this instance"));
            }
            (None, Some(_)) => {}
            (None, None) => return Err(invalid("segment needs @key or @ordinal")),
        }
        if index + 1 == parts.len() {
            return Ok(ResolvedElement::Set(self));
        }

        let next = &parts[index + 1];
        let id = self
            .order
            .iter()
            .copied()
            .find(|id| tree.element(*id).group_qualified_name == next.element_name)
            .or_else(|| {
                self.order
                    .iter()
                    .copied()
                    .find(|id| tree.element(*id).name == next.element_name)
            })
            .ok_or_else(|| invalid("no such element in this group"))?;
        let value = self
            .values
            .get(&id)
            .ok_or_else(|| invalid("element value has been removed"))?;
        let last = index + 2 == parts.len();
        match value {
            SubmissionValue::Repeat(repeat) => repeat.resolve(index + 1, parts),
            SubmissionValue::Blob(blob) => match next.ordinal {
                Some(ordinal) => {
                    let ordinal = usize::try_from(ordinal)
                        .ok()
                        .filter(|ordinal| (1..=blob.attachment_count()).contains(ordinal))
                        .ok_or_else(|| invalid("attachment ordinal out of range"))?;
                    Ok(ResolvedElement::Attachment {
                        value: blob,
                        ordinal,
                    })
                }
                None => Ok(ResolvedElement::Value(value)),
            },
            SubmissionValue::Choice(_) => Ok(ResolvedElement::Value(value)),
            _ if last => Ok(ResolvedElement::Value(value)),
            _ => Err(EngineError::TrailingKeyParts {
                key: rendered().to_string(),
                element: next.element_name.clone(),
            }),
        }
    }

    /// Renders the selected values through `formatter`.
    ///
    /// With `include_parent_key`, a nested set first emits its enclosing row key.
    pub fn formatted_row(
        &self,
        selection: &ElementSelection,
        formatter: &mut dyn ElementFormatter,
        include_parent_key: bool,
    ) -> FormattedRow {
        let mut row = FormattedRow::new(self.construct_submission_key(None));
        if include_parent_key && let Some(enclosing) = &self.enclosing {
            formatter.format_uid(enclosing.row_key.as_str(), &enclosing.property_name, &mut row);
        }
        let ordinal = self.ordinal.map(|ordinal| ordinal.to_string()).unwrap_or_default();
        let tree = &self.form.elements;
        for id in self.selected(selection) {
            if let Some(value) = self.values.get(&id) {
                value.format(tree.element(id), formatter, &ordinal, &mut row);
            }
        }
        row
    }

    fn selected(&self, selection: &ElementSelection) -> Vec<FormElementId> {
        match selection {
            ElementSelection::All => self.order.clone(),
            ElementSelection::Elements(elements) => elements.clone(),
            ElementSelection::Namespaces(namespaces) => {
                let metadata = namespaces.contains(&FormElementNamespace::Metadata);
                let values = namespaces.contains(&FormElementNamespace::Values);
                let tree = &self.form.elements;
                self.order
                    .iter()
                    .copied()
                    .filter(|id| metadata == values || tree.element(*id).is_metadata() == metadata)
                    .collect()
            }
        }
    }

    fn unknown_element(&self, element: FormElementId) -> EngineError {
        EngineError::IllegalState(format!(
            "element `{}` has no value in {}",
            self.form.elements.element(element).name,
            self.key
        ))
    }

    fn update_value(
        &mut self,
        element: FormElementId,
        update: impl FnOnce(&mut SubmissionValue) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let Some(value) = self.values.get_mut(&element) else {
            return Err(self.unknown_element(element));
        };
        update(value)?;
        value.write_cells(&mut self.rows)?;
        self.state = SetState::Populated;
        Ok(())
    }

    pub fn set_value_from_string(&mut self, element: FormElementId, raw: &str) -> Result<(), EngineError> {
        self.update_value(element, |value| value.set_from_string(raw))
    }

    pub fn set_string(&mut self, element: FormElementId, text: Option<String>) -> Result<(), EngineError> {
        self.update_value(element, |value| match value {
            SubmissionValue::String(value) => value.set(text),
            _ => Err(mismatch("string")),
        })
    }

    pub fn set_long(&mut self, element: FormElementId, number: Option<i64>) -> Result<(), EngineError> {
        self.update_value(element, |value| match value {
            SubmissionValue::Long(value) => {
                value.set(number);
                Ok(())
            }
            _ => Err(mismatch("integer")),
        })
    }

    pub fn set_decimal(&mut self, element: FormElementId, number: Option<Decimal>) -> Result<(), EngineError> {
        self.update_value(element, |value| match value {
            SubmissionValue::Decimal(value) => {
                value.set(number);
                Ok(())
            }
            _ => Err(mismatch("decimal")),
        })
    }

    pub fn set_boolean(&mut self, element: FormElementId, flag: Option<bool>) -> Result<(), EngineError> {
        self.update_value(element, |value| match value {
            SubmissionValue::Boolean(value) => {
                value.set(flag);
                Ok(())
            }
            _ => Err(mismatch("boolean")),
        })
    }

    pub fn set_date_time(
        &mut self,
        element: FormElementId,
        data: Option<DateTimeData>,
    ) -> Result<(), EngineError> {
        self.update_value(element, |value| match value {
            SubmissionValue::DateTime(value) => value.set(data),
            _ => Err(mismatch("date/time")),
        })
    }

    pub fn set_geopoint(&mut self, element: FormElementId, point: Option<GeoPoint>) -> Result<(), EngineError> {
        self.update_value(element, |value| match value {
            SubmissionValue::GeoPoint(value) => {
                value.set(point);
                Ok(())
            }
            _ => Err(mismatch("geopoint")),
        })
    }

    pub fn set_choices(&mut self, element: FormElementId, choices: Vec<String>) -> Result<(), EngineError> {
        self.update_value(element, |value| match value {
            SubmissionValue::Choice(value) => {
                value.set(choices);
                Ok(())
            }
            _ => Err(mismatch("choice")),
        })
    }

    /// Stages an attachment; it is written on the next [`persist`](Self::persist).
    pub fn set_attachment(
        &mut self,
        element: FormElementId,
        attachment: NewAttachment,
        overwrite: bool,
    ) -> Result<AttachmentOutcome, EngineError> {
        let outcome = match self.values.get_mut(&element) {
            Some(SubmissionValue::Blob(blob)) => blob.stage(attachment, overwrite),
            Some(_) => return Err(mismatch("binary")),
            None => return Err(self.unknown_element(element)),
        };
        self.state = SetState::Populated;
        Ok(outcome)
    }

    pub fn add_repeat_instance(
        &mut self,
        store: &dyn RelationalStore,
        element: FormElementId,
    ) -> Result<&mut SubmissionSet, EngineError> {
        let form = Arc::clone(&self.form);
        if !matches!(self.values.get(&element), Some(SubmissionValue::Repeat(_))) {
            return Err(match self.values.get(&element) {
                Some(_) => mismatch("repeat"),
                None => self.unknown_element(element),
            });
        }
        self.state = SetState::Populated;
        match self.values.get_mut(&element) {
            Some(SubmissionValue::Repeat(repeat)) => repeat.add_instance(&form, store),
            _ => Err(mismatch("repeat")),
        }
    }

    /// The repeat instance of `element` at 1-based `ordinal`.
    pub fn repeat_instance_mut(&mut self, element: FormElementId, ordinal: usize) -> Option<&mut SubmissionSet> {
        match self.values.get_mut(&element) {
            Some(SubmissionValue::Repeat(repeat)) => {
                self.state = SetState::Populated;
                repeat.instance_mut(ordinal)
            }
            _ => None,
        }
    }

    /// Detaches a binary value so the set no longer reports it; stored attachments are untouched.
    pub fn remove_value(&mut self, element: FormElementId) -> Result<SubmissionValue, EngineError> {
        let form_element = self.form.elements.element(element);
        if form_element.is_metadata() || form_element.element_type != FormElementType::Binary {
            return Err(EngineError::UnsupportedRemoval(form_element.name.clone()));
        }
        let removed = self
            .values
            .remove(&element)
            .ok_or_else(|| self.unknown_element(element))?;
        self.state = SetState::Populated;
        Ok(removed)
    }

    /// Writes owned tables first, then phantom rows, then the group row.
    pub fn persist(&mut self, store: &dyn RelationalStore) -> Result<(), EngineError> {
        self.state = SetState::Persisting;
        let result = self.persist_rows(store);
        self.state = if result.is_ok() {
            SetState::Persisted
        } else {
            SetState::Populated
        };
        result
    }

    fn persist_rows(&mut self, store: &dyn RelationalStore) -> Result<(), EngineError> {
        for id in &self.order {
            if let Some(value) = self.values.get_mut(id)
                && value.persists_first()
            {
                value.persist(store)?;
            }
        }
        let phantoms: Vec<StoredRow> = self
            .rows
            .iter()
            .filter(|(table, _)| **table != self.group_table)
            .map(|(_, row)| row.clone())
            .collect();
        store.upsert_all(&phantoms)?;
        store.upsert(self.row_in(self.group_table)?)?;
        debug!(key = %self.key, rows = self.rows.len(), "persisted submission set");
        Ok(())
    }

    /// Appends every row key owned by this set, children before parents.
    pub fn collect_entity_keys(
        &self,
        store: &dyn RelationalStore,
        keys: &mut Vec<EntityKey>,
    ) -> Result<(), EngineError> {
        for value in self.submission_values() {
            value.collect_entity_keys(store, keys)?;
        }
        keys.extend(self.rows.values().rev().map(StoredRow::entity_key));
        Ok(())
    }

    /// Visits this set, then each value, descending into repeat instances.
    ///
    /// Returns `true` when the visitor aborted.
    pub fn depth_first<V: SubmissionVisitor + ?Sized>(&self, visitor: &mut V) -> bool {
        if visitor.traverse_set(self) {
            return true;
        }
        let tree = &self.form.elements;
        for id in &self.order {
            let Some(value) = self.values.get(id) else {
                continue;
            };
            if visitor.traverse_value(value, tree.element(*id)) {
                return true;
            }
            if let SubmissionValue::Repeat(repeat) = value
                && repeat.sets().iter().any(|set| set.depth_first(visitor))
            {
                return true;
            }
        }
        false
    }
}

fn mismatch(expected: &str) -> EngineError {
    EngineError::IllegalState(format!("element does not hold a {expected} value"))
}
