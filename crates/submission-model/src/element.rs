use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{ElementId, ElementType, SchemaError, SchemaTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FormElementId(pub u32);

/// Submission-facing kind of a form element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormElementType {
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
}

impl FormElementType {
    fn from_schema(element_type: ElementType) -> Option<Self> {
        Some(match element_type {
            ElementType::String => FormElementType::String,
            ElementType::DateTime => FormElementType::DateTime,
            ElementType::Date => FormElementType::Date,
            ElementType::Time => FormElementType::Time,
            ElementType::Integer => FormElementType::Integer,
            ElementType::Decimal => FormElementType::Decimal,
            ElementType::GeoPoint => FormElementType::GeoPoint,
            ElementType::GeoTrace => FormElementType::GeoTrace,
            ElementType::GeoShape => FormElementType::GeoShape,
            ElementType::Binary => FormElementType::Binary,
            ElementType::Boolean => FormElementType::Boolean,
            ElementType::Select1 => FormElementType::Select1,
            ElementType::SelectN => FormElementType::SelectN,
            ElementType::Repeat => FormElementType::Repeat,
            ElementType::Group => FormElementType::Group,
            ElementType::Phantom | ElementType::BinaryContentRefBlob | ElementType::RefBlob => {
                return None;
            }
        })
    }
}

/// Synthetic per-submission fields attached to the top-level group, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    InstanceId,
    ModelVersion,
    UiVersion,
    SubmissionDate,
    IsComplete,
    DateMarkedAsComplete,
}

impl MetadataKind {
    pub const ALL: [MetadataKind; 6] = [
        MetadataKind::InstanceId,
        MetadataKind::ModelVersion,
        MetadataKind::UiVersion,
        MetadataKind::SubmissionDate,
        MetadataKind::IsComplete,
        MetadataKind::DateMarkedAsComplete,
    ];

    pub fn element_name(self) -> &'static str {
        match self {
            MetadataKind::InstanceId => "*meta-instance-id*",
            MetadataKind::ModelVersion => "*meta-model-version*",
            MetadataKind::UiVersion => "*meta-ui-version*",
            MetadataKind::SubmissionDate => "*meta-submission-date*",
            MetadataKind::IsComplete => "*meta-is-complete*",
            MetadataKind::DateMarkedAsComplete => "*meta-date-marked-as-complete*",
        }
    }

    pub fn element_type(self) -> FormElementType {
        match self {
            MetadataKind::InstanceId => FormElementType::String,
            MetadataKind::ModelVersion | MetadataKind::UiVersion => FormElementType::Integer,
            MetadataKind::SubmissionDate | MetadataKind::DateMarkedAsComplete => {
                FormElementType::DateTime
            }
            MetadataKind::IsComplete => FormElementType::Boolean,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementSource {
    Schema(ElementId),
    Metadata(MetadataKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormElementNamespace {
    Metadata,
    Values,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormElement {
    pub id: FormElementId,
    pub parent: Option<FormElementId>,
    pub source: ElementSource,
    pub children: Vec<FormElementId>,
    pub name: String,
    pub group_qualified_name: String,
    pub element_type: FormElementType,
}

impl FormElement {
    pub fn is_metadata(&self) -> bool {
        matches!(self.source, ElementSource::Metadata(_))
    }

    pub fn schema_element(&self) -> Option<ElementId> {
        match self.source {
            ElementSource::Schema(id) => Some(id),
            ElementSource::Metadata(_) => None,
        }
    }

    pub fn metadata(&self) -> Option<MetadataKind> {
        match self.source {
            ElementSource::Metadata(kind) => Some(kind),
            ElementSource::Schema(_) => None,
        }
    }
}

/// Schema-level address of a form element: `formId/top/group:field/...`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormElementKey(String);

impl FormElementKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ElementKeyError {
    #[error("element key `{key}` does not belong to form `{form_id}`")]
    WrongForm { key: String, form_id: String },
    #[error("element key `{key}` is not well formed at `{segment}`")]
    Malformed { key: String, segment: String },
}

/// Callbacks for [`FormElementTree::depth_first`]; returning `true` aborts the walk.
pub trait FormElementVisitor {
    fn enter(&mut self, _element: &FormElement) -> bool {
        false
    }

    fn leave(&mut self, _element: &FormElement) {}

    /// Called with ordinals 1, 2, ... until it returns `false`.
    fn descend_into_repeat(&mut self, _element: &FormElement, _ordinal: usize) -> bool {
        false
    }

    fn ascend_from_repeat(&mut self, _element: &FormElement, _ordinal: usize) {}

    fn traverse(&mut self, _element: &FormElement) -> bool {
        false
    }
}

/// Submission-facing projection of a [`SchemaTree`] with phantoms flattened away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormElementTree {
    form_id: String,
    elements: Vec<FormElement>,
    #[serde(skip)]
    by_schema: BTreeMap<ElementId, FormElementId>,
}

impl FormElementTree {
    pub fn build(schema: &SchemaTree) -> Result<Self, SchemaError> {
        let mut tree = Self {
            form_id: schema.form_id.clone(),
            elements: Vec::new(),
            by_schema: BTreeMap::new(),
        };
        let root = tree.push_schema(schema, None, schema.root())?;
        for kind in MetadataKind::ALL {
            let id = FormElementId(tree.elements.len() as u32);
            tree.elements.push(FormElement {
                id,
                parent: Some(root),
                source: ElementSource::Metadata(kind),
                children: Vec::new(),
                name: kind.element_name().to_string(),
                group_qualified_name: kind.element_name().to_string(),
                element_type: kind.element_type(),
            });
            tree.elements[root.0 as usize].children.push(id);
        }
        tree.add_children(schema, schema.root(), root)?;
        Ok(tree)
    }

    fn add_children(
        &mut self,
        schema: &SchemaTree,
        from: ElementId,
        parent: FormElementId,
    ) -> Result<(), SchemaError> {
        for child in schema.element(from).child_ids() {
            match schema.element(child).element_type {
                ElementType::Phantom => self.add_children(schema, child, parent)?,
                ElementType::Group | ElementType::Repeat => {
                    let id = self.push_schema(schema, Some(parent), child)?;
                    self.add_children(schema, child, id)?;
                }
                _ => {
                    self.push_schema(schema, Some(parent), child)?;
                }
            }
        }
        Ok(())
    }

    fn push_schema(
        &mut self,
        schema: &SchemaTree,
        parent: Option<FormElementId>,
        source: ElementId,
    ) -> Result<FormElementId, SchemaError> {
        let node = schema.element(source);
        let hidden = || SchemaError::HiddenElement(node.name().unwrap_or("<phantom>").to_string());
        let element_type = FormElementType::from_schema(node.element_type).ok_or_else(hidden)?;
        let name = node.name().ok_or_else(hidden)?.to_string();
        let id = FormElementId(self.elements.len() as u32);
        self.elements.push(FormElement {
            id,
            parent,
            source: ElementSource::Schema(source),
            children: Vec::new(),
            name,
            group_qualified_name: schema.group_qualified_name(source)?,
            element_type,
        });
        if let Some(parent) = parent {
            self.elements[parent.0 as usize].children.push(id);
        }
        self.by_schema.insert(source, id);
        Ok(id)
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn root(&self) -> FormElementId {
        FormElementId(0)
    }

    pub fn element(&self, id: FormElementId) -> &FormElement {
        &self.elements[id.0 as usize]
    }

    pub fn elements(&self) -> &[FormElement] {
        &self.elements
    }

    pub fn for_schema_element(&self, id: ElementId) -> Option<FormElementId> {
        self.by_schema.get(&id).copied()
    }

    /// Children of `id` limited to `namespaces`; an empty filter or both namespaces yield every child.
    pub fn children(&self, id: FormElementId, namespaces: &[FormElementNamespace]) -> Vec<FormElementId> {
        let element = self.element(id);
        let metadata = namespaces.contains(&FormElementNamespace::Metadata);
        let values = namespaces.contains(&FormElementNamespace::Values);
        if metadata == values {
            return element.children.clone();
        }
        element
            .children
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_metadata() == metadata)
            .collect()
    }

    pub fn find_child(&self, parent: FormElementId, name: &str) -> Option<FormElementId> {
        self.element(parent)
            .children
            .iter()
            .copied()
            .find(|child| self.element(*child).name == name)
    }

    /// True when `ancestor` lies on the parent chain of `id` (or is `id`).
    pub fn is_ancestor(&self, ancestor: FormElementId, id: FormElementId) -> bool {
        let mut current = Some(id);
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            current = self.element(candidate).parent;
        }
        false
    }

    /// Walks the tree depth first; returns `true` when the visitor aborted.
    pub fn depth_first<V: FormElementVisitor + ?Sized>(&self, visitor: &mut V) -> bool {
        self.visit(self.root(), visitor)
    }

    fn visit<V: FormElementVisitor + ?Sized>(&self, id: FormElementId, visitor: &mut V) -> bool {
        let element = self.element(id);
        match element.element_type {
            FormElementType::Group => {
                if visitor.enter(element) {
                    return true;
                }
                let aborted = element
                    .children
                    .iter()
                    .any(|child| self.visit(*child, visitor));
                visitor.leave(element);
                aborted
            }
            FormElementType::Repeat => {
                if visitor.enter(element) {
                    return true;
                }
                let mut aborted = false;
                let mut ordinal = 1;
                while visitor.descend_into_repeat(element, ordinal) {
                    aborted = element
                        .children
                        .iter()
                        .any(|child| self.visit(*child, visitor));
                    visitor.ascend_from_repeat(element, ordinal);
                    if aborted {
                        break;
                    }
                    ordinal += 1;
                }
                visitor.leave(element);
                aborted
            }
            _ => visitor.traverse(element),
        }
    }

    pub fn element_key(&self, id: FormElementId) -> FormElementKey {
        FormElementKey(self.qualified_path(id))
    }

    fn qualified_path(&self, id: FormElementId) -> String {
        let element = self.element(id);
        match element.parent {
            None => format!("{}/{}", self.form_id, element.name),
            Some(parent) => {
                let parent_element = self.element(parent);
                let separator = if parent_element.element_type == FormElementType::Repeat
                    || parent_element.parent.is_none()
                {
                    '/'
                } else {
                    ':'
                };
                format!("{}{separator}{}", self.qualified_path(parent), element.name)
            }
        }
    }

    pub fn resolve_key_path(&self, key: &FormElementKey) -> Result<FormElementId, ElementKeyError> {
        let raw = key.as_str();
        let rest = raw
            .strip_prefix(self.form_id.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| ElementKeyError::WrongForm {
                key: raw.to_string(),
                form_id: self.form_id.clone(),
            })?;
        let malformed = |segment: &str| ElementKeyError::Malformed {
            key: raw.to_string(),
            segment: segment.to_string(),
        };

        let mut current = self.root();
        let mut first = true;
        for slash_part in rest.split('/') {
            let mut colon_parts = slash_part.split(':');
            if first {
                let top = colon_parts.next().unwrap_or_default();
                if self.element(current).name != top {
                    return Err(malformed(top));
                }
                first = false;
            }
            for name in colon_parts {
                current = self.find_child(current, name).ok_or_else(|| malformed(name))?;
            }
        }
        Ok(current)
    }
}
