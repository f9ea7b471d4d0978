use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::schema::SchemaError;

static FIELD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("valid field name regex"));

/// Declared kind of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    DateTime,
    Date,
    Time,
    Integer,
    Decimal,
    Geopoint,
    Geotrace,
    Geoshape,
    Binary,
    Boolean,
    Select1,
    SelectN,
    Repeat,
    Group,
}

impl FieldKind {
    pub fn is_container(self) -> bool {
        matches!(self, FieldKind::Group | FieldKind::Repeat)
    }
}

/// One field of a form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Column capacity for string-like fields; the store default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldSpec>,
}

impl FieldSpec {
    pub fn leaf(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            max_length: None,
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>, children: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Group,
            max_length: None,
            children,
        }
    }

    pub fn repeat(name: impl Into<String>, children: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Repeat,
            max_length: None,
            children,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if !FIELD_NAME.is_match(&self.name) {
            return Err(SchemaError::InvalidName(self.name.clone()));
        }
        if !self.kind.is_container() && !self.children.is_empty() {
            return Err(SchemaError::ChildrenNotAllowed(self.name.clone()));
        }
        let mut names = BTreeSet::new();
        if let Some(duplicate) = self.children.iter().find(|child| !names.insert(&child.name)) {
            return Err(SchemaError::DuplicateName(duplicate.name.clone()));
        }
        self.children.iter().try_for_each(FieldSpec::validate)
    }
}

/// Versioned form definition handed to the layout compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormDefinition {
    pub form_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_version: Option<i64>,
    pub root: FieldSpec,
}

impl FormDefinition {
    pub fn new(form_id: impl Into<String>, root: FieldSpec) -> Self {
        Self {
            form_id: form_id.into(),
            model_version: None,
            ui_version: None,
            root,
        }
    }

    pub fn with_versions(mut self, model_version: Option<i64>, ui_version: Option<i64>) -> Self {
        self.model_version = model_version;
        self.ui_version = ui_version;
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.form_id.trim().is_empty() {
            return Err(SchemaError::InvalidName(self.form_id.clone()));
        }
        if self.root.kind != FieldKind::Group {
            return Err(SchemaError::RootNotGroup(self.root.name.clone()));
        }
        self.root.validate()
    }
}
