use serde::Serialize;

use crate::compile::compile;
use crate::definition::FormDefinition;
use crate::element::{FormElementId, FormElementTree};
use crate::key::FormVersion;
use crate::limits::StoreLimits;
use crate::schema::{SchemaError, SchemaTree};

/// Immutable layout of one form version, shared by every submission of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledForm {
    pub form_id: String,
    pub version: FormVersion,
    pub schema: SchemaTree,
    pub elements: FormElementTree,
    pub limits: StoreLimits,
}

impl CompiledForm {
    pub fn compile(definition: &FormDefinition, limits: &StoreLimits) -> Result<Self, SchemaError> {
        let schema = compile(definition, limits)?;
        let elements = FormElementTree::build(&schema)?;
        Ok(Self {
            form_id: definition.form_id.clone(),
            version: FormVersion {
                model_version: definition.model_version,
                ui_version: definition.ui_version,
            },
            schema,
            elements,
            limits: limits.clone(),
        })
    }

    pub fn top_level_group(&self) -> FormElementId {
        self.elements.root()
    }

    pub fn top_level_name(&self) -> &str {
        &self.elements.element(self.elements.root()).name
    }
}
