pub mod key;
pub mod layout;
pub mod schema;
pub mod submit;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use submission_model::{FormDefinition, StoreLimits};
use tracing::debug;

pub(crate) fn load_definition(path: &Path) -> Result<FormDefinition> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read form definition {}", path.display()))?;
    let definition = FormDefinition::from_json_str(&raw)
        .with_context(|| format!("invalid form definition {}", path.display()))?;
    debug!(form_id = %definition.form_id, path = %path.display(), "loaded form definition");
    Ok(definition)
}

pub(crate) fn load_limits(path: Option<&Path>) -> Result<StoreLimits> {
    match path {
        Some(path) => StoreLimits::from_path(path)
            .with_context(|| format!("failed to load store limits {}", path.display())),
        None => Ok(StoreLimits::default()),
    }
}

pub(crate) fn render_version(version: Option<i64>) -> String {
    version.map_or_else(|| "null".to_string(), |version| version.to_string())
}
