use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use submission_model::{CompiledForm, FormDefinition, FormVersion, StoreLimits};
use submission_store::RelationalStore;
use tracing::info;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FormVersionKey {
    form_id: String,
    version: FormVersion,
}

/// Compile-once cache of form layouts, keyed by form id and version.
///
/// Table declaration happens inside the per-version guard, so concurrent
/// registrations of the same version converge on one compiled form.
#[derive(Debug, Default)]
pub struct FormRegistry {
    limits: StoreLimits,
    forms: DashMap<FormVersionKey, Arc<OnceCell<Arc<CompiledForm>>>>,
}

impl FormRegistry {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            limits,
            forms: DashMap::new(),
        }
    }

    pub fn limits(&self) -> &StoreLimits {
        &self.limits
    }

    pub fn register(
        &self,
        definition: &FormDefinition,
        store: &dyn RelationalStore,
    ) -> Result<Arc<CompiledForm>, EngineError> {
        let key = FormVersionKey {
            form_id: definition.form_id.clone(),
            version: FormVersion {
                model_version: definition.model_version,
                ui_version: definition.ui_version,
            },
        };
        // Clone the cell out so the map shard is not locked while compiling.
        let cell = Arc::clone(&self.forms.entry(key).or_default());
        let form = cell.get_or_try_init(|| {
            let form = CompiledForm::compile(definition, &self.limits)?;
            for table in form.schema.tables() {
                store.declare_table(table)?;
            }
            info!(
                form_id = %form.form_id,
                model_version = ?form.version.model_version,
                ui_version = ?form.version.ui_version,
                tables = form.schema.tables().len(),
                "registered form"
            );
            Ok::<_, EngineError>(Arc::new(form))
        })?;
        Ok(Arc::clone(form))
    }

    pub fn get(&self, form_id: &str, version: FormVersion) -> Option<Arc<CompiledForm>> {
        let key = FormVersionKey {
            form_id: form_id.to_string(),
            version,
        };
        self.forms
            .get(&key)
            .and_then(|cell| cell.value().get().map(Arc::clone))
    }

    pub fn len(&self) -> usize {
        self.forms.iter().filter(|entry| entry.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
