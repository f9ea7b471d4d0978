use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use submission_model::{
    CompiledForm, FormElementId, FormElementNamespace, MetadataKind, SubmissionKey,
    SubmissionKeyPart,
};
use submission_store::{RelationalStore, RowKey, StoreError};
use time::OffsetDateTime;
use tracing::info;

use crate::error::EngineError;
use crate::registry::FormRegistry;
use crate::set::{ResolvedElement, SubmissionSet};
use crate::value::{DateTimeData, SubmissionValue};

/// A complete submission: the top-level set plus its metadata.
///
/// Dereferences to the top-level [`SubmissionSet`] for value access.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    set: SubmissionSet,
}

impl Submission {
    /// Starts a new submission, stamping its submission date.
    pub fn create(
        form: Arc<CompiledForm>,
        store: &dyn RelationalStore,
        instance_id: Option<RowKey>,
    ) -> Result<Self, EngineError> {
        if let Some(id) = &instance_id {
            let core = &form.schema.table(form.schema.top_level_table()).name;
            match store.get_row(core, id) {
                Ok(_) => return Err(EngineError::DuplicateInstance(id.clone())),
                Err(StoreError::NotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        let set = SubmissionSet::create_top_level(form, store, instance_id)?;
        let mut submission = Self { set };
        let submission_date = submission.metadata_element(MetadataKind::SubmissionDate)?;
        let is_complete = submission.metadata_element(MetadataKind::IsComplete)?;
        submission.set.set_date_time(
            submission_date,
            Some(DateTimeData::DateTime(OffsetDateTime::now_utc())),
        )?;
        submission.set.set_boolean(is_complete, Some(false))?;
        info!(
            form_id = %submission.form().form_id,
            instance_id = %submission.instance_id(),
            "created submission"
        );
        Ok(submission)
    }

    pub fn load(
        form: Arc<CompiledForm>,
        store: &dyn RelationalStore,
        instance_id: &RowKey,
    ) -> Result<Self, EngineError> {
        let set = SubmissionSet::load_top_level(form, store, instance_id)?;
        Ok(Self { set })
    }

    /// Loads the submission addressed by the first two segments of `key`.
    pub fn fetch(
        registry: &FormRegistry,
        store: &dyn RelationalStore,
        key: &SubmissionKey,
    ) -> Result<Self, EngineError> {
        let parts = key.parts()?;
        let [form_part, top, ..] = parts.as_slice() else {
            return Err(EngineError::invalid_key(
                key,
                "needs a form segment and a top-level segment",
            ));
        };
        let version = form_part.version.unwrap_or_default();
        let form = registry
            .get(&form_part.element_name, version)
            .ok_or_else(|| EngineError::UnknownForm(form_part.element_name.clone()))?;
        if top.element_name != form.top_level_name() {
            return Err(EngineError::invalid_key(
                key,
                format!("top-level element is `{}`", form.top_level_name()),
            ));
        }
        let auri = top
            .auri
            .as_deref()
            .ok_or_else(|| EngineError::invalid_key(key, "top-level segment needs @key"))?;
        Self::load(form, store, &RowKey::new(auri))
    }

    /// Resolves every segment of `parts`, starting with the form segment.
    pub fn resolve_submission_key(
        &self,
        parts: &[SubmissionKeyPart],
    ) -> Result<ResolvedElement<'_>, EngineError> {
        let form = self.form();
        let first = parts
            .first()
            .ok_or_else(|| EngineError::invalid_key("", "empty submission key"))?;
        if first.element_name != form.form_id || first.version.unwrap_or_default() != form.version {
            return Err(EngineError::invalid_key(
                SubmissionKey::from_parts(parts),
                "key addresses a different form version",
            ));
        }
        self.set.resolve_submission_key_at(1, parts)
    }

    fn metadata_element(&self, kind: MetadataKind) -> Result<FormElementId, EngineError> {
        let tree = &self.form().elements;
        tree.children(tree.root(), &[FormElementNamespace::Metadata])
            .into_iter()
            .find(|id| tree.element(*id).metadata() == Some(kind))
            .ok_or_else(|| {
                EngineError::IllegalState(format!("form lacks {}", kind.element_name()))
            })
    }

    fn metadata_value(&self, kind: MetadataKind) -> Option<&SubmissionValue> {
        self.metadata_element(kind)
            .ok()
            .and_then(|id| self.set.get_value(id))
    }

    pub fn instance_id(&self) -> &RowKey {
        self.set.row_key()
    }

    pub fn model_version(&self) -> Option<i64> {
        self.metadata_value(MetadataKind::ModelVersion)
            .and_then(SubmissionValue::as_long)
            .and_then(|value| value.value())
    }

    pub fn ui_version(&self) -> Option<i64> {
        self.metadata_value(MetadataKind::UiVersion)
            .and_then(SubmissionValue::as_long)
            .and_then(|value| value.value())
    }

    pub fn submission_date(&self) -> Option<OffsetDateTime> {
        self.metadata_value(MetadataKind::SubmissionDate)
            .and_then(SubmissionValue::as_date_time)
            .and_then(|value| value.date_time())
    }

    pub fn is_complete(&self) -> bool {
        self.metadata_value(MetadataKind::IsComplete)
            .and_then(SubmissionValue::as_boolean)
            .and_then(|value| value.value())
            .unwrap_or(false)
    }

    pub fn marked_as_complete_date(&self) -> Option<OffsetDateTime> {
        self.metadata_value(MetadataKind::DateMarkedAsComplete)
            .and_then(SubmissionValue::as_date_time)
            .and_then(|value| value.date_time())
    }

    /// Flags the submission complete and stamps the completion date.
    pub fn mark_complete(&mut self) -> Result<(), EngineError> {
        let is_complete = self.metadata_element(MetadataKind::IsComplete)?;
        let marked = self.metadata_element(MetadataKind::DateMarkedAsComplete)?;
        self.set.set_boolean(is_complete, Some(true))?;
        self.set.set_date_time(
            marked,
            Some(DateTimeData::DateTime(OffsetDateTime::now_utc())),
        )
    }

    /// Removes every row of this submission, children before parents.
    pub fn delete(self, store: &dyn RelationalStore) -> Result<(), EngineError> {
        let mut keys = Vec::new();
        self.set.collect_entity_keys(store, &mut keys)?;
        store.delete_all(&keys)?;
        info!(instance_id = %self.instance_id(), rows = keys.len(), "deleted submission");
        Ok(())
    }

    pub fn into_set(self) -> SubmissionSet {
        self.set
    }
}

impl Deref for Submission {
    type Target = SubmissionSet;

    fn deref(&self) -> &Self::Target {
        &self.set
    }
}

impl DerefMut for Submission {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.set
    }
}
