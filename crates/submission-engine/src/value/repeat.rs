use std::sync::Arc;

use submission_model::{CompiledForm, FormElementId, SubmissionKey, SubmissionKeyPart, TableName};
use submission_store::{EntityKey, RelationalStore, RowKey, RowQuery, ordinal_gap};

use super::SubmissionValue;
use crate::error::EngineError;
use crate::set::{EnclosingSet, ResolvedElement, SubmissionSet};

/// What a nested set needs from the set enclosing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NestedContext {
    pub(crate) enclosing: EnclosingSet,
    /// Row in the enclosing set that owns the repeat table.
    pub(crate) parent_row: RowKey,
    pub(crate) top_level_key: RowKey,
    pub(crate) table: TableName,
}

/// Ordered instances of a repeat group.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatValue {
    pub(crate) element: FormElementId,
    key: SubmissionKey,
    context: NestedContext,
    sets: Vec<SubmissionSet>,
}

impl RepeatValue {
    pub(crate) fn new(element: FormElementId, key: SubmissionKey, context: NestedContext) -> Self {
        Self {
            element,
            key,
            context,
            sets: Vec::new(),
        }
    }

    pub fn key(&self) -> &SubmissionKey {
        &self.key
    }

    pub fn sets(&self) -> &[SubmissionSet] {
        &self.sets
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// The instance at 1-based `ordinal`.
    pub fn instance(&self, ordinal: usize) -> Option<&SubmissionSet> {
        ordinal.checked_sub(1).and_then(|index| self.sets.get(index))
    }

    pub fn instance_mut(&mut self, ordinal: usize) -> Option<&mut SubmissionSet> {
        ordinal
            .checked_sub(1)
            .and_then(move |index| self.sets.get_mut(index))
    }

    pub(crate) fn add_instance(
        &mut self,
        form: &Arc<CompiledForm>,
        store: &dyn RelationalStore,
    ) -> Result<&mut SubmissionSet, EngineError> {
        let ordinal = self.sets.len() as i64 + 1;
        let set =
            SubmissionSet::create_nested(Arc::clone(form), store, self.element, &self.context, ordinal)?;
        self.sets.push(set);
        let index = self.sets.len() - 1;
        Ok(&mut self.sets[index])
    }

    pub(crate) fn load(
        &mut self,
        form: &Arc<CompiledForm>,
        store: &dyn RelationalStore,
    ) -> Result<(), EngineError> {
        let rows = store.query(&RowQuery::children_of(
            self.context.table.clone(),
            &self.context.parent_row,
        ))?;
        if let Some(gap) = ordinal_gap(&rows) {
            return Err(EngineError::enumerated(
                &self.context.table,
                &self.context.parent_row,
                gap,
            ));
        }
        self.sets = rows
            .into_iter()
            .map(|row| {
                SubmissionSet::load_nested(Arc::clone(form), store, self.element, row, &self.context)
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    pub(crate) fn persist(&mut self, store: &dyn RelationalStore) -> Result<(), EngineError> {
        self.sets.iter_mut().try_for_each(|set| set.persist(store))
    }

    pub(crate) fn collect_entity_keys(
        &self,
        store: &dyn RelationalStore,
        keys: &mut Vec<EntityKey>,
    ) -> Result<(), EngineError> {
        self.sets
            .iter()
            .try_for_each(|set| set.collect_entity_keys(store, keys))
    }

    /// Resolves `parts[index]`, the segment naming this repeat.
    pub(crate) fn resolve(
        &self,
        index: usize,
        parts: &[SubmissionKeyPart],
    ) -> Result<ResolvedElement<'_>, EngineError> {
        let part = &parts[index];
        let invalid = |reason: &str| {
            EngineError::invalid_key(SubmissionKey::from_parts(parts), reason.to_string())
        };
        if let Some(ordinal) = part.ordinal {
            let set = usize::try_from(ordinal)
                .ok()
                .and_then(|ordinal| self.instance(ordinal))
                .ok_or_else(|| invalid("repeat ordinal out of range"))?;
            return set.resolve_submission_key_at(index, parts);
        }
        match &part.auri {
            None if index + 1 == parts.len() => Ok(ResolvedElement::Repeat(self)),
            None => Err(EngineError::TrailingKeyParts {
                key: SubmissionKey::from_parts(parts).to_string(),
                element: part.element_name.clone(),
            }),
            Some(auri) => self
                .sets
                .iter()
                .find(|set| set.row_key().as_str() == auri)
                .ok_or_else(|| invalid("no repeat instance with this key"))?
                .resolve_submission_key_at(index, parts),
        }
    }

    /// Values of `element` across every instance.
    pub(crate) fn find_element_value(
        &self,
        element: FormElementId,
    ) -> Result<Vec<&SubmissionValue>, EngineError> {
        let mut found = Vec::new();
        for set in &self.sets {
            found.extend(set.find_element_value(element)?);
        }
        Ok(found)
    }
}
