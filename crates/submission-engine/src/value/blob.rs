use submission_model::{FormElementId, SubmissionKey};
use submission_store::{
    AttachmentInfo, AttachmentOutcome, AttachmentTables, BlobStore, EntityKey, NewAttachment,
    RelationalBlobStore, RelationalStore, RowKey, content_hash,
};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Attachment staged on a value until the set is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingAttachment {
    attachment: NewAttachment,
    hash: String,
    /// Ordinal the attachment will occupy once written.
    ordinal: usize,
}

/// Binary attachments of one element instance, addressed by 1-based ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobValue {
    pub(crate) element: FormElementId,
    key: SubmissionKey,
    tables: AttachmentTables,
    parent_key: RowKey,
    top_level_key: RowKey,
    attachments: Vec<AttachmentInfo>,
    pending: Vec<PendingAttachment>,
}

impl BlobValue {
    pub(crate) fn new(
        element: FormElementId,
        key: SubmissionKey,
        tables: AttachmentTables,
        parent_key: RowKey,
        top_level_key: RowKey,
    ) -> Self {
        Self {
            element,
            key,
            tables,
            parent_key,
            top_level_key,
            attachments: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn key(&self) -> &SubmissionKey {
        &self.key
    }

    /// Key addressing the attachment at `ordinal`.
    pub fn generate_submission_key(&self, ordinal: usize) -> SubmissionKey {
        self.key.with_ordinal(ordinal as i64)
    }

    /// Stored attachments as of the last load or persist.
    pub fn attachments(&self) -> &[AttachmentInfo] {
        &self.attachments
    }

    pub fn attachment_count(&self) -> usize {
        let staged = self
            .pending
            .iter()
            .filter(|pending| pending.ordinal > self.attachments.len())
            .count();
        self.attachments.len() + staged
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn attachment_bytes(
        &self,
        store: &dyn RelationalStore,
        ordinal: usize,
    ) -> Result<Vec<u8>, EngineError> {
        if let Some(pending) = self.pending.iter().find(|pending| pending.ordinal == ordinal) {
            return Ok(pending.attachment.bytes.clone());
        }
        let blobs = RelationalBlobStore::new(store, self.tables.clone());
        Ok(blobs.attachment_bytes(&self.parent_key, ordinal)?)
    }

    /// Stages `attachment`, reporting what persisting it will do.
    pub(crate) fn stage(&mut self, attachment: NewAttachment, overwrite: bool) -> AttachmentOutcome {
        let hash = content_hash(&attachment.bytes);
        let filename = attachment.filename.clone();

        if let Some(index) = self
            .pending
            .iter()
            .position(|pending| pending.attachment.filename == filename)
        {
            let pending = &mut self.pending[index];
            if pending.hash == hash {
                return AttachmentOutcome::FileUnchanged;
            }
            if !overwrite {
                warn!(key = %self.key, "staged attachment differs; not overwriting");
                return AttachmentOutcome::NewFileVersion;
            }
            pending.attachment = attachment;
            pending.hash = hash;
            return AttachmentOutcome::NewFileVersion;
        }

        let stored = self
            .attachments
            .iter()
            .find(|info| info.filename == filename)
            .map(|info| (info.ordinal, info.content_hash.clone()));
        let (ordinal, outcome) = match stored {
            None => (
                self.attachment_count() + 1,
                AttachmentOutcome::CompletelyNewFile,
            ),
            // A missing hash marks an interrupted write; it is always completed.
            Some((ordinal, None)) => (ordinal, AttachmentOutcome::CompletelyNewFile),
            Some((_, Some(current))) if current == hash => {
                return AttachmentOutcome::FileUnchanged;
            }
            Some((_, Some(_))) if !overwrite => {
                warn!(key = %self.key, "attachment differs from stored content; not overwriting");
                return AttachmentOutcome::NewFileVersion;
            }
            Some((ordinal, Some(_))) => (ordinal, AttachmentOutcome::NewFileVersion),
        };
        debug!(key = %self.key, ordinal, ?outcome, "staged attachment");
        self.pending.push(PendingAttachment {
            attachment,
            hash,
            ordinal,
        });
        outcome
    }

    pub(crate) fn load(&mut self, store: &dyn RelationalStore) -> Result<(), EngineError> {
        let blobs = RelationalBlobStore::new(store, self.tables.clone());
        self.attachments = blobs.attachments(&self.parent_key)?;
        self.pending.clear();
        Ok(())
    }

    pub(crate) fn persist(&mut self, store: &dyn RelationalStore) -> Result<(), EngineError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let blobs = RelationalBlobStore::new(store, self.tables.clone());
        // An attachment stays staged until its write succeeds.
        while let Some(pending) = self.pending.first() {
            blobs.put_attachment(&self.parent_key, &self.top_level_key, &pending.attachment, true)?;
            self.pending.remove(0);
        }
        self.attachments = blobs.attachments(&self.parent_key)?;
        Ok(())
    }

    pub(crate) fn collect_entity_keys(
        &self,
        store: &dyn RelationalStore,
        keys: &mut Vec<EntityKey>,
    ) -> Result<(), EngineError> {
        let blobs = RelationalBlobStore::new(store, self.tables.clone());
        keys.extend(blobs.entity_keys(&self.parent_key)?);
        Ok(())
    }
}
