use serde::Serialize;
use sha2::{Digest, Sha256};
use submission_model::schema::{
    CONTENT_HASH_COLUMN, CONTENT_LENGTH_COLUMN, CONTENT_TYPE_COLUMN, SUB_AURI_COLUMN,
    UNROOTED_FILE_PATH_COLUMN, VALUE_COLUMN,
};
use submission_model::{ElementId, ElementType, SchemaTree, TableName};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::query::RowQuery;
use crate::row::{CellValue, EntityKey, RowKey, StoredRow, ordinal_gap};
use crate::store::{RelationalStore, StoreError};

/// Result of storing an attachment under a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentOutcome {
    FileUnchanged,
    NewFileVersion,
    CompletelyNewFile,
}

/// Metadata of one stored attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentInfo {
    pub ordinal: usize,
    pub key: RowKey,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Absent while the content is only partially written.
    pub content_hash: Option<String>,
    pub content_length: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl AttachmentInfo {
    fn from_row(ordinal: usize, row: &StoredRow) -> Self {
        Self {
            ordinal,
            key: row.key.clone(),
            filename: row.text(UNROOTED_FILE_PATH_COLUMN).map(str::to_string),
            content_type: row.text(CONTENT_TYPE_COLUMN).map(str::to_string),
            content_hash: row.text(CONTENT_HASH_COLUMN).map(str::to_string),
            content_length: row.cell(CONTENT_LENGTH_COLUMN).as_integer(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub filename: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// `sha256:<hex>` digest used for attachment de-duplication.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Boundary to attachment storage, addressed by parent row and 1-based ordinal.
pub trait BlobStore {
    fn attachment_count(&self, parent: &RowKey) -> Result<usize, StoreError>;

    fn attachments(&self, parent: &RowKey) -> Result<Vec<AttachmentInfo>, StoreError>;

    fn attachment(&self, parent: &RowKey, ordinal: usize) -> Result<AttachmentInfo, StoreError>;

    fn attachment_bytes(&self, parent: &RowKey, ordinal: usize) -> Result<Vec<u8>, StoreError>;

    fn find_by_filename(
        &self,
        parent: &RowKey,
        filename: Option<&str>,
    ) -> Result<Option<AttachmentInfo>, StoreError>;

    /// Stores `attachment` under its filename, de-duplicating by content hash.
    ///
    /// Differing content for an existing filename is only written when `overwrite` is set.
    fn put_attachment(
        &self,
        parent: &RowKey,
        top_level: &RowKey,
        attachment: &NewAttachment,
        overwrite: bool,
    ) -> Result<AttachmentOutcome, StoreError>;

    fn delete_all(&self, parent: &RowKey) -> Result<(), StoreError>;

    fn entity_keys(&self, parent: &RowKey) -> Result<Vec<EntityKey>, StoreError>;
}

/// The content, content-ref and raw-bytes tables backing one binary field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentTables {
    pub content: TableName,
    pub content_ref: TableName,
    pub blob: TableName,
    pub chunk_bytes: usize,
}

impl AttachmentTables {
    pub fn for_element(schema: &SchemaTree, binary: ElementId, chunk_bytes: usize) -> Option<Self> {
        let element = schema.element(binary);
        if element.element_type != ElementType::Binary {
            return None;
        }
        let reference = schema.element(element.child_ids().next()?);
        let blob = schema.element(reference.child_ids().next()?);
        Some(Self {
            content: schema.table(element.location.table).name.clone(),
            content_ref: schema.table(reference.location.table).name.clone(),
            blob: schema.table(blob.location.table).name.clone(),
            chunk_bytes,
        })
    }
}

/// [`BlobStore`] spreading each attachment over the three attachment tables.
pub struct RelationalBlobStore<'a> {
    store: &'a dyn RelationalStore,
    tables: AttachmentTables,
}

impl<'a> RelationalBlobStore<'a> {
    pub fn new(store: &'a dyn RelationalStore, tables: AttachmentTables) -> Self {
        Self { store, tables }
    }

    fn content_rows(&self, parent: &RowKey) -> Result<Vec<StoredRow>, StoreError> {
        let rows = self
            .store
            .query(&RowQuery::children_of(self.tables.content.clone(), parent))?;
        check_ordinals(&self.tables.content, parent, &rows)?;
        Ok(rows)
    }

    fn content_row(&self, parent: &RowKey, ordinal: usize) -> Result<StoredRow, StoreError> {
        let mut rows = self.content_rows(parent)?;
        if ordinal == 0 || ordinal > rows.len() {
            return Err(StoreError::NotFound {
                table: self.tables.content.clone(),
                key: parent.clone(),
            });
        }
        Ok(rows.swap_remove(ordinal - 1))
    }

    fn ref_rows(&self, content: &RowKey) -> Result<Vec<StoredRow>, StoreError> {
        let rows = self
            .store
            .query(&RowQuery::children_of(self.tables.content_ref.clone(), content))?;
        check_ordinals(&self.tables.content_ref, content, &rows)?;
        Ok(rows)
    }

    fn chunk_entity_keys(&self, content: &RowKey) -> Result<Vec<EntityKey>, StoreError> {
        let mut keys = Vec::new();
        for reference in self.ref_rows(content)? {
            if let Some(blob) = reference.text(SUB_AURI_COLUMN) {
                keys.push(EntityKey {
                    table: self.tables.blob.clone(),
                    key: RowKey::new(blob),
                });
            }
            keys.push(reference.entity_key());
        }
        Ok(keys)
    }

    fn write_content(
        &self,
        mut content: StoredRow,
        top_level: &RowKey,
        attachment: &NewAttachment,
        hash: String,
    ) -> Result<(), StoreError> {
        // The hash stays empty until every chunk is stored.
        content.set(
            CONTENT_TYPE_COLUMN,
            CellValue::Text(attachment.content_type.clone()),
        );
        content.set(
            CONTENT_LENGTH_COLUMN,
            CellValue::Integer(attachment.bytes.len() as i64),
        );
        content.set(CONTENT_HASH_COLUMN, CellValue::Null);
        self.store.upsert(&content)?;

        let stale = self.chunk_entity_keys(&content.key)?;
        self.store.delete_all(&stale)?;

        for (index, chunk) in attachment.bytes.chunks(self.tables.chunk_bytes).enumerate() {
            let mut reference = self.store.new_row(&self.tables.content_ref)?;
            let mut blob = self.store.new_row(&self.tables.blob)?;
            blob.parent_key = Some(reference.key.clone());
            blob.top_level_key = Some(top_level.clone());
            blob.ordinal = Some(1);
            blob.set(VALUE_COLUMN, CellValue::Bytes(chunk.to_vec()));
            reference.parent_key = Some(content.key.clone());
            reference.top_level_key = Some(top_level.clone());
            reference.ordinal = Some(index as i64 + 1);
            reference.set(SUB_AURI_COLUMN, CellValue::Text(blob.key.to_string()));
            self.store.upsert(&blob)?;
            self.store.upsert(&reference)?;
        }

        content.set(CONTENT_HASH_COLUMN, CellValue::Text(hash));
        self.store.upsert(&content)?;
        debug!(
            table = %self.tables.content,
            key = %content.key,
            length = attachment.bytes.len(),
            "stored attachment content"
        );
        Ok(())
    }
}

impl BlobStore for RelationalBlobStore<'_> {
    fn attachment_count(&self, parent: &RowKey) -> Result<usize, StoreError> {
        Ok(self.content_rows(parent)?.len())
    }

    fn attachments(&self, parent: &RowKey) -> Result<Vec<AttachmentInfo>, StoreError> {
        Ok(self
            .content_rows(parent)?
            .iter()
            .enumerate()
            .map(|(index, row)| AttachmentInfo::from_row(index + 1, row))
            .collect())
    }

    fn attachment(&self, parent: &RowKey, ordinal: usize) -> Result<AttachmentInfo, StoreError> {
        let row = self.content_row(parent, ordinal)?;
        Ok(AttachmentInfo::from_row(ordinal, &row))
    }

    fn attachment_bytes(&self, parent: &RowKey, ordinal: usize) -> Result<Vec<u8>, StoreError> {
        let content = self.content_row(parent, ordinal)?;
        let mut bytes = Vec::new();
        if content.text(CONTENT_HASH_COLUMN).is_none() {
            return Ok(bytes);
        }
        for reference in self.ref_rows(&content.key)? {
            let Some(blob) = reference.text(SUB_AURI_COLUMN) else {
                continue;
            };
            let blob = self.store.get_row(&self.tables.blob, &RowKey::new(blob))?;
            if let Some(chunk) = blob.cell(VALUE_COLUMN).as_bytes() {
                bytes.extend_from_slice(chunk);
            }
        }
        Ok(bytes)
    }

    fn find_by_filename(
        &self,
        parent: &RowKey,
        filename: Option<&str>,
    ) -> Result<Option<AttachmentInfo>, StoreError> {
        Ok(self
            .content_rows(parent)?
            .iter()
            .enumerate()
            .find(|(_, row)| row.text(UNROOTED_FILE_PATH_COLUMN) == filename)
            .map(|(index, row)| AttachmentInfo::from_row(index + 1, row)))
    }

    fn put_attachment(
        &self,
        parent: &RowKey,
        top_level: &RowKey,
        attachment: &NewAttachment,
        overwrite: bool,
    ) -> Result<AttachmentOutcome, StoreError> {
        let hash = content_hash(&attachment.bytes);
        let rows = self.content_rows(parent)?;
        let filename = attachment.filename.as_deref();
        let matched = rows
            .iter()
            .find(|row| row.text(UNROOTED_FILE_PATH_COLUMN) == filename);

        match matched {
            None => {
                let mut content = self.store.new_row(&self.tables.content)?;
                content.parent_key = Some(parent.clone());
                content.top_level_key = Some(top_level.clone());
                content.ordinal = Some(rows.len() as i64 + 1);
                content.set(
                    UNROOTED_FILE_PATH_COLUMN,
                    CellValue::from(attachment.filename.clone()),
                );
                self.write_content(content, top_level, attachment, hash)?;
                Ok(AttachmentOutcome::CompletelyNewFile)
            }
            Some(row) => match row.text(CONTENT_HASH_COLUMN) {
                None => {
                    self.write_content(row.clone(), top_level, attachment, hash)?;
                    Ok(AttachmentOutcome::CompletelyNewFile)
                }
                Some(current) if current == hash => Ok(AttachmentOutcome::FileUnchanged),
                Some(_) if !overwrite => {
                    warn!(
                        parent = %parent,
                        filename = filename.unwrap_or_default(),
                        "attachment differs from stored content; not overwriting"
                    );
                    Ok(AttachmentOutcome::NewFileVersion)
                }
                Some(_) => {
                    self.write_content(row.clone(), top_level, attachment, hash)?;
                    Ok(AttachmentOutcome::NewFileVersion)
                }
            },
        }
    }

    fn delete_all(&self, parent: &RowKey) -> Result<(), StoreError> {
        let keys = self.entity_keys(parent)?;
        self.store.delete_all(&keys)
    }

    fn entity_keys(&self, parent: &RowKey) -> Result<Vec<EntityKey>, StoreError> {
        let mut keys = Vec::new();
        for content in self.content_rows(parent)? {
            keys.extend(self.chunk_entity_keys(&content.key)?);
            keys.push(content.entity_key());
        }
        Ok(keys)
    }
}

fn check_ordinals(table: &TableName, parent: &RowKey, rows: &[StoredRow]) -> Result<(), StoreError> {
    match ordinal_gap(rows) {
        Some((expected, found)) => Err(StoreError::EnumeratedElement {
            table: table.clone(),
            parent: parent.clone(),
            expected,
            found,
        }),
        None => Ok(()),
    }
}
