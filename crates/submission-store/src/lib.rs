//! Storage boundaries consumed by the submission engine.

pub mod blob;
pub mod memory;
pub mod query;
pub mod row;
pub mod store;

pub use blob::{
    AttachmentInfo, AttachmentOutcome, AttachmentTables, BlobStore, NewAttachment,
    RelationalBlobStore, content_hash,
};
pub use memory::InMemoryStore;
pub use query::{FilterColumn, RowFilter, RowQuery, SortColumn};
pub use row::{CellValue, EntityKey, RowKey, StoredRow, ordinal_gap};
pub use store::{RelationalStore, StoreError};
