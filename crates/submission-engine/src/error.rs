use submission_model::{ElementKeyError, KeyError, SchemaError, TableName};
use submission_store::{RowKey, StoreError};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    ElementKey(#[from] ElementKeyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid submission key `{key}`: {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("submission `{0}` already exists")]
    DuplicateInstance(RowKey),
    #[error("form `{0}` is not registered")]
    UnknownForm(String),
    #[error("expected exactly one row in {table} under parent {parent_key}, found {found}")]
    Reconstruction {
        table: TableName,
        parent_key: RowKey,
        found: usize,
    },
    #[error("rows of {table} under {parent} expected ordinal {expected}, found {found:?}")]
    EnumeratedElement {
        table: TableName,
        parent: RowKey,
        expected: i64,
        found: Option<i64>,
    },
    #[error("submission key `{key}` continues past leaf element `{element}`")]
    TrailingKeyParts { key: String, element: String },
    #[error("element `{0}` cannot be removed; only binary attachments support removal")]
    UnsupportedRemoval(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("cannot convert `{raw}` to {target}: {reason}")]
    Conversion {
        raw: String,
        target: &'static str,
        reason: String,
    },
}

impl EngineError {
    pub(crate) fn conversion(raw: &str, target: &'static str, reason: impl ToString) -> Self {
        EngineError::Conversion {
            raw: raw.to_string(),
            target,
            reason: reason.to_string(),
        }
    }

    /// Child rows whose ordinals are not `1..n`; logged since the stored data is corrupt.
    pub(crate) fn enumerated(
        table: &TableName,
        parent: &RowKey,
        (expected, found): (i64, Option<i64>),
    ) -> Self {
        error!(%table, %parent, expected, ?found, "child rows are not numbered 1..n");
        EngineError::EnumeratedElement {
            table: table.clone(),
            parent: parent.clone(),
            expected,
            found,
        }
    }

    pub(crate) fn invalid_key(key: impl ToString, reason: impl Into<String>) -> Self {
        EngineError::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
