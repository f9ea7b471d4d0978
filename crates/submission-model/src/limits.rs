use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ceilings imposed by the backing relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StoreLimits {
    /// Schema (namespace) every physical table is declared in.
    pub schema: String,
    /// Maximum number of columns per table, implicit columns included.
    pub max_columns_per_table: usize,
    /// Maximum estimated row width in bytes.
    pub max_row_bytes: usize,
    /// Column capacity for strings that declare no `max_length`.
    pub default_string_length: usize,
    /// Size of each raw-bytes row of a binary attachment.
    pub blob_chunk_bytes: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            schema: "submissions".into(),
            max_columns_per_table: 400,
            max_row_bytes: 65_000,
            default_string_length: 255,
            blob_chunk_bytes: 1_048_576,
        }
    }
}

#[derive(Debug, Error)]
pub enum LimitsError {
    #[error("failed to read limits file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid limits document: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("limit `{0}` must be greater than zero")]
    Zero(&'static str),
}

impl StoreLimits {
    pub fn from_toml_str(raw: &str) -> Result<Self, LimitsError> {
        let limits: StoreLimits = toml::from_str(raw)?;
        limits.check()?;
        Ok(limits)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LimitsError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| LimitsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Rejects limits under which no layout can be compiled.
    pub fn check(&self) -> Result<(), LimitsError> {
        if self.max_columns_per_table == 0 {
            return Err(LimitsError::Zero("max_columns_per_table"));
        }
        if self.max_row_bytes == 0 {
            return Err(LimitsError::Zero("max_row_bytes"));
        }
        if self.default_string_length == 0 {
            return Err(LimitsError::Zero("default_string_length"));
        }
        if self.blob_chunk_bytes == 0 {
            return Err(LimitsError::Zero("blob_chunk_bytes"));
        }
        Ok(())
    }
}
