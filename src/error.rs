//! Error types for Yuna
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using YunaError
pub type Result<T> = std::result::Result<T, YunaError>;

/// Boxed failure raised by a serialization or compression codec
pub type CodecError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for Yuna operations
#[derive(Debug, Error)]
pub enum YunaError {
    // -------------------------------------------------------------------------
    // I/O and Engine Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LMDB error: {0}")]
    Engine(#[from] heed::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("'{tag}': unknown {kind} format")]
    UnknownCodec { kind: &'static str, tag: String },

    #[error("cannot serialize value for key '{key}' in table '{table}': {source}")]
    Serialization {
        table: String,
        key: String,
        #[source]
        source: CodecError,
    },

    #[error("cannot deserialize value for key '{key}' in table '{table}': {source}")]
    Deserialization {
        table: String,
        key: String,
        #[source]
        source: CodecError,
    },

    // -------------------------------------------------------------------------
    // Metadata / Identity Errors
    // -------------------------------------------------------------------------
    #[error("LMDB file is not a Yuna DB file: {0:?}")]
    NoMetadata(PathBuf),

    #[error("Yuna DB has corrupted metadata: {path:?}: {reason}")]
    CorruptMetadata { path: PathBuf, reason: String },

    #[error("LMDB file '{field}' mismatch: expected '{expected}', got '{actual}'")]
    IdentityMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    // -------------------------------------------------------------------------
    // Table Errors
    // -------------------------------------------------------------------------
    #[error("table '{0}' already exists in this database")]
    DuplicateTable(String),

    #[error("no table named '{0}' in this database")]
    NoSuchTable(String),

    #[error("key '{key}' not found in table '{table}'")]
    KeyNotFound { table: String, key: String },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("cannot repack {0:?}: database is still open")]
    AlreadyOpen(PathBuf),

    #[error("database is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl YunaError {
    pub(crate) fn key_not_found(table: &str, key: &str) -> Self {
        YunaError::KeyNotFound {
            table: table.to_string(),
            key: key.to_string(),
        }
    }
}
