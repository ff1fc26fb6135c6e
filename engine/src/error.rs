//! Error types for the fieldsync engine.

use crate::{FieldName, NativeName, SourceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Startup configuration errors.
///
/// These are fatal: a registry or adapter set that fails to build must abort
/// process start rather than continue with a partial configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("canonical field catalog is empty")]
    EmptyCatalog,

    #[error("duplicate canonical field: {0}")]
    DuplicateField(FieldName),

    #[error("enum field '{0}' declares no variants")]
    EmptyEnum(FieldName),

    #[error("no sources configured")]
    NoSources,

    #[error("duplicate source: {0}")]
    DuplicateSource(SourceId),

    #[error("source '{0}' maps no fields")]
    EmptyMapping(SourceId),

    #[error("source '{source_id}' maps unknown canonical field '{field}'")]
    UnknownField { source_id: SourceId, field: FieldName },

    #[error("source '{source_id}' maps native name '{native}' more than once")]
    DuplicateNativeName {
        source_id: SourceId,
        native: NativeName,
    },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("no adapter registered for source '{0}'")]
    MissingAdapter(SourceId),

    #[error("adapter registered for unconfigured source '{0}'")]
    UnknownAdapter(SourceId),

    #[error("invalid schema document: {0}")]
    Parse(String),
}

/// Errors raised by the engine while interpreting field data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown canonical field: {0}")]
    UnknownField(FieldName),

    #[error("malformed timestamp '{raw}': {reason}")]
    TimestampFormat { raw: String, reason: String },

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: FieldName,
        expected: String,
        got: String,
    },
}

/// Failure of a single adapter call.
///
/// Adapters report every transport, auth or validation problem through this
/// type. None of these abort a sync run; they are recorded per
/// (field, source) pair.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum AdapterError {
    /// Transport or authentication failure.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source refused the write (validation, constraint, ...).
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The call exceeded its deadline.
    #[error("call timed out after {0} ms")]
    Timeout(u64),

    /// The source returned a value that cannot be read as the field's type.
    #[error("malformed value: {0}")]
    Malformed(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
