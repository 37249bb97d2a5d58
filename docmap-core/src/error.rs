//! Error types and result types for document mapping operations.
//!
//! Every fallible operation in this crate returns [`DocMapResult<T>`]. Errors are
//! grouped into [`ErrorCategory`] buckets so callers can tell configuration mistakes
//! and routing failures apart from precondition violations and storage failures
//! without matching on every variant.
//!
//! A document that simply does not match a filter is *not* an error: `find_one`
//! returns `None` and `update` / `delete` return `false` in that case.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::backend::Mode;

/// Coarse classification of a [`DocMapError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The registry was configured twice or with an invalid binding list.
    Configuration,
    /// The database or collection for an operation could not be determined.
    Resolution,
    /// The operation was rejected before any storage access.
    Precondition,
    /// The storage layer failed, or a stored document could not be mapped.
    Storage,
}

/// Represents all possible errors raised while routing and executing document operations.
#[derive(Error, Debug)]
pub enum DocMapError {
    /// The registry already holds a configuration.
    #[error("Database configuration can only be done once")]
    AlreadyConfigured,
    /// The same alias was bound twice, either within a mode or across modes.
    #[error("Database alias `{0}` is bound more than once")]
    DuplicateAlias(String),
    /// More than one binding of a mode is marked as default.
    #[error("Only one {0} database can be set as default")]
    MultipleDefaults(Mode),
    /// A mode received bindings but none of them is marked as default.
    #[error("At least one {0} database must be defined as default")]
    NoDefault(Mode),
    /// A default lookup was made for a mode that has no default binding.
    #[error("No default {0} database is configured")]
    NoDefaultConfigured(Mode),
    /// No binding exists for the requested alias.
    #[error("No {mode} database was found for the alias `{alias}`")]
    DatabaseNotFound { alias: String, mode: Mode },
    /// The model has no collection name and none was given explicitly.
    #[error("The collection name must be specified in the settings of model `{0}`")]
    MissingCollectionName(&'static str),
    /// An explicit database handle does not belong to the operation's mode.
    #[error("Database `{name}` is a {found} handle, expected a {expected} handle")]
    InvalidDatabaseHandle { name: String, expected: Mode, found: Mode },
    /// An explicit collection handle does not belong to the operation's mode.
    #[error("Collection `{name}` is a {found} handle, expected a {expected} handle")]
    InvalidCollectionHandle { name: String, expected: Mode, found: Mode },
    /// An argument was malformed or not allowed for the operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The instance has no identity yet.
    #[error("You must insert or fetch a document before calling `{0}`")]
    RequiresLoadedDocument(&'static str),
    /// A custom query key does not start with the `$` operator marker.
    #[error("The custom query key `{0}` must start with $")]
    InvalidOperatorKey(String),
    /// A field path descends into a value that is not a document.
    #[error("The value at `{0}` is not a document")]
    InvalidFieldPath(String),
    /// Item lookup on a field that is not present.
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    /// A unique constraint was violated on insertion.
    #[error("This document is already inserted or another document has the same key in collection {collection} | Server error: {message}")]
    DuplicateKey { collection: String, message: String },
    /// `reload` found no stored document for the instance identity.
    #[error("Document {id} does not exist in collection {collection}")]
    DocumentNotFound { id: String, collection: String },
    /// Conversion between models and raw documents failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// An error reported by the underlying database collaborator.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocMapError {
    /// Returns the category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DocMapError::AlreadyConfigured
            | DocMapError::DuplicateAlias(_)
            | DocMapError::MultipleDefaults(_)
            | DocMapError::NoDefault(_)
            | DocMapError::NoDefaultConfigured(_) => ErrorCategory::Configuration,
            DocMapError::DatabaseNotFound { .. }
            | DocMapError::MissingCollectionName(_)
            | DocMapError::InvalidDatabaseHandle { .. }
            | DocMapError::InvalidCollectionHandle { .. } => ErrorCategory::Resolution,
            DocMapError::InvalidArgument(_)
            | DocMapError::RequiresLoadedDocument(_)
            | DocMapError::InvalidOperatorKey(_)
            | DocMapError::InvalidFieldPath(_)
            | DocMapError::KeyNotFound(_) => ErrorCategory::Precondition,
            DocMapError::DuplicateKey { .. }
            | DocMapError::DocumentNotFound { .. }
            | DocMapError::Serialization(_)
            | DocMapError::Backend(_) => ErrorCategory::Storage,
        }
    }
}

/// A specialized `Result` type for document mapping operations.
pub type DocMapResult<T> = Result<T, DocMapError>;

impl From<BsonError> for DocMapError {
    fn from(err: BsonError) -> Self {
        DocMapError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocMapError {
    fn from(err: SerdeJsonError) -> Self {
        DocMapError::Serialization(err.to_string())
    }
}
