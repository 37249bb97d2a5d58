//! Database collaborator abstraction.
//!
//! The mapping layer never talks to a database engine directly. Instead it drives the
//! small set of primitives defined here, once for each operating [`Mode`]:
//!
//! - [`SyncDatabase`] / [`SyncCollection`]: every primitive blocks the calling thread
//! - [`AsyncDatabase`] / [`AsyncCollection`]: every primitive is a suspending future
//!
//! Handles are shared through `Arc` and wrapped in the mode-tagged [`DatabaseHandle`]
//! and [`CollectionHandle`] enums, which is what the registry stores and what callers
//! pass when they want to bypass alias resolution.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`. The core adds no locking around handles, so
//! any synchronisation a backend needs is its own responsibility.
//!
//! # Duplicate keys
//!
//! `insert_one` must report unique constraint violations as
//! [`DocMapError::DuplicateKey`](crate::error::DocMapError::DuplicateKey) so the engine
//! can tell them apart from other storage failures.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;
use std::{
    fmt::{self, Debug, Display},
    sync::Arc,
};

use crate::{
    error::DocMapResult,
    index::IndexSpec,
    query::{OperationOptions, UpdateSpec},
};

/// Operating mode of a database handle and of the operations driving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mode {
    /// Operations run to completion on the calling thread.
    Sync,
    /// Operations are futures that suspend inside database primitives.
    Async,
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Sync => f.write_str("sync"),
            Mode::Async => f.write_str("async"),
        }
    }
}

/// Lazily produced raw documents of a blocking `find`.
pub type DocumentIter = Box<dyn Iterator<Item = DocMapResult<Document>> + Send>;

/// Lazily produced raw documents of a suspending `find`.
pub type DocumentStream = BoxStream<'static, DocMapResult<Document>>;

/// A blocking database: a named container of collections.
pub trait SyncDatabase: Send + Sync + Debug {
    /// Returns the database name.
    fn name(&self) -> &str;

    /// Returns a handle to the named collection.
    ///
    /// This must not perform I/O; collections are created lazily by the engine.
    fn collection(&self, name: &str) -> Arc<dyn SyncCollection>;
}

/// A blocking collection exposing the primitives the engine relies on.
pub trait SyncCollection: Send + Sync + Debug {
    /// Returns the collection name.
    fn name(&self) -> &str;

    /// Returns every document matching `filter`, produced lazily.
    fn find(&self, filter: Document, options: OperationOptions) -> DocMapResult<DocumentIter>;

    /// Returns the first document matching `filter`, if any.
    fn find_one(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>>;

    /// Atomically updates the first matching document.
    ///
    /// Returns the image selected by `options.return_document` (pre-image when unset),
    /// or `None` when nothing matched and no upsert happened.
    fn find_one_and_update(
        &self,
        filter: Document,
        update: UpdateSpec,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>>;

    /// Atomically deletes the first matching document and returns its final image.
    fn find_one_and_delete(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>>;

    /// Inserts a document and returns its identity.
    ///
    /// A missing `_id` is generated by the backend.
    fn insert_one(&self, document: Document, options: OperationOptions) -> DocMapResult<Bson>;

    /// Counts the documents matching `filter`.
    fn count_documents(&self, filter: Document, options: OperationOptions) -> DocMapResult<u64>;

    /// Creates the given indexes and returns their names.
    fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocMapResult<Vec<String>>;
}

/// A suspending database: a named container of collections.
pub trait AsyncDatabase: Send + Sync + Debug {
    /// Returns the database name.
    fn name(&self) -> &str;

    /// Returns a handle to the named collection without performing I/O.
    fn collection(&self, name: &str) -> Arc<dyn AsyncCollection>;
}

/// A suspending collection exposing the primitives the engine relies on.
///
/// Semantics mirror [`SyncCollection`] one to one.
#[async_trait]
pub trait AsyncCollection: Send + Sync + Debug {
    fn name(&self) -> &str;

    async fn find(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<DocumentStream>;

    async fn find_one(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>>;

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: UpdateSpec,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>>;

    async fn find_one_and_delete(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>>;

    async fn insert_one(&self, document: Document, options: OperationOptions)
    -> DocMapResult<Bson>;

    async fn count_documents(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<u64>;

    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocMapResult<Vec<String>>;
}

/// A database handle tagged with its mode.
#[derive(Debug, Clone)]
pub enum DatabaseHandle {
    Sync(Arc<dyn SyncDatabase>),
    Async(Arc<dyn AsyncDatabase>),
}

impl DatabaseHandle {
    /// Wraps a blocking database.
    pub fn from_sync(database: impl SyncDatabase + 'static) -> Self {
        DatabaseHandle::Sync(Arc::new(database))
    }

    /// Wraps a suspending database.
    pub fn from_async(database: impl AsyncDatabase + 'static) -> Self {
        DatabaseHandle::Async(Arc::new(database))
    }

    /// Returns the mode this handle operates in.
    pub fn mode(&self) -> Mode {
        match self {
            DatabaseHandle::Sync(_) => Mode::Sync,
            DatabaseHandle::Async(_) => Mode::Async,
        }
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        match self {
            DatabaseHandle::Sync(database) => database.name(),
            DatabaseHandle::Async(database) => database.name(),
        }
    }

    /// Returns a handle to the named collection in the same mode.
    pub fn collection(&self, name: &str) -> CollectionHandle {
        match self {
            DatabaseHandle::Sync(database) => CollectionHandle::Sync(database.collection(name)),
            DatabaseHandle::Async(database) => CollectionHandle::Async(database.collection(name)),
        }
    }
}

/// A collection handle tagged with its mode.
#[derive(Debug, Clone)]
pub enum CollectionHandle {
    Sync(Arc<dyn SyncCollection>),
    Async(Arc<dyn AsyncCollection>),
}

impl CollectionHandle {
    /// Returns the mode this handle operates in.
    pub fn mode(&self) -> Mode {
        match self {
            CollectionHandle::Sync(_) => Mode::Sync,
            CollectionHandle::Async(_) => Mode::Async,
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        match self {
            CollectionHandle::Sync(collection) => collection.name(),
            CollectionHandle::Async(collection) => collection.name(),
        }
    }
}

/// Factory trait for constructing database handles from backend-specific settings.
#[async_trait]
pub trait DatabaseBuilder {
    async fn build(self) -> DocMapResult<DatabaseHandle>;
}
