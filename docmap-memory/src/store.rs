//! In-memory database handles for both operating modes.
//!
//! [`InMemoryDatabase`] guards its collections with an async-aware read-write lock and
//! implements the suspending collaborator traits; [`BlockingInMemoryDatabase`] uses a
//! blocking lock and implements the blocking ones. Collections are created on first
//! write and every clone of a database shares the same data.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, stream};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

use docmap_core::{
    backend::{
        AsyncCollection, AsyncDatabase, DatabaseBuilder, DatabaseHandle, DocumentIter,
        DocumentStream, Mode, SyncCollection, SyncDatabase,
    },
    error::DocMapResult,
    index::IndexSpec,
    query::{OperationOptions, UpdateSpec},
};

use crate::collection::CollectionState;

type StoreMap = HashMap<String, CollectionState>;

/// Suspending in-memory database.
///
/// # Example
///
/// ```ignore
/// use docmap::memory::InMemoryDatabase;
/// use docmap::registry::DatabaseBinding;
///
/// let handle = InMemoryDatabase::builder("app").build().await?;
/// REGISTRY.configure(vec![DatabaseBinding::new("main", handle).as_default()])?;
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryDatabase {
    name: String,
    store: Arc<mea::rwlock::RwLock<StoreMap>>,
}

impl InMemoryDatabase {
    /// Creates an empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(mea::rwlock::RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for a database named `name`.
    pub fn builder(name: impl Into<String>) -> InMemoryDatabaseBuilder {
        InMemoryDatabaseBuilder { name: name.into(), mode: Mode::Async }
    }

    /// Wraps this database in a registry handle.
    pub fn into_handle(self) -> DatabaseHandle {
        DatabaseHandle::from_async(self)
    }
}

impl AsyncDatabase for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn AsyncCollection> {
        Arc::new(InMemoryCollection {
            namespace: format!("{}.{}", self.name, name),
            name: name.to_string(),
            store: self.store.clone(),
        })
    }
}

/// Collection of an [`InMemoryDatabase`].
#[derive(Debug, Clone)]
pub struct InMemoryCollection {
    namespace: String,
    name: String,
    store: Arc<mea::rwlock::RwLock<StoreMap>>,
}

#[async_trait]
impl AsyncCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<DocumentStream> {
        let documents = match self.store.read().await.get(&self.name) {
            Some(state) => state.find(&filter, &options)?,
            None => Vec::new(),
        };

        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn find_one(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        let options = OperationOptions { limit: Some(1), ..options };

        Ok(match self.store.read().await.get(&self.name) {
            Some(state) => state.find(&filter, &options)?.into_iter().next(),
            None => None,
        })
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: UpdateSpec,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.store
            .write()
            .await
            .entry(self.name.clone())
            .or_default()
            .find_one_and_update(&self.namespace, &filter, &update, &options)
    }

    async fn find_one_and_delete(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        match self.store.write().await.get_mut(&self.name) {
            Some(state) => state.find_one_and_delete(&filter, &options),
            None => Ok(None),
        }
    }

    async fn insert_one(
        &self,
        document: Document,
        _options: OperationOptions,
    ) -> DocMapResult<Bson> {
        self.store
            .write()
            .await
            .entry(self.name.clone())
            .or_default()
            .insert_one(&self.namespace, document)
    }

    async fn count_documents(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<u64> {
        match self.store.read().await.get(&self.name) {
            Some(state) => state.count(&filter, &options),
            None => Ok(0),
        }
    }

    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocMapResult<Vec<String>> {
        debug!(collection = %self.namespace, indexes = indexes.len(), "creating in-memory indexes");

        self.store
            .write()
            .await
            .entry(self.name.clone())
            .or_default()
            .create_indexes(&self.namespace, indexes)
    }
}

/// Blocking in-memory database.
#[derive(Debug, Clone)]
pub struct BlockingInMemoryDatabase {
    name: String,
    store: Arc<parking_lot::RwLock<StoreMap>>,
}

impl BlockingInMemoryDatabase {
    /// Creates an empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(parking_lot::RwLock::new(StoreMap::new())),
        }
    }

    /// Wraps this database in a registry handle.
    pub fn into_handle(self) -> DatabaseHandle {
        DatabaseHandle::from_sync(self)
    }
}

impl SyncDatabase for BlockingInMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn SyncCollection> {
        Arc::new(BlockingInMemoryCollection {
            namespace: format!("{}.{}", self.name, name),
            name: name.to_string(),
            store: self.store.clone(),
        })
    }
}

/// Collection of a [`BlockingInMemoryDatabase`].
#[derive(Debug, Clone)]
pub struct BlockingInMemoryCollection {
    namespace: String,
    name: String,
    store: Arc<parking_lot::RwLock<StoreMap>>,
}

impl SyncCollection for BlockingInMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, filter: Document, options: OperationOptions) -> DocMapResult<DocumentIter> {
        let documents = match self.store.read().get(&self.name) {
            Some(state) => state.find(&filter, &options)?,
            None => Vec::new(),
        };

        Ok(Box::new(documents.into_iter().map(Ok)))
    }

    fn find_one(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        let options = OperationOptions { limit: Some(1), ..options };

        Ok(match self.store.read().get(&self.name) {
            Some(state) => state.find(&filter, &options)?.into_iter().next(),
            None => None,
        })
    }

    fn find_one_and_update(
        &self,
        filter: Document,
        update: UpdateSpec,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.store
            .write()
            .entry(self.name.clone())
            .or_default()
            .find_one_and_update(&self.namespace, &filter, &update, &options)
    }

    fn find_one_and_delete(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        match self.store.write().get_mut(&self.name) {
            Some(state) => state.find_one_and_delete(&filter, &options),
            None => Ok(None),
        }
    }

    fn insert_one(&self, document: Document, _options: OperationOptions) -> DocMapResult<Bson> {
        self.store
            .write()
            .entry(self.name.clone())
            .or_default()
            .insert_one(&self.namespace, document)
    }

    fn count_documents(&self, filter: Document, options: OperationOptions) -> DocMapResult<u64> {
        match self.store.read().get(&self.name) {
            Some(state) => state.count(&filter, &options),
            None => Ok(0),
        }
    }

    fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocMapResult<Vec<String>> {
        debug!(collection = %self.namespace, indexes = indexes.len(), "creating in-memory indexes");

        self.store
            .write()
            .entry(self.name.clone())
            .or_default()
            .create_indexes(&self.namespace, indexes)
    }
}

/// Builder for in-memory database handles.
///
/// Builds a suspending database unless [`blocking`](Self::blocking) is called.
#[derive(Debug, Clone)]
pub struct InMemoryDatabaseBuilder {
    name: String,
    mode: Mode,
}

impl InMemoryDatabaseBuilder {
    /// Builds a blocking database instead.
    pub fn blocking(mut self) -> Self {
        self.mode = Mode::Sync;
        self
    }
}

#[async_trait]
impl DatabaseBuilder for InMemoryDatabaseBuilder {
    async fn build(self) -> DocMapResult<DatabaseHandle> {
        Ok(match self.mode {
            Mode::Sync => BlockingInMemoryDatabase::new(self.name).into_handle(),
            Mode::Async => InMemoryDatabase::new(self.name).into_handle(),
        })
    }
}
