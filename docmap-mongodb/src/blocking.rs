//! Blocking MongoDB collaborators built on the driver's `sync` API.

use bson::{Bson, Document};
use mongodb::sync::{Client, Collection as MongoCollection};
use std::sync::Arc;
use tracing::debug;

use docmap_core::{
    backend::{DatabaseHandle, DocumentIter, SyncCollection, SyncDatabase},
    error::{DocMapError, DocMapResult},
    index::IndexSpec,
    query::{OperationOptions, UpdateSpec},
};

use crate::options::{
    count_options, find_one_and_delete_options, find_one_and_update_options, find_one_options,
    find_options, index_model, map_error, update_modifications,
};

/// A database on a MongoDB deployment, driven by the blocking driver.
#[derive(Debug, Clone)]
pub struct BlockingMongoDatabase {
    client: Client,
    database: String,
}

impl BlockingMongoDatabase {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into() }
    }

    /// Connects without an async runtime.
    pub fn connect(dsn: &str, database: &str) -> DocMapResult<Self> {
        Ok(Self::new(
            Client::with_uri_str(dsn).map_err(|e| DocMapError::Backend(e.to_string()))?,
            database,
        ))
    }

    /// Wraps this database in a registry handle.
    pub fn into_handle(self) -> DatabaseHandle {
        DatabaseHandle::from_sync(self)
    }
}

impl SyncDatabase for BlockingMongoDatabase {
    fn name(&self) -> &str {
        &self.database
    }

    fn collection(&self, name: &str) -> Arc<dyn SyncCollection> {
        Arc::new(BlockingMongoDbCollection {
            namespace: format!("{}.{}", self.database, name),
            inner: self.client.database(&self.database).collection(name),
        })
    }
}

/// A collection of a [`BlockingMongoDatabase`].
#[derive(Debug, Clone)]
pub struct BlockingMongoDbCollection {
    namespace: String,
    inner: MongoCollection<Document>,
}

impl SyncCollection for BlockingMongoDbCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn find(&self, filter: Document, options: OperationOptions) -> DocMapResult<DocumentIter> {
        let namespace = self.namespace.clone();
        let cursor = self
            .inner
            .find(filter)
            .with_options(find_options(options))
            .run()
            .map_err(|e| map_error(e, &self.namespace))?;

        Ok(Box::new(
            cursor.map(move |document| document.map_err(|e| map_error(e, &namespace))),
        ))
    }

    fn find_one(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.inner
            .find_one(filter)
            .with_options(find_one_options(options))
            .run()
            .map_err(|e| map_error(e, &self.namespace))
    }

    fn find_one_and_update(
        &self,
        filter: Document,
        update: UpdateSpec,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.inner
            .find_one_and_update(filter, update_modifications(update))
            .with_options(find_one_and_update_options(options))
            .run()
            .map_err(|e| map_error(e, &self.namespace))
    }

    fn find_one_and_delete(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.inner
            .find_one_and_delete(filter)
            .with_options(find_one_and_delete_options(options))
            .run()
            .map_err(|e| map_error(e, &self.namespace))
    }

    fn insert_one(&self, document: Document, _options: OperationOptions) -> DocMapResult<Bson> {
        Ok(self
            .inner
            .insert_one(document)
            .run()
            .map_err(|e| map_error(e, &self.namespace))?
            .inserted_id)
    }

    fn count_documents(&self, filter: Document, options: OperationOptions) -> DocMapResult<u64> {
        self.inner
            .count_documents(filter)
            .with_options(count_options(options))
            .run()
            .map_err(|e| map_error(e, &self.namespace))
    }

    fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocMapResult<Vec<String>> {
        debug!(collection = %self.namespace, indexes = indexes.len(), "creating indexes");

        Ok(self
            .inner
            .create_indexes(indexes.into_iter().map(index_model))
            .run()
            .map_err(|e| map_error(e, &self.namespace))?
            .index_names)
    }
}
