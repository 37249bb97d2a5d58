//! Suspending MongoDB collaborators built on the driver's async API.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::{Client, Collection as MongoCollection, options::ClientOptions};
use std::sync::Arc;
use tracing::debug;

use docmap_core::{
    backend::{
        AsyncCollection, AsyncDatabase, DatabaseBuilder, DatabaseHandle, DocumentStream, Mode,
    },
    error::{DocMapError, DocMapResult},
    index::IndexSpec,
    query::{OperationOptions, UpdateSpec},
};

use crate::{
    blocking::BlockingMongoDatabase,
    options::{
        count_options, find_one_and_delete_options, find_one_and_update_options,
        find_one_options, find_options, index_model, map_error, update_modifications,
    },
};

/// A database on a MongoDB deployment, driven by the async driver.
#[derive(Debug, Clone)]
pub struct MongoDatabase {
    client: Client,
    database: String,
}

impl MongoDatabase {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into() }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDatabaseBuilder {
        MongoDatabaseBuilder::new(dsn, database)
    }

    /// Wraps this database in a registry handle.
    pub fn into_handle(self) -> DatabaseHandle {
        DatabaseHandle::from_async(self)
    }

    /// Closes the underlying client.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

impl AsyncDatabase for MongoDatabase {
    fn name(&self) -> &str {
        &self.database
    }

    fn collection(&self, name: &str) -> Arc<dyn AsyncCollection> {
        Arc::new(MongoDbCollection {
            namespace: format!("{}.{}", self.database, name),
            inner: self.client.database(&self.database).collection(name),
        })
    }
}

/// A collection of a [`MongoDatabase`].
#[derive(Debug, Clone)]
pub struct MongoDbCollection {
    namespace: String,
    inner: MongoCollection<Document>,
}

#[async_trait]
impl AsyncCollection for MongoDbCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<DocumentStream> {
        let namespace = self.namespace.clone();

        Ok(self
            .inner
            .find(filter)
            .with_options(find_options(options))
            .await
            .map_err(|e| map_error(e, &self.namespace))?
            .map_err(move |e| map_error(e, &namespace))
            .boxed())
    }

    async fn find_one(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.inner
            .find_one(filter)
            .with_options(find_one_options(options))
            .await
            .map_err(|e| map_error(e, &self.namespace))
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: UpdateSpec,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.inner
            .find_one_and_update(filter, update_modifications(update))
            .with_options(find_one_and_update_options(options))
            .await
            .map_err(|e| map_error(e, &self.namespace))
    }

    async fn find_one_and_delete(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.inner
            .find_one_and_delete(filter)
            .with_options(find_one_and_delete_options(options))
            .await
            .map_err(|e| map_error(e, &self.namespace))
    }

    async fn insert_one(
        &self,
        document: Document,
        _options: OperationOptions,
    ) -> DocMapResult<Bson> {
        Ok(self
            .inner
            .insert_one(document)
            .await
            .map_err(|e| map_error(e, &self.namespace))?
            .inserted_id)
    }

    async fn count_documents(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<u64> {
        self.inner
            .count_documents(filter)
            .with_options(count_options(options))
            .await
            .map_err(|e| map_error(e, &self.namespace))
    }

    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocMapResult<Vec<String>> {
        debug!(collection = %self.namespace, indexes = indexes.len(), "creating indexes");

        Ok(self
            .inner
            .create_indexes(indexes.into_iter().map(index_model))
            .await
            .map_err(|e| map_error(e, &self.namespace))?
            .index_names)
    }
}

/// Connects to a MongoDB deployment and produces a database handle.
///
/// The handle is suspending unless [`blocking`](Self::blocking) is called.
#[derive(Debug, Clone)]
pub struct MongoDatabaseBuilder {
    dsn: String,
    database: String,
    mode: Mode,
}

impl MongoDatabaseBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            mode: Mode::Async,
        }
    }

    /// Produces a blocking handle instead.
    ///
    /// Blocking handles must not be driven from inside an async runtime.
    pub fn blocking(mut self) -> Self {
        self.mode = Mode::Sync;
        self
    }
}

#[async_trait]
impl DatabaseBuilder for MongoDatabaseBuilder {
    async fn build(self) -> DocMapResult<DatabaseHandle> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocMapError::Backend(e.to_string()))?;

        Ok(match self.mode {
            Mode::Async => MongoDatabase::new(
                Client::with_options(options).map_err(|e| DocMapError::Backend(e.to_string()))?,
                self.database,
            )
            .into_handle(),
            Mode::Sync => BlockingMongoDatabase::new(
                mongodb::sync::Client::with_options(options)
                    .map_err(|e| DocMapError::Backend(e.to_string()))?,
                self.database,
            )
            .into_handle(),
        })
    }
}
