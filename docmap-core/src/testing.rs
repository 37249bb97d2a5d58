//! Recording database stub shared by the unit tests.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::stream;
use std::sync::{Arc, Mutex};

use crate::{
    backend::{
        AsyncCollection, AsyncDatabase, DatabaseHandle, DocumentIter, DocumentStream,
        SyncCollection, SyncDatabase,
    },
    error::DocMapResult,
    index::IndexSpec,
    query::{OperationOptions, UpdateSpec},
};

/// A primitive invocation seen by the stub.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Find(Document),
    FindOne(Document, OperationOptions),
    FindOneAndUpdate(Document, UpdateSpec, OperationOptions),
    FindOneAndDelete(Document),
    InsertOne(Document),
    CountDocuments(Document),
    CreateIndexes(Vec<String>),
}

#[derive(Debug, Default)]
struct Journal {
    calls: Mutex<Vec<Call>>,
    reply: Mutex<Option<Document>>,
}

impl Journal {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn reply(&self) -> Option<Document> {
        self.reply.lock().unwrap().clone()
    }
}

/// Database stub that records every primitive call and answers with a canned document.
#[derive(Debug, Clone)]
pub(crate) struct StubDatabase {
    name: String,
    journal: Arc<Journal>,
}

impl StubDatabase {
    pub(crate) fn new(name: &str) -> Self {
        Self { name: name.to_string(), journal: Arc::default() }
    }

    pub(crate) fn sync_handle(name: &str) -> DatabaseHandle {
        Self::new(name).as_sync()
    }

    pub(crate) fn async_handle(name: &str) -> DatabaseHandle {
        Self::new(name).as_async()
    }

    /// Answers every lookup primitive with `reply`.
    pub(crate) fn replying(self, reply: Document) -> Self {
        *self.journal.reply.lock().unwrap() = Some(reply);
        self
    }

    pub(crate) fn as_sync(&self) -> DatabaseHandle {
        DatabaseHandle::Sync(Arc::new(self.clone()))
    }

    pub(crate) fn as_async(&self) -> DatabaseHandle {
        DatabaseHandle::Async(Arc::new(self.clone()))
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.journal.calls.lock().unwrap().clone()
    }

    fn open(&self, name: &str) -> Arc<StubCollection> {
        Arc::new(StubCollection { name: name.to_string(), journal: self.journal.clone() })
    }
}

impl SyncDatabase for StubDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn SyncCollection> {
        self.open(name)
    }
}

impl AsyncDatabase for StubDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn AsyncCollection> {
        self.open(name)
    }
}

#[derive(Debug)]
struct StubCollection {
    name: String,
    journal: Arc<Journal>,
}

impl StubCollection {
    fn inserted_id(&self, document: &Document) -> Bson {
        document
            .get("_id")
            .cloned()
            .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()))
    }
}

impl SyncCollection for StubCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, filter: Document, _options: OperationOptions) -> DocMapResult<DocumentIter> {
        self.journal.record(Call::Find(filter));
        Ok(Box::new(self.journal.reply().into_iter().map(Ok)))
    }

    fn find_one(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.journal.record(Call::FindOne(filter, options));
        Ok(self.journal.reply())
    }

    fn find_one_and_update(
        &self,
        filter: Document,
        update: UpdateSpec,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.journal
            .record(Call::FindOneAndUpdate(filter, update, options));
        Ok(self.journal.reply())
    }

    fn find_one_and_delete(
        &self,
        filter: Document,
        _options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        self.journal.record(Call::FindOneAndDelete(filter));
        Ok(self.journal.reply())
    }

    fn insert_one(&self, document: Document, _options: OperationOptions) -> DocMapResult<Bson> {
        let id = self.inserted_id(&document);
        self.journal.record(Call::InsertOne(document));
        Ok(id)
    }

    fn count_documents(&self, filter: Document, _options: OperationOptions) -> DocMapResult<u64> {
        self.journal.record(Call::CountDocuments(filter));
        Ok(self.journal.reply().map_or(0, |_| 1))
    }

    fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocMapResult<Vec<String>> {
        let names = indexes.iter().map(IndexSpec::name).collect::<Vec<_>>();
        self.journal.record(Call::CreateIndexes(names.clone()));
        Ok(names)
    }
}

#[async_trait]
impl AsyncCollection for StubCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<DocumentStream> {
        let documents = SyncCollection::find(self, filter, options)?;
        Ok(Box::pin(stream::iter(documents)))
    }

    async fn find_one(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        SyncCollection::find_one(self, filter, options)
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: UpdateSpec,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        SyncCollection::find_one_and_update(self, filter, update, options)
    }

    async fn find_one_and_delete(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        SyncCollection::find_one_and_delete(self, filter, options)
    }

    async fn insert_one(
        &self,
        document: Document,
        options: OperationOptions,
    ) -> DocMapResult<Bson> {
        SyncCollection::insert_one(self, document, options)
    }

    async fn count_documents(
        &self,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<u64> {
        SyncCollection::count_documents(self, filter, options)
    }

    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocMapResult<Vec<String>> {
        SyncCollection::create_indexes(self, indexes)
    }
}
