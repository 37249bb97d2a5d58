//! Document operations that suspend inside database primitives.
//!
//! [`AsyncDocument`] mirrors [`SyncDocument`](crate::blocking::SyncDocument) operation
//! for operation: same arguments, same preconditions, same results. Only the database
//! primitives are awaited; resolution and precondition checks run synchronously before
//! the first suspension point.
//!
//! # Example
//!
//! ```ignore
//! use docmap::{prelude::*, suspending::AsyncDocument};
//!
//! let route = REGISTRY.route();
//!
//! let mut user = User { id: None, name: "Ping".into() };
//! user.insert(&route, false, OperationOptions::default()).await?;
//!
//! let found = User::find_one(&route, user.id.unwrap(), None, OperationOptions::default()).await?;
//! ```

use async_trait::async_trait;
use bson::{Document, oid::ObjectId};
use futures::{StreamExt, stream::BoxStream};
use tracing::debug;

use crate::{
    engine,
    error::{DocMapError, DocMapResult},
    model::{Model, ModelExt},
    query::{FindFilter, OperationOptions, UpdateSpec},
    resolver::{Route, Suspending, resolve},
};

/// Lazily materialized models of a suspending `find`.
pub type ModelStream<M> = BoxStream<'static, DocMapResult<M>>;

/// Suspending document operations.
///
/// This trait is automatically implemented for all types that implement [`Model`].
#[async_trait]
pub trait AsyncDocument: Model {
    /// Creates the indexes declared in the model settings.
    ///
    /// Resolves the route first and returns `Ok(None)` when there are no indexes.
    async fn build_indexes(route: &Route<'_>) -> DocMapResult<Option<Vec<String>>>;

    /// Streams every model matching `filter`.
    async fn find(
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<ModelStream<Self>>;

    /// Returns the first model matching `filter`, optionally updating it atomically.
    async fn find_one<F>(
        route: &Route<'_>,
        filter: F,
        update: Option<UpdateSpec>,
        options: OperationOptions,
    ) -> DocMapResult<Option<Self>>
    where
        F: Into<FindFilter> + Send;

    async fn count_documents(
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<u64>;

    /// Inserts this instance and binds it to the identity the database assigned.
    async fn insert(
        &mut self,
        route: &Route<'_>,
        allow_nulls: bool,
        options: OperationOptions,
    ) -> DocMapResult<ObjectId>;

    /// Atomically updates the stored document of this instance.
    async fn update<U>(
        &mut self,
        route: &Route<'_>,
        filter: Document,
        update: U,
        options: OperationOptions,
    ) -> DocMapResult<bool>
    where
        U: Into<UpdateSpec> + Send;

    /// Runs [`update`](Self::update) with an update built from operator blocks.
    async fn update_with_custom_queries(
        &mut self,
        route: &Route<'_>,
        queries: Vec<Document>,
        options: OperationOptions,
    ) -> DocMapResult<bool>;

    /// Atomically deletes the stored document of this instance.
    async fn delete(
        &mut self,
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<bool>;

    /// Refreshes this instance from storage, restricted to `fields` when not empty.
    async fn reload(
        &mut self,
        route: &Route<'_>,
        fields: &[&str],
        options: OperationOptions,
    ) -> DocMapResult<()>;
}

#[async_trait]
impl<M: Model> AsyncDocument for M {
    async fn build_indexes(route: &Route<'_>) -> DocMapResult<Option<Vec<String>>> {
        let settings = M::settings();
        let resolved = resolve::<Suspending>(route, &settings, M::model_name())?;
        if settings.indexes.is_empty() {
            return Ok(None);
        }

        debug!(
            model = M::model_name(),
            collection = resolved.collection.name(),
            indexes = settings.indexes.len(),
            "building indexes"
        );

        Ok(Some(
            resolved
                .collection
                .create_indexes(settings.indexes)
                .await?,
        ))
    }

    async fn find(
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<ModelStream<Self>> {
        let resolved = resolve::<Suspending>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), "find");

        let documents = resolved.collection.find(filter, options).await?;

        Ok(documents
            .map(|document| document.and_then(M::from_document))
            .boxed())
    }

    async fn find_one<F>(
        route: &Route<'_>,
        filter: F,
        update: Option<UpdateSpec>,
        options: OperationOptions,
    ) -> DocMapResult<Option<Self>>
    where
        F: Into<FindFilter> + Send,
    {
        options.forbid_return_document()?;
        let filter = filter.into().into_document()?;

        let resolved = resolve::<Suspending>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), "find_one");

        let document = match update.filter(|update| !update.is_empty()) {
            Some(update) => {
                resolved
                    .collection
                    .find_one_and_update(filter, update, engine::post_image_options(options)?)
                    .await?
            }
            None => resolved.collection.find_one(filter, options).await?,
        };

        document.map(M::from_document).transpose()
    }

    async fn count_documents(
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<u64> {
        let resolved = resolve::<Suspending>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), "count_documents");

        resolved
            .collection
            .count_documents(filter, options)
            .await
    }

    async fn insert(
        &mut self,
        route: &Route<'_>,
        allow_nulls: bool,
        options: OperationOptions,
    ) -> DocMapResult<ObjectId> {
        let payload = engine::insert_payload(self, allow_nulls)?;

        let resolved = resolve::<Suspending>(route, &M::settings(), M::model_name())?;
        let collection = resolved.collection.name().to_string();

        debug!(model = M::model_name(), %collection, allow_nulls, "insert");

        let id = resolved
            .collection
            .insert_one(payload, options)
            .await
            .map_err(|err| engine::annotate_duplicate(err, &collection))?;
        let id = engine::inserted_id(id)?;

        engine::bind_inserted(self, id)?;

        Ok(id)
    }

    async fn update<U>(
        &mut self,
        route: &Route<'_>,
        filter: Document,
        update: U,
        options: OperationOptions,
    ) -> DocMapResult<bool>
    where
        U: Into<UpdateSpec> + Send,
    {
        let id = engine::require_identity(self, "update")?;
        let options = engine::post_image_options(options)?;

        let resolved = resolve::<Suspending>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), %id, "update");

        let image = resolved
            .collection
            .find_one_and_update(engine::bind_identity(id, filter), update.into(), options)
            .await?;

        match image {
            Some(image) => engine::apply_image(self, image).map(|_| true),
            None => Ok(false),
        }
    }

    async fn update_with_custom_queries(
        &mut self,
        route: &Route<'_>,
        queries: Vec<Document>,
        options: OperationOptions,
    ) -> DocMapResult<bool> {
        let (filter, update) = engine::merge_custom_queries(queries)?;

        AsyncDocument::update(self, route, filter, update, options).await
    }

    async fn delete(
        &mut self,
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<bool> {
        let id = engine::require_identity(self, "delete")?;

        let resolved = resolve::<Suspending>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), %id, "delete");

        let image = resolved
            .collection
            .find_one_and_delete(engine::bind_identity(id, filter), options)
            .await?;

        match image {
            Some(image) => engine::apply_image(self, image).map(|_| true),
            None => Ok(false),
        }
    }

    async fn reload(
        &mut self,
        route: &Route<'_>,
        fields: &[&str],
        mut options: OperationOptions,
    ) -> DocMapResult<()> {
        let projection = engine::reload_projection(fields)?;
        let id = engine::require_identity(self, "reload")?;

        let resolved = resolve::<Suspending>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), %id, ?fields, "reload");

        if projection.is_some() {
            options.projection = projection;
        }

        let image = resolved
            .collection
            .find_one(engine::bind_identity(id, Document::new()), options)
            .await?
            .ok_or_else(|| DocMapError::DocumentNotFound {
                id: id.to_hex(),
                collection: resolved.collection.name().to_string(),
            })?;

        engine::apply_image(self, image)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use futures::TryStreamExt;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        backend::Mode,
        model::ModelSettings,
        query::ReturnDocument,
        registry::{DatabaseBinding, Registry},
        testing::{Call, StubDatabase},
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        #[serde(rename = "_id", alias = "id", skip_serializing_if = "Option::is_none", default)]
        id: Option<ObjectId>,
        name: String,
        score: Option<i32>,
    }

    impl Model for Ping {
        fn id(&self) -> Option<&ObjectId> {
            self.id.as_ref()
        }

        fn settings() -> ModelSettings {
            ModelSettings::new().collection("pings")
        }
    }

    fn configured(database: &StubDatabase) -> Registry {
        let registry = Registry::new();
        registry
            .configure(vec![DatabaseBinding::new("events", database.as_async()).as_default()])
            .unwrap();
        registry
    }

    fn ping() -> Ping {
        Ping { id: None, name: "Ping".into(), score: None }
    }

    #[tokio::test]
    async fn insert_then_find_one_by_identity() {
        let database = StubDatabase::new("events");
        let registry = configured(&database);
        let mut ping = ping();

        let id = ping
            .insert(&registry.route(), true, OperationOptions::default())
            .await
            .unwrap();
        assert_eq!(ping.id, Some(id));

        let found = Ping::find_one(&registry.route(), id, None, OperationOptions::default())
            .await
            .unwrap();
        assert!(found.is_none());

        assert_eq!(
            database.calls(),
            vec![
                Call::InsertOne(doc! { "name": "Ping", "score": null }),
                Call::FindOne(doc! { "_id": id }, OperationOptions::default()),
            ]
        );
    }

    #[tokio::test]
    async fn find_one_with_update_returns_post_image() {
        let id = ObjectId::new();
        let database = StubDatabase::new("events").replying(doc! { "_id": id, "name": "Pong" });
        let registry = configured(&database);

        let found = Ping::find_one(
            &registry.route(),
            doc! { "name": "Ping" },
            Some(doc! { "$set": { "name": "Pong" } }.into()),
            OperationOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(found.name, "Pong");
        assert!(matches!(
            &database.calls()[..],
            [Call::FindOneAndUpdate(_, _, options)]
                if options.return_document == Some(ReturnDocument::After)
        ));
    }

    #[tokio::test]
    async fn update_ignores_caller_identity() {
        let id = ObjectId::new();
        let database = StubDatabase::new("events").replying(doc! { "_id": id, "score": 1 });
        let registry = configured(&database);
        let mut ping = Ping { id: Some(id), ..ping() };

        let updated = ping
            .update(
                &registry.route(),
                doc! { "_id": ObjectId::new() },
                doc! { "$inc": { "score": 1 } },
                OperationOptions::default(),
            )
            .await
            .unwrap();

        assert!(updated);
        assert_eq!(ping.score, Some(1));
        assert!(matches!(
            &database.calls()[..],
            [Call::FindOneAndUpdate(filter, ..)] if *filter == doc! { "_id": id }
        ));
    }

    #[tokio::test]
    async fn preconditions_fail_before_storage() {
        let database = StubDatabase::new("events");
        let registry = configured(&database);
        let mut unbound = ping();
        let mut bound = Ping { id: Some(ObjectId::new()), ..ping() };

        assert!(matches!(
            unbound
                .update(&registry.route(), doc! {}, doc! { "$set": { "a": 1 } }, OperationOptions::default())
                .await,
            Err(DocMapError::RequiresLoadedDocument("update"))
        ));
        assert!(matches!(
            unbound.delete(&registry.route(), doc! {}, OperationOptions::default()).await,
            Err(DocMapError::RequiresLoadedDocument("delete"))
        ));
        assert!(matches!(
            bound.reload(&registry.route(), &["a.b"], OperationOptions::default()).await,
            Err(DocMapError::InvalidArgument(_))
        ));
        assert!(matches!(
            bound
                .update_with_custom_queries(&registry.route(), vec![doc! { "set": { "a": 1 } }], OperationOptions::default())
                .await,
            Err(DocMapError::InvalidOperatorKey(key)) if key == "set"
        ));
        assert!(database.calls().is_empty());
    }

    #[tokio::test]
    async fn find_streams_models() {
        let database = StubDatabase::new("events").replying(doc! { "_id": ObjectId::new(), "name": "Ping" });
        let registry = configured(&database);

        let pings = Ping::find(&registry.route(), doc! {}, OperationOptions::default())
            .await
            .unwrap()
            .try_collect::<Vec<_>>()
            .await
            .unwrap();

        assert_eq!(pings.len(), 1);
    }

    #[tokio::test]
    async fn reload_of_a_vanished_document_fails() {
        let database = StubDatabase::new("events");
        let registry = configured(&database);
        let mut ping = Ping { id: Some(ObjectId::new()), ..ping() };

        let err = ping
            .reload(&registry.route(), &[], OperationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DocMapError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn sync_handles_are_rejected() {
        let registry = Registry::new();
        let route = registry.route().database(StubDatabase::sync_handle("main"));

        let err = Ping::count_documents(&route, doc! {}, OperationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DocMapError::InvalidDatabaseHandle { expected: Mode::Async, found: Mode::Sync, .. }
        ));
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Unmapped {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        id: Option<ObjectId>,
    }

    impl Model for Unmapped {
        fn id(&self) -> Option<&ObjectId> {
            self.id.as_ref()
        }

        fn model_name() -> &'static str {
            "Unmapped"
        }
    }

    #[tokio::test]
    async fn build_indexes_fails_without_a_collection_name() {
        let database = StubDatabase::new("events");
        let registry = configured(&database);

        let err = Unmapped::build_indexes(&registry.route()).await.unwrap_err();

        assert!(matches!(err, DocMapError::MissingCollectionName("Unmapped")));
        assert_eq!(
            Unmapped::build_indexes(&registry.route().collection("unmapped"))
                .await
                .unwrap(),
            None
        );
        assert!(database.calls().is_empty());
    }

    #[tokio::test]
    async fn insert_rejects_identities_not_stored_under_id() {
        let database = StubDatabase::new("events");
        let registry = configured(&database);
        let mut unmapped = Unmapped { id: None };

        let err = unmapped
            .insert(&registry.route().collection("unmapped"), false, OperationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DocMapError::Serialization(_)));
        assert_eq!(unmapped.id, None);
    }
}
