//! Document operations that block the calling thread.
//!
//! [`SyncDocument`] is implemented for every [`Model`]. Each operation resolves its
//! database and collection through a [`Route`] (see [`crate::resolver`]) and then
//! drives the blocking primitives of [`SyncCollection`](crate::backend::SyncCollection).
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let route = REGISTRY.route();
//!
//! let mut user = User { id: None, name: "Ping".into() };
//! user.insert(&route, false, OperationOptions::default())?;
//!
//! user.update(&route, doc! {}, doc! { "$set": { "name": "Pong" } }, OperationOptions::default())?;
//! assert_eq!(user.name, "Pong");
//! ```

use bson::{Document, oid::ObjectId};
use tracing::debug;

use crate::{
    engine,
    error::{DocMapError, DocMapResult},
    model::{Model, ModelExt},
    query::{FindFilter, OperationOptions, UpdateSpec},
    resolver::{Blocking, Route, resolve},
};

/// Lazily materialized models of a blocking `find`.
pub type ModelIter<M> = Box<dyn Iterator<Item = DocMapResult<M>> + Send>;

/// Blocking document operations.
///
/// This trait is automatically implemented for all types that implement [`Model`].
pub trait SyncDocument: Model {
    /// Creates the indexes declared in the model settings.
    ///
    /// The route is resolved first, then `Ok(None)` is returned without touching storage
    /// when the model declares no indexes. Otherwise returns the names of the created
    /// indexes.
    fn build_indexes(route: &Route<'_>) -> DocMapResult<Option<Vec<String>>>;

    /// Returns every model matching `filter`, materialized one document at a time.
    ///
    /// Each call starts a new cursor. Storage and mapping errors surface per item.
    fn find(
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<ModelIter<Self>>;

    /// Returns the first model matching `filter`.
    ///
    /// `filter` may be a filter document or a bare identity (an [`ObjectId`] or its hex
    /// string). When `update` is given and not empty the match is atomically updated and
    /// the post-update image is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::InvalidArgument`] when `options.return_document` is set.
    fn find_one<F>(
        route: &Route<'_>,
        filter: F,
        update: Option<UpdateSpec>,
        options: OperationOptions,
    ) -> DocMapResult<Option<Self>>
    where
        F: Into<FindFilter>;

    /// Counts the documents matching `filter`.
    fn count_documents(
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<u64>;

    /// Inserts this instance and binds it to the identity the database assigned.
    ///
    /// Null fields are left out unless `allow_nulls` is set.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::DuplicateKey`] on a unique constraint violation.
    fn insert(
        &mut self,
        route: &Route<'_>,
        allow_nulls: bool,
        options: OperationOptions,
    ) -> DocMapResult<ObjectId>;

    /// Atomically updates the stored document of this instance.
    ///
    /// `filter` narrows the match further; an `_id` key in it is ignored. Returns
    /// `false` when nothing matched, otherwise refreshes this instance from the
    /// post-update image and returns `true`.
    ///
    /// # Errors
    ///
    /// - [`DocMapError::RequiresLoadedDocument`] when this instance has no identity
    /// - [`DocMapError::InvalidArgument`] when `options.return_document` is set
    fn update<U>(
        &mut self,
        route: &Route<'_>,
        filter: Document,
        update: U,
        options: OperationOptions,
    ) -> DocMapResult<bool>
    where
        U: Into<UpdateSpec>;

    /// Runs [`update`](Self::update) with an update built from operator blocks.
    ///
    /// Each block is a single-key document such as `{"$set": {..}}`; a `$match` block
    /// becomes the filter.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::InvalidOperatorKey`] for keys that do not start with `$`.
    fn update_with_custom_queries(
        &mut self,
        route: &Route<'_>,
        queries: Vec<Document>,
        options: OperationOptions,
    ) -> DocMapResult<bool>;

    /// Atomically deletes the stored document of this instance.
    ///
    /// Returns `false` when nothing matched, otherwise refreshes this instance from the
    /// deleted document and returns `true`.
    fn delete(
        &mut self,
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<bool>;

    /// Refreshes this instance from storage, restricted to `fields` when not empty.
    ///
    /// # Errors
    ///
    /// - [`DocMapError::InvalidArgument`] when a field name contains a `.`
    /// - [`DocMapError::DocumentNotFound`] when the document no longer exists
    fn reload(
        &mut self,
        route: &Route<'_>,
        fields: &[&str],
        options: OperationOptions,
    ) -> DocMapResult<()>;
}

impl<M: Model> SyncDocument for M {
    fn build_indexes(route: &Route<'_>) -> DocMapResult<Option<Vec<String>>> {
        let settings = M::settings();
        let resolved = resolve::<Blocking>(route, &settings, M::model_name())?;
        if settings.indexes.is_empty() {
            return Ok(None);
        }

        debug!(
            model = M::model_name(),
            collection = resolved.collection.name(),
            indexes = settings.indexes.len(),
            "building indexes"
        );

        Ok(Some(resolved.collection.create_indexes(settings.indexes)?))
    }

    fn find(
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<ModelIter<Self>> {
        let resolved = resolve::<Blocking>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), "find");

        let documents = resolved.collection.find(filter, options)?;

        Ok(Box::new(
            documents.map(|document| document.and_then(M::from_document)),
        ))
    }

    fn find_one<F>(
        route: &Route<'_>,
        filter: F,
        update: Option<UpdateSpec>,
        options: OperationOptions,
    ) -> DocMapResult<Option<Self>>
    where
        F: Into<FindFilter>,
    {
        options.forbid_return_document()?;
        let filter = filter.into().into_document()?;

        let resolved = resolve::<Blocking>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), "find_one");

        let document = match update.filter(|update| !update.is_empty()) {
            Some(update) => resolved.collection.find_one_and_update(
                filter,
                update,
                engine::post_image_options(options)?,
            )?,
            None => resolved.collection.find_one(filter, options)?,
        };

        document.map(M::from_document).transpose()
    }

    fn count_documents(
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<u64> {
        let resolved = resolve::<Blocking>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), "count_documents");

        resolved.collection.count_documents(filter, options)
    }

    fn insert(
        &mut self,
        route: &Route<'_>,
        allow_nulls: bool,
        options: OperationOptions,
    ) -> DocMapResult<ObjectId> {
        let payload = engine::insert_payload(self, allow_nulls)?;

        let resolved = resolve::<Blocking>(route, &M::settings(), M::model_name())?;
        let collection = resolved.collection.name().to_string();

        debug!(model = M::model_name(), %collection, allow_nulls, "insert");

        let id = resolved
            .collection
            .insert_one(payload, options)
            .map_err(|err| engine::annotate_duplicate(err, &collection))?;
        let id = engine::inserted_id(id)?;

        engine::bind_inserted(self, id)?;

        Ok(id)
    }

    fn update<U>(
        &mut self,
        route: &Route<'_>,
        filter: Document,
        update: U,
        options: OperationOptions,
    ) -> DocMapResult<bool>
    where
        U: Into<UpdateSpec>,
    {
        let id = engine::require_identity(self, "update")?;
        let options = engine::post_image_options(options)?;

        let resolved = resolve::<Blocking>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), %id, "update");

        let image = resolved.collection.find_one_and_update(
            engine::bind_identity(id, filter),
            update.into(),
            options,
        )?;

        match image {
            Some(image) => engine::apply_image(self, image).map(|_| true),
            None => Ok(false),
        }
    }

    fn update_with_custom_queries(
        &mut self,
        route: &Route<'_>,
        queries: Vec<Document>,
        options: OperationOptions,
    ) -> DocMapResult<bool> {
        let (filter, update) = engine::merge_custom_queries(queries)?;

        SyncDocument::update(self, route, filter, update, options)
    }

    fn delete(
        &mut self,
        route: &Route<'_>,
        filter: Document,
        options: OperationOptions,
    ) -> DocMapResult<bool> {
        let id = engine::require_identity(self, "delete")?;

        let resolved = resolve::<Blocking>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), %id, "delete");

        let image = resolved
            .collection
            .find_one_and_delete(engine::bind_identity(id, filter), options)?;

        match image {
            Some(image) => engine::apply_image(self, image).map(|_| true),
            None => Ok(false),
        }
    }

    fn reload(
        &mut self,
        route: &Route<'_>,
        fields: &[&str],
        mut options: OperationOptions,
    ) -> DocMapResult<()> {
        let projection = engine::reload_projection(fields)?;
        let id = engine::require_identity(self, "reload")?;

        let resolved = resolve::<Blocking>(route, &M::settings(), M::model_name())?;

        debug!(model = M::model_name(), collection = resolved.collection.name(), %id, ?fields, "reload");

        if projection.is_some() {
            options.projection = projection;
        }

        let image = resolved
            .collection
            .find_one(engine::bind_identity(id, Document::new()), options)?
            .ok_or_else(|| DocMapError::DocumentNotFound {
                id: id.to_hex(),
                collection: resolved.collection.name().to_string(),
            })?;

        engine::apply_image(self, image)
    }
}

#[cfg(test)]
mod tests {
    use bson::{Bson, doc};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        index::IndexSpec,
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
            ModelSettings::new()
                .collection("pings")
                .index(IndexSpec::builder().ascending("name").unique(true).build())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Unindexed {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
        id: Option<ObjectId>,
    }

    impl Model for Unindexed {
        fn id(&self) -> Option<&ObjectId> {
            self.id.as_ref()
        }

        fn settings() -> ModelSettings {
            ModelSettings::new().collection("unindexed")
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Unnamed {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
        id: Option<ObjectId>,
    }

    impl Model for Unnamed {
        fn id(&self) -> Option<&ObjectId> {
            self.id.as_ref()
        }

        fn model_name() -> &'static str {
            "Unnamed"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Unmapped {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        id: Option<ObjectId>,
        name: String,
    }

    impl Model for Unmapped {
        fn id(&self) -> Option<&ObjectId> {
            self.id.as_ref()
        }

        fn settings() -> ModelSettings {
            ModelSettings::new().collection("unmapped")
        }
    }

    fn configured(database: &StubDatabase) -> Registry {
        let registry = Registry::new();
        registry
            .configure(vec![DatabaseBinding::new("main", database.as_sync()).as_default()])
            .unwrap();
        registry
    }

    fn ping() -> Ping {
        Ping { id: None, name: "Ping".into(), score: None }
    }

    #[test]
    fn insert_binds_the_assigned_identity() {
        let database = StubDatabase::new("main");
        let registry = configured(&database);
        let mut ping = ping();

        let id = ping
            .insert(&registry.route(), false, OperationOptions::default())
            .unwrap();

        assert_eq!(ping.id, Some(id));
        assert_eq!(
            database.calls(),
            vec![Call::InsertOne(doc! { "name": "Ping" })]
        );
    }

    #[test]
    fn update_requires_identity_before_storage() {
        let database = StubDatabase::new("main");
        let registry = configured(&database);
        let mut ping = ping();

        let err = ping
            .update(&registry.route(), doc! {}, doc! { "$set": { "score": 1 } }, OperationOptions::default())
            .unwrap_err();

        assert!(matches!(err, DocMapError::RequiresLoadedDocument("update")));
        assert!(database.calls().is_empty());
    }

    #[test]
    fn update_pins_identity_and_requests_post_image() {
        let id = ObjectId::new();
        let database = StubDatabase::new("main")
            .replying(doc! { "_id": id, "name": "Pong", "score": 3 });
        let registry = configured(&database);
        let mut ping = Ping { id: Some(id), ..ping() };

        let updated = ping
            .update(
                &registry.route(),
                doc! { "_id": ObjectId::new(), "name": "Ping" },
                doc! { "$set": { "name": "Pong", "score": 3 } },
                OperationOptions::default(),
            )
            .unwrap();

        assert!(updated);
        assert_eq!(ping, Ping { id: Some(id), name: "Pong".into(), score: Some(3) });
        assert_eq!(
            database.calls(),
            vec![Call::FindOneAndUpdate(
                doc! { "_id": id, "name": "Ping" },
                UpdateSpec::Document(doc! { "$set": { "name": "Pong", "score": 3 } }),
                OperationOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )]
        );
    }

    #[test]
    fn unmatched_update_leaves_instance_untouched() {
        let database = StubDatabase::new("main");
        let registry = configured(&database);
        let mut ping = Ping { id: Some(ObjectId::new()), ..ping() };
        let before = ping.clone();

        let updated = ping
            .update(&registry.route(), doc! {}, doc! { "$set": { "score": 1 } }, OperationOptions::default())
            .unwrap();

        assert!(!updated);
        assert_eq!(ping, before);
    }

    #[test]
    fn custom_queries_route_match_into_the_filter() {
        let id = ObjectId::new();
        let database = StubDatabase::new("main")
            .replying(doc! { "_id": id, "name": "Ping", "score": 2 });
        let registry = configured(&database);
        let mut ping = Ping { id: Some(id), ..ping() };

        ping.update_with_custom_queries(
            &registry.route(),
            vec![
                doc! { "$match": { "name": "Ping" } },
                doc! { "$inc": { "score": 2 } },
            ],
            OperationOptions::default(),
        )
        .unwrap();

        assert_eq!(ping.score, Some(2));
        assert!(matches!(
            &database.calls()[..],
            [Call::FindOneAndUpdate(filter, UpdateSpec::Document(update), _)]
                if *filter == doc! { "_id": id, "name": "Ping" }
                    && *update == doc! { "$inc": { "score": 2 } }
        ));
    }

    #[test]
    fn find_one_normalises_identity_and_rejects_image_selection() {
        let id = ObjectId::new();
        let database = StubDatabase::new("main").replying(doc! { "_id": id, "name": "Ping" });
        let registry = configured(&database);

        let found = Ping::find_one(&registry.route(), id.to_hex(), None, OperationOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(found.id, Some(id));
        assert_eq!(
            database.calls(),
            vec![Call::FindOne(doc! { "_id": id }, OperationOptions::default())]
        );

        let err = Ping::find_one(
            &registry.route(),
            id,
            None,
            OperationOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .unwrap_err();
        assert!(matches!(err, DocMapError::InvalidArgument(_)));
    }

    #[test]
    fn find_one_with_empty_update_is_a_plain_lookup() {
        let database = StubDatabase::new("main");
        let registry = configured(&database);

        let found = Ping::find_one(
            &registry.route(),
            doc! { "name": "Ping" },
            Some(UpdateSpec::Document(Document::new())),
            OperationOptions::default(),
        )
        .unwrap();

        assert!(found.is_none());
        assert!(matches!(&database.calls()[..], [Call::FindOne(..)]));
    }

    #[test]
    fn find_materializes_each_document() {
        let database = StubDatabase::new("main").replying(doc! { "_id": ObjectId::new(), "name": "Ping" });
        let registry = configured(&database);

        let pings = Ping::find(&registry.route(), doc! {}, OperationOptions::default())
            .unwrap()
            .collect::<DocMapResult<Vec<_>>>()
            .unwrap();

        assert_eq!(pings.len(), 1);
        assert_eq!(pings[0].name, "Ping");
    }

    #[test]
    fn delete_refreshes_from_the_final_image() {
        let id = ObjectId::new();
        let database = StubDatabase::new("main")
            .replying(doc! { "_id": id, "name": "Ping", "score": 9 });
        let registry = configured(&database);
        let mut ping = Ping { id: Some(id), ..ping() };

        assert!(ping.delete(&registry.route(), doc! { "_id": "ignored" }, OperationOptions::default()).unwrap());
        assert_eq!(ping.score, Some(9));
        assert_eq!(database.calls(), vec![Call::FindOneAndDelete(doc! { "_id": id })]);

        let mut unbound = self::ping();
        assert!(matches!(
            unbound.delete(&registry.route(), doc! {}, OperationOptions::default()),
            Err(DocMapError::RequiresLoadedDocument("delete"))
        ));
    }

    #[test]
    fn reload_projects_fields_and_reports_missing_documents() {
        let id = ObjectId::new();
        let database = StubDatabase::new("main").replying(doc! { "_id": id, "score": 4 });
        let registry = configured(&database);
        let mut ping = Ping { id: Some(id), ..ping() };

        ping.reload(&registry.route(), &["score"], OperationOptions::default())
            .unwrap();

        assert_eq!(ping, Ping { id: Some(id), name: "Ping".into(), score: Some(4) });
        assert_eq!(
            database.calls(),
            vec![Call::FindOne(
                doc! { "_id": id },
                OperationOptions::builder().projection(doc! { "score": 1 }).build(),
            )]
        );

        let empty = StubDatabase::new("empty");
        let registry = configured(&empty);
        let err = ping
            .reload(&registry.route(), &[], OperationOptions::default())
            .unwrap_err();
        assert!(matches!(err, DocMapError::DocumentNotFound { collection, .. } if collection == "pings"));
    }

    #[test]
    fn reload_rejects_dotted_fields_without_storage() {
        let database = StubDatabase::new("main");
        let registry = configured(&database);
        let mut ping = Ping { id: Some(ObjectId::new()), ..ping() };

        let err = ping
            .reload(&registry.route(), &["a.b"], OperationOptions::default())
            .unwrap_err();

        assert!(matches!(err, DocMapError::InvalidArgument(_)));
        assert!(database.calls().is_empty());
    }

    #[test]
    fn build_indexes_skips_models_without_indexes() {
        let database = StubDatabase::new("main");
        let registry = configured(&database);

        assert_eq!(Unindexed::build_indexes(&registry.route()).unwrap(), None);
        assert!(database.calls().is_empty());

        assert_eq!(
            Ping::build_indexes(&registry.route()).unwrap(),
            Some(vec!["name_1".to_string()])
        );
    }

    #[test]
    fn build_indexes_resolves_before_skipping() {
        let database = StubDatabase::new("main");
        let registry = configured(&database);

        let err = Unnamed::build_indexes(&registry.route()).unwrap_err();
        assert!(matches!(err, DocMapError::MissingCollectionName("Unnamed")));

        let err = Unindexed::build_indexes(&registry.route().database("missing")).unwrap_err();
        assert!(matches!(err, DocMapError::DatabaseNotFound { .. }));
        assert!(database.calls().is_empty());
    }

    #[test]
    fn insert_rejects_identities_not_stored_under_id() {
        let database = StubDatabase::new("main");
        let registry = configured(&database);
        let mut unmapped = Unmapped { id: None, name: "Ping".into() };

        let err = unmapped
            .insert(&registry.route(), false, OperationOptions::default())
            .unwrap_err();

        assert!(matches!(err, DocMapError::Serialization(_)));
        assert_eq!(unmapped.id, None);
    }

    #[test]
    fn count_uses_the_explicit_collection() {
        let database = StubDatabase::new("main").replying(doc! { "x": Bson::Null });
        let registry = configured(&database);

        let count = Ping::count_documents(
            &registry.route().collection("archived_pings"),
            doc! { "name": "Ping" },
            OperationOptions::default(),
        )
        .unwrap();

        assert_eq!(count, 1);
    }

    #[test]
    fn async_handles_are_rejected() {
        let registry = Registry::new();
        let route = registry.route().database(StubDatabase::async_handle("events"));

        let err = Ping::count_documents(&route, doc! {}, OperationOptions::default()).unwrap_err();

        assert!(matches!(err, DocMapError::InvalidDatabaseHandle { .. }));
    }
}
