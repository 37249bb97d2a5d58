//! Database and collection resolution.
//!
//! Every storage-facing operation starts by turning a [`Route`] (a registry plus an
//! optional explicit database and collection) and the model's [`ModelSettings`] into
//! concrete handles. The algorithm is the same for both modes; [`resolve`] is generic
//! over a [`ModeMarker`] that only decides which handle variant is acceptable.
//!
//! 1. An explicit database handle is used as is, provided it belongs to the mode.
//! 2. Otherwise the registry is asked for the explicit alias, then the model's
//!    `database_alias`, then the mode default.
//! 3. An explicit collection handle is used as is (mode checked), an explicit name is
//!    opened on the resolved database, and otherwise the model's `collection_name` is.
//!
//! Resolution performs no I/O.

use std::sync::Arc;
use tracing::debug;

use crate::{
    backend::{
        AsyncCollection, AsyncDatabase, CollectionHandle, DatabaseHandle, Mode, SyncCollection,
        SyncDatabase,
    },
    error::{DocMapError, DocMapResult},
    model::ModelSettings,
    registry::Registry,
};

/// Explicit database selection: a registry alias or a concrete handle.
#[derive(Debug, Clone)]
pub enum DatabaseRef {
    Alias(String),
    Handle(DatabaseHandle),
}

impl From<&str> for DatabaseRef {
    fn from(alias: &str) -> Self {
        DatabaseRef::Alias(alias.to_string())
    }
}

impl From<String> for DatabaseRef {
    fn from(alias: String) -> Self {
        DatabaseRef::Alias(alias)
    }
}

impl From<DatabaseHandle> for DatabaseRef {
    fn from(handle: DatabaseHandle) -> Self {
        DatabaseRef::Handle(handle)
    }
}

/// Explicit collection selection: a collection name or a concrete handle.
#[derive(Debug, Clone)]
pub enum CollectionRef {
    Name(String),
    Handle(CollectionHandle),
}

impl From<&str> for CollectionRef {
    fn from(name: &str) -> Self {
        CollectionRef::Name(name.to_string())
    }
}

impl From<String> for CollectionRef {
    fn from(name: String) -> Self {
        CollectionRef::Name(name)
    }
}

impl From<CollectionHandle> for CollectionRef {
    fn from(handle: CollectionHandle) -> Self {
        CollectionRef::Handle(handle)
    }
}

/// Where an operation should run.
///
/// Built from a registry with [`Registry::route`]; without overrides the model's
/// settings decide.
///
/// ```ignore
/// let archive = registry.route().database("archive").collection("users_2023");
/// let user = User::find_one(&archive, id, None, OperationOptions::default())?;
/// ```
#[derive(Debug, Clone)]
pub struct Route<'r> {
    registry: &'r Registry,
    database: Option<DatabaseRef>,
    collection: Option<CollectionRef>,
}

impl<'r> Route<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry, database: None, collection: None }
    }

    /// Overrides the database, by alias or by handle.
    pub fn database(mut self, database: impl Into<DatabaseRef>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Overrides the collection, by name or by handle.
    pub fn collection(mut self, collection: impl Into<CollectionRef>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }
}

impl Registry {
    /// Returns a route with no overrides.
    pub fn route(&self) -> Route<'_> {
        Route::new(self)
    }
}

/// Selects the handle types of one operating mode.
pub trait ModeMarker {
    const MODE: Mode;

    type Database: Clone + Send + Sync;
    type Collection: Clone + Send + Sync;

    fn database(handle: &DatabaseHandle) -> Option<Self::Database>;

    fn collection(handle: &CollectionHandle) -> Option<Self::Collection>;

    fn open(database: &Self::Database, name: &str) -> Self::Collection;
}

/// Marker for blocking operations.
#[derive(Debug, Clone, Copy)]
pub struct Blocking;

/// Marker for suspending operations.
#[derive(Debug, Clone, Copy)]
pub struct Suspending;

impl ModeMarker for Blocking {
    const MODE: Mode = Mode::Sync;

    type Database = Arc<dyn SyncDatabase>;
    type Collection = Arc<dyn SyncCollection>;

    fn database(handle: &DatabaseHandle) -> Option<Self::Database> {
        match handle {
            DatabaseHandle::Sync(database) => Some(database.clone()),
            DatabaseHandle::Async(_) => None,
        }
    }

    fn collection(handle: &CollectionHandle) -> Option<Self::Collection> {
        match handle {
            CollectionHandle::Sync(collection) => Some(collection.clone()),
            CollectionHandle::Async(_) => None,
        }
    }

    fn open(database: &Self::Database, name: &str) -> Self::Collection {
        database.collection(name)
    }
}

impl ModeMarker for Suspending {
    const MODE: Mode = Mode::Async;

    type Database = Arc<dyn AsyncDatabase>;
    type Collection = Arc<dyn AsyncCollection>;

    fn database(handle: &DatabaseHandle) -> Option<Self::Database> {
        match handle {
            DatabaseHandle::Async(database) => Some(database.clone()),
            DatabaseHandle::Sync(_) => None,
        }
    }

    fn collection(handle: &CollectionHandle) -> Option<Self::Collection> {
        match handle {
            CollectionHandle::Async(collection) => Some(collection.clone()),
            CollectionHandle::Sync(_) => None,
        }
    }

    fn open(database: &Self::Database, name: &str) -> Self::Collection {
        database.collection(name)
    }
}

/// Handles an operation runs against.
#[derive(Debug, Clone)]
pub struct Resolved<K: ModeMarker> {
    pub database: K::Database,
    pub collection: K::Collection,
}

/// Resolves the database and collection for an operation of mode `K`.
///
/// `model` names the model type in error messages.
///
/// # Errors
///
/// - [`DocMapError::InvalidDatabaseHandle`] / [`DocMapError::InvalidCollectionHandle`]
///   for explicit handles of the other mode
/// - [`DocMapError::DatabaseNotFound`] for unknown aliases
/// - [`DocMapError::NoDefaultConfigured`] when falling back to a missing default
/// - [`DocMapError::MissingCollectionName`] when no collection can be determined
pub fn resolve<K: ModeMarker>(
    route: &Route<'_>,
    settings: &ModelSettings,
    model: &'static str,
) -> DocMapResult<Resolved<K>> {
    let database = match &route.database {
        Some(DatabaseRef::Handle(handle)) => expect_database::<K>(handle)?,
        explicit => {
            let alias = match explicit {
                Some(DatabaseRef::Alias(alias)) => Some(alias.as_str()),
                _ => settings.database_alias.as_deref(),
            };

            let binding = route
                .registry
                .lookup(K::MODE, alias)?
                .ok_or_else(|| DocMapError::DatabaseNotFound {
                    alias: alias.unwrap_or_default().to_string(),
                    mode: K::MODE,
                })?;

            expect_database::<K>(binding.handle())?
        }
    };

    let collection = match &route.collection {
        Some(CollectionRef::Handle(handle)) => K::collection(handle).ok_or_else(|| {
            DocMapError::InvalidCollectionHandle {
                name: handle.name().to_string(),
                expected: K::MODE,
                found: handle.mode(),
            }
        })?,
        Some(CollectionRef::Name(name)) => K::open(&database, name),
        None => {
            let name = settings
                .collection_name
                .as_deref()
                .ok_or(DocMapError::MissingCollectionName(model))?;

            K::open(&database, name)
        }
    };

    debug!(mode = %K::MODE, model, "resolved database and collection");

    Ok(Resolved { database, collection })
}

fn expect_database<K: ModeMarker>(handle: &DatabaseHandle) -> DocMapResult<K::Database> {
    K::database(handle).ok_or_else(|| DocMapError::InvalidDatabaseHandle {
        name: handle.name().to_string(),
        expected: K::MODE,
        found: handle.mode(),
    })
}
