//! Typed document mapping for document databases.
//!
//! `docmap` binds serde models to collections of a document database and runs the
//! usual document operations on them, in a blocking and in a suspending flavour that
//! share one behaviour. It re-exports the pieces of the sub-crates:
//!
//! - [`model`] - the [`Model`](model::Model) trait, its settings and field access
//! - [`registry`] - alias to database bindings, configured once per process
//! - [`resolver`] - per-operation overrides of the database and collection
//! - [`blocking`] - [`SyncDocument`](blocking::SyncDocument), operations that block
//! - [`suspending`] - [`AsyncDocument`](suspending::AsyncDocument), operations as futures
//! - [`memory`] and [`mongodb`] - database collaborators
//!
//! Both operation traits use the same method names, so bring exactly one of them into
//! scope next to the [`prelude`].
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{blocking::SyncDocument, memory::BlockingInMemoryDatabase, prelude::*};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//! #[model(collection = "players")]
//! pub struct Player {
//!     #[serde(rename = "_id", alias = "id", skip_serializing_if = "Option::is_none", default)]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! static REGISTRY: Registry = Registry::new();
//!
//! fn main() -> DocMapResult<()> {
//!     REGISTRY.configure(vec![
//!         DatabaseBinding::new("main", BlockingInMemoryDatabase::new("app").into_handle())
//!             .as_default(),
//!     ])?;
//!
//!     let route = REGISTRY.route();
//!
//!     let mut ping = Player { id: None, name: "Ping".into() };
//!     ping.insert(&route, false, OperationOptions::default())?;
//!
//!     ping.update(&route, doc! {}, doc! { "$set": { "name": "Pong" } }, OperationOptions::default())?;
//!     assert_eq!(ping.name, "Pong");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process databases for development and testing
//! - [`mongodb`] - MongoDB databases (requires the `mongodb` feature)

pub mod prelude;

pub use docmap_core::{
    ID_FIELD, backend, blocking, error, field, index, model, query, registry, resolver,
    suspending,
};
pub use docmap_macros::{EmbeddedDocument, Model};

pub use bson;

/// In-memory database collaborators.
pub mod memory {
    pub use docmap_memory::{
        BlockingInMemoryCollection, BlockingInMemoryDatabase, InMemoryCollection,
        InMemoryDatabase, InMemoryDatabaseBuilder,
    };
}

/// MongoDB database collaborators.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmap_mongodb::{
        BlockingMongoDatabase, BlockingMongoDbCollection, MongoDatabase, MongoDatabaseBuilder,
        MongoDbCollection,
    };
}
