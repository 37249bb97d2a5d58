//! A typed document-mapping layer that binds serde models to document database collections.
//!
//! This crate is the core of the docmap project and provides:
//!
//! - **Model traits** ([`model`]) - Typed models, their settings and raw document conversion
//! - **Database collaborators** ([`backend`]) - Blocking and suspending database primitives
//! - **Database registry** ([`registry`]) - Alias to database bindings, configured once
//! - **Resolution** ([`resolver`]) - Picking the database and collection of an operation
//! - **Blocking operations** ([`blocking`]) - Document operations that block the caller
//! - **Suspending operations** ([`suspending`]) - The same operations as futures
//! - **Query inputs** ([`query`]) - Filters, update specifications and operation options
//! - **Index declarations** ([`index`]) - Index specifications declared by models
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! static REGISTRY: Registry = Registry::new();
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//! #[model(collection = "users")]
//! pub struct User {
//!     #[serde(rename = "_id", alias = "id", skip_serializing_if = "Option::is_none", default)]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! REGISTRY.configure(vec![DatabaseBinding::new("main", handle).as_default()])?;
//!
//! let mut user = User { id: None, name: "Ping".into() };
//! let id = user.insert(&REGISTRY.route(), false, OperationOptions::default())?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_core;

pub mod backend;
pub mod blocking;
pub mod error;
pub mod field;
pub mod index;
pub mod model;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod suspending;

mod engine;

#[cfg(test)]
mod testing;

/// Reserved key holding a document's identity.
pub const ID_FIELD: &str = "_id";
