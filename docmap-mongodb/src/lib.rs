//! MongoDB collaborators for docmap.
//!
//! This crate implements the blocking and suspending database primitives on top of the
//! official MongoDB driver. Enable it through the `mongodb` feature of the facade crate:
//!
//! ```toml
//! [dependencies]
//! docmap = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! Unique index violations (server code 11000) surface as
//! [`DocMapError::DuplicateKey`](docmap_core::error::DocMapError::DuplicateKey); every
//! other driver failure becomes a backend error.
//!
//! # Example
//!
//! ```ignore
//! use docmap::{backend::DatabaseBuilder, mongodb::MongoDatabase, registry::DatabaseBinding};
//!
//! let handle = MongoDatabase::builder("mongodb://localhost:27017", "app")
//!     .build()
//!     .await?;
//!
//! REGISTRY.configure(vec![DatabaseBinding::new("main", handle).as_default()])?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_mongodb;

mod options;

pub mod blocking;
pub mod store;

pub use blocking::{BlockingMongoDatabase, BlockingMongoDbCollection};
pub use store::{MongoDatabase, MongoDatabaseBuilder, MongoDbCollection};
