//! In-memory database collaborators for docmap.
//!
//! This crate implements the blocking and suspending database primitives over plain
//! in-process maps, which makes it the default backend for tests and local
//! development. Data lives for as long as a database handle (or one of its clones) does.
//!
//! # Supported queries
//!
//! Filters understand the logical operators (`$and`, `$or`, `$nor`) and the field
//! operators `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists` and
//! `$not`, on dotted paths and through arrays. Updates accept the common operator
//! documents and `$set` / `$unset` pipelines. Unique and sparse indexes are enforced
//! on insertion and update.
//!
//! # Example
//!
//! ```ignore
//! use docmap::{memory::InMemoryDatabase, backend::DatabaseBuilder};
//!
//! let suspending = InMemoryDatabase::builder("app").build().await?;
//! let blocking = InMemoryDatabase::builder("app").blocking().build().await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_memory;

mod collection;
mod evaluator;
mod update;

pub mod store;

pub use store::{
    BlockingInMemoryCollection, BlockingInMemoryDatabase, InMemoryCollection, InMemoryDatabase,
    InMemoryDatabaseBuilder,
};
