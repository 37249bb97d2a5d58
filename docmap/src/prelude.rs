//! Convenient re-exports of commonly used types from docmap.
//!
//! ```ignore
//! use docmap::prelude::*;
//! use docmap::blocking::SyncDocument; // or docmap::suspending::AsyncDocument
//! ```
//!
//! The operation traits share method names and are not part of the prelude; import
//! the one matching the mode of your database.

pub use docmap_core::{
    backend::{CollectionHandle, DatabaseBuilder, DatabaseHandle, Mode},
    error::{DocMapError, DocMapResult, ErrorCategory},
    index::IndexSpec,
    model::{EmbeddedDocument, Model, ModelExt, ModelSettings},
    query::{FindFilter, OperationOptions, ReturnDocument, SortDirection, UpdateSpec},
    registry::{DatabaseBinding, Registry},
    resolver::Route,
};
pub use docmap_macros::{EmbeddedDocument, Model};

pub use bson::{Bson, Document, doc, oid::ObjectId};
pub use serde::{Deserialize, Serialize};
