//! Core traits for typed models and their conversion to raw documents.
//!
//! A [`Model`] is a serde type bound to a collection through its [`ModelSettings`].
//! Its identity serializes under the reserved `_id` key and stays `None` until the
//! instance is inserted or loaded. Extra, undeclared fields are preserved by
//! flattening a [`bson::Document`] into the struct.
//!
//! # Example
//!
//! ```ignore
//! use docmap::{bson::{Document, oid::ObjectId}, model::{Model, ModelSettings}};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id", alias = "id", skip_serializing_if = "Option::is_none", default)]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//!     #[serde(flatten)]
//!     pub extra: Document,
//! }
//!
//! impl Model for User {
//!     fn id(&self) -> Option<&ObjectId> {
//!         self.id.as_ref()
//!     }
//!
//!     fn settings() -> ModelSettings {
//!         ModelSettings::new().collection("users")
//!     }
//! }
//! ```

use bson::{Bson, Document, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_value, to_value};

use crate::{
    error::{DocMapError, DocMapResult},
    field,
    index::IndexSpec,
};

/// Static routing settings of a model type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSettings {
    /// Collection used when an operation names none explicitly.
    pub collection_name: Option<String>,
    /// Registry alias used when an operation names no database; `None` means the mode default.
    pub database_alias: Option<String>,
    /// Indexes submitted by `build_indexes`.
    pub indexes: Vec<IndexSpec>,
}

impl ModelSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    /// Sets the registry alias of the database this model lives in.
    pub fn database_alias(mut self, alias: impl Into<String>) -> Self {
        self.database_alias = Some(alias.into());
        self
    }

    /// Appends an index specification.
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Appends several index specifications.
    pub fn indexes(mut self, indexes: impl IntoIterator<Item = IndexSpec>) -> Self {
        self.indexes.extend(indexes);
        self
    }
}

/// Core trait that every collection-bound model implements.
///
/// Usually derived with `#[derive(Model)]`.
pub trait Model: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns the identity, or `None` before the instance is inserted or loaded.
    fn id(&self) -> Option<&ObjectId>;

    /// Returns the routing settings of this model type.
    fn settings() -> ModelSettings {
        ModelSettings::default()
    }

    /// Returns a human readable name used in error messages.
    fn model_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Extension trait providing conversions and field access for models.
///
/// This trait is automatically implemented for all types that implement [`Model`].
pub trait ModelExt: Model {
    /// Returns `true` once the instance holds an identity.
    fn is_bound(&self) -> bool;

    /// Serializes this model into a raw document keyed by field aliases.
    fn to_document(&self) -> DocMapResult<Document>;

    /// Creates a model from a raw document keyed by field names or aliases.
    fn from_document(document: Document) -> DocMapResult<Self>;

    fn to_json(&self) -> DocMapResult<Value>;

    fn from_json(value: Value) -> DocMapResult<Self>;

    /// Returns the value at a dotted field path, `None` when a segment is absent.
    ///
    /// `"id"` is an alias for the `_id` identity field.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::InvalidFieldPath`] when the path descends into a value
    /// that is not a document.
    fn get(&self, path: &str) -> DocMapResult<Option<Bson>>;

    /// Like [`get`](Self::get), returning `default` when a segment is absent.
    fn get_or(&self, path: &str, default: impl Into<Bson>) -> DocMapResult<Bson>;

    /// Item lookup: like [`get`](Self::get), failing with
    /// [`DocMapError::KeyNotFound`] when a segment is absent.
    fn field(&self, path: &str) -> DocMapResult<Bson>;
}

impl<M: Model> ModelExt for M {
    fn is_bound(&self) -> bool {
        self.id().is_some()
    }

    fn to_document(&self) -> DocMapResult<Document> {
        into_document(serialize_to_bson(self)?)
    }

    fn from_document(document: Document) -> DocMapResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_json(&self) -> DocMapResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocMapResult<Self> {
        Ok(from_value(value)?)
    }

    fn get(&self, path: &str) -> DocMapResult<Option<Bson>> {
        Ok(field::lookup(&self.to_document()?, path)?.cloned())
    }

    fn get_or(&self, path: &str, default: impl Into<Bson>) -> DocMapResult<Bson> {
        Ok(ModelExt::get(self, path)?.unwrap_or_else(|| default.into()))
    }

    fn field(&self, path: &str) -> DocMapResult<Bson> {
        ModelExt::get(self, path)?.ok_or_else(|| DocMapError::KeyNotFound(path.to_string()))
    }
}

/// A nested model that is stored inside a parent document rather than a collection.
///
/// Provides the same dotted field access as [`ModelExt`]. Usually derived with
/// `#[derive(EmbeddedDocument)]`.
pub trait EmbeddedDocument: Serialize {
    fn to_document(&self) -> DocMapResult<Document> {
        into_document(serialize_to_bson(self)?)
    }

    fn get(&self, path: &str) -> DocMapResult<Option<Bson>> {
        Ok(field::lookup(&EmbeddedDocument::to_document(self)?, path)?.cloned())
    }

    fn get_or(&self, path: &str, default: impl Into<Bson>) -> DocMapResult<Bson> {
        Ok(EmbeddedDocument::get(self, path)?.unwrap_or_else(|| default.into()))
    }

    fn field(&self, path: &str) -> DocMapResult<Bson> {
        EmbeddedDocument::get(self, path)?
            .ok_or_else(|| DocMapError::KeyNotFound(path.to_string()))
    }
}

fn into_document(bson: Bson) -> DocMapResult<Document> {
    match bson {
        Bson::Document(document) => Ok(document),
        other => Err(DocMapError::Serialization(format!(
            "expected a document, found {:?}",
            other.element_type()
        ))),
    }
}
