//! Filter, update and option types passed through to the database collaborator.
//!
//! Filters and updates are raw BSON documents in the database's own query language;
//! this module only wraps them in small enums where an operation accepts more than one
//! shape, and collects the keyword options every primitive understands.
//!
//! # Options
//!
//! ```ignore
//! use docmap::query::{OperationOptions, SortDirection};
//!
//! let options = OperationOptions::builder()
//!     .sort("created_at", SortDirection::Desc)
//!     .limit(10)
//!     .build();
//! ```

use bson::{Bson, Document, oid::ObjectId};

use crate::error::{DocMapError, DocMapResult};

/// Which image of a document a find-and-modify primitive returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before the modification.
    Before,
    /// The document as it is after the modification.
    After,
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    fn as_bson(self) -> Bson {
        match self {
            SortDirection::Asc => Bson::Int32(1),
            SortDirection::Desc => Bson::Int32(-1),
        }
    }
}

/// Keyword options forwarded to the database primitives.
///
/// Each primitive reads the fields that apply to it and ignores the rest.
/// `return_document` is reserved for the engine: operations that always return the
/// post-update image reject options where the caller has set it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationOptions {
    /// Fields to include (`1`) or exclude (`0`) from returned documents.
    pub projection: Option<Document>,
    /// Sort specification, `{field: 1 | -1}`.
    pub sort: Option<Document>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
    /// Insert a document when an update matches nothing.
    pub upsert: Option<bool>,
    /// Pre- or post-image selection for find-and-modify primitives.
    pub return_document: Option<ReturnDocument>,
}

impl OperationOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new options builder for fluent construction.
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::new()
    }

    /// Fails when the caller tried to choose the returned image.
    pub(crate) fn forbid_return_document(&self) -> DocMapResult<()> {
        match self.return_document {
            Some(_) => Err(DocMapError::InvalidArgument(
                "You cannot use return_document as a parameter".to_string(),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OptionsBuilder {
    options: OperationOptions,
}

impl OptionsBuilder {
    /// Creates a new options builder.
    pub fn new() -> Self {
        OptionsBuilder { options: OperationOptions::default() }
    }

    /// Restricts returned documents to (or away from) the given fields.
    pub fn projection(mut self, projection: Document) -> Self {
        self.options.projection = Some(projection);
        self
    }

    /// Appends a sort key. Keys are applied in the order they are added.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.options
            .sort
            .get_or_insert_with(Document::new)
            .insert(field.into(), direction.as_bson());
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: i64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Inserts a new document when an update filter matches nothing.
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.options.upsert = Some(upsert);
        self
    }

    /// Selects the returned image of find-and-modify primitives.
    pub fn return_document(mut self, image: ReturnDocument) -> Self {
        self.options.return_document = Some(image);
        self
    }

    /// Builds and returns the final options.
    pub fn build(self) -> OperationOptions {
        self.options
    }
}

/// Filter accepted by `find_one`: a raw filter document or a bare identity.
///
/// Identities are normalised to `{_id: <id>}` before reaching the database.
#[derive(Debug, Clone, PartialEq)]
pub enum FindFilter {
    /// A raw filter document.
    Document(Document),
    /// An identity value.
    Id(ObjectId),
    /// An identity in its 24 character hex form.
    HexId(String),
}

impl FindFilter {
    /// Converts this filter into a raw filter document.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::InvalidArgument`] if a hex identity cannot be parsed.
    pub fn into_document(self) -> DocMapResult<Document> {
        let id = match self {
            FindFilter::Document(document) => return Ok(document),
            FindFilter::Id(id) => id,
            FindFilter::HexId(hex) => ObjectId::parse_str(&hex).map_err(|err| {
                DocMapError::InvalidArgument(format!("`{hex}` is not a valid object id: {err}"))
            })?,
        };

        let mut filter = Document::new();
        filter.insert(crate::ID_FIELD, id);

        Ok(filter)
    }
}

impl From<Document> for FindFilter {
    fn from(document: Document) -> Self {
        FindFilter::Document(document)
    }
}

impl From<ObjectId> for FindFilter {
    fn from(id: ObjectId) -> Self {
        FindFilter::Id(id)
    }
}

impl From<&str> for FindFilter {
    fn from(hex: &str) -> Self {
        FindFilter::HexId(hex.to_string())
    }
}

impl From<String> for FindFilter {
    fn from(hex: String) -> Self {
        FindFilter::HexId(hex)
    }
}

/// Update specification: an operator document or an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateSpec {
    /// An update document such as `{"$set": {"name": "Pong"}}`.
    Document(Document),
    /// An ordered list of pipeline stages.
    Pipeline(Vec<Document>),
}

impl UpdateSpec {
    /// Returns `true` if the update carries no modification at all.
    pub fn is_empty(&self) -> bool {
        match self {
            UpdateSpec::Document(document) => document.is_empty(),
            UpdateSpec::Pipeline(stages) => stages.is_empty(),
        }
    }
}

impl From<Document> for UpdateSpec {
    fn from(document: Document) -> Self {
        UpdateSpec::Document(document)
    }
}

impl From<Vec<Document>> for UpdateSpec {
    fn from(stages: Vec<Document>) -> Self {
        UpdateSpec::Pipeline(stages)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn identity_filters_normalise_to_id_clause() {
        let id = ObjectId::new();

        assert_eq!(FindFilter::from(id).into_document().unwrap(), doc! { "_id": id });
        assert_eq!(
            FindFilter::from(id.to_hex()).into_document().unwrap(),
            doc! { "_id": id }
        );
        assert_eq!(
            FindFilter::from(doc! { "name": "Ping" }).into_document().unwrap(),
            doc! { "name": "Ping" }
        );
    }

    #[test]
    fn malformed_hex_identity_is_rejected() {
        let err = FindFilter::from("not-an-id").into_document().unwrap_err();

        assert!(matches!(err, DocMapError::InvalidArgument(_)));
    }

    #[test]
    fn builder_accumulates_sort_keys_in_order() {
        let options = OperationOptions::builder()
            .sort("age", SortDirection::Desc)
            .sort("name", SortDirection::Asc)
            .limit(5)
            .build();

        assert_eq!(options.sort, Some(doc! { "age": -1, "name": 1 }));
        assert_eq!(options.limit, Some(5));
        assert!(options.forbid_return_document().is_ok());
    }

    #[test]
    fn caller_chosen_return_document_is_forbidden() {
        let options = OperationOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();

        assert!(matches!(
            options.forbid_return_document(),
            Err(DocMapError::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_updates_are_detected() {
        assert!(UpdateSpec::from(Document::new()).is_empty());
        assert!(UpdateSpec::from(Vec::<Document>::new()).is_empty());
        assert!(!UpdateSpec::from(doc! { "$set": { "a": 1 } }).is_empty());
    }
}
