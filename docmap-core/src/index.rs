//! Index specifications declared by models and submitted by `build_indexes`.

use bson::{Bson, Document};

/// A single index over one or more fields of a collection.
///
/// # Example
///
/// ```ignore
/// use docmap::index::IndexSpec;
///
/// let by_email = IndexSpec::builder()
///     .ascending("email")
///     .unique(true)
///     .build();
/// assert_eq!(by_email.name(), "email_1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Ordered index keys, `{field: 1 | -1}`.
    pub keys: Document,
    /// Explicit index name. Derived from the keys when absent.
    pub name: Option<String>,
    /// Whether the index enforces uniqueness of the key tuple.
    pub unique: bool,
    /// Whether documents missing the indexed fields are skipped.
    pub sparse: bool,
}

impl IndexSpec {
    /// Creates an index over the given keys.
    pub fn new(keys: Document) -> Self {
        Self { keys, name: None, unique: false, sparse: false }
    }

    /// Creates a new index builder.
    pub fn builder() -> IndexSpecBuilder {
        IndexSpecBuilder::default()
    }

    /// Returns the index name, deriving `field_1_other_-1` style names from the keys.
    pub fn name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        self.keys
            .iter()
            .map(|(field, direction)| match direction {
                Bson::Int32(value) => format!("{field}_{value}"),
                Bson::Int64(value) => format!("{field}_{value}"),
                Bson::Double(value) => format!("{field}_{value}"),
                Bson::String(value) => format!("{field}_{value}"),
                other => format!("{field}_{other}"),
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Returns the indexed field names in key order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexSpecBuilder {
    keys: Document,
    name: Option<String>,
    unique: bool,
    sparse: bool,
}

impl IndexSpecBuilder {
    /// Adds an ascending key.
    pub fn ascending(mut self, field: impl Into<String>) -> Self {
        self.keys.insert(field.into(), 1);
        self
    }

    /// Adds a descending key.
    pub fn descending(mut self, field: impl Into<String>) -> Self {
        self.keys.insert(field.into(), -1);
        self
    }

    /// Sets an explicit index name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enforces uniqueness over the key tuple.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Skips documents that lack the indexed fields.
    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Builds and returns the final index specification.
    pub fn build(self) -> IndexSpec {
        IndexSpec {
            keys: self.keys,
            name: self.name,
            unique: self.unique,
            sparse: self.sparse,
        }
    }
}
