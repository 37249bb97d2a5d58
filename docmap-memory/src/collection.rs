//! Documents and indexes of a single in-memory collection.
//!
//! [`CollectionState`] implements every primitive the mapping layer needs as plain,
//! lock-free methods; the blocking and suspending handles in [`crate::store`] only
//! differ in how they lock the state around these calls.

use std::cmp::Ordering;

use bson::{Bson, Document, oid::ObjectId};
use tracing::debug;

use docmap_core::{
    ID_FIELD,
    error::{DocMapError, DocMapResult},
    index::IndexSpec,
    query::{OperationOptions, ReturnDocument, UpdateSpec},
};

use crate::{
    evaluator::{self, Comparable, bson_eq, values_at},
    update::{self, get_path, set_path},
};

/// Name of the implicit unique index on `_id`.
const ID_INDEX: &str = "_id_";

#[derive(Debug, Clone, Default)]
pub(crate) struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl CollectionState {
    /// Matching documents after sort, skip, limit and projection.
    pub(crate) fn find(&self, filter: &Document, options: &OperationOptions) -> DocMapResult<Vec<Document>> {
        self.select(filter, options)?
            .into_iter()
            .map(|position| project(&self.documents[position], options.projection.as_ref()))
            .collect()
    }

    pub(crate) fn count(&self, filter: &Document, options: &OperationOptions) -> DocMapResult<u64> {
        Ok(self.select(filter, options)?.len() as u64)
    }

    pub(crate) fn insert_one(&mut self, namespace: &str, mut document: Document) -> DocMapResult<Bson> {
        let id = match document.get(ID_FIELD) {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut with_id = Document::new();
                with_id.insert(ID_FIELD, id.clone());
                with_id.extend(document);
                document = with_id;
                id
            }
        };

        self.check_unique(namespace, &document, None)?;
        self.documents.push(document);

        Ok(id)
    }

    pub(crate) fn find_one_and_update(
        &mut self,
        namespace: &str,
        filter: &Document,
        update: &UpdateSpec,
        options: &OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        let first = self.select(filter, &first_only(options))?.into_iter().next();

        let Some(position) = first else {
            if options.upsert != Some(true) {
                return Ok(None);
            }

            let mut seed = update::apply(&equality_seed(filter), update, true)?;
            if !seed.contains_key(ID_FIELD) {
                let mut with_id = Document::new();
                with_id.insert(ID_FIELD, ObjectId::new());
                with_id.extend(seed);
                seed = with_id;
            }

            self.check_unique(namespace, &seed, None)?;
            self.documents.push(seed.clone());

            return match options.return_document {
                Some(ReturnDocument::After) => project(&seed, options.projection.as_ref()).map(Some),
                _ => Ok(None),
            };
        };

        let before = self.documents[position].clone();
        let after = update::apply(&before, update, false)?;

        self.check_unique(namespace, &after, Some(position))?;
        self.documents[position] = after.clone();

        let image = match options.return_document {
            Some(ReturnDocument::After) => after,
            _ => before,
        };

        project(&image, options.projection.as_ref()).map(Some)
    }

    pub(crate) fn find_one_and_delete(
        &mut self,
        filter: &Document,
        options: &OperationOptions,
    ) -> DocMapResult<Option<Document>> {
        let first = self.select(filter, &first_only(options))?.into_iter().next();

        match first {
            Some(position) => {
                let removed = self.documents.remove(position);
                project(&removed, options.projection.as_ref()).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Registers indexes, failing when existing documents violate a new unique index.
    pub(crate) fn create_indexes(&mut self, namespace: &str, indexes: Vec<IndexSpec>) -> DocMapResult<Vec<String>> {
        let mut names = Vec::with_capacity(indexes.len());

        for index in indexes {
            let name = index.name();

            if !self.indexes.iter().any(|existing| existing.name() == name) {
                if index.unique {
                    for (position, document) in self.documents.iter().enumerate() {
                        if let Some(key) = index_key(&index, document) {
                            if self.conflicts(&index, &key, Some(position)) {
                                return Err(duplicate(namespace, &name, &key));
                            }
                        }
                    }
                }

                self.indexes.push(index);
            }

            names.push(name);
        }

        Ok(names)
    }

    /// Positions of matching documents after sort, skip and limit.
    fn select(&self, filter: &Document, options: &OperationOptions) -> DocMapResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in self.documents.iter().enumerate() {
            if evaluator::matches(document, filter)? {
                positions.push(position);
            }
        }

        if let Some(sort) = &options.sort {
            positions.sort_by(|a, b| compare_by(sort, &self.documents[*a], &self.documents[*b]));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit {
            Some(limit) if limit != 0 => limit.unsigned_abs() as usize,
            _ => usize::MAX,
        };

        Ok(positions.into_iter().skip(skip).take(limit).collect())
    }

    fn check_unique(&self, namespace: &str, document: &Document, ignore: Option<usize>) -> DocMapResult<()> {
        let id_index = IndexSpec::builder().ascending(ID_FIELD).name(ID_INDEX).unique(true).build();

        for index in std::iter::once(&id_index).chain(self.indexes.iter().filter(|index| index.unique)) {
            if let Some(key) = index_key(index, document) {
                if self.conflicts(index, &key, ignore) {
                    return Err(duplicate(namespace, &index.name(), &key));
                }
            }
        }

        Ok(())
    }

    fn conflicts(&self, index: &IndexSpec, key: &[Bson], ignore: Option<usize>) -> bool {
        self.documents
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != ignore)
            .filter_map(|(_, document)| index_key(index, document))
            .any(|other| other.iter().zip(key).all(|(a, b)| bson_eq(a, b)))
    }
}

fn first_only(options: &OperationOptions) -> OperationOptions {
    OperationOptions { limit: Some(1), ..options.clone() }
}

/// Key tuple of `document` under `index`; `None` when a sparse index skips it.
fn index_key(index: &IndexSpec, document: &Document) -> Option<Vec<Bson>> {
    let mut key = Vec::new();
    let mut present = false;

    for field in index.fields() {
        match get_path(document, field) {
            Some(value) => {
                present = true;
                key.push(value.clone());
            }
            None => key.push(Bson::Null),
        }
    }

    (present || !index.sparse).then_some(key)
}

fn duplicate(namespace: &str, index: &str, key: &[Bson]) -> DocMapError {
    let key = key
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    DocMapError::DuplicateKey {
        collection: namespace.to_string(),
        message: format!(
            "E11000 duplicate key error collection: {namespace} index: {index} dup key: {{ {key} }}"
        ),
    }
}

/// Document seeded from the equality clauses of an upsert filter.
fn equality_seed(filter: &Document) -> Document {
    let mut seed = Document::new();

    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }

        let value = match condition {
            Bson::Document(operators) if operators.keys().any(|key| key.starts_with('$')) => {
                match operators.get("$eq") {
                    Some(value) => value.clone(),
                    None => continue,
                }
            }
            value => value.clone(),
        };

        if let Err(err) = set_path(&mut seed, key, value) {
            debug!(field = %key, %err, "skipping upsert seed field");
        }
    }

    seed
}

fn compare_by(sort: &Document, left: &Document, right: &Document) -> Ordering {
    for (field, direction) in sort {
        let null = Bson::Null;
        let left = values_at(left, field).into_iter().next().unwrap_or(&null);
        let right = values_at(right, field).into_iter().next().unwrap_or(&null);

        let ordering = Comparable::from(left).sort_cmp(&Comparable::from(right));
        let ordering = match direction {
            Bson::Int32(-1) | Bson::Int64(-1) => ordering.reverse(),
            Bson::Double(value) if *value < 0.0 => ordering.reverse(),
            _ => ordering,
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Applies an inclusion (`{f: 1}`) or exclusion (`{f: 0}`) projection.
fn project(document: &Document, projection: Option<&Document>) -> DocMapResult<Document> {
    let Some(projection) = projection.filter(|projection| !projection.is_empty()) else {
        return Ok(document.clone());
    };

    let fields = projection
        .iter()
        .filter(|(field, _)| field.as_str() != ID_FIELD)
        .map(|(field, value)| (field.as_str(), is_included(value)))
        .collect::<Vec<_>>();
    let inclusive = fields.first().is_some_and(|(_, include)| *include);

    if fields.iter().any(|(_, include)| *include != inclusive) {
        return Err(DocMapError::Backend(
            "Cannot mix inclusion and exclusion in a projection".to_string(),
        ));
    }

    let keep_id = projection.get(ID_FIELD).is_none_or(is_included);

    let mut projected = if inclusive {
        let mut projected = Document::new();
        for (field, _) in &fields {
            if let Some(value) = get_path(document, field) {
                set_path(&mut projected, field, value.clone())?;
            }
        }
        projected
    } else {
        let mut projected = document.clone();
        for (field, _) in &fields {
            update::remove_path(&mut projected, field);
        }
        projected
    };

    match (keep_id, document.get(ID_FIELD)) {
        (true, Some(id)) if !projected.contains_key(ID_FIELD) => {
            let mut with_id = Document::new();
            with_id.insert(ID_FIELD, id.clone());
            with_id.extend(projected);
            projected = with_id;
        }
        (false, _) => {
            projected.remove(ID_FIELD);
        }
        _ => {}
    }

    Ok(projected)
}

fn is_included(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        _ => true,
    }
}
