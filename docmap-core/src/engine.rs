//! Mode independent steps shared by the blocking and suspending operations.
//!
//! Everything here is pure: the preconditions checked before touching storage and the
//! document shaping done around each primitive call.

use bson::{Bson, Document, oid::ObjectId};

use crate::{
    ID_FIELD,
    error::{DocMapError, DocMapResult},
    field::PATH_SEPARATOR,
    model::{Model, ModelExt},
    query::{OperationOptions, ReturnDocument},
};

/// Marker every custom query operator starts with.
const OPERATOR_MARKER: char = '$';

/// Pseudo-operator whose block becomes the filter of a custom query update.
const MATCH_OPERATOR: &str = "$match";

/// Returns the identity of `model`, failing when it is not bound yet.
pub(crate) fn require_identity<M: Model>(
    model: &M,
    operation: &'static str,
) -> DocMapResult<ObjectId> {
    model
        .id()
        .copied()
        .ok_or(DocMapError::RequiresLoadedDocument(operation))
}

/// Pins `filter` to `id`, discarding any identity clause the caller supplied.
pub(crate) fn bind_identity(id: ObjectId, mut filter: Document) -> Document {
    filter.remove(ID_FIELD);

    let mut bound = Document::new();
    bound.insert(ID_FIELD, id);
    bound.extend(filter);
    bound
}

/// Options for find-and-modify calls that must return the post-update image.
pub(crate) fn post_image_options(options: OperationOptions) -> DocMapResult<OperationOptions> {
    options.forbid_return_document()?;

    Ok(OperationOptions { return_document: Some(ReturnDocument::After), ..options })
}

/// Folds single-key operator blocks into one update document.
///
/// Blocks are merged in order, so a later field overrides an earlier one under the
/// same operator. The `$match` block is split off and returned as the filter.
pub(crate) fn merge_custom_queries(queries: Vec<Document>) -> DocMapResult<(Document, Document)> {
    let mut update = Document::new();

    for query in queries {
        for (operator, block) in query {
            if !operator.starts_with(OPERATOR_MARKER) {
                return Err(DocMapError::InvalidOperatorKey(operator));
            }

            let Bson::Document(block) = block else {
                return Err(DocMapError::InvalidArgument(format!(
                    "The value of custom query operator `{operator}` must be a document"
                )));
            };

            if block.is_empty() {
                continue;
            }

            match update.get_mut(&operator) {
                Some(Bson::Document(merged)) => merged.extend(block),
                _ => {
                    update.insert(operator, block);
                }
            }
        }
    }

    let filter = match update.remove(MATCH_OPERATOR) {
        Some(Bson::Document(filter)) => filter,
        _ => Document::new(),
    };

    Ok((filter, update))
}

/// Serializes `model` for insertion.
///
/// Null values are dropped (recursively through embedded documents) unless
/// `allow_nulls` is set; a null identity is always dropped.
pub(crate) fn insert_payload<M: Model>(model: &M, allow_nulls: bool) -> DocMapResult<Document> {
    let mut document = model.to_document()?;

    if !allow_nulls {
        strip_nulls(&mut document);
    }

    if matches!(document.get(ID_FIELD), Some(Bson::Null)) {
        document.remove(ID_FIELD);
    }

    Ok(document)
}

fn strip_nulls(document: &mut Document) {
    let nulls = document
        .iter()
        .filter(|(_, value)| matches!(value, Bson::Null))
        .map(|(key, _)| key.clone())
        .collect::<Vec<_>>();

    for key in nulls {
        document.remove(&key);
    }

    for (_, value) in document.iter_mut() {
        match value {
            Bson::Document(inner) => strip_nulls(inner),
            Bson::Array(items) => items.iter_mut().for_each(|item| {
                if let Bson::Document(inner) = item {
                    strip_nulls(inner);
                }
            }),
            _ => {}
        }
    }
}

/// Builds the projection of a partial reload, `None` for a full reload.
pub(crate) fn reload_projection(fields: &[&str]) -> DocMapResult<Option<Document>> {
    if fields.iter().any(|field| field.contains(PATH_SEPARATOR)) {
        return Err(DocMapError::InvalidArgument(
            "It is not possible to use dot annotation on reload.".to_string(),
        ));
    }

    if fields.is_empty() {
        return Ok(None);
    }

    Ok(Some(
        fields
            .iter()
            .map(|field| (field.to_string(), Bson::Int32(1)))
            .collect(),
    ))
}

/// Overwrites the fields of `model` with the keys present in `image`.
///
/// Keys absent from `image` keep their current value.
pub(crate) fn apply_image<M: Model>(model: &mut M, image: Document) -> DocMapResult<()> {
    let mut document = model.to_document()?;
    document.extend(image);

    *model = M::from_document(document)?;

    Ok(())
}

/// Binds the identity assigned by `insert_one` to `model`.
///
/// Fails when the model does not read its identity back from the `_id` key.
pub(crate) fn bind_inserted<M: Model>(model: &mut M, id: ObjectId) -> DocMapResult<()> {
    let mut image = Document::new();
    image.insert(ID_FIELD, id);
    apply_image(model, image)?;

    if model.id() != Some(&id) {
        return Err(DocMapError::Serialization(format!(
            "model `{}` does not map its identity to `{ID_FIELD}`",
            M::model_name()
        )));
    }

    Ok(())
}

/// Converts the identity reported by `insert_one`.
pub(crate) fn inserted_id(id: Bson) -> DocMapResult<ObjectId> {
    match id {
        Bson::ObjectId(id) => Ok(id),
        other => Err(DocMapError::Serialization(format!(
            "expected an object id as inserted identity, found {other}"
        ))),
    }
}

/// Stamps the resolved collection onto duplicate key failures.
pub(crate) fn annotate_duplicate(err: DocMapError, collection: &str) -> DocMapError {
    match err {
        DocMapError::DuplicateKey { message, .. } => {
            tracing::warn!(collection, %message, "duplicate key on insert");

            DocMapError::DuplicateKey { collection: collection.to_string(), message }
        }
        other => other,
    }
}
