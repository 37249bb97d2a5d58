//! Dotted field path lookup over raw documents.

use bson::{Bson, Document};

use crate::{
    ID_FIELD,
    error::{DocMapError, DocMapResult},
};

/// Path separator for nested field access.
pub const PATH_SEPARATOR: &str = ".";

/// Alias accepted in place of the reserved identity key.
const ID_ALIAS: &str = "id";

/// Resolves `path` against `document`.
///
/// Returns `Ok(None)` as soon as a segment is absent, and fails with
/// [`DocMapError::InvalidFieldPath`] (carrying the path walked so far) when a
/// segment must be descended into but holds something other than a document.
pub fn lookup<'a>(document: &'a Document, path: &str) -> DocMapResult<Option<&'a Bson>> {
    let path = if path == ID_ALIAS { ID_FIELD } else { path };
    let segments = path.split(PATH_SEPARATOR).collect::<Vec<_>>();
    let mut current = document;

    for (depth, segment) in segments.iter().enumerate() {
        match current.get(*segment) {
            None => return Ok(None),
            Some(value) if depth + 1 == segments.len() => return Ok(Some(value)),
            Some(Bson::Document(inner)) => current = inner,
            Some(_) => {
                return Err(DocMapError::InvalidFieldPath(
                    segments[..=depth].join(PATH_SEPARATOR),
                ));
            }
        }
    }

    Ok(None)
}
