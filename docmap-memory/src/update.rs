//! Update application for in-memory documents.
//!
//! Supports operator documents (`$set`, `$unset`, `$inc`, `$push`, `$addToSet`,
//! `$pull`, `$rename`, `$setOnInsert`) and pipelines made of `$set` / `$addFields` and
//! `$unset` stages. Operator paths may be dotted; missing intermediate documents are
//! created.

use bson::{Bson, Document};

use docmap_core::{
    ID_FIELD,
    error::{DocMapError, DocMapResult},
    query::UpdateSpec,
};

use crate::evaluator::{self, bson_eq, unsupported};

/// Applies `update` to a copy of `document` and returns the result.
///
/// `inserting` is set when the document is being created by an upsert, which enables
/// `$setOnInsert`.
///
/// # Errors
///
/// Returns [`DocMapError::Backend`] for unsupported operators, type mismatches and
/// attempts to change `_id`.
pub(crate) fn apply(document: &Document, update: &UpdateSpec, inserting: bool) -> DocMapResult<Document> {
    let mut updated = document.clone();

    match update {
        UpdateSpec::Document(operators) => {
            if operators.keys().any(|key| !key.starts_with('$')) {
                return Err(DocMapError::Backend(
                    "update document requires atomic operators".to_string(),
                ));
            }

            for (operator, fields) in operators {
                let Bson::Document(fields) = fields else {
                    return Err(DocMapError::Backend(format!(
                        "modifier {operator} needs a document argument"
                    )));
                };

                apply_operator(&mut updated, operator, fields, inserting)?;
            }
        }
        UpdateSpec::Pipeline(stages) => {
            for stage in stages {
                apply_stage(&mut updated, stage)?;
            }
        }
    }

    if document.get(ID_FIELD).is_some_and(|id| {
        updated
            .get(ID_FIELD)
            .is_none_or(|updated_id| !bson_eq(id, updated_id))
    }) {
        return Err(DocMapError::Backend(
            "Performing an update on the path '_id' would modify the immutable field '_id'"
                .to_string(),
        ));
    }

    Ok(updated)
}

fn apply_operator(
    document: &mut Document,
    operator: &str,
    fields: &Document,
    inserting: bool,
) -> DocMapResult<()> {
    for (path, value) in fields {
        match operator {
            "$set" => set_path(document, path, value.clone())?,
            "$setOnInsert" if inserting => set_path(document, path, value.clone())?,
            "$setOnInsert" => {}
            "$unset" => {
                remove_path(document, path);
            }
            "$inc" => {
                let current = get_path(document, path);
                let incremented = increment(path, current, value)?;
                set_path(document, path, incremented)?;
            }
            "$push" => {
                let items = each_or_single(value);
                array_at(document, path)?.extend(items);
            }
            "$addToSet" => {
                let items = each_or_single(value);
                let array = array_at(document, path)?;
                for item in items {
                    if !array.iter().any(|existing| bson_eq(existing, &item)) {
                        array.push(item);
                    }
                }
            }
            "$pull" => {
                if let Some(Bson::Array(items)) = get_path_mut(document, path) {
                    let mut kept = Vec::with_capacity(items.len());
                    for item in items.drain(..) {
                        if !pull_matches(&item, value)? {
                            kept.push(item);
                        }
                    }
                    *items = kept;
                }
            }
            "$rename" => {
                let Bson::String(target) = value else {
                    return Err(DocMapError::Backend(format!(
                        "$rename target for `{path}` must be a string"
                    )));
                };
                if let Some(moved) = remove_path(document, path) {
                    set_path(document, target, moved)?;
                }
            }
            other => return Err(unsupported("update operator", other)),
        }
    }

    Ok(())
}

fn apply_stage(document: &mut Document, stage: &Document) -> DocMapResult<()> {
    for (name, spec) in stage {
        match (name.as_str(), spec) {
            ("$set" | "$addFields", Bson::Document(fields)) => {
                for (path, value) in fields {
                    let value = match value {
                        Bson::String(reference) if reference.starts_with('$') => {
                            get_path(document, &reference[1..])
                                .cloned()
                                .unwrap_or(Bson::Null)
                        }
                        other => other.clone(),
                    };
                    set_path(document, path, value)?;
                }
            }
            ("$unset", Bson::String(path)) => {
                remove_path(document, path);
            }
            ("$unset", Bson::Array(paths)) => {
                for path in paths {
                    if let Bson::String(path) = path {
                        remove_path(document, path);
                    }
                }
            }
            (other, _) => return Err(unsupported("pipeline stage", other)),
        }
    }

    Ok(())
}

fn each_or_single(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Document(modifier) => match modifier.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            _ => vec![value.clone()],
        },
        _ => vec![value.clone()],
    }
}

fn pull_matches(item: &Bson, condition: &Bson) -> DocMapResult<bool> {
    match (item, condition) {
        (Bson::Document(item), Bson::Document(filter)) => evaluator::matches(item, filter),
        _ => Ok(bson_eq(item, condition)),
    }
}

fn increment(path: &str, current: Option<&Bson>, by: &Bson) -> DocMapResult<Bson> {
    let mismatch = || DocMapError::Backend(format!("cannot apply $inc to `{path}`"));

    Ok(match (current.unwrap_or(&Bson::Int32(0)), by) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(*a as i64 + *b as i64)),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(checked_long(path, *a as i64, *b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(checked_long(path, *a, *b as i64)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(checked_long(path, *a, *b)?),
        (Bson::Double(a), b) => Bson::Double(a + as_f64(b).ok_or_else(mismatch)?),
        (a, Bson::Double(b)) => Bson::Double(as_f64(a).ok_or_else(mismatch)? + b),
        _ => return Err(mismatch()),
    })
}

fn checked_long(path: &str, current: i64, by: i64) -> DocMapResult<i64> {
    current.checked_add(by).ok_or_else(|| {
        DocMapError::Backend(format!("$inc on `{path}` would cause an integer overflow"))
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(*value as f64),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

/// Returns the value at a dotted path through nested documents.
pub(crate) fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(inner) => get_path(inner, rest),
            _ => None,
        },
        None => document.get(path),
    }
}

fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    match path.split_once('.') {
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => get_path_mut(inner, rest),
            _ => None,
        },
        None => document.get_mut(path),
    }
}

/// Sets the value at a dotted path, creating missing intermediate documents.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> DocMapResult<()> {
    match path.split_once('.') {
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(DocMapError::Backend(format!(
                    "cannot create field `{rest}` in element `{head}`, which is not a document"
                ))),
            }
        }
        None => {
            document.insert(path, value);
            Ok(())
        }
    }
}

/// Removes and returns the value at a dotted path.
pub(crate) fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => remove_path(inner, rest),
            _ => None,
        },
        None => document.remove(path),
    }
}

fn array_at<'a>(document: &'a mut Document, path: &str) -> DocMapResult<&'a mut Vec<Bson>> {
    if get_path(document, path).is_none() {
        set_path(document, path, Bson::Array(Vec::new()))?;
    }

    match get_path_mut(document, path) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(DocMapError::Backend(format!("the field `{path}` must be an array"))),
    }
}
