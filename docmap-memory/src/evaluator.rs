//! Filter evaluation for in-memory documents.
//!
//! Filters use the MongoDB query language subset listed below. Field keys may be dotted
//! paths; a path that crosses an array fans out over its elements, and a condition on
//! an array field holds when it holds for the array or any of its elements.
//!
//! | Operator | Meaning |
//! |---|---|
//! | `$and`, `$or`, `$nor` | logical combination of sub-filters |
//! | `$eq`, `$ne` | equality (a bare value means `$eq`) |
//! | `$gt`, `$gte`, `$lt`, `$lte` | ordering within the same type |
//! | `$in`, `$nin` | membership in a list |
//! | `$exists` | presence of the field |
//! | `$not` | negation of an operator document |

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, DateTime, Document, oid::ObjectId};

use docmap_core::error::{DocMapError, DocMapResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so that `Int32(1)` equals `Double(1.0)`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Bson::Document(document) => Comparable::Map(
                document
                    .iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    /// Total order used for sorting: by type rank first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Returns `true` if two BSON values are equal under numeric normalization.
pub(crate) fn bson_eq(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Collects the values found at a dotted `path`, fanning out over arrays.
pub(crate) fn values_at<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut current = vec![];
    if let Some((head, rest)) = path.split_once('.') {
        if let Some(value) = document.get(head) {
            descend(value, rest, &mut current);
        }
    } else if let Some(value) = document.get(path) {
        current.push(value);
    }
    current
}

fn descend<'a>(value: &'a Bson, path: &str, found: &mut Vec<&'a Bson>) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let next = match value {
        Bson::Document(document) => document.get(head),
        Bson::Array(items) => match head.parse::<usize>() {
            Ok(index) => items.get(index),
            Err(_) => {
                for item in items {
                    descend(item, path, found);
                }
                return;
            }
        },
        _ => None,
    };

    match (next, rest) {
        (Some(next), Some(rest)) => descend(next, rest, found),
        (Some(next), None) => found.push(next),
        (None, _) => {}
    }
}

/// Evaluates `filter` against `document`.
///
/// # Errors
///
/// Returns [`DocMapError::Backend`] for malformed filters and unsupported operators.
pub(crate) fn matches(document: &Document, filter: &Document) -> DocMapResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => sub_filters(key, condition)?
                .iter()
                .try_fold(true, |all, sub| Ok::<_, DocMapError>(all && matches(document, sub)?))?,
            "$or" => sub_filters(key, condition)?
                .iter()
                .try_fold(false, |any, sub| Ok::<_, DocMapError>(any || matches(document, sub)?))?,
            "$nor" => !sub_filters(key, condition)?
                .iter()
                .try_fold(false, |any, sub| Ok::<_, DocMapError>(any || matches(document, sub)?))?,
            operator if operator.starts_with('$') => {
                return Err(unsupported("query operator", operator));
            }
            path => field_matches(&values_at(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn sub_filters<'f>(operator: &str, condition: &'f Bson) -> DocMapResult<Vec<&'f Document>> {
    let Bson::Array(items) = condition else {
        return Err(DocMapError::Backend(format!("{operator} argument must be an array")));
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(document) => Ok(document),
            _ => Err(DocMapError::Backend(format!(
                "{operator} argument's entries must be documents"
            ))),
        })
        .collect()
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(document)
            if document
                .keys()
                .next()
                .is_some_and(|key| key.starts_with('$')) =>
        {
            Some(document)
        }
        _ => None,
    }
}

fn field_matches(values: &[&Bson], condition: &Bson) -> DocMapResult<bool> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(equals(values, condition));
    };

    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => equals(values, operand),
            "$ne" => !equals(values, operand),
            "$gt" => compares(values, operand, |ordering| ordering == Ordering::Greater),
            "$gte" => compares(values, operand, |ordering| ordering != Ordering::Less),
            "$lt" => compares(values, operand, |ordering| ordering == Ordering::Less),
            "$lte" => compares(values, operand, |ordering| ordering != Ordering::Greater),
            "$in" => members(operator, operand)?
                .iter()
                .any(|member| equals(values, member)),
            "$nin" => !members(operator, operand)?
                .iter()
                .any(|member| equals(values, member)),
            "$exists" => {
                let expected = match operand {
                    Bson::Boolean(value) => *value,
                    Bson::Int32(value) => *value != 0,
                    Bson::Int64(value) => *value != 0,
                    Bson::Null => false,
                    _ => true,
                };
                values.is_empty() != expected
            }
            "$not" => match operand {
                Bson::Document(_) if is_operator_document(operand).is_some() => {
                    !field_matches(values, operand)?
                }
                _ => return Err(DocMapError::Backend("$not needs an operator document".to_string())),
            },
            other => return Err(unsupported("query operator", other)),
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn members<'o>(operator: &str, operand: &'o Bson) -> DocMapResult<&'o Vec<Bson>> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(DocMapError::Backend(format!("{operator} needs an array"))),
    }
}

/// Equality against any candidate value or any element of an array candidate.
///
/// A missing field equals `null`.
fn equals(values: &[&Bson], expected: &Bson) -> bool {
    let expected = Comparable::from(expected);

    if values.is_empty() {
        return expected == Comparable::Null;
    }

    values.iter().any(|value| {
        let value = Comparable::from(*value);
        if value == expected {
            return true;
        }

        match value {
            Comparable::Array(items) => items.iter().any(|item| *item == expected),
            _ => false,
        }
    })
}

fn compares(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let operand = Comparable::from(operand);

    values.iter().any(|value| {
        let value = Comparable::from(*value);
        let direct = value.partial_cmp(&operand).is_some_and(&accept);

        direct
            || match value {
                Comparable::Array(items) => items
                    .iter()
                    .any(|item| item.partial_cmp(&operand).is_some_and(&accept)),
                _ => false,
            }
    })
}

pub(crate) fn unsupported(kind: &str, operator: &str) -> DocMapError {
    DocMapError::Backend(format!("unsupported {kind} `{operator}`"))
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use rstest::rstest;

    use super::*;

    fn player() -> Document {
        doc! {
            "name": "Ping",
            "score": 12,
            "ratio": 0.5,
            "tags": ["fast", "left"],
            "stats": { "wins": 3, "streak": { "best": 5 } },
            "matches": [{ "opponent": "Pong", "won": true }, { "opponent": "Zed", "won": false }],
            "coach": null,
        }
    }

    #[rstest]
    #[case::equality(doc! { "name": "Ping" }, true)]
    #[case::numeric_normalization(doc! { "score": 12.0 }, true)]
    #[case::dotted(doc! { "stats.streak.best": 5 }, true)]
    #[case::array_membership(doc! { "tags": "left" }, true)]
    #[case::array_of_documents(doc! { "matches.opponent": "Zed" }, true)]
    #[case::array_index(doc! { "tags.0": "fast" }, true)]
    #[case::missing_is_null(doc! { "nickname": null }, true)]
    #[case::explicit_null(doc! { "coach": null }, true)]
    #[case::mismatch(doc! { "name": "Pong" }, false)]
    #[case::gt(doc! { "score": { "$gt": 10 } }, true)]
    #[case::range(doc! { "score": { "$gte": 12, "$lt": 13 } }, true)]
    #[case::range_miss(doc! { "score": { "$gt": 12 } }, false)]
    #[case::cross_type_order(doc! { "name": { "$gt": 1 } }, false)]
    #[case::ne(doc! { "name": { "$ne": "Pong" } }, true)]
    #[case::ne_array(doc! { "tags": { "$ne": "fast" } }, false)]
    #[case::in_list(doc! { "name": { "$in": ["Pong", "Ping"] } }, true)]
    #[case::nin_list(doc! { "tags": { "$nin": ["slow"] } }, true)]
    #[case::exists(doc! { "stats.wins": { "$exists": true } }, true)]
    #[case::not_exists(doc! { "stats.losses": { "$exists": false } }, true)]
    #[case::not(doc! { "score": { "$not": { "$gt": 20 } } }, true)]
    #[case::and(doc! { "$and": [{ "name": "Ping" }, { "score": 12 }] }, true)]
    #[case::or(doc! { "$or": [{ "name": "Pong" }, { "score": 12 }] }, true)]
    #[case::nor(doc! { "$nor": [{ "name": "Pong" }, { "score": 13 }] }, true)]
    #[case::embedded_equality(doc! { "stats": { "wins": 3, "streak": { "best": 5 } } }, true)]
    fn filters_match(#[case] filter: Document, #[case] expected: bool) {
        assert_eq!(matches(&player(), &filter).unwrap(), expected);
    }

    #[rstest]
    #[case(doc! { "$where": "true" })]
    #[case(doc! { "name": { "$regex": "P" } })]
    #[case(doc! { "$or": { "name": "Ping" } })]
    #[case(doc! { "score": { "$in": 12 } })]
    fn malformed_filters_are_backend_errors(#[case] filter: Document) {
        assert!(matches!(matches(&player(), &filter), Err(DocMapError::Backend(_))));
    }

    #[test]
    fn sort_order_ranks_types() {
        let number = Bson::Int32(5);
        let text = Bson::String("a".into());
        let null = Bson::Null;

        assert_eq!(Comparable::from(&null).sort_cmp(&Comparable::from(&number)), Ordering::Less);
        assert_eq!(Comparable::from(&number).sort_cmp(&Comparable::from(&text)), Ordering::Less);
        assert_eq!(
            Comparable::from(&Bson::Int64(7)).sort_cmp(&Comparable::from(&Bson::Double(6.5))),
            Ordering::Greater
        );
    }
}
