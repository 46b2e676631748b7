//! Value helpers shared by the evaluator and the aggregation runner
//!
//! Paths are dotted (`address.city`) and walk nested objects only.

use std::borrow::Borrow;
use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::request::SortDirection;

pub fn get_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set `path`, creating intermediate objects. A non-object in the way is replaced.
pub fn set_path(doc: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                set_path(inner, rest, value);
            }
        }
    }
}

pub fn remove_path(doc: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Value::Object(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

/// Equality with numeric normalization (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).map_or(false, |w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Ordering for range predicates: numbers numerically, strings
/// lexicographically. Any other pairing is unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total ordering for sorting.
///
/// - absent < null < bool < number < string < array < object
/// - same type: natural ordering; arrays and objects compare equal
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x @ Value::Number(_)), Some(y @ Value::Number(_)))
        | (Some(x @ Value::String(_)), Some(y @ Value::String(_))) => {
            compare_values(x, y).unwrap_or(Ordering::Equal)
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Stable multi-key sort of documents
pub fn sort_documents<D>(docs: &mut [D], keys: &[(String, SortDirection)])
where
    D: Borrow<Map<String, Value>>,
{
    docs.sort_by(|a, b| {
        keys.iter()
            .map(|(field, direction)| {
                let ordering = sort_order(get_path(a.borrow(), field), get_path(b.borrow(), field));
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// A value and, when it is an array, each of its elements
pub fn candidates(value: &Value) -> impl Iterator<Item = &Value> {
    let elements = match value {
        Value::Array(items) => items.as_slice(),
        _ => &[],
    };
    std::iter::once(value).chain(elements.iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_paths() {
        let mut doc = obj(json!({"a": {"b": 1}, "c": 2}));
        assert_eq!(get_path(&doc, "a.b"), Some(&json!(1)));
        assert_eq!(get_path(&doc, "c.d"), None);

        set_path(&mut doc, "a.x.y", json!(true));
        assert_eq!(doc["a"]["x"]["y"], true);

        assert_eq!(remove_path(&mut doc, "a.b"), Some(json!(1)));
        assert!(get_path(&doc, "a.b").is_none());
    }

    #[test]
    fn test_numeric_equality() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(values_equal(&json!({"n": [1]}), &json!({"n": [1.0]})));
    }

    #[test]
    fn test_mixed_types_unordered() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(1), &json!("1")), None);
    }

    #[test]
    fn test_sort_order_by_type_rank() {
        assert_eq!(sort_order(None, Some(&json!(null))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!(true)), Some(&json!(0))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!(99)), Some(&json!("a"))), Ordering::Less);
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let mut docs = vec![
            obj(json!({"id": 1, "g": "b", "n": 1})),
            obj(json!({"id": 2, "g": "a", "n": 1})),
            obj(json!({"id": 3, "g": "a", "n": 2})),
            obj(json!({"id": 4, "g": "b", "n": 1})),
        ];
        sort_documents(
            &mut docs,
            &[
                ("g".to_string(), SortDirection::Asc),
                ("n".to_string(), SortDirection::Desc),
            ],
        );
        let ids: Vec<_> = docs.iter().map(|d| d["id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(2), json!(1), json!(4)]);
    }
}
