//! Native query evaluator
//!
//! Compiles a document-store query object once into a predicate tree, then
//! tests records against it.
//!
//! Absent fields: `$eq $gt $gte $lt $lte $in $regex` never match an absent
//! field. `$ne` and `$nin` are the exact complements of `$eq` and `$in`, so
//! they do match it, and `$nor` matches whatever its children reject.
//! An array field matches when the array itself or any element satisfies
//! the comparator.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use super::values::{candidates, compare_values, get_path, values_equal};
use crate::core::error::{QueryError, QueryResult};

#[derive(Debug, Clone)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Nor(Vec<Node>),
    Field { path: String, test: Test },
}

#[derive(Debug, Clone)]
enum Test {
    Eq(Value),
    Ne(Value),
    Range(Ordering, bool, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Regex(Regex),
}

/// A compiled query
#[derive(Debug, Clone)]
pub struct Matcher {
    root: Node,
}

impl Matcher {
    pub fn compile(query: &Map<String, Value>) -> QueryResult<Self> {
        Ok(Self {
            root: compile_object(query)?,
        })
    }

    /// Compile a query given as any JSON value; it must be an object
    pub fn compile_value(query: &Value) -> QueryResult<Self> {
        match query {
            Value::Object(map) => Self::compile(map),
            other => Err(QueryError::backend(format!(
                "query must be an object, got {}",
                other
            ))),
        }
    }

    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        eval(&self.root, doc)
    }
}

fn compile_object(query: &Map<String, Value>) -> QueryResult<Node> {
    let mut nodes = Vec::with_capacity(query.len());

    for (key, value) in query {
        let node = match key.as_str() {
            "$and" => Node::And(compile_list(key, value)?),
            "$or" => Node::Or(compile_list(key, value)?),
            "$nor" => Node::Nor(compile_list(key, value)?),
            op if op.starts_with('$') => {
                return Err(QueryError::backend(format!(
                    "unknown top level operator: {}",
                    op
                )))
            }
            field => compile_field(field, value)?,
        };
        nodes.push(node);
    }

    Ok(match nodes.len() {
        1 => nodes.remove(0),
        _ => Node::And(nodes),
    })
}

fn compile_list(key: &str, value: &Value) -> QueryResult<Vec<Node>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| QueryError::backend(format!("{} must be a nonempty array", key)))?;

    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => compile_object(map),
            _ => Err(QueryError::backend(format!(
                "{} entries must be objects",
                key
            ))),
        })
        .collect()
}

fn compile_field(field: &str, spec: &Value) -> QueryResult<Node> {
    let operators = match spec {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
        literal => {
            return Ok(Node::Field {
                path: field.to_string(),
                test: Test::Eq(literal.clone()),
            })
        }
    };

    let mut tests = Vec::new();
    for (op, operand) in operators {
        let test = match op.as_str() {
            "$eq" => Test::Eq(operand.clone()),
            "$ne" => Test::Ne(operand.clone()),
            "$gt" => Test::Range(Ordering::Greater, false, operand.clone()),
            "$gte" => Test::Range(Ordering::Greater, true, operand.clone()),
            "$lt" => Test::Range(Ordering::Less, false, operand.clone()),
            "$lte" => Test::Range(Ordering::Less, true, operand.clone()),
            "$in" => Test::In(list_operand(op, operand)?),
            "$nin" => Test::Nin(list_operand(op, operand)?),
            "$regex" => Test::Regex(compile_regex(operand, operators.get("$options"))?),
            "$options" => continue,
            other => {
                return Err(QueryError::backend(format!("unknown operator: {}", other)));
            }
        };
        tests.push(Node::Field {
            path: field.to_string(),
            test,
        });
    }

    Ok(match tests.len() {
        1 => tests.remove(0),
        _ => Node::And(tests),
    })
}

fn list_operand(op: &str, operand: &Value) -> QueryResult<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| QueryError::backend(format!("{} needs an array", op)))
}

fn compile_regex(pattern: &Value, options: Option<&Value>) -> QueryResult<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| QueryError::backend("$regex has to be a string"))?;
    let options = options.and_then(Value::as_str).unwrap_or_default();

    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| QueryError::backend(format!("invalid $regex: {}", e)))
}

fn eval(node: &Node, doc: &Map<String, Value>) -> bool {
    match node {
        Node::And(children) => children.iter().all(|c| eval(c, doc)),
        Node::Or(children) => children.iter().any(|c| eval(c, doc)),
        Node::Nor(children) => !children.iter().any(|c| eval(c, doc)),
        Node::Field { path, test } => test_field(test, get_path(doc, path)),
    }
}

fn test_field(test: &Test, actual: Option<&Value>) -> bool {
    match test {
        Test::Eq(expected) => equals(actual, expected),
        Test::Ne(expected) => !equals(actual, expected),
        Test::In(list) => list.iter().any(|expected| equals(actual, expected)),
        Test::Nin(list) => !list.iter().any(|expected| equals(actual, expected)),
        Test::Range(direction, inclusive, bound) => actual.map_or(false, |value| {
            candidates(value).any(|c| match compare_values(c, bound) {
                Some(Ordering::Equal) => *inclusive,
                Some(ordering) => ordering == *direction,
                None => false,
            })
        }),
        Test::Regex(re) => actual.map_or(false, |value| {
            candidates(value).any(|c| c.as_str().map_or(false, |s| re.is_match(s)))
        }),
    }
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    actual.map_or(false, |value| {
        candidates(value).any(|c| values_equal(c, expected))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn matches(query: Value, record: Value) -> bool {
        Matcher::compile_value(&query).unwrap().matches(&doc(record))
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(matches(json!({}), json!({"a": 1})));
        assert!(matches(json!({}), json!({})));
    }

    #[test]
    fn test_range() {
        let q = json!({"$and": [{"age": {"$gte": 18}}, {"age": {"$lt": 65}}]});
        assert!(matches(q.clone(), json!({"age": 18})));
        assert!(matches(q.clone(), json!({"age": 64.5})));
        assert!(!matches(q.clone(), json!({"age": 65})));
        assert!(!matches(q.clone(), json!({"age": "30"})));
        assert!(!matches(q, json!({})));
    }

    #[test]
    fn test_absent_field_policy() {
        assert!(!matches(json!({"x": {"$eq": 1}}), json!({})));
        assert!(matches(json!({"x": {"$ne": 1}}), json!({})));
        assert!(!matches(json!({"x": {"$in": [1]}}), json!({})));
        assert!(matches(json!({"x": {"$nin": [1]}}), json!({})));
        assert!(matches(json!({"$nor": [{"x": {"$eq": 1}}]}), json!({})));
        assert!(!matches(json!({"$nor": [{"x": {"$eq": 1}}]}), json!({"x": 1})));
    }

    #[test]
    fn test_regex_options() {
        let q = json!({"name": {"$regex": "^al", "$options": "i"}});
        assert!(matches(q.clone(), json!({"name": "Alice"})));
        assert!(!matches(q.clone(), json!({"name": "Sal"})));
        assert!(!matches(q, json!({"name": 5})));
    }

    #[test]
    fn test_array_fields() {
        assert!(matches(json!({"tags": {"$eq": "a"}}), json!({"tags": ["b", "a"]})));
        assert!(matches(json!({"tags": {"$eq": ["b", "a"]}}), json!({"tags": ["b", "a"]})));
        assert!(!matches(json!({"tags": {"$ne": "a"}}), json!({"tags": ["a"]})));
    }

    #[test]
    fn test_literal_and_dotted_fields() {
        assert!(matches(json!({"a.b": 2}), json!({"a": {"b": 2}})));
        assert!(matches(json!({"a": {"b": 2}}), json!({"a": {"b": 2}})));
    }

    #[test]
    fn test_bad_queries() {
        assert!(Matcher::compile_value(&json!({"$where": "1"})).is_err());
        assert!(Matcher::compile_value(&json!({"a": {"$like": 1}})).is_err());
        assert!(Matcher::compile_value(&json!({"$and": []})).is_err());
        assert!(Matcher::compile_value(&json!({"a": {"$regex": "("}})).is_err());
        assert!(Matcher::compile_value(&json!([1])).is_err());
    }
}
