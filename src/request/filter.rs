//! # Filter Predicate Tree
//!
//! A node is either a leaf condition `{field, op, value}` or a logical
//! composition `{and?, or?, not?}`. Decoding is strict: a node with neither
//! shape, with both shapes, or with an unknown operator is rejected.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::core::error::QueryError;

/// Leaf comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    /// Case-insensitive substring
    Search,
    /// Case-insensitive prefix
    StartsWith,
    /// Case-insensitive suffix
    EndsWith,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 11] = [
        FilterOperator::Eq,
        FilterOperator::Ne,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::In,
        FilterOperator::Nin,
        FilterOperator::Search,
        FilterOperator::StartsWith,
        FilterOperator::EndsWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Ne => "ne",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::In => "in",
            FilterOperator::Nin => "nin",
            FilterOperator::Search => "search",
            FilterOperator::StartsWith => "startsWith",
            FilterOperator::EndsWith => "endsWith",
        }
    }

    /// Operators whose value must be a list
    pub fn takes_list(&self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::Nin)
    }

    /// Operators whose value is matched as text
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            FilterOperator::Search | FilterOperator::StartsWith | FilterOperator::EndsWith
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterOperator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| QueryError::translation(format!("Unsupported filter operation: {}", s)))
    }
}

/// Leaf comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub field: String,
    pub op: FilterOperator,
    pub value: Value,
}

/// Boolean composition; keys present on one node combine conjunctively
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogicalFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<Filter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<Filter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<Filter>>,
}

/// A predicate tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Filter {
    Condition(Condition),
    Logical(LogicalFilter),
}

impl Filter {
    pub fn condition(field: impl Into<String>, op: FilterOperator, value: Value) -> Self {
        Filter::Condition(Condition {
            field: field.into(),
            op,
            value,
        })
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::condition(field, FilterOperator::Eq, value)
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::Logical(LogicalFilter {
            and: Some(filters),
            ..LogicalFilter::default()
        })
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Logical(LogicalFilter {
            or: Some(filters),
            ..LogicalFilter::default()
        })
    }

    pub fn not(filter: Filter) -> Self {
        Filter::Logical(LogicalFilter {
            not: Some(Box::new(filter)),
            ..LogicalFilter::default()
        })
    }

    /// Conjoin another predicate onto this one
    pub fn and_also(self, other: Filter) -> Self {
        match self {
            Filter::Logical(LogicalFilter {
                and: Some(mut children),
                or: None,
                not: None,
            }) => {
                children.push(other);
                Filter::and(children)
            }
            current => Filter::and(vec![current, other]),
        }
    }

    /// Strictly decode a node from a JSON object
    pub fn from_map(mut map: Map<String, Value>) -> Result<Self, QueryError> {
        if map.contains_key("field") {
            return Condition::from_map(map).map(Filter::Condition);
        }

        let and = map.remove("and").map(Self::list_from_value).transpose()?;
        let or = map.remove("or").map(Self::list_from_value).transpose()?;
        let not = map
            .remove("not")
            .map(|v| Self::from_value(v).map(Box::new))
            .transpose()?;

        if let Some(key) = map.keys().next() {
            return Err(QueryError::translation(format!(
                "Unknown filter key `{}`",
                key
            )));
        }

        if and.is_none() && or.is_none() && not.is_none() {
            return Err(QueryError::translation(
                "Filter node must carry `field` or one of `and`, `or`, `not`",
            ));
        }

        Ok(Filter::Logical(LogicalFilter { and, or, not }))
    }

    pub fn from_value(value: Value) -> Result<Self, QueryError> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(QueryError::translation(format!(
                "Filter node must be an object, got {}",
                other
            ))),
        }
    }

    fn list_from_value(value: Value) -> Result<Vec<Filter>, QueryError> {
        match value {
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            _ => Err(QueryError::translation(
                "`and`/`or` must hold a list of filters",
            )),
        }
    }
}

impl Condition {
    fn from_map(mut map: Map<String, Value>) -> Result<Self, QueryError> {
        let field = match map.remove("field") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => {
                return Err(QueryError::translation(
                    "Filter `field` must be a non-empty string",
                ))
            }
        };

        let op = match map.remove("op").or_else(|| map.remove("operator")) {
            Some(Value::String(s)) => s.parse::<FilterOperator>()?,
            _ => {
                return Err(QueryError::translation(format!(
                    "Filter on `{}` is missing `op`",
                    field
                )))
            }
        };

        let value = map.remove("value").ok_or_else(|| {
            QueryError::translation(format!("Filter on `{}` is missing `value`", field))
        })?;

        if let Some(key) = map.keys().next() {
            return Err(QueryError::translation(format!(
                "Filter on `{}` mixes a condition with `{}`",
                field, key
            )));
        }

        if op.takes_list() && !value.is_array() {
            return Err(QueryError::translation(format!(
                "`{}` on `{}` requires a list value",
                op, field
            )));
        }

        if op.is_pattern() && !value.is_string() {
            return Err(QueryError::translation(format!(
                "`{}` on `{}` requires a string value",
                op, field
            )));
        }

        Ok(Self { field, op, value })
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Filter::from_value(value).map_err(D::Error::custom)
    }
}
