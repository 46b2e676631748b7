//! Filter translation
//!
//! Leaf:    `{field, op, value}`  → `{field: {"$op": value}}`
//! Pattern: `search|startsWith|endsWith` → `{field: {"$regex", "$options": "i"}}`
//! Logical: `and|or|not` → `$and|$or|$nor` on one object (conjunctive)
//! Absent:  `{}` (matches every record)

use serde_json::{json, Map, Value};

use crate::core::error::{QueryError, QueryResult};
use crate::request::{Condition, Filter, FilterOperator, LogicalFilter};

/// Translates the uniform request model into document-store queries
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentTranslator;

impl DocumentTranslator {
    pub fn new() -> Self {
        Self
    }

    /// `None` is the match-everything predicate
    pub fn filter(&self, filter: Option<&Filter>) -> QueryResult<Map<String, Value>> {
        match filter {
            None => Ok(Map::new()),
            Some(filter) => self.node(filter),
        }
    }

    fn node(&self, filter: &Filter) -> QueryResult<Map<String, Value>> {
        match filter {
            Filter::Condition(condition) => self.condition(condition),
            Filter::Logical(logical) => self.logical(logical),
        }
    }

    fn condition(&self, condition: &Condition) -> QueryResult<Map<String, Value>> {
        let Condition { field, op, value } = condition;

        if op.takes_list() && !value.is_array() {
            return Err(QueryError::translation(format!(
                "`{}` on `{}` requires a list value",
                op, field
            )));
        }

        let comparator = match op {
            FilterOperator::Eq => json!({ "$eq": value }),
            FilterOperator::Ne => json!({ "$ne": value }),
            FilterOperator::Gt => json!({ "$gt": value }),
            FilterOperator::Gte => json!({ "$gte": value }),
            FilterOperator::Lt => json!({ "$lt": value }),
            FilterOperator::Lte => json!({ "$lte": value }),
            FilterOperator::In => json!({ "$in": value }),
            FilterOperator::Nin => json!({ "$nin": value }),
            FilterOperator::Search | FilterOperator::StartsWith | FilterOperator::EndsWith => {
                let text = value.as_str().ok_or_else(|| {
                    QueryError::translation(format!(
                        "`{}` on `{}` requires a string value",
                        op, field
                    ))
                })?;
                json!({ "$regex": pattern(*op, text), "$options": "i" })
            }
        };

        let mut out = Map::new();
        out.insert(field.clone(), comparator);
        Ok(out)
    }

    fn logical(&self, logical: &LogicalFilter) -> QueryResult<Map<String, Value>> {
        let mut out = Map::new();

        if let Some(children) = &logical.and {
            out.insert("$and".into(), self.children("and", children)?);
        }
        if let Some(children) = &logical.or {
            out.insert("$or".into(), self.children("or", children)?);
        }
        if let Some(child) = &logical.not {
            let negated = self.node(child)?;
            out.insert("$nor".into(), Value::Array(vec![Value::Object(negated)]));
        }

        if out.is_empty() {
            return Err(QueryError::translation(
                "Filter node must carry `field` or one of `and`, `or`, `not`",
            ));
        }
        Ok(out)
    }

    fn children(&self, key: &str, children: &[Filter]) -> QueryResult<Value> {
        if children.is_empty() {
            return Err(QueryError::translation(format!(
                "`{}` requires at least one filter",
                key
            )));
        }
        children
            .iter()
            .map(|child| self.node(child).map(Value::Object))
            .collect::<QueryResult<Vec<_>>>()
            .map(Value::Array)
    }
}

/// The user's text is a literal; only the anchors are pattern syntax
fn pattern(op: FilterOperator, text: &str) -> String {
    let escaped = regex::escape(text);
    match op {
        FilterOperator::StartsWith => format!("^{}", escaped),
        FilterOperator::EndsWith => format!("{}$", escaped),
        _ => escaped,
    }
}
