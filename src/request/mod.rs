//! Request Model
//!
//! The uniform operation descriptor every caller hands to the engine.
//! Filters and pipeline stages are explicit sum types so every adapter
//! matches them exhaustively.

mod filter;
mod stage;

pub use filter::{Condition, Filter, FilterOperator, LogicalFilter};
pub use stage::{
    Accumulator, AccumulatorOp, GraphLookupSpec, GroupSpec, LookupSpec, Stage, Unwind,
    UnwindSpec,
};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{QueryError, QueryResult};

/// The seven operations a request can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
    Count,
    Aggregate,
}

impl Operation {
    /// Every operation, in dispatch order
    pub const ALL: [Operation; 7] = [
        Operation::List,
        Operation::Get,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::Count,
        Operation::Aggregate,
    ];

    /// Wire name of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Count => "count",
            Operation::Aggregate => "aggregate",
        }
    }

    /// Whether the operation writes to the backend
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Delete
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| QueryError::shape(format!("Unsupported operation type: {}", s)))
    }
}

/// A single data operation against one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Operation kind (wire name `type`)
    #[serde(rename = "type", alias = "operation")]
    pub operation: Operation,

    /// Logical collection the request targets
    pub entity: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Payload for create/update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    /// Predicate tree; `null` decodes to no filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<QueryOptions>,

    /// Aggregation stages, used only by `aggregate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<Stage>>,
}

impl Request {
    /// Create a bare request for an operation on an entity
    pub fn new(operation: Operation, entity: impl Into<String>) -> Self {
        Self {
            operation,
            entity: entity.into(),
            id: None,
            data: None,
            filter: None,
            options: None,
            pipeline: None,
        }
    }

    pub fn list(entity: impl Into<String>) -> Self {
        Self::new(Operation::List, entity)
    }

    pub fn get(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(Operation::Get, entity).with_id(id)
    }

    pub fn create(entity: impl Into<String>, data: Value) -> Self {
        Self::new(Operation::Create, entity).with_data(data)
    }

    pub fn update(entity: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        Self::new(Operation::Update, entity)
            .with_id(id)
            .with_data(data)
    }

    pub fn delete(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(Operation::Delete, entity).with_id(id)
    }

    pub fn count(entity: impl Into<String>) -> Self {
        Self::new(Operation::Count, entity)
    }

    pub fn aggregate(entity: impl Into<String>, pipeline: Vec<Stage>) -> Self {
        Self::new(Operation::Aggregate, entity).with_pipeline(pipeline)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a payload; non-object values are ignored
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = Some(map);
        }
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Vec<Stage>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Decode a request from its JSON form.
    ///
    /// Checks the envelope shape first so a missing `entity` or `type` is
    /// reported as a contract violation rather than a serde message.
    pub fn from_value(value: Value) -> QueryResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| QueryError::shape("request must be a JSON object"))?;

        match obj.get("entity") {
            Some(Value::String(s)) if !s.is_empty() => {}
            _ => return Err(QueryError::shape("`entity` (string) is required")),
        }

        let op = obj.get("type").or_else(|| obj.get("operation"));
        match op {
            Some(Value::String(s)) if !s.is_empty() => {
                s.parse::<Operation>()?;
            }
            _ => return Err(QueryError::shape("`type` (operation) is required")),
        }

        match obj.get("options") {
            None | Some(Value::Null) | Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(QueryError::shape("`options` must be an object if provided"))
            }
        }

        serde_json::from_value(value).map_err(QueryError::from)
    }

    /// Convert back to the JSON wire form
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Relation expansion for a reference field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Populate {
    /// Field holding an id (or array of ids)
    pub field: String,

    /// Entity the ids refer to; defaults to `field`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub populate: Option<Vec<Populate>>,
}

impl Populate {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            from: None,
            select: None,
            populate: None,
        }
    }

    pub fn from_entity(mut self, entity: impl Into<String>) -> Self {
        self.from = Some(entity.into());
        self
    }

    /// Entity the reference resolves against
    pub fn target(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.field)
    }
}

/// Read options. `sort`, `select` and `populate` accept a single value
/// where a list is expected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub sort: Option<Vec<SortSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub select: Option<Vec<String>>,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub populate: Option<Vec<Populate>>,
}

impl QueryOptions {
    pub fn paged(limit: i64, page: i64) -> Self {
        Self {
            limit: Some(limit),
            page: Some(page),
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<OneOrMany<T>> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    }))
}
