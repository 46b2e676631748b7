//! Aggregation Pipeline Stages
//!
//! Each stage is a single-key object on the wire, e.g. `{"match": {...}}`.
//! Unknown stage tags fail to decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::filter::Filter;
use super::SortSpec;

/// One step of an aggregation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Match(Filter),
    Group(GroupSpec),
    Sort(Vec<SortSpec>),
    Limit(i64),
    Skip(i64),
    /// field -> keep (1/true) or drop (0/false)
    Project(Map<String, Value>),
    Lookup(LookupSpec),
    Unwind(Unwind),
    AddFields(Map<String, Value>),
    /// Name of the output field holding the count
    Count(String),
    GraphLookup(GraphLookupSpec),
    /// Named sub-pipelines run over the same input
    Facet(BTreeMap<String, Vec<Stage>>),
}

impl Stage {
    /// Wire tag of the stage
    pub fn tag(&self) -> &'static str {
        match self {
            Stage::Match(_) => "match",
            Stage::Group(_) => "group",
            Stage::Sort(_) => "sort",
            Stage::Limit(_) => "limit",
            Stage::Skip(_) => "skip",
            Stage::Project(_) => "project",
            Stage::Lookup(_) => "lookup",
            Stage::Unwind(_) => "unwind",
            Stage::AddFields(_) => "addFields",
            Stage::Count(_) => "count",
            Stage::GraphLookup(_) => "graphLookup",
            Stage::Facet(_) => "facet",
        }
    }
}

/// Grouping key plus accumulated output fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Field name, `null`, or an object of output key -> field name
    #[serde(rename = "_id")]
    pub id: Value,

    #[serde(default)]
    pub fields: BTreeMap<String, Accumulator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumulatorOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AccumulatorOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccumulatorOp::Count => "count",
            AccumulatorOp::Sum => "sum",
            AccumulatorOp::Avg => "avg",
            AccumulatorOp::Min => "min",
            AccumulatorOp::Max => "max",
        }
    }
}

/// One output field of a group; `count` ignores `field`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    pub op: AccumulatorOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Accumulator {
    pub fn count() -> Self {
        Self {
            op: AccumulatorOp::Count,
            field: None,
        }
    }

    pub fn over(op: AccumulatorOp, field: impl Into<String>) -> Self {
        Self {
            op,
            field: Some(field.into()),
        }
    }
}

/// Join description. Either the equality form (`localField` +
/// `foreignField`) or the sub-pipeline form (`let` + `pipeline`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupSpec {
    pub from: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_field: Option<String>,

    #[serde(rename = "let", default, skip_serializing_if = "Option::is_none")]
    pub bindings: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<Stage>>,

    /// Output alias, defaults to `from`
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl LookupSpec {
    pub fn equality(
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            local_field: Some(local_field.into()),
            foreign_field: Some(foreign_field.into()),
            bindings: None,
            pipeline: None,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn output_field(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.from)
    }
}

/// Either a bare path or a structured unwind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Unwind {
    Path(String),
    Spec(UnwindSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwindSpec {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_null_and_empty_arrays: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_array_index: Option<String>,
}

/// Recursive self/foreign-collection traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLookupSpec {
    pub from: String,
    /// Starting expression, usually a `$field` reference
    pub start_with: Value,
    pub connect_from_field: String,
    pub connect_to_field: String,
    #[serde(rename = "as")]
    pub alias: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict_search_with_match: Option<Filter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_parsing() {
        let stages: Vec<Stage> = serde_json::from_value(json!([
            {"match": {"field": "status", "op": "eq", "value": "paid"}},
            {"group": {"_id": "customer", "fields": {"total": {"op": "sum", "field": "amount"}}}},
            {"sort": [{"field": "total", "direction": "desc"}]},
            {"limit": 5}
        ]))
        .unwrap();

        let tags: Vec<_> = stages.iter().map(Stage::tag).collect();
        assert_eq!(tags, vec!["match", "group", "sort", "limit"]);
    }

    #[test]
    fn test_unknown_stage_tag_rejected() {
        let err = serde_json::from_value::<Stage>(json!({"bucket": {"groupBy": "$x"}})).unwrap_err();
        assert!(err.to_string().contains("bucket"));
    }

    #[test]
    fn test_unwind_forms() {
        let bare: Stage = serde_json::from_value(json!({"unwind": "tags"})).unwrap();
        assert_eq!(bare, Stage::Unwind(Unwind::Path("tags".into())));

        let spec: Stage = serde_json::from_value(json!({
            "unwind": {"path": "tags", "preserveNullAndEmptyArrays": false}
        }))
        .unwrap();
        match spec {
            Stage::Unwind(Unwind::Spec(s)) => {
                assert_eq!(s.preserve_null_and_empty_arrays, Some(false));
                assert!(s.include_array_index.is_none());
            }
            other => panic!("unexpected stage {:?}", other),
        }
    }

    #[test]
    fn test_lookup_alias_defaults_to_from() {
        let lookup = LookupSpec::equality("orders", "_id", "userId");
        assert_eq!(lookup.output_field(), "orders");
        assert_eq!(lookup.with_alias("purchases").output_field(), "purchases");
    }

    #[test]
    fn test_facet_parsing() {
        let stage: Stage = serde_json::from_value(json!({
            "facet": {
                "byStatus": [{"group": {"_id": "status", "fields": {"n": {"op": "count"}}}}],
                "top": [{"sort": [{"field": "amount", "direction": "desc"}]}, {"limit": 3}]
            }
        }))
        .unwrap();

        match stage {
            Stage::Facet(branches) => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches["top"].len(), 2);
            }
            other => panic!("unexpected stage {:?}", other),
        }
    }
}
