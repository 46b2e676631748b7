//! Pipeline translation
//!
//! Order-preserving: stage `i` of the request becomes stage `i` of the
//! native pipeline. Facet branches use a restricted stage set that has no
//! nested `facet`.

use serde_json::{json, Map, Value};

use super::filter::DocumentTranslator;
use crate::adapter::QueryTranslator;
use crate::core::error::{QueryError, QueryResult};
use crate::request::{
    Accumulator, AccumulatorOp, Filter, GraphLookupSpec, GroupSpec, LookupSpec, SortDirection,
    SortSpec, Stage, Unwind,
};

/// Where a stage list sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Top,
    Facet,
}

impl DocumentTranslator {
    pub fn pipeline(&self, stages: &[Stage]) -> QueryResult<Vec<Value>> {
        self.stages(stages, Scope::Top)
    }

    fn stages(&self, stages: &[Stage], scope: Scope) -> QueryResult<Vec<Value>> {
        stages
            .iter()
            .map(|stage| self.stage(stage, scope))
            .collect()
    }

    fn stage(&self, stage: &Stage, scope: Scope) -> QueryResult<Value> {
        let translated = match stage {
            Stage::Match(filter) => json!({ "$match": self.filter(Some(filter))? }),
            Stage::Group(group) => json!({ "$group": self.group(group)? }),
            Stage::Sort(keys) => json!({ "$sort": sort_spec(keys)? }),
            Stage::Limit(n) => {
                if *n <= 0 {
                    return Err(QueryError::translation("`limit` must be positive"));
                }
                json!({ "$limit": n })
            }
            Stage::Skip(n) => {
                if *n < 0 {
                    return Err(QueryError::translation("`skip` must be non-negative"));
                }
                json!({ "$skip": n })
            }
            Stage::Project(fields) => json!({ "$project": fields }),
            Stage::Lookup(lookup) => json!({ "$lookup": self.lookup(lookup)? }),
            Stage::Unwind(unwind) => json!({ "$unwind": unwind_spec(unwind) }),
            Stage::AddFields(fields) => json!({ "$addFields": fields }),
            Stage::Count(field) => {
                if field.is_empty() || field.starts_with('$') || field.contains('.') {
                    return Err(QueryError::translation(format!(
                        "Invalid `count` output field: {:?}",
                        field
                    )));
                }
                json!({ "$count": field })
            }
            Stage::GraphLookup(spec) => json!({ "$graphLookup": self.graph_lookup(spec)? }),
            Stage::Facet(branches) => {
                if scope == Scope::Facet {
                    return Err(QueryError::translation(format!(
                        "Unsupported pipeline step in facet: {}",
                        stage.tag()
                    )));
                }
                let mut out = Map::new();
                for (name, branch) in branches {
                    let native = self.stages(branch, Scope::Facet)?;
                    out.insert(name.clone(), Value::Array(native));
                }
                json!({ "$facet": out })
            }
        };
        Ok(translated)
    }

    fn group(&self, group: &GroupSpec) -> QueryResult<Map<String, Value>> {
        let mut out = Map::new();
        out.insert("_id".into(), group_key(&group.id));

        for (name, accumulator) in &group.fields {
            if name == "_id" {
                return Err(QueryError::translation(
                    "`group` output field cannot be `_id`",
                ));
            }
            out.insert(name.clone(), accumulate(name, accumulator)?);
        }
        Ok(out)
    }

    fn lookup(&self, lookup: &LookupSpec) -> QueryResult<Map<String, Value>> {
        let mut out = Map::new();
        out.insert("from".into(), Value::String(lookup.from.clone()));

        match (&lookup.local_field, &lookup.foreign_field) {
            (Some(local), Some(foreign)) => {
                out.insert("localField".into(), Value::String(local.clone()));
                out.insert("foreignField".into(), Value::String(foreign.clone()));
            }
            _ if lookup.bindings.is_some() || lookup.pipeline.is_some() => {
                let bindings = lookup.bindings.clone().unwrap_or_default();
                let stages = lookup.pipeline.as_deref().unwrap_or_default();
                out.insert("let".into(), Value::Object(bindings));
                out.insert("pipeline".into(), Value::Array(self.pipeline(stages)?));
            }
            _ => {
                return Err(QueryError::translation(format!(
                    "Invalid lookup configuration on `{}`: expected `localField` and \
                     `foreignField`, or `let` with a `pipeline`",
                    lookup.from
                )))
            }
        }

        out.insert("as".into(), Value::String(lookup.output_field().to_string()));
        Ok(out)
    }

    fn graph_lookup(&self, spec: &GraphLookupSpec) -> QueryResult<Map<String, Value>> {
        let mut out = Map::new();
        out.insert("from".into(), Value::String(spec.from.clone()));
        out.insert("startWith".into(), spec.start_with.clone());
        out.insert(
            "connectFromField".into(),
            Value::String(spec.connect_from_field.clone()),
        );
        out.insert(
            "connectToField".into(),
            Value::String(spec.connect_to_field.clone()),
        );
        out.insert("as".into(), Value::String(spec.alias.clone()));

        if let Some(depth) = spec.max_depth {
            if depth < 0 {
                return Err(QueryError::translation(
                    "`graphLookup.maxDepth` must be non-negative",
                ));
            }
            out.insert("maxDepth".into(), json!(depth));
        }
        if let Some(field) = &spec.depth_field {
            out.insert("depthField".into(), Value::String(field.clone()));
        }
        if let Some(filter) = &spec.restrict_search_with_match {
            out.insert(
                "restrictSearchWithMatch".into(),
                Value::Object(self.filter(Some(filter))?),
            );
        }
        Ok(out)
    }
}

impl QueryTranslator for DocumentTranslator {
    type Predicate = Map<String, Value>;
    type Stage = Value;

    fn translate_filter(&self, filter: Option<&Filter>) -> QueryResult<Self::Predicate> {
        self.filter(filter)
    }

    fn translate_pipeline(&self, stages: &[Stage]) -> QueryResult<Vec<Self::Stage>> {
        self.pipeline(stages)
    }
}

/// `"field"` → `"$field"`; objects map each value the same way; `null`
/// and other literals pass through
fn group_key(id: &Value) -> Value {
    match id {
        Value::String(field) => Value::String(field_ref(field)),
        Value::Object(parts) => Value::Object(
            parts
                .iter()
                .map(|(k, v)| (k.clone(), group_key(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn accumulate(name: &str, accumulator: &Accumulator) -> QueryResult<Value> {
    let native_op = match accumulator.op {
        AccumulatorOp::Count => return Ok(json!({ "$sum": 1 })),
        AccumulatorOp::Sum => "$sum",
        AccumulatorOp::Avg => "$avg",
        AccumulatorOp::Min => "$min",
        AccumulatorOp::Max => "$max",
    };

    let field = accumulator.field.as_deref().ok_or_else(|| {
        QueryError::translation(format!(
            "`{}` accumulator for `{}` requires a `field`",
            accumulator.op.as_str(),
            name
        ))
    })?;

    let mut out = Map::new();
    out.insert(native_op.into(), Value::String(field_ref(field)));
    Ok(Value::Object(out))
}

fn sort_spec(keys: &[SortSpec]) -> QueryResult<Map<String, Value>> {
    if keys.is_empty() {
        return Err(QueryError::translation("`sort` requires at least one key"));
    }
    Ok(keys
        .iter()
        .map(|key| {
            let direction = match key.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            (key.field.clone(), json!(direction))
        })
        .collect())
}

fn unwind_spec(unwind: &Unwind) -> Value {
    match unwind {
        Unwind::Path(path) => Value::String(field_ref(path)),
        Unwind::Spec(spec) => {
            let mut out = Map::new();
            out.insert("path".into(), Value::String(field_ref(&spec.path)));
            if let Some(preserve) = spec.preserve_null_and_empty_arrays {
                out.insert("preserveNullAndEmptyArrays".into(), Value::Bool(preserve));
            }
            if let Some(index) = &spec.include_array_index {
                out.insert("includeArrayIndex".into(), Value::String(index.clone()));
            }
            Value::Object(out)
        }
    }
}

fn field_ref(field: &str) -> String {
    if field.starts_with('$') {
        field.to_string()
    } else {
        format!("${}", field)
    }
}
