//! Native aggregation runner
//!
//! Executes a translated pipeline over in-memory records. Each stage
//! consumes the previous stage's output; nothing is reordered.
//!
//! Expressions: `"$field"` reads a (dotted) field of the current record,
//! `"$$name"` reads a `let` binding, `"$$ROOT"` is the whole record.
//! Arrays and plain objects are evaluated element-wise; anything else is a
//! literal.

use std::collections::HashMap;

use serde_json::{json, Map, Number, Value};

use super::matcher::Matcher;
use super::registry::{Document, EntityRegistry};
use super::values::{
    candidates, get_path, remove_path, set_path, sort_documents, sort_order, values_equal,
};
use crate::core::error::{QueryError, QueryResult};
use crate::request::SortDirection;

type Vars = Map<String, Value>;

/// Runs native pipelines against the collections of one registry
#[derive(Clone, Copy)]
pub struct AggregationRunner<'a> {
    registry: &'a EntityRegistry,
    in_facet: bool,
}

impl<'a> AggregationRunner<'a> {
    pub fn new(registry: &'a EntityRegistry) -> Self {
        Self {
            registry,
            in_facet: false,
        }
    }

    pub fn run(&self, stages: &[Value], input: Vec<Document>) -> QueryResult<Vec<Document>> {
        stages
            .iter()
            .try_fold(input, |docs, stage| self.stage(stage, docs))
    }

    fn stage(&self, stage: &Value, docs: Vec<Document>) -> QueryResult<Vec<Document>> {
        let (name, spec) = single_entry(stage)?;
        match name {
            "$match" => {
                let matcher = Matcher::compile_value(spec)?;
                Ok(docs.into_iter().filter(|d| matcher.matches(d)).collect())
            }
            "$group" => group(spec, docs),
            "$sort" => sort(spec, docs),
            "$limit" => {
                let n = spec
                    .as_u64()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| QueryError::backend("the limit must be positive"))?;
                Ok(docs.into_iter().take(n as usize).collect())
            }
            "$skip" => {
                let n = spec
                    .as_u64()
                    .ok_or_else(|| QueryError::backend("the skip must be non-negative"))?;
                Ok(docs.into_iter().skip(n as usize).collect())
            }
            "$project" => project(spec, docs),
            "$lookup" => self.lookup(spec, docs),
            "$unwind" => unwind(spec, docs),
            "$addFields" => add_fields(spec, docs),
            "$count" => count(spec, docs),
            "$graphLookup" => self.graph_lookup(spec, docs),
            "$facet" => self.facet(spec, docs),
            other => Err(QueryError::backend(format!(
                "Unrecognized pipeline stage name: '{}'",
                other
            ))),
        }
    }

    fn lookup(&self, spec: &Value, mut docs: Vec<Document>) -> QueryResult<Vec<Document>> {
        let spec = object(spec, "$lookup")?;
        let from = string_field(spec, "from", "$lookup")?;
        let alias = string_field(spec, "as", "$lookup")?;
        let foreign = self.registry.collection(from)?;

        let local = spec.get("localField").and_then(Value::as_str);
        let remote = spec.get("foreignField").and_then(Value::as_str);

        if let (Some(local), Some(remote)) = (local, remote) {
            for doc in &mut docs {
                let key = get_path(doc, local).cloned().unwrap_or(Value::Null);
                let joined: Vec<Value> = foreign
                    .iter()
                    .filter(|f| join_match(&key, get_path(f, remote).unwrap_or(&Value::Null)))
                    .cloned()
                    .map(Value::Object)
                    .collect();
                set_path(doc, alias, Value::Array(joined));
            }
            return Ok(docs);
        }

        let stages = spec
            .get("pipeline")
            .and_then(Value::as_array)
            .ok_or_else(|| QueryError::backend("$lookup requires either localField/foreignField or pipeline"))?;
        let bindings = spec.get("let").and_then(Value::as_object);
        let inner = Self {
            in_facet: false,
            ..*self
        };

        for doc in &mut docs {
            let mut vars = Vars::new();
            if let Some(bindings) = bindings {
                for (name, expr) in bindings {
                    let value = eval(expr, doc, &Vars::new())?.unwrap_or(Value::Null);
                    vars.insert(name.clone(), value);
                }
            }
            let bound: Vec<Value> = stages.iter().map(|s| substitute(s, &vars)).collect();
            let joined = inner.run(&bound, foreign.documents().to_vec())?;
            set_path(
                doc,
                alias,
                Value::Array(joined.into_iter().map(Value::Object).collect()),
            );
        }
        Ok(docs)
    }

    fn graph_lookup(&self, spec: &Value, mut docs: Vec<Document>) -> QueryResult<Vec<Document>> {
        let spec = object(spec, "$graphLookup")?;
        let from = string_field(spec, "from", "$graphLookup")?;
        let connect_from = string_field(spec, "connectFromField", "$graphLookup")?;
        let connect_to = string_field(spec, "connectToField", "$graphLookup")?;
        let alias = string_field(spec, "as", "$graphLookup")?;
        let start_with = spec
            .get("startWith")
            .ok_or_else(|| QueryError::backend("$graphLookup requires 'startWith'"))?;
        let max_depth = match spec.get("maxDepth") {
            None => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                QueryError::backend("$graphLookup maxDepth must be a non-negative integer")
            })?),
        };
        let depth_field = spec.get("depthField").and_then(Value::as_str);
        let restrict = spec
            .get("restrictSearchWithMatch")
            .map(Matcher::compile_value)
            .transpose()?;

        let foreign = self.registry.collection(from)?;

        for doc in &mut docs {
            let start = eval(start_with, doc, &Vars::new())?.unwrap_or(Value::Null);
            let mut frontier = flatten(start);
            let mut visited = vec![false; foreign.len()];
            let mut found = Vec::new();
            let mut depth: u64 = 0;

            while !frontier.is_empty() && max_depth.map_or(true, |max| depth <= max) {
                let mut next = Vec::new();
                for (i, candidate) in foreign.iter().enumerate() {
                    if visited[i] || restrict.as_ref().map_or(false, |r| !r.matches(candidate)) {
                        continue;
                    }
                    let Some(target) = get_path(candidate, connect_to) else {
                        continue;
                    };
                    if !frontier.iter().any(|v| join_match(v, target)) {
                        continue;
                    }

                    visited[i] = true;
                    if let Some(link) = get_path(candidate, connect_from) {
                        next.extend(flatten(link.clone()));
                    }
                    let mut hit = candidate.clone();
                    if let Some(field) = depth_field {
                        set_path(&mut hit, field, json!(depth));
                    }
                    found.push(Value::Object(hit));
                }
                frontier = next;
                depth += 1;
            }

            set_path(doc, alias, Value::Array(found));
        }
        Ok(docs)
    }

    fn facet(&self, spec: &Value, docs: Vec<Document>) -> QueryResult<Vec<Document>> {
        if self.in_facet {
            return Err(QueryError::backend(
                "$facet is not allowed to be used within a $facet stage",
            ));
        }
        let spec = object(spec, "$facet")?;
        let branch_runner = Self {
            in_facet: true,
            ..*self
        };

        let mut out = Document::new();
        for (name, stages) in spec {
            let stages = stages.as_array().ok_or_else(|| {
                QueryError::backend(format!("$facet branch '{}' must be an array", name))
            })?;
            let results = branch_runner.run(stages, docs.clone())?;
            out.insert(
                name.clone(),
                Value::Array(results.into_iter().map(Value::Object).collect()),
            );
        }
        Ok(vec![out])
    }
}

fn single_entry(stage: &Value) -> QueryResult<(&str, &Value)> {
    match stage.as_object() {
        Some(map) if map.len() == 1 => map
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| QueryError::backend("empty pipeline stage")),
        _ => Err(QueryError::backend(
            "A pipeline stage specification object must contain exactly one field",
        )),
    }
}

fn object<'v>(spec: &'v Value, stage: &str) -> QueryResult<&'v Map<String, Value>> {
    spec.as_object()
        .ok_or_else(|| QueryError::backend(format!("{} specification must be an object", stage)))
}

fn string_field<'v>(spec: &'v Map<String, Value>, key: &str, stage: &str) -> QueryResult<&'v str> {
    spec.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| QueryError::backend(format!("{} requires string '{}'", stage, key)))
}

/// Evaluate an expression against `doc`; `None` means the referenced field is absent
fn eval(expr: &Value, doc: &Document, vars: &Vars) -> QueryResult<Option<Value>> {
    match expr {
        Value::String(s) if s.starts_with("$$") => Ok(resolve_var(&s[2..], doc, vars)),
        Value::String(s) if s.starts_with('$') => Ok(get_path(doc, &s[1..]).cloned()),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, doc, vars)?.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(out)))
        }
        Value::Object(map) => {
            if let Some(op) = map.keys().find(|k| k.starts_with('$')) {
                return Err(QueryError::backend(format!(
                    "Unrecognized expression '{}'",
                    op
                )));
            }
            let mut out = Map::new();
            for (key, value) in map {
                if let Some(v) = eval(value, doc, vars)? {
                    out.insert(key.clone(), v);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        literal => Ok(Some(literal.clone())),
    }
}

fn resolve_var(reference: &str, doc: &Document, vars: &Vars) -> Option<Value> {
    let (name, path) = match reference.split_once('.') {
        Some((name, path)) => (name, Some(path)),
        None => (reference, None),
    };

    let root = match vars.get(name) {
        Some(value) => value.clone(),
        None if name == "ROOT" => Value::Object(doc.clone()),
        None => return None,
    };

    match path {
        None => Some(root),
        Some(path) => root.as_object().and_then(|m| get_path(m, path)).cloned(),
    }
}

/// Replace every bound `"$$name"` string inside a stage
fn substitute(stage: &Value, vars: &Vars) -> Value {
    match stage {
        Value::String(s) if s.starts_with("$$") => {
            let reference = &s[2..];
            let name = reference.split('.').next().unwrap_or(reference);
            if vars.contains_key(name) {
                resolve_var(reference, &Document::new(), vars).unwrap_or(Value::Null)
            } else {
                stage.clone()
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(|i| substitute(i, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn join_match(local: &Value, foreign: &Value) -> bool {
    candidates(local).any(|l| candidates(foreign).any(|f| values_equal(l, f)))
}

fn flatten(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.into_iter().filter(|v| !v.is_null()).collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[derive(Debug)]
enum Accumulator {
    Sum { int: i64, float: f64, is_float: bool },
    Avg { total: f64, n: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    fn new(op: &str) -> QueryResult<Self> {
        Ok(match op {
            "$sum" => Accumulator::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
            "$avg" => Accumulator::Avg { total: 0.0, n: 0 },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            other => {
                return Err(QueryError::backend(format!(
                    "unknown group operator '{}'",
                    other
                )))
            }
        })
    }

    fn push(&mut self, value: Option<Value>) {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return;
        };
        match self {
            Accumulator::Sum {
                int,
                float,
                is_float,
            } => {
                if let Some(i) = value.as_i64() {
                    match int.checked_add(i) {
                        Some(sum) => *int = sum,
                        None => {
                            *float += i as f64;
                            *is_float = true;
                        }
                    }
                } else if let Some(f) = value.as_f64() {
                    *float += f;
                    *is_float = true;
                }
            }
            Accumulator::Avg { total, n } => {
                if let Some(f) = value.as_f64() {
                    *total += f;
                    *n += 1;
                }
            }
            Accumulator::Min(current) => {
                if current
                    .as_ref()
                    .map_or(true, |c| sort_order(Some(&value), Some(c)).is_lt())
                {
                    *current = Some(value);
                }
            }
            Accumulator::Max(current) => {
                if current
                    .as_ref()
                    .map_or(true, |c| sort_order(Some(&value), Some(c)).is_gt())
                {
                    *current = Some(value);
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Sum {
                int,
                float,
                is_float,
            } => {
                if is_float {
                    float_value(int as f64 + float)
                } else {
                    json!(int)
                }
            }
            Accumulator::Avg { total, n } => {
                if n == 0 {
                    Value::Null
                } else {
                    float_value(total / n as f64)
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) => v.unwrap_or(Value::Null),
        }
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

fn group(spec: &Value, docs: Vec<Document>) -> QueryResult<Vec<Document>> {
    let spec = object(spec, "$group")?;
    let key_expr = spec
        .get("_id")
        .ok_or_else(|| QueryError::backend("a group specification must include an _id"))?;

    let mut fields: Vec<(&String, &str, &Value)> = Vec::new();
    for (name, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let (op, expr) = match acc.as_object() {
            Some(map) if map.len() == 1 => map.iter().next().map(|(k, v)| (k.as_str(), v)),
            _ => None,
        }
        .ok_or_else(|| {
            QueryError::backend(format!("the group aggregate field '{}' must be an object", name))
        })?;
        Accumulator::new(op)?;
        fields.push((name, op, expr));
    }

    let vars = Vars::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<Accumulator>)> = Vec::new();

    for doc in &docs {
        let key = eval(key_expr, doc, &vars)?.unwrap_or(Value::Null);
        let slot = match index.get(&key.to_string()) {
            Some(&slot) => slot,
            None => {
                let accs = fields
                    .iter()
                    .map(|(_, op, _)| Accumulator::new(op))
                    .collect::<QueryResult<Vec<_>>>()?;
                index.insert(key.to_string(), groups.len());
                groups.push((key, accs));
                groups.len() - 1
            }
        };

        for ((_, _, expr), acc) in fields.iter().zip(groups[slot].1.iter_mut()) {
            acc.push(eval(expr, doc, &vars)?);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accs)| {
            let mut out = Document::new();
            out.insert("_id".into(), key);
            for ((name, _, _), acc) in fields.iter().zip(accs) {
                out.insert((*name).clone(), acc.finish());
            }
            out
        })
        .collect())
}

fn sort(spec: &Value, mut docs: Vec<Document>) -> QueryResult<Vec<Document>> {
    let spec = object(spec, "$sort")?;
    if spec.is_empty() {
        return Err(QueryError::backend("$sort stage must have at least one sort key"));
    }

    let keys = spec
        .iter()
        .map(|(field, direction)| match direction.as_i64() {
            Some(1) => Ok((field.clone(), SortDirection::Asc)),
            Some(-1) => Ok((field.clone(), SortDirection::Desc)),
            _ => Err(QueryError::backend(format!(
                "$sort key ordering for '{}' must be 1 or -1",
                field
            ))),
        })
        .collect::<QueryResult<Vec<_>>>()?;

    sort_documents(&mut docs, &keys);
    Ok(docs)
}

fn project(spec: &Value, docs: Vec<Document>) -> QueryResult<Vec<Document>> {
    let spec = object(spec, "$project")?;
    if spec.is_empty() {
        return Err(QueryError::backend(
            "projection specification must have at least one field",
        ));
    }

    let mut keep_id = true;
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    let mut computed = Vec::new();

    for (field, value) in spec {
        let flag = match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.as_f64().map_or(false, |f| f != 0.0)),
            _ => None,
        };
        match (field.as_str(), flag) {
            ("_id", Some(keep)) => keep_id = keep,
            (_, Some(true)) => included.push(field),
            (_, Some(false)) => excluded.push(field),
            (_, None) => computed.push((field, value)),
        }
    }

    let inclusion = !included.is_empty() || !computed.is_empty();
    if inclusion && !excluded.is_empty() {
        return Err(QueryError::backend(format!(
            "Cannot do exclusion on field {} in inclusion projection",
            excluded[0]
        )));
    }

    let vars = Vars::new();
    docs.into_iter()
        .map(|doc| {
            if !inclusion {
                let mut out = doc;
                for field in &excluded {
                    remove_path(&mut out, field);
                }
                if !keep_id {
                    out.remove("_id");
                }
                return Ok(out);
            }

            let mut out = Document::new();
            if keep_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id".into(), id.clone());
                }
            }
            for field in &included {
                if let Some(v) = get_path(&doc, field) {
                    set_path(&mut out, field, v.clone());
                }
            }
            for (field, expr) in &computed {
                if let Some(v) = eval(expr, &doc, &vars)? {
                    set_path(&mut out, field, v);
                }
            }
            Ok(out)
        })
        .collect()
}

fn unwind(spec: &Value, docs: Vec<Document>) -> QueryResult<Vec<Document>> {
    let (path, preserve, index_field) = match spec {
        Value::String(path) => (path.as_str(), false, None),
        Value::Object(map) => (
            string_field(map, "path", "$unwind")?,
            map.get("preserveNullAndEmptyArrays")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            map.get("includeArrayIndex").and_then(Value::as_str),
        ),
        _ => {
            return Err(QueryError::backend(
                "$unwind expects a string path or an object",
            ))
        }
    };
    let path = path.strip_prefix('$').ok_or_else(|| {
        QueryError::backend("path option to $unwind stage should be prefixed with a '$'")
    })?;

    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match get_path(&doc, path).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for (i, item) in items.into_iter().enumerate() {
                    let mut copy = doc.clone();
                    set_path(&mut copy, path, item);
                    if let Some(field) = index_field {
                        set_path(&mut copy, field, json!(i));
                    }
                    out.push(copy);
                }
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if preserve {
                    let mut copy = doc;
                    if matches!(get_path(&copy, path), Some(Value::Array(_))) {
                        remove_path(&mut copy, path);
                    }
                    if let Some(field) = index_field {
                        set_path(&mut copy, field, Value::Null);
                    }
                    out.push(copy);
                }
            }
            Some(_) => {
                let mut copy = doc;
                if let Some(field) = index_field {
                    set_path(&mut copy, field, Value::Null);
                }
                out.push(copy);
            }
        }
    }
    Ok(out)
}

fn add_fields(spec: &Value, docs: Vec<Document>) -> QueryResult<Vec<Document>> {
    let spec = object(spec, "$addFields")?;
    let vars = Vars::new();

    docs.into_iter()
        .map(|mut doc| {
            let mut values = Vec::with_capacity(spec.len());
            for (field, expr) in spec {
                values.push((field, eval(expr, &doc, &vars)?));
            }
            for (field, value) in values {
                if let Some(value) = value {
                    set_path(&mut doc, field, value);
                }
            }
            Ok(doc)
        })
        .collect()
}

fn count(spec: &Value, docs: Vec<Document>) -> QueryResult<Vec<Document>> {
    let field = spec
        .as_str()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| QueryError::backend("the count field must be a non-empty string"))?;

    if docs.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Document::new();
    out.insert(field.to_string(), json!(docs.len()));
    Ok(vec![out])
}
