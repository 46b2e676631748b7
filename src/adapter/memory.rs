//! In-memory adapter
//!
//! A deliberately small test double. Records live in one ordered vector per
//! entity and carry a synthetic string `id`. It declares no per-operation
//! handlers, so every call arrives through `execute`.
//!
//! Known limits, reported as errors rather than ignored:
//! - a request carrying a filter fails, whatever its operation
//! - `get` works by `id` only
//! - `aggregate` is not supported

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};

use super::Adapter;
use crate::core::error::{QueryError, QueryResult};
use crate::request::{Operation, Request};
use crate::response::Response;

type Record = Map<String, Value>;

#[derive(Default)]
pub struct InMemoryAdapter {
    collections: Mutex<BTreeMap<String, Vec<Record>>>,
    next_id: AtomicU64,
    calls: AtomicUsize,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entity; non-object values are skipped
    pub fn with_records(self, entity: impl Into<String>, records: Vec<Value>) -> Self {
        let records: Vec<Record> = records
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.lock().entry(entity.into()).or_default().extend(records);
        self
    }

    /// Number of requests that reached the adapter
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Current records of an entity, in insertion order
    pub fn records(&self, entity: &str) -> Vec<Value> {
        self.lock()
            .get(entity)
            .map(|records| records.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<Record>>> {
        self.collections.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self, request: &Request) -> QueryResult<Response> {
        if request.filter.is_some() {
            return Err(QueryError::backend(
                "in-memory adapter does not evaluate filters",
            ));
        }

        match request.operation {
            Operation::List => Ok(self.list_all(request)),
            Operation::Get => self.get_by_id(request),
            Operation::Create => Ok(self.insert(request)),
            Operation::Update => Ok(self.merge(request)),
            Operation::Delete => Ok(self.remove(request)),
            Operation::Count => Ok(self.count_all(request)),
            Operation::Aggregate => Err(QueryError::Unsupported(Operation::Aggregate)),
        }
    }

    fn list_all(&self, request: &Request) -> Response {
        Response::multiple(
            format!("Fetched {} list successfully", request.entity),
            self.records(&request.entity),
        )
    }

    fn get_by_id(&self, request: &Request) -> QueryResult<Response> {
        let id = request
            .id
            .as_deref()
            .ok_or(QueryError::Unsupported(Operation::Get))?;

        let collections = self.lock();
        let found = collections
            .get(&request.entity)
            .and_then(|records| records.iter().find(|r| has_id(r, id)));

        Ok(match found {
            Some(record) => Response::single(
                format!("Fetched {} successfully", request.entity),
                Value::Object(record.clone()),
            ),
            None => not_found(&request.entity),
        })
    }

    fn insert(&self, request: &Request) -> Response {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut record = Record::new();
        record.insert("id".to_string(), Value::String(seq.to_string()));
        if let Some(data) = &request.data {
            record.extend(data.clone());
        }

        self.lock()
            .entry(request.entity.clone())
            .or_default()
            .push(record.clone());

        Response::single(
            format!("Created {} successfully", request.entity),
            Value::Object(record),
        )
    }

    fn merge(&self, request: &Request) -> Response {
        let id = request.id.as_deref().unwrap_or_default();
        let mut collections = self.lock();
        let target = collections
            .get_mut(&request.entity)
            .and_then(|records| records.iter_mut().find(|r| has_id(r, id)));

        match target {
            Some(record) => {
                if let Some(data) = &request.data {
                    record.extend(data.clone());
                }
                Response::single(
                    format!("Updated {} successfully", request.entity),
                    Value::Object(record.clone()),
                )
            }
            None => not_found(&request.entity),
        }
    }

    fn remove(&self, request: &Request) -> Response {
        let id = request.id.as_deref().unwrap_or_default();
        let mut collections = self.lock();
        let Some(records) = collections.get_mut(&request.entity) else {
            return not_found(&request.entity);
        };

        match records.iter().position(|r| has_id(r, id)) {
            Some(index) => {
                records.remove(index);
                Response::empty(format!("Deleted {} successfully", request.entity))
            }
            None => not_found(&request.entity),
        }
    }

    fn count_all(&self, request: &Request) -> Response {
        let count = self.lock().get(&request.entity).map_or(0, Vec::len);
        Response::single(
            format!("Counted {} successfully", request.entity),
            serde_json::json!({ "count": count }),
        )
    }
}

impl Adapter for InMemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let outcome = self.handle(request);
        async move { outcome }.boxed()
    }
}

fn has_id(record: &Record, id: &str) -> bool {
    record.get("id").and_then(Value::as_str) == Some(id)
}

fn not_found(entity: &str) -> Response {
    Response::failure(format!("{} not found", entity))
}
