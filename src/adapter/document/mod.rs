//! # Document Adapter
//!
//! Embedded document-store backend. Requests are translated into the
//! store's native query language (Mongo-style `$` operators) and then
//! evaluated against collections held by the adapter's own
//! `EntityRegistry`. Collections can be persisted as JSON snapshots.
//!
//! ```text
//! Request ── DocumentTranslator ──► native filter / pipeline
//!                                        │
//!                       Matcher / AggregationRunner
//!                                        │
//!                               EntityRegistry ◄──► SnapshotStore
//! ```

mod aggregate;
mod filter;
mod matcher;
mod pipeline;
mod registry;
mod store;
mod values;

pub use aggregate::AggregationRunner;
pub use filter::DocumentTranslator;
pub use matcher::Matcher;
pub use registry::{Collection, Document, EntityName, EntityRegistry, NotRegistered};
pub use store::SnapshotStore;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{Adapter, Capabilities, QueryTranslator};
use crate::core::error::{QueryError, QueryResult};
use crate::observability::Logger;
use crate::request::{Operation, Populate, QueryOptions, Request};
use crate::response::{Page, Response};
use values::{get_path, remove_path, set_path, sort_documents, values_equal};

const DEFAULT_LIMIT: i64 = 10;

/// Document adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Directory holding `<entity>.json` snapshots (default: none, memory only)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Write snapshots when the adapter is closed (default: true)
    #[serde(default = "default_flush_on_close")]
    pub flush_on_close: bool,
}

fn default_flush_on_close() -> bool {
    true
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            flush_on_close: default_flush_on_close(),
        }
    }
}

impl DocumentConfig {
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }
}

type Handler = fn(&DocumentAdapter, &Request) -> QueryResult<Response>;

pub struct DocumentAdapter {
    registry: RwLock<EntityRegistry>,
    translator: DocumentTranslator,
    store: Option<SnapshotStore>,
    config: DocumentConfig,
    closed: AtomicBool,
}

impl Default for DocumentAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentAdapter {
    /// Memory-only adapter with no registered entities
    pub fn new() -> Self {
        Self::with_registry(EntityRegistry::new(), None, DocumentConfig::default())
    }

    /// Open an adapter, loading snapshots when `data_dir` is set
    pub fn open(config: DocumentConfig) -> QueryResult<Self> {
        let store = config.data_dir.clone().map(SnapshotStore::new);
        let registry = match &store {
            Some(store) => store.load()?,
            None => EntityRegistry::new(),
        };
        Ok(Self::with_registry(registry, store, config))
    }

    fn with_registry(
        registry: EntityRegistry,
        store: Option<SnapshotStore>,
        config: DocumentConfig,
    ) -> Self {
        Self {
            registry: RwLock::new(registry),
            translator: DocumentTranslator::new(),
            store,
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Seed an entity while building the adapter
    pub fn with_entity(self, entity: &str, documents: Vec<Value>) -> QueryResult<Self> {
        self.register_with(entity, documents)?;
        Ok(self)
    }

    /// Register an empty collection; existing records are kept
    pub fn register(&self, entity: &str) {
        self.write().register(entity);
    }

    /// Register `entity` holding `documents`, replacing any existing records
    pub fn register_with(&self, entity: &str, documents: Vec<Value>) -> QueryResult<()> {
        let documents = documents
            .into_iter()
            .map(|value| match value {
                Value::Object(map) => Ok(map),
                other => Err(QueryError::backend(format!(
                    "records of {} must be objects, found {}",
                    entity, other
                ))),
            })
            .collect::<QueryResult<Vec<_>>>()?;

        self.write().register_with(entity, documents);
        Ok(())
    }

    pub fn entities(&self) -> Vec<String> {
        self.read().names().map(|n| n.to_string()).collect()
    }

    /// Current records of an entity, in storage order
    pub fn records(&self, entity: &str) -> QueryResult<Vec<Value>> {
        let registry = self.read();
        let collection = registry.collection(entity)?;
        Ok(collection.iter().cloned().map(Value::Object).collect())
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write snapshots now. A memory-only adapter has nothing to write.
    pub fn flush(&self) -> QueryResult<()> {
        match &self.store {
            Some(store) => store.save(&self.read()),
            None => Ok(()),
        }
    }

    /// The native query a request would run, without running it
    pub fn explain(&self, request: &Request) -> QueryResult<Value> {
        let mut plan = Map::new();
        plan.insert("entity".into(), json!(request.entity));
        plan.insert("operation".into(), json!(request.operation.as_str()));

        if request.operation == Operation::Aggregate {
            let stages = request.pipeline.as_deref().unwrap_or_default();
            let native = self.translator.translate_pipeline(stages)?;
            plan.insert("pipeline".into(), Value::Array(native));
        } else {
            let native = self.translator.translate_filter(request.filter.as_ref())?;
            plan.insert("filter".into(), Value::Object(native));
        }

        if request.operation == Operation::List {
            let window = Window::from_options(request.options.as_ref());
            plan.insert(
                "window".into(),
                json!({ "skip": window.skip, "limit": window.limit }),
            );
        }

        Ok(Value::Object(plan))
    }

    fn read(&self) -> RwLockReadGuard<'_, EntityRegistry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EntityRegistry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    fn matcher(&self, request: &Request) -> QueryResult<Matcher> {
        let native = self.translator.translate_filter(request.filter.as_ref())?;
        Matcher::compile(&native)
    }

    /// Extra predicate an id-addressed call must also satisfy, e.g. a
    /// tenant conjunct added by middleware
    fn scope_matcher(&self, request: &Request) -> QueryResult<Option<Matcher>> {
        match request.filter {
            Some(_) => self.matcher(request).map(Some),
            None => Ok(None),
        }
    }

    fn respond<'a>(
        &'a self,
        request: &'a Request,
        handler: Handler,
    ) -> BoxFuture<'a, QueryResult<Response>> {
        let outcome = if self.is_closed() {
            Err(QueryError::backend("adapter is closed"))
        } else {
            handler(self, request)
        };
        async move { outcome }.boxed()
    }

    fn list_records(&self, request: &Request) -> QueryResult<Response> {
        let matcher = self.matcher(request)?;
        let options = request.options.clone().unwrap_or_default();
        let window = Window::from_options(Some(&options));

        let registry = self.read();
        let collection = registry.collection(&request.entity)?;

        let total = collection.iter().filter(|d| matcher.matches(d)).count() as u64;

        let mut hits: Vec<&Document> = collection.iter().filter(|d| matcher.matches(d)).collect();
        if let Some(sort) = &options.sort {
            let keys: Vec<_> = sort.iter().map(|s| (s.field.clone(), s.direction)).collect();
            sort_documents(&mut hits, &keys);
        }

        let items = hits
            .into_iter()
            .skip(window.skip as usize)
            .take(window.limit as usize)
            .map(|doc| shape(&registry, doc, &options).map(Value::Object))
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(Response::paginated(
            format!("Fetched {} list successfully", request.entity),
            Page::new(items, total, window.skip, window.limit),
        ))
    }

    fn get_record(&self, request: &Request) -> QueryResult<Response> {
        let options = request.options.clone().unwrap_or_default();
        let message = format!("Fetched {} successfully", request.entity);

        if let Some(id) = &request.id {
            let scope = self.scope_matcher(request)?;
            let registry = self.read();
            let collection = registry.collection(&request.entity)?;
            return match collection.find_by_id(id).filter(|d| in_scope(&scope, d)) {
                Some(doc) => Ok(Response::single(
                    message,
                    Value::Object(shape(&registry, doc, &options)?),
                )),
                None => Ok(not_found(&request.entity)),
            };
        }

        let matcher = self.matcher(request)?;
        let registry = self.read();
        let collection = registry.collection(&request.entity)?;
        let item = match collection.iter().find(|d| matcher.matches(d)) {
            Some(doc) => Value::Object(shape(&registry, doc, &options)?),
            None => Value::Null,
        };
        Ok(Response::single(message, item))
    }

    fn create_record(&self, request: &Request) -> QueryResult<Response> {
        let data = request.data.clone().unwrap_or_default();
        let id = match data.get("_id") {
            Some(Value::String(id)) => id.clone(),
            _ => Uuid::new_v4().to_string(),
        };

        let mut doc = Document::new();
        doc.insert("_id".into(), Value::String(id.clone()));
        doc.extend(data.into_iter().filter(|(k, _)| k != "_id"));

        let mut registry = self.write();
        let collection = registry.collection_mut(&request.entity)?;
        if collection.position_of(&id).is_some() {
            return Err(QueryError::backend(format!(
                "Duplicate _id '{}' in {}",
                id, request.entity
            )));
        }
        collection.push(doc.clone());

        Ok(Response::single(
            format!("{} created successfully", request.entity),
            Value::Object(doc),
        ))
    }

    fn update_record(&self, request: &Request) -> QueryResult<Response> {
        let matcher = match (&request.id, &request.filter) {
            (Some(_), _) => self.scope_matcher(request)?,
            (None, Some(_)) => Some(self.matcher(request)?),
            (None, None) => {
                return Err(QueryError::shape(
                    "`update` requires an `id` or a `filter`",
                ))
            }
        };
        let changes = request.data.clone().unwrap_or_default();
        let message = format!("{} updated successfully", request.entity);

        let mut registry = self.write();
        let collection = registry.collection_mut(&request.entity)?;

        let index = match (&request.id, &matcher) {
            (Some(id), _) => collection
                .position_of(id)
                .filter(|&i| collection.get(i).is_some_and(|d| in_scope(&matcher, d))),
            (None, Some(matcher)) => collection.iter().position(|d| matcher.matches(d)),
            (None, None) => None,
        };

        let Some(doc) = index.and_then(|i| collection.get_mut(i)) else {
            return Ok(match request.id {
                Some(_) => not_found(&request.entity),
                None => Response::single(message, Value::Null),
            });
        };

        if let Some(new_id) = changes.get("_id") {
            if !doc.get("_id").map_or(false, |old| values_equal(old, new_id)) {
                return Err(QueryError::backend(
                    "Performing an update on the path '_id' would modify the immutable field '_id'",
                ));
            }
        }

        for (path, value) in changes {
            set_path(doc, &path, value);
        }

        Ok(Response::single(message, Value::Object(doc.clone())))
    }

    fn delete_record(&self, request: &Request) -> QueryResult<Response> {
        let id = request
            .id
            .as_deref()
            .ok_or_else(|| QueryError::shape("`delete` requires a string `id`"))?;

        let scope = self.scope_matcher(request)?;
        let mut registry = self.write();
        let collection = registry.collection_mut(&request.entity)?;

        let index = collection
            .position_of(id)
            .filter(|&i| collection.get(i).is_some_and(|d| in_scope(&scope, d)));

        Ok(match index {
            Some(index) => {
                collection.remove(index);
                Response::empty(format!("Deleted {} successfully", request.entity))
            }
            None => not_found(&request.entity),
        })
    }

    fn count_records(&self, request: &Request) -> QueryResult<Response> {
        let matcher = self.matcher(request)?;
        let registry = self.read();
        let collection = registry.collection(&request.entity)?;
        let count = collection.iter().filter(|d| matcher.matches(d)).count();

        Ok(Response::single(
            format!("Counted {} successfully", request.entity),
            json!(count),
        ))
    }

    fn aggregate_records(&self, request: &Request) -> QueryResult<Response> {
        let registry = self.read();
        let collection = registry.collection(&request.entity)?;

        let stages = match request.pipeline.as_deref() {
            Some(stages) if !stages.is_empty() => stages,
            _ => return Ok(Response::failure("Missing 'pipeline' in aggregate request")),
        };

        let native = self.translator.translate_pipeline(stages)?;
        let input = collection.documents().to_vec();
        let output = AggregationRunner::new(&registry).run(&native, input)?;

        Ok(Response::multiple(
            format!("Aggregated {} successfully", request.entity),
            output.into_iter().map(Value::Object).collect(),
        ))
    }
}

impl Adapter for DocumentAdapter {
    fn name(&self) -> &'static str {
        "document"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        let handler: Handler = match request.operation {
            Operation::List => Self::list_records,
            Operation::Get => Self::get_record,
            Operation::Create => Self::create_record,
            Operation::Update => Self::update_record,
            Operation::Delete => Self::delete_record,
            Operation::Count => Self::count_records,
            Operation::Aggregate => Self::aggregate_records,
        };
        self.respond(request, handler)
    }

    fn list<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        self.respond(request, Self::list_records)
    }

    fn get<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        self.respond(request, Self::get_record)
    }

    fn create<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        self.respond(request, Self::create_record)
    }

    fn update<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        self.respond(request, Self::update_record)
    }

    fn delete<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        self.respond(request, Self::delete_record)
    }

    fn count<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        self.respond(request, Self::count_records)
    }

    fn aggregate<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        self.respond(request, Self::aggregate_records)
    }

    fn close(&self) -> BoxFuture<'_, QueryResult<()>> {
        let outcome = if self.is_closed() {
            Ok(())
        } else {
            let flushed = if self.config.flush_on_close {
                self.flush()
            } else {
                Ok(())
            };
            if flushed.is_ok() {
                self.closed.store(true, Ordering::SeqCst);
                Logger::info("ADAPTER_CLOSED", &[("adapter", self.name())]);
            }
            flushed
        };
        async move { outcome }.boxed()
    }
}

/// Resolved `skip`/`limit` of a list call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    skip: u64,
    limit: u64,
}

impl Window {
    /// `page` wins over `skip`; pages start at 1
    fn from_options(options: Option<&QueryOptions>) -> Self {
        let options = options.cloned().unwrap_or_default();
        let limit = options
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT) as u64;
        let skip = match options.page {
            Some(page) => (page.max(1) as u64 - 1).saturating_mul(limit),
            None => options.skip.filter(|s| *s >= 0).unwrap_or(0) as u64,
        };
        Self { skip, limit }
    }
}

fn in_scope(scope: &Option<Matcher>, doc: &Document) -> bool {
    scope.as_ref().map_or(true, |matcher| matcher.matches(doc))
}

fn not_found(entity: &str) -> Response {
    Response::failure(format!("{} not found", entity))
}

/// Apply `select` and `populate` to an outgoing record
fn shape(registry: &EntityRegistry, doc: &Document, options: &QueryOptions) -> QueryResult<Document> {
    let mut out = select_fields(doc, options.select.as_deref());
    populate(registry, &mut out, options.populate.as_deref().unwrap_or_default())?;
    Ok(out)
}

/// `["name", "email"]` keeps those fields; `["-password"]` drops fields.
/// `_id` is kept unless excluded explicitly.
fn select_fields(doc: &Document, select: Option<&[String]>) -> Document {
    let fields = match select {
        Some(fields) if !fields.is_empty() => fields,
        _ => return doc.clone(),
    };

    if fields.iter().all(|f| f.starts_with('-')) {
        let mut out = doc.clone();
        for field in fields {
            remove_path(&mut out, &field[1..]);
        }
        return out;
    }

    let mut out = Document::new();
    if let Some(id) = doc.get("_id") {
        out.insert("_id".into(), id.clone());
    }
    for field in fields.iter().filter(|f| !f.starts_with('-')) {
        if let Some(value) = get_path(doc, field) {
            set_path(&mut out, field, value.clone());
        }
    }
    out
}

/// Replace reference ids with the records they point at. Unknown ids
/// resolve to null, and are dropped from id arrays.
fn populate(registry: &EntityRegistry, doc: &mut Document, specs: &[Populate]) -> QueryResult<()> {
    for spec in specs {
        let Some(reference) = get_path(doc, &spec.field).cloned() else {
            continue;
        };
        let target = registry.collection(spec.target())?;

        let resolve = |id: &Value| -> QueryResult<Option<Value>> {
            let Some(found) = id.as_str().and_then(|id| target.find_by_id(id)) else {
                return Ok(None);
            };
            let mut found = select_fields(found, spec.select.as_deref());
            populate(registry, &mut found, spec.populate.as_deref().unwrap_or_default())?;
            Ok(Some(Value::Object(found)))
        };

        let resolved = match &reference {
            Value::Array(ids) => {
                let mut items = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(item) = resolve(id)? {
                        items.push(item);
                    }
                }
                Value::Array(items)
            }
            id => resolve(id)?.unwrap_or(Value::Null),
        };
        set_path(doc, &spec.field, resolved);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Filter, FilterOperator, SortSpec, Stage};

    fn seeded() -> DocumentAdapter {
        DocumentAdapter::new()
            .with_entity(
                "users",
                vec![
                    json!({"_id": "u1", "name": "Ada", "age": 36, "team": "t1"}),
                    json!({"_id": "u2", "name": "Alan", "age": 41, "team": "t2"}),
                    json!({"_id": "u3", "name": "Grace", "age": 17}),
                ],
            )
            .unwrap()
            .with_entity(
                "teams",
                vec![json!({"_id": "t1", "title": "Core"}), json!({"_id": "t2", "title": "Infra"})],
            )
            .unwrap()
    }

    #[test]
    fn test_window_saturates_for_huge_page() {
        let window = Window::from_options(Some(&QueryOptions::paged(10, i64::MAX)));
        assert_eq!(window.skip, u64::MAX);
        assert_eq!(window.limit, 10);
    }

    #[tokio::test]
    async fn test_list_past_the_end_is_empty() {
        let adapter = seeded();
        let request = Request::list("users").with_options(QueryOptions::paged(10, i64::MAX));

        let response = adapter.list(&request).await.unwrap();
        let page = response.page().unwrap();
        assert!(response.status);
        assert!(page.items.is_empty());
        assert_eq!(page.total_items, 3);
        assert_eq!(page.next_page, None);
    }

    #[tokio::test]
    async fn test_list_filter_sort_select() {
        let adapter = seeded();
        let request = Request::list("users")
            .with_filter(Filter::condition("age", FilterOperator::Gte, json!(18)))
            .with_options(QueryOptions {
                sort: Some(vec![SortSpec::desc("age")]),
                select: Some(vec!["name".into()]),
                ..QueryOptions::default()
            });

        let response = adapter.list(&request).await.unwrap();
        assert_eq!(
            response.items().unwrap(),
            &[json!({"_id": "u2", "name": "Alan"}), json!({"_id": "u1", "name": "Ada"})]
        );
        assert_eq!(response.page().unwrap().total_items, 2);
    }

    #[tokio::test]
    async fn test_list_populate() {
        let adapter = seeded();
        let request = Request::list("users").with_options(QueryOptions {
            populate: Some(vec![Populate::new("team").from_entity("teams")]),
            ..QueryOptions::default()
        });

        let response = adapter.list(&request).await.unwrap();
        let items = response.items().unwrap();
        assert_eq!(items[0]["team"], json!({"_id": "t1", "title": "Core"}));
        assert!(items[2].get("team").is_none());
    }

    #[tokio::test]
    async fn test_get_by_id_and_filter() {
        let adapter = seeded();

        let found = adapter.get(&Request::get("users", "u2")).await.unwrap();
        assert_eq!(found.item().unwrap()["name"], "Alan");

        let missing = adapter.get(&Request::get("users", "nope")).await.unwrap();
        assert!(!missing.status);
        assert_eq!(missing.message, "users not found");

        let by_filter = Request::new(Operation::Get, "users")
            .with_filter(Filter::condition("name", FilterOperator::Eq, json!("Zed")));
        let none = adapter.get(&by_filter).await.unwrap();
        assert!(none.status);
        assert_eq!(none.item(), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let adapter = seeded();

        let created = adapter
            .create(&Request::create("users", json!({"name": "Linus"})))
            .await
            .unwrap();
        let id = created.item().unwrap()["_id"].as_str().unwrap().to_string();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(created.message, "users created successfully");

        let kept = adapter
            .create(&Request::create("users", json!({"_id": "u9", "name": "Ken"})))
            .await
            .unwrap();
        assert_eq!(kept.item().unwrap()["_id"], "u9");

        let duplicate = adapter
            .create(&Request::create("users", json!({"_id": "u9"})))
            .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_update() {
        let adapter = seeded();

        let updated = adapter
            .update(&Request::update("users", "u1", json!({"age": 37, "address.city": "London"})))
            .await
            .unwrap();
        assert_eq!(updated.item().unwrap()["age"], 37);
        assert_eq!(updated.item().unwrap()["address"]["city"], "London");

        let rename = adapter
            .update(&Request::update("users", "u1", json!({"_id": "other"})))
            .await;
        assert!(rename.is_err());

        let bare = Request::new(Operation::Update, "users").with_data(json!({"age": 1}));
        assert!(adapter.update(&bare).await.is_err());

        let no_match = Request::new(Operation::Update, "users")
            .with_filter(Filter::condition("name", FilterOperator::Eq, json!("Zed")))
            .with_data(json!({"age": 1}));
        let response = adapter.update(&no_match).await.unwrap();
        assert_eq!(response.item(), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let adapter = seeded();

        let deleted = adapter.delete(&Request::delete("users", "u3")).await.unwrap();
        assert!(deleted.status);
        assert!(deleted.data.is_none());

        let again = adapter.delete(&Request::delete("users", "u3")).await.unwrap();
        assert!(!again.status);

        let count = adapter.count(&Request::count("users")).await.unwrap();
        assert_eq!(count.item(), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_aggregate_requires_pipeline() {
        let adapter = seeded();

        let missing = adapter
            .aggregate(&Request::new(Operation::Aggregate, "users"))
            .await
            .unwrap();
        assert!(!missing.status);
        assert_eq!(missing.message, "Missing 'pipeline' in aggregate request");
        assert!(missing.data.is_none());

        let empty = adapter.aggregate(&Request::aggregate("users", vec![])).await.unwrap();
        assert!(!empty.status);
    }

    #[tokio::test]
    async fn test_aggregate() {
        let adapter = seeded();
        let pipeline = vec![
            serde_json::from_value::<Stage>(json!({"match": {"field": "age", "op": "gte", "value": 18}}))
                .unwrap(),
            Stage::Count("adults".into()),
        ];

        let response = adapter
            .aggregate(&Request::aggregate("users", pipeline))
            .await
            .unwrap();
        assert_eq!(response.items().unwrap(), &[json!({"adults": 2})]);
    }

    #[tokio::test]
    async fn test_unregistered_entity() {
        let adapter = seeded();
        let err = adapter.list(&Request::list("ghosts")).await.unwrap_err();
        assert_eq!(err.to_string(), "Model for entity ghosts is not registered");
    }

    #[tokio::test]
    async fn test_closed_adapter_rejects_calls() {
        let adapter = seeded();
        adapter.close().await.unwrap();
        assert!(adapter.is_closed());

        let err = adapter.count(&Request::count("users")).await.unwrap_err();
        assert_eq!(err, QueryError::backend("adapter is closed"));
        assert!(adapter.close().await.is_ok());
    }

    #[test]
    fn test_explain() {
        let adapter = seeded();
        let request = Request::list("users")
            .with_filter(Filter::condition("name", FilterOperator::StartsWith, json!("A")))
            .with_options(QueryOptions::paged(5, 3));

        let plan = adapter.explain(&request).unwrap();
        assert_eq!(
            plan,
            json!({
                "entity": "users",
                "operation": "list",
                "filter": {"name": {"$regex": "^A", "$options": "i"}},
                "window": {"skip": 10, "limit": 5}
            })
        );
    }

    #[test]
    fn test_select_exclusion() {
        let doc = json!({"_id": "u1", "name": "Ada", "password": "x"})
            .as_object()
            .cloned()
            .unwrap();
        let out = select_fields(&doc, Some(&["-password".to_string()]));
        assert_eq!(Value::Object(out), json!({"_id": "u1", "name": "Ada"}));
    }
}
