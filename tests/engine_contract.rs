//! Engine Contract Tests
//!
//! Tests for the guarantees `QueryEngine::execute` gives every caller:
//! - Shape errors are caught before any adapter call
//! - Middleware runs in order and can abort the chain
//! - Payload validation short-circuits dispatch
//! - Declared per-operation handlers win over the generic entry point
//! - No failure, panics included, escapes as anything but an envelope

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use rawql::adapter::{Adapter, Capabilities, DocumentAdapter, InMemoryAdapter};
use rawql::core::{EngineConfig, QueryEngine, QueryError, QueryResult, ScopeMiddleware};
use rawql::request::{Filter, FilterOperator, Operation, Request};
use rawql::response::Response;
use rawql::validation::{FieldKind, RuleSchema, ValidationRegistry, ValidationResult};
use serde_json::{json, Value};

// =============================================================================
// Test Utilities
// =============================================================================

/// Counts calls per entry point; `create` has a dedicated handler
#[derive(Default)]
struct CountingAdapter {
    execute_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl CountingAdapter {
    fn total(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst) + self.create_calls.load(Ordering::SeqCst)
    }
}

impl Adapter for CountingAdapter {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(&[Operation::Create])
    }

    fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        let entity = request.entity.clone();
        async move { Ok(Response::single("via execute", json!({ "entity": entity }))) }.boxed()
    }

    fn create<'a>(&'a self, _request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok(Response::single("via create", Value::Null)) }.boxed()
    }
}

struct PanickingAdapter;

impl Adapter for PanickingAdapter {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn execute<'a>(&'a self, _request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        async move { explode() }.boxed()
    }
}

fn explode() -> QueryResult<Response> {
    panic!("backend exploded")
}

fn counting_engine() -> (Arc<CountingAdapter>, QueryEngine) {
    let adapter = Arc::new(CountingAdapter::default());
    let engine = QueryEngine::from_shared(adapter.clone(), EngineConfig::default());
    (adapter, engine)
}

// =============================================================================
// Shape Validation
// =============================================================================

/// Delete without an id never reaches the adapter.
#[tokio::test]
async fn test_delete_without_id_fails_before_dispatch() {
    let (adapter, engine) = counting_engine();

    let response = engine
        .execute_value(json!({"entity": "users", "type": "delete"}))
        .await;

    assert!(!response.status);
    assert!(response.data.is_none());
    assert_eq!(response.message, "`delete` requires a string `id`");
    assert_eq!(adapter.total(), 0);
    assert_eq!(engine.metrics().snapshot().shape_rejections, 1);
}

/// Missing entity, missing type and non-object options are all shape errors.
#[tokio::test]
async fn test_malformed_envelopes() {
    let (adapter, engine) = counting_engine();

    for body in [
        json!({"type": "list"}),
        json!({"entity": "users"}),
        json!({"entity": "users", "type": "upsert"}),
        json!({"entity": "users", "type": "list", "options": [1]}),
    ] {
        let response = engine.execute_value(body).await;
        assert!(!response.status);
        assert!(response.data.is_none());
    }
    assert_eq!(adapter.total(), 0);
}

/// A null filter is the same as no filter.
#[tokio::test]
async fn test_null_filter_is_absent() {
    let engine = QueryEngine::new(InMemoryAdapter::new().with_records("users", vec![json!({"n": 1})]));

    let response = engine
        .execute_value(json!({"entity": "users", "type": "list", "filter": null}))
        .await;
    assert!(response.status, "{}", response.message);
}

// =============================================================================
// Dispatch
// =============================================================================

/// Declared handlers are preferred; everything else falls back to execute.
#[tokio::test]
async fn test_capabilities_drive_dispatch() {
    let (adapter, engine) = counting_engine();

    let created = engine.execute(Request::create("users", json!({"a": 1}))).await;
    assert_eq!(created.message, "via create");

    let listed = engine.execute(Request::list("users")).await;
    assert_eq!(listed.message, "via execute");

    assert_eq!(adapter.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.execute_calls.load(Ordering::SeqCst), 1);
}

/// An operation supported by neither path is a failed envelope.
#[tokio::test]
async fn test_unsupported_operation() {
    let engine = QueryEngine::new(InMemoryAdapter::new());

    let response = engine
        .execute(Request::aggregate("users", vec![]))
        .await;
    assert!(!response.status);
    assert_eq!(
        response.message,
        "Adapter does not support 'aggregate' and no generic execute() found"
    );
}

/// A panicking adapter becomes a generic failure.
#[tokio::test]
async fn test_panic_is_contained() {
    let engine = QueryEngine::new(PanickingAdapter);

    let response = engine.execute(Request::list("users")).await;
    assert!(!response.status);
    assert!(response.data.is_none());
    assert_eq!(response.message, "RawQl Engine Execution Error");
}

/// The adapter swap takes effect for the next call.
#[tokio::test]
async fn test_set_adapter() {
    let engine = QueryEngine::new(InMemoryAdapter::new());
    engine.set_adapter(InMemoryAdapter::new().with_records("users", vec![json!({"n": 1})]));

    let response = engine.execute(Request::list("users")).await;
    assert_eq!(response.items().unwrap().len(), 1);
    assert_eq!(engine.metrics().snapshot().adapter_swaps, 1);
}

// =============================================================================
// Middleware
// =============================================================================

/// Middleware runs in registration order and sees earlier rewrites.
#[tokio::test]
async fn test_middleware_order() {
    let adapter = Arc::new(InMemoryAdapter::new());
    let engine = QueryEngine::from_shared(adapter.clone(), EngineConfig::default());

    engine.use_middleware(|mut request: Request| async move {
        request
            .data
            .get_or_insert_with(Default::default)
            .insert("step".into(), json!(1));
        Ok::<_, QueryError>(request)
    });
    engine.use_middleware(|mut request: Request| async move {
        let data = request.data.get_or_insert_with(Default::default);
        let seen = data.get("step").and_then(Value::as_i64).unwrap_or(0);
        data.insert("step".into(), json!(seen + 1));
        Ok::<_, QueryError>(request)
    });

    let response = engine.execute(Request::create("notes", json!({}))).await;
    assert!(response.status);
    assert_eq!(response.item().unwrap()["step"], 2);
    assert_eq!(engine.middleware_count(), 2);
}

/// A failing middleware aborts the chain before dispatch.
#[tokio::test]
async fn test_middleware_abort() {
    let adapter = Arc::new(InMemoryAdapter::new());
    let engine = QueryEngine::from_shared(adapter.clone(), EngineConfig::default());

    engine.use_middleware(|_request: Request| async move {
        Err::<Request, _>(QueryError::middleware("tenant header missing"))
    });

    let response = engine.execute(Request::list("users")).await;
    assert!(!response.status);
    assert_eq!(response.message, "tenant header missing");
    assert_eq!(adapter.call_count(), 0);
    assert_eq!(engine.metrics().snapshot().middleware_aborts, 1);
}

/// The scope middleware stamps creates.
#[tokio::test]
async fn test_scope_middleware_stamps_creates() {
    let engine = QueryEngine::new(InMemoryAdapter::new())
        .with_middleware(ScopeMiddleware::new("tenant", json!("acme")));

    let response = engine.execute(Request::create("notes", json!({"body": "hi"}))).await;
    assert_eq!(response.item().unwrap()["tenant"], "acme");
}

fn tenant_engine() -> (Arc<DocumentAdapter>, QueryEngine) {
    let adapter = Arc::new(
        DocumentAdapter::new()
            .with_entity(
                "docs",
                vec![
                    json!({"_id": "a", "tenantId": "t1", "secret": "mine"}),
                    json!({"_id": "b", "tenantId": "t2", "secret": "other tenant"}),
                ],
            )
            .unwrap(),
    );
    let engine = QueryEngine::from_shared(adapter.clone(), EngineConfig::default())
        .with_middleware(ScopeMiddleware::new("tenantId", json!("t1")));
    (adapter, engine)
}

/// Id-addressed reads and writes stay inside the scope.
#[tokio::test]
async fn test_scope_applies_to_id_lookups() {
    let (adapter, engine) = tenant_engine();

    let foreign = engine.execute(Request::get("docs", "b")).await;
    assert!(!foreign.status);
    assert_eq!(foreign.message, "docs not found");
    assert!(foreign.data.is_none());

    let own = engine.execute(Request::get("docs", "a")).await;
    assert_eq!(own.item().unwrap()["secret"], "mine");

    let updated = engine
        .execute(Request::update("docs", "b", json!({"secret": "stolen"})))
        .await;
    assert!(!updated.status);

    let deleted = engine.execute(Request::delete("docs", "b")).await;
    assert!(!deleted.status);
    assert_eq!(deleted.message, "docs not found");

    let remaining = adapter.records("docs").unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[1]["secret"], "other tenant");
}

/// Deleting a record of the caller's own tenant still works.
#[tokio::test]
async fn test_scope_allows_own_delete() {
    let (adapter, engine) = tenant_engine();

    let deleted = engine.execute(Request::delete("docs", "a")).await;
    assert!(deleted.status, "{}", deleted.message);
    assert_eq!(adapter.records("docs").unwrap().len(), 1);
}

// =============================================================================
// Payload Validation
// =============================================================================

/// A rejected create reports field errors and never reaches the adapter.
#[tokio::test]
async fn test_validation_rejects_create() {
    let (adapter, engine) = counting_engine();
    engine.set_validator(ValidationRegistry::new().with(
        "users",
        Operation::Create,
        RuleSchema::new().required("email", FieldKind::String),
    ));

    let response = engine.execute(Request::create("users", json!({}))).await;

    assert!(!response.status);
    assert_eq!(response.message, "Validation failed");
    assert!(response.data.is_none());
    let errors = response.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "email");
    assert_eq!(adapter.total(), 0);
}

/// No rule for the pair means the request passes.
#[tokio::test]
async fn test_validation_without_rule_passes() {
    let (adapter, engine) = counting_engine();
    engine.set_validator(ValidationRegistry::new().with(
        "users",
        Operation::Create,
        RuleSchema::new().required("email", FieldKind::String),
    ));

    let response = engine.execute(Request::create("teams", json!({}))).await;
    assert!(response.status);
    assert_eq!(adapter.total(), 1);
}

/// Invalid without detail gets a single generic field error.
#[tokio::test]
async fn test_validation_without_detail() {
    let (_adapter, engine) = counting_engine();
    engine.set_validator(|_: &str, _: Operation, _: &Value| ValidationResult::invalid(vec![]));

    let response = engine.execute(Request::list("users")).await;
    assert_eq!(response.message, "Validation failed");
    assert_eq!(response.errors.unwrap().len(), 1);
}

/// List requests are validated against their normalized options.
#[tokio::test]
async fn test_list_validates_options() {
    let (_adapter, engine) = counting_engine();
    engine.set_validator(|_: &str, op: Operation, payload: &Value| {
        if op == Operation::List && payload["limit"] == json!(10) {
            ValidationResult::ok()
        } else {
            ValidationResult::invalid(vec![])
        }
    });

    let response = engine
        .execute(Request::list("users").with_filter(Filter::condition(
            "age",
            FilterOperator::Gt,
            json!(1),
        )))
        .await;
    assert!(response.status, "{}", response.message);
}
