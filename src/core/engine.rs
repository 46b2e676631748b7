//! Query Engine
//!
//! Orchestrates one call end to end:
//! shape check → normalize → middleware chain → payload validation → dispatch.
//! Every outcome, including adapter panics, comes back as a `Response`.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures_util::future::FutureExt;
use serde_json::{json, Map, Value};

use crate::adapter::{Adapter, Capabilities};
use crate::observability::{Logger, MetricsRegistry};
use crate::request::{Operation, QueryOptions, Request};
use crate::response::{FieldError, Response};
use crate::validation::Validator;

use super::config::EngineConfig;
use super::context::RequestContext;
use super::error::{QueryError, QueryResult};
use super::middleware::Middleware;

/// An adapter together with the capability set it declared at install time
#[derive(Clone)]
struct InstalledAdapter {
    adapter: Arc<dyn Adapter>,
    capabilities: Capabilities,
}

impl InstalledAdapter {
    fn new(adapter: Arc<dyn Adapter>) -> Self {
        let capabilities = adapter.capabilities();
        Self {
            adapter,
            capabilities,
        }
    }
}

/// The uniform query engine
pub struct QueryEngine {
    adapter: RwLock<InstalledAdapter>,
    validator: RwLock<Option<Arc<dyn Validator>>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    config: EngineConfig,
    metrics: Arc<MetricsRegistry>,
}

impl QueryEngine {
    /// Create an engine over the given adapter
    pub fn new(adapter: impl Adapter + 'static) -> Self {
        Self::with_config(adapter, EngineConfig::default())
    }

    pub fn with_config(adapter: impl Adapter + 'static, config: EngineConfig) -> Self {
        Self::from_shared(Arc::new(adapter), config)
    }

    /// Create an engine over an adapter the caller keeps a handle to
    pub fn from_shared(adapter: Arc<dyn Adapter>, config: EngineConfig) -> Self {
        Logger::set_min_severity(config.min_log_severity);
        Self {
            adapter: RwLock::new(InstalledAdapter::new(adapter)),
            validator: RwLock::new(None),
            middleware: RwLock::new(Vec::new()),
            config,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Attach a validator at construction
    pub fn with_validator(self, validator: impl Validator + 'static) -> Self {
        self.set_validator(validator);
        self
    }

    /// Append a middleware at construction
    pub fn with_middleware(self, middleware: impl Middleware + 'static) -> Self {
        self.use_middleware(middleware);
        self
    }

    /// Append a middleware; it runs after every previously registered one
    pub fn use_middleware(&self, middleware: impl Middleware + 'static) {
        let mut chain = self.middleware.write().unwrap_or_else(|e| e.into_inner());
        chain.push(Arc::new(middleware));
    }

    /// Swap the backend; calls already in flight keep the adapter they started with
    pub fn set_adapter(&self, adapter: impl Adapter + 'static) {
        self.set_shared_adapter(Arc::new(adapter));
    }

    pub fn set_shared_adapter(&self, adapter: Arc<dyn Adapter>) {
        let installed = InstalledAdapter::new(adapter);
        Logger::info(
            "ADAPTER_INSTALLED",
            &[("adapter", installed.adapter.name())],
        );
        *self.adapter.write().unwrap_or_else(|e| e.into_inner()) = installed;
        self.metrics.increment_adapter_swaps();
    }

    /// Register or replace the validator
    pub fn set_validator(&self, validator: impl Validator + 'static) {
        *self.validator.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(validator));
    }

    /// Detach the validator
    pub fn clear_validator(&self) {
        *self.validator.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Close the current adapter's resources
    pub async fn close(&self) -> QueryResult<()> {
        let installed = self.current_adapter();
        installed.adapter.close().await
    }

    /// Decode a JSON request and execute it
    pub async fn execute_value(&self, value: Value) -> Response {
        match Request::from_value(value) {
            Ok(request) => self.execute(request).await,
            Err(err) => {
                self.metrics.increment_shape_rejections();
                self.metrics.increment_requests_failed();
                let message = err.to_string();
                Logger::warn(
                    "QUERY_REJECTED",
                    &[("code", err.code()), ("error", message.as_str())],
                );
                Response::from(&err)
            }
        }
    }

    /// Execute a request. Never fails: errors become `{status: false}`.
    pub async fn execute(&self, request: Request) -> Response {
        let installed = self.current_adapter();
        let ctx = RequestContext::new(&request, installed.adapter.name());

        if self.config.log_requests {
            log_event("QUERY_BEGIN", &ctx, &[]);
        }

        let outcome = AssertUnwindSafe(self.run(request, &installed))
            .catch_unwind()
            .await
            .unwrap_or(Err(QueryError::Internal));

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                self.record_error(&err);
                log_event(
                    "QUERY_FAILED",
                    &ctx,
                    &[("code", err.code().to_string()), ("error", err.to_string())],
                );
                Response::from(&err)
            }
        };

        if response.status {
            self.metrics.increment_requests_executed();
        } else {
            self.metrics.increment_requests_failed();
        }

        if self.config.log_requests {
            log_event(
                "QUERY_COMPLETE",
                &ctx,
                &[
                    ("duration_ms", ctx.elapsed_ms().to_string()),
                    ("status", response.status.to_string()),
                ],
            );
        }

        response
    }

    async fn run(&self, request: Request, installed: &InstalledAdapter) -> QueryResult<Response> {
        validate_shape(&request)?;

        let mut request = normalize(request, &self.config);

        let chain = self.middleware_snapshot();
        for middleware in &chain {
            request = middleware.handle(request).await.map_err(|err| match err {
                QueryError::Middleware(_) => err,
                other => QueryError::middleware(other.to_string()),
            })?;
        }

        if let Some(validator) = self.current_validator() {
            let payload = validation_payload(&request);
            let result = validator
                .validate(&request.entity, request.operation, &payload)
                .await;

            if !result.valid {
                self.metrics.increment_validation_rejections();
                let errors = result
                    .errors
                    .filter(|errors| !errors.is_empty())
                    .unwrap_or_else(|| vec![FieldError::new("_unknown", "Validation failed")]);
                return Ok(Response::validation_failed(errors));
            }
        }

        dispatch(installed, &request).await
    }

    fn current_adapter(&self) -> InstalledAdapter {
        self.adapter
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn current_validator(&self) -> Option<Arc<dyn Validator>> {
        self.validator
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn middleware_snapshot(&self) -> Vec<Arc<dyn Middleware>> {
        self.middleware
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record_error(&self, err: &QueryError) {
        match err {
            QueryError::Shape(_) | QueryError::Decode(_) => {
                self.metrics.increment_shape_rejections()
            }
            QueryError::Middleware(_) => self.metrics.increment_middleware_aborts(),
            _ => {}
        }
    }
}

/// Contract checks that run before anything else
pub fn validate_shape(request: &Request) -> QueryResult<()> {
    if request.entity.trim().is_empty() {
        return Err(QueryError::shape("`entity` (string) is required"));
    }

    if request.operation == Operation::Delete
        && request.id.as_deref().map_or(true, str::is_empty)
    {
        return Err(QueryError::shape(format!(
            "`{}` requires a string `id`",
            request.operation
        )));
    }

    Ok(())
}

/// Apply defaults, returning a new request value
pub fn normalize(request: Request, config: &EngineConfig) -> Request {
    if request.operation != Operation::List {
        return request;
    }

    let mut options = request.options.clone().unwrap_or_default();

    if options.limit.map_or(true, |limit| limit <= 0) {
        options.limit = Some(config.default_limit.max(1));
    }
    if options.skip.map_or(true, |skip| skip < 0) {
        options.skip = Some(0);
    }

    Request {
        options: Some(options),
        ..request
    }
}

/// The value handed to the validator for each operation
pub fn validation_payload(request: &Request) -> Value {
    match request.operation {
        Operation::Create | Operation::Update => {
            Value::Object(request.data.clone().unwrap_or_default())
        }
        Operation::List => request
            .options
            .as_ref()
            .map(options_value)
            .unwrap_or_else(|| Value::Object(Map::new())),
        Operation::Aggregate => match (&request.data, &request.pipeline) {
            (Some(data), _) => Value::Object(data.clone()),
            (None, Some(pipeline)) => {
                serde_json::to_value(pipeline).unwrap_or(Value::Array(Vec::new()))
            }
            (None, None) => Value::Object(Map::new()),
        },
        Operation::Get | Operation::Delete | Operation::Count => json!({
            "id": request.id,
            "filter": request.filter,
        }),
    }
}

fn options_value(options: &QueryOptions) -> Value {
    serde_json::to_value(options).unwrap_or_else(|_| Value::Object(Map::new()))
}

async fn dispatch(installed: &InstalledAdapter, request: &Request) -> QueryResult<Response> {
    let adapter = installed.adapter.as_ref();

    if !installed.capabilities.supports(request.operation) {
        return adapter.execute(request).await;
    }

    match request.operation {
        Operation::List => adapter.list(request).await,
        Operation::Get => adapter.get(request).await,
        Operation::Create => adapter.create(request).await,
        Operation::Update => adapter.update(request).await,
        Operation::Delete => adapter.delete(request).await,
        Operation::Count => adapter.count(request).await,
        Operation::Aggregate => adapter.aggregate(request).await,
    }
}

fn log_event(event: &str, ctx: &RequestContext, extra: &[(&str, String)]) {
    let mut fields = ctx.log_fields();
    fields.extend(extra.iter().map(|(k, v)| (*k, v.clone())));
    let refs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();

    if event == "QUERY_FAILED" {
        Logger::warn(event, &refs);
    } else {
        Logger::info(event, &refs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shape_requires_entity() {
        let req = Request::list("");
        assert!(matches!(validate_shape(&req), Err(QueryError::Shape(_))));
    }

    #[test]
    fn test_delete_requires_id() {
        let req = Request::new(Operation::Delete, "users");
        let err = validate_shape(&req).unwrap_err();
        assert_eq!(err.to_string(), "`delete` requires a string `id`");

        assert!(validate_shape(&Request::delete("users", "u1")).is_ok());
    }

    #[test]
    fn test_normalize_list_defaults() {
        let req = normalize(Request::list("users"), &EngineConfig::default());
        let options = req.options.unwrap();
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.skip, Some(0));
    }

    #[test]
    fn test_normalize_fixes_bad_window() {
        let req = Request::list("users").with_options(QueryOptions {
            limit: Some(-3),
            skip: Some(-1),
            ..QueryOptions::default()
        });
        let options = normalize(req, &EngineConfig::default()).options.unwrap();
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.skip, Some(0));
    }

    #[test]
    fn test_normalize_keeps_valid_window() {
        let req = Request::list("users").with_options(QueryOptions {
            limit: Some(25),
            skip: Some(50),
            ..QueryOptions::default()
        });
        let options = normalize(req, &EngineConfig::default()).options.unwrap();
        assert_eq!(options.limit, Some(25));
        assert_eq!(options.skip, Some(50));
    }

    #[test]
    fn test_normalize_leaves_other_operations() {
        let req = Request::count("users");
        assert_eq!(normalize(req.clone(), &EngineConfig::default()), req);
    }

    #[test]
    fn test_validation_payloads() {
        let create = Request::create("users", json!({"email": "a@b.c"}));
        assert_eq!(validation_payload(&create), json!({"email": "a@b.c"}));

        let get = Request::get("users", "u1");
        assert_eq!(validation_payload(&get), json!({"id": "u1", "filter": null}));

        let agg = Request::aggregate("users", vec![crate::request::Stage::Limit(1)]);
        assert_eq!(validation_payload(&agg), json!([{"limit": 1}]));

        let list = normalize(Request::list("users"), &EngineConfig::default());
        assert_eq!(validation_payload(&list), json!({"limit": 10, "skip": 0}));
    }
}
