//! Scope Middleware
//!
//! Confines every request to the records whose scope field carries a fixed
//! value (tenant, owner). Reads get an extra conjunct; creates are stamped.

use std::collections::HashSet;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::core::error::{QueryError, QueryResult};
use crate::request::{Filter, Operation, Request, Stage};

use super::Middleware;

/// Scope middleware
pub struct ScopeMiddleware {
    field: String,
    value: Value,
    /// Entities the scope applies to; empty means all
    entities: HashSet<String>,
}

impl ScopeMiddleware {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
            entities: HashSet::new(),
        }
    }

    /// Restrict the scope to the given entities
    pub fn for_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = entities.into_iter().map(Into::into).collect();
        self
    }

    fn applies_to(&self, entity: &str) -> bool {
        self.entities.is_empty() || self.entities.contains(entity)
    }

    fn scope_filter(&self) -> Filter {
        Filter::eq(self.field.clone(), self.value.clone())
    }

    fn scoped(&self, mut request: Request) -> QueryResult<Request> {
        if !self.applies_to(&request.entity) {
            return Ok(request);
        }

        match request.operation {
            Operation::Create => {
                let data = request.data.get_or_insert_with(Default::default);
                data.insert(self.field.clone(), self.value.clone());
            }
            Operation::Aggregate => {
                let pipeline = request.pipeline.take().unwrap_or_default();
                if !pipeline.is_empty() {
                    let mut scoped = Vec::with_capacity(pipeline.len() + 1);
                    scoped.push(Stage::Match(self.scope_filter()));
                    scoped.extend(pipeline);
                    request.pipeline = Some(scoped);
                }
            }
            Operation::Update => {
                if let Some(existing) = request.data.as_ref().and_then(|d| d.get(&self.field)) {
                    if existing != &self.value {
                        return Err(QueryError::middleware(format!(
                            "Cannot move {} record out of scope `{}`",
                            request.entity, self.field
                        )));
                    }
                }
                request.filter = Some(self.conjoin(request.filter.take()));
            }
            Operation::List | Operation::Get | Operation::Delete | Operation::Count => {
                request.filter = Some(self.conjoin(request.filter.take()));
            }
        }

        Ok(request)
    }

    fn conjoin(&self, filter: Option<Filter>) -> Filter {
        match filter {
            Some(existing) => existing.and_also(self.scope_filter()),
            None => self.scope_filter(),
        }
    }
}

impl Middleware for ScopeMiddleware {
    fn handle<'a>(&'a self, request: Request) -> BoxFuture<'a, QueryResult<Request>> {
        async move { self.scoped(request) }.boxed()
    }

    fn name(&self) -> &str {
        "scope"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_gets_scope_filter() {
        let mw = ScopeMiddleware::new("tenantId", json!("t1"));
        let req = mw.handle(Request::list("users")).await.unwrap();

        assert_eq!(req.filter, Some(Filter::eq("tenantId", json!("t1"))));
    }

    #[tokio::test]
    async fn test_existing_filter_is_conjoined() {
        let mw = ScopeMiddleware::new("tenantId", json!("t1"));
        let req = Request::count("users").with_filter(Filter::eq("active", json!(true)));
        let req = mw.handle(req).await.unwrap();

        assert_eq!(
            req.filter,
            Some(Filter::and(vec![
                Filter::eq("active", json!(true)),
                Filter::eq("tenantId", json!("t1")),
            ]))
        );
    }

    #[tokio::test]
    async fn test_create_is_stamped() {
        let mw = ScopeMiddleware::new("tenantId", json!("t1"));
        let req = mw
            .handle(Request::create("users", json!({"name": "Ann"})))
            .await
            .unwrap();

        assert_eq!(req.data.unwrap()["tenantId"], "t1");
    }

    #[tokio::test]
    async fn test_update_cannot_leave_scope() {
        let mw = ScopeMiddleware::new("tenantId", json!("t1"));
        let req = Request::update("users", "u1", json!({"tenantId": "t2"}));
        assert!(matches!(mw.handle(req).await, Err(QueryError::Middleware(_))));
    }

    #[tokio::test]
    async fn test_aggregate_gets_leading_match() {
        let mw = ScopeMiddleware::new("tenantId", json!("t1"));
        let req = Request::aggregate("orders", vec![Stage::Limit(5)]);
        let req = mw.handle(req).await.unwrap();
        let pipeline = req.pipeline.unwrap();

        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline[0].tag(), "match");
    }

    #[tokio::test]
    async fn test_unscoped_entity_untouched() {
        let mw = ScopeMiddleware::new("tenantId", json!("t1")).for_entities(["orders"]);
        let req = mw.handle(Request::list("users")).await.unwrap();
        assert!(req.filter.is_none());
    }
}
