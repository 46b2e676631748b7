//! Guard Middleware
//!
//! Rejects operations that are not permitted on an entity.

use std::collections::{HashMap, HashSet};

use futures_util::future::{BoxFuture, FutureExt};

use crate::core::error::{QueryError, QueryResult};
use crate::request::{Operation, Request};

use super::Middleware;

/// Guard middleware
#[derive(Default)]
pub struct GuardMiddleware {
    denied: HashMap<String, HashSet<Operation>>,
}

impl GuardMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny one operation on an entity
    pub fn deny(mut self, entity: impl Into<String>, operation: Operation) -> Self {
        self.denied.entry(entity.into()).or_default().insert(operation);
        self
    }

    /// Deny every write operation on an entity
    pub fn read_only(self, entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Operation::ALL
            .into_iter()
            .filter(Operation::is_write)
            .fold(self, |guard, op| guard.deny(entity.clone(), op))
    }

    fn check(&self, request: &Request) -> QueryResult<()> {
        let denied = self
            .denied
            .get(&request.entity)
            .is_some_and(|ops| ops.contains(&request.operation));

        if denied {
            return Err(QueryError::middleware(format!(
                "Operation '{}' is not permitted on '{}'",
                request.operation, request.entity
            )));
        }
        Ok(())
    }
}

impl Middleware for GuardMiddleware {
    fn handle<'a>(&'a self, request: Request) -> BoxFuture<'a, QueryResult<Request>> {
        async move {
            self.check(&request)?;
            Ok(request)
        }
        .boxed()
    }

    fn name(&self) -> &str {
        "guard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_allowed_operation_passes() {
        let guard = GuardMiddleware::new().deny("users", Operation::Delete);
        assert!(guard.handle(Request::list("users")).await.is_ok());
    }

    #[tokio::test]
    async fn test_denied_operation_rejected() {
        let guard = GuardMiddleware::new().deny("users", Operation::Delete);
        let err = guard.handle(Request::delete("users", "u1")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Operation 'delete' is not permitted on 'users'"
        );
    }

    #[tokio::test]
    async fn test_read_only_entity() {
        let guard = GuardMiddleware::new().read_only("auditLog");

        assert!(guard.handle(Request::list("auditLog")).await.is_ok());
        assert!(guard
            .handle(Request::create("auditLog", json!({"x": 1})))
            .await
            .is_err());
        assert!(guard
            .handle(Request::update("auditLog", "a1", json!({"x": 2})))
            .await
            .is_err());
    }
}
