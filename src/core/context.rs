//! Request Context
//!
//! Per-call metadata the engine carries for observability. The request
//! itself stays a plain value; the context is never handed to adapters.

use std::time::Instant;

use uuid::Uuid;

use crate::request::{Operation, Request};

/// Context for one `execute` call
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request ID for log correlation
    pub request_id: Uuid,

    pub entity: String,

    pub operation: Operation,

    /// Name of the adapter the call was dispatched to
    pub adapter: &'static str,

    started_at: Instant,
}

impl RequestContext {
    pub fn new(request: &Request, adapter: &'static str) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            entity: request.entity.clone(),
            operation: request.operation,
            adapter,
            started_at: Instant::now(),
        }
    }

    /// Elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }

    /// Key/value pairs for structured log lines
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("adapter", self.adapter.to_string()),
            ("entity", self.entity.clone()),
            ("operation", self.operation.to_string()),
            ("request_id", self.request_id.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_from_request() {
        let req = Request::count("users");
        let ctx = RequestContext::new(&req, "memory");

        assert_eq!(ctx.entity, "users");
        assert_eq!(ctx.operation, Operation::Count);
        assert_ne!(ctx.request_id, RequestContext::new(&req, "memory").request_id);
    }

    #[test]
    fn test_log_fields_sorted_keys() {
        let ctx = RequestContext::new(&Request::list("posts"), "document");
        let keys: Vec<_> = ctx.log_fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["adapter", "entity", "operation", "request_id"]);
    }
}
