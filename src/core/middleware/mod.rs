//! Middleware Traits and Implementations
//!
//! A middleware takes the normalized request by value and returns the
//! (possibly rewritten) request for the next stage. An error aborts the
//! chain. Stages run strictly in registration order.

use std::future::Future;

use futures_util::future::{BoxFuture, FutureExt};

use crate::core::error::QueryResult;
use crate::request::Request;

/// Request interceptor run before payload validation and dispatch
pub trait Middleware: Send + Sync {
    /// Rewrite or reject the request
    fn handle<'a>(&'a self, request: Request) -> BoxFuture<'a, QueryResult<Request>>;

    /// Name used in logs
    fn name(&self) -> &str {
        "middleware"
    }
}

impl<F, Fut> Middleware for F
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = QueryResult<Request>> + Send + 'static,
{
    fn handle<'a>(&'a self, request: Request) -> BoxFuture<'a, QueryResult<Request>> {
        (self)(request).boxed()
    }

    fn name(&self) -> &str {
        "closure"
    }
}

pub mod guard;
pub mod scope;

pub use guard::GuardMiddleware;
pub use scope::ScopeMiddleware;
