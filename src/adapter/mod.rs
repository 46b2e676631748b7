//! # Storage Adapters
//!
//! An adapter turns the uniform request into backend work. The generic
//! `execute` entry point is mandatory. Per-operation handlers are optional;
//! an adapter announces the ones it implements through its `Capabilities`,
//! and the engine reads that descriptor once when the adapter is installed.

use std::collections::BTreeSet;

use futures_util::future::{BoxFuture, FutureExt};

use crate::core::error::{QueryError, QueryResult};
use crate::request::{Filter, Operation, Request, Stage};
use crate::response::Response;

pub mod document;
pub mod memory;

pub use document::{DocumentAdapter, DocumentConfig};
pub use memory::InMemoryAdapter;

/// Set of operations an adapter serves with a dedicated handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    operations: BTreeSet<Operation>,
}

impl Capabilities {
    /// No per-operation handlers; everything goes through `execute`
    pub fn none() -> Self {
        Self::default()
    }

    /// A handler for every operation
    pub fn all() -> Self {
        Self::of(&Operation::ALL)
    }

    pub fn of(operations: &[Operation]) -> Self {
        Self {
            operations: operations.iter().copied().collect(),
        }
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.operations.iter().copied()
    }
}

/// Backend adapter contract
pub trait Adapter: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Per-operation handlers this adapter implements
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }

    /// Generic entry point for any request
    fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>>;

    fn list<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        unsupported(request)
    }

    fn get<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        unsupported(request)
    }

    fn create<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        unsupported(request)
    }

    fn update<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        unsupported(request)
    }

    fn delete<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        unsupported(request)
    }

    fn count<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        unsupported(request)
    }

    fn aggregate<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, QueryResult<Response>> {
        unsupported(request)
    }

    /// Release backend resources. Adapters without resources keep the default.
    fn close(&self) -> BoxFuture<'_, QueryResult<()>> {
        async { Ok(()) }.boxed()
    }
}

/// Default body for handlers an adapter does not implement
pub fn unsupported<'a>(request: &Request) -> BoxFuture<'a, QueryResult<Response>> {
    let operation = request.operation;
    async move { Err(QueryError::Unsupported(operation)) }.boxed()
}

/// Converts backend-agnostic filters and pipelines into a backend's native form
pub trait QueryTranslator {
    /// Native predicate
    type Predicate;
    /// Native pipeline stage
    type Stage;

    /// `None` translates to the match-everything predicate
    fn translate_filter(&self, filter: Option<&Filter>) -> QueryResult<Self::Predicate>;

    /// Order-preserving: stage `i` in maps to stage `i` out
    fn translate_pipeline(&self, stages: &[Stage]) -> QueryResult<Vec<Self::Stage>>;
}
