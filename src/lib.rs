//! rawql - A backend-agnostic query engine
//!
//! One uniform request shape (list, get, create, update, delete, count,
//! aggregate) is routed through a middleware chain and an optional payload
//! validator into a pluggable storage adapter, which translates filters and
//! aggregation pipelines into its backend's native query form.

pub mod adapter;
pub mod cli;
pub mod core;
pub mod observability;
pub mod request;
pub mod response;
pub mod validation;

pub use crate::adapter::{Adapter, Capabilities, DocumentAdapter, InMemoryAdapter};
pub use crate::core::{EngineConfig, Middleware, QueryEngine, QueryError, QueryResult};
pub use crate::request::{Filter, FilterOperator, Operation, QueryOptions, Request, Stage};
pub use crate::response::{FieldError, Page, Response, ResponseData};
pub use crate::validation::{ValidationRegistry, ValidationResult, Validator};
