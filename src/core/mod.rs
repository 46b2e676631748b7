//! # Core Module
//!
//! The engine, its configuration, the error model and the middleware
//! chain. Every caller goes through `QueryEngine::execute`.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod middleware;

pub use config::EngineConfig;
pub use context::RequestContext;
pub use engine::{normalize, validate_shape, validation_payload, QueryEngine};
pub use error::{QueryError, QueryResult};
pub use middleware::{GuardMiddleware, Middleware, ScopeMiddleware};
