//! Core Error Types
//!
//! Every failure inside the engine, a middleware, a translator or an
//! adapter is a `QueryError`. The engine turns all of them into a failed
//! response envelope; none escapes `execute`.

use thiserror::Error;

use crate::request::Operation;

/// Core module result type
pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Malformed request envelope (missing entity/type, delete without id)
    #[error("{0}")]
    Shape(String),

    /// Request body could not be decoded
    #[error("Invalid request: {0}")]
    Decode(String),

    /// A middleware aborted the chain
    #[error("{0}")]
    Middleware(String),

    /// Filter or pipeline could not be translated
    #[error("{0}")]
    Translation(String),

    /// Target entity has no registered collection
    #[error("Model for entity {entity} is not registered")]
    NotRegistered { entity: String },

    /// Neither a per-operation handler nor the generic entry point
    #[error("Adapter does not support '{0}' and no generic execute() found")]
    Unsupported(Operation),

    /// Connection, storage or native query failure
    #[error("{0}")]
    Backend(String),

    /// Adapter or middleware panicked
    #[error("RawQl Engine Execution Error")]
    Internal,
}

impl QueryError {
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub fn middleware(msg: impl Into<String>) -> Self {
        Self::Middleware(msg.into())
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation(msg.into())
    }

    pub fn not_registered(entity: impl Into<String>) -> Self {
        Self::NotRegistered {
            entity: entity.into(),
        }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Stable code for logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::Shape(_) => "RAWQL_SHAPE_ERROR",
            Self::Decode(_) => "RAWQL_DECODE_ERROR",
            Self::Middleware(_) => "RAWQL_MIDDLEWARE_ERROR",
            Self::Translation(_) => "RAWQL_TRANSLATION_ERROR",
            Self::NotRegistered { .. } => "RAWQL_NOT_REGISTERED",
            Self::Unsupported(_) => "RAWQL_UNSUPPORTED",
            Self::Backend(_) => "RAWQL_BACKEND_ERROR",
            Self::Internal => "RAWQL_INTERNAL_ERROR",
        }
    }

    /// Whether the failure was caused by the caller's request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Shape(_) | Self::Decode(_) | Self::Translation(_) | Self::Unsupported(_)
        )
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
