//! # Payload Validation
//!
//! The engine hands each request's payload to an optional `Validator`
//! before dispatch. A validator reports outcomes as data; it never fails.

mod registry;
mod rules;

pub use registry::{Schema, ValidationRegistry};
pub use rules::{FieldKind, FieldRule, RuleSchema};

use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::Operation;
use crate::response::FieldError;

/// Outcome of validating one payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: None,
        }
    }

    pub fn invalid(errors: Vec<FieldError>) -> Self {
        Self {
            valid: false,
            errors: Some(errors),
        }
    }

    /// Valid when `errors` is empty
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        if errors.is_empty() {
            Self::ok()
        } else {
            Self::invalid(errors)
        }
    }
}

/// Payload validator consulted by the engine
pub trait Validator: Send + Sync {
    fn validate<'a>(
        &'a self,
        entity: &'a str,
        operation: Operation,
        payload: &'a Value,
    ) -> BoxFuture<'a, ValidationResult>;
}

impl<F> Validator for F
where
    F: Fn(&str, Operation, &Value) -> ValidationResult + Send + Sync,
{
    fn validate<'a>(
        &'a self,
        entity: &'a str,
        operation: Operation,
        payload: &'a Value,
    ) -> BoxFuture<'a, ValidationResult> {
        let result = self(entity, operation, payload);
        async move { result }.boxed()
    }
}
