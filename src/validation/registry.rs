//! Schemas keyed by entity and operation

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;

use super::{ValidationResult, Validator};
use crate::request::Operation;

/// Something that can judge a payload
pub trait Schema: Send + Sync {
    fn check(&self, payload: &Value) -> ValidationResult;
}

impl<F> Schema for F
where
    F: Fn(&Value) -> ValidationResult + Send + Sync,
{
    fn check(&self, payload: &Value) -> ValidationResult {
        self(payload)
    }
}

/// Validator backed by per-(entity, operation) schemas.
///
/// A pair with no registered schema is valid.
#[derive(Default, Clone)]
pub struct ValidationRegistry {
    schemas: HashMap<String, Arc<dyn Schema>>,
}

impl ValidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(entity: &str, operation: Operation) -> String {
        format!("{}:{}", entity, operation)
    }

    /// Register or replace the schema for `entity` + `operation`
    pub fn register(&mut self, entity: &str, operation: Operation, schema: impl Schema + 'static) {
        self.schemas
            .insert(Self::key(entity, operation), Arc::new(schema));
    }

    pub fn with(mut self, entity: &str, operation: Operation, schema: impl Schema + 'static) -> Self {
        self.register(entity, operation, schema);
        self
    }

    pub fn get(&self, entity: &str, operation: Operation) -> Option<Arc<dyn Schema>> {
        self.schemas.get(&Self::key(entity, operation)).cloned()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl Validator for ValidationRegistry {
    fn validate<'a>(
        &'a self,
        entity: &'a str,
        operation: Operation,
        payload: &'a Value,
    ) -> BoxFuture<'a, ValidationResult> {
        let result = match self.get(entity, operation) {
            Some(schema) => schema.check(payload),
            None => ValidationResult::ok(),
        };
        async move { result }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::FieldError;
    use serde_json::json;

    fn email_required(payload: &Value) -> ValidationResult {
        match payload.get("email") {
            Some(Value::String(_)) => ValidationResult::ok(),
            _ => ValidationResult::invalid(vec![FieldError::new("email", "email is required")]),
        }
    }

    #[tokio::test]
    async fn test_unregistered_pair_is_valid() {
        let registry = ValidationRegistry::new();
        let result = registry
            .validate("users", Operation::Create, &json!({}))
            .await;
        assert_eq!(result, ValidationResult::ok());
    }

    #[tokio::test]
    async fn test_schema_selected_by_operation() {
        let registry = ValidationRegistry::new().with("users", Operation::Create, email_required);

        let payload = json!({"name": "ann"});
        assert!(!registry.validate("users", Operation::Create, &payload).await.valid);
        assert!(registry.validate("users", Operation::Update, &payload).await.valid);
        assert!(registry.validate("posts", Operation::Create, &payload).await.valid);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ValidationRegistry::new();
        registry.register("users", Operation::Create, email_required);
        registry.register("users", Operation::Create, |_: &Value| ValidationResult::ok());
        assert_eq!(registry.len(), 1);
        assert!(registry
            .get("users", Operation::Create)
            .unwrap()
            .check(&json!({}))
            .valid);
    }
}
