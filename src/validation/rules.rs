//! Declarative field rules
//!
//! A `RuleSchema` maps field names to a presence requirement and an
//! optional JSON type. Every failing field is reported, in field-name order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::Schema;
use super::ValidationResult;
use crate::response::FieldError;

/// JSON type a field must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    /// Any JSON number
    Number,
    /// A number without a fractional part
    Integer,
    Bool,
    Object,
    Array,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Bool => "bool",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,
    #[serde(default)]
    pub required: bool,
}

/// Field name -> rule
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSchema {
    fields: BTreeMap<String, FieldRule>,
}

impl RuleSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field must be present, non-null and of `kind`
    pub fn required(mut self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            field.into(),
            FieldRule {
                kind: Some(kind),
                required: true,
            },
        );
        self
    }

    /// Field may be absent or null; if present it must be of `kind`
    pub fn optional(mut self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            field.into(),
            FieldRule {
                kind: Some(kind),
                required: false,
            },
        );
        self
    }

    /// Field must be present, any type
    pub fn present(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(
            field.into(),
            FieldRule {
                kind: None,
                required: true,
            },
        );
        self
    }

    /// Every rule violation in `payload`
    pub fn violations(&self, payload: &Value) -> Vec<FieldError> {
        let Some(obj) = payload.as_object() else {
            return vec![FieldError::new("_root", "payload must be an object")];
        };

        let mut errors = Vec::new();
        for (name, rule) in &self.fields {
            match obj.get(name) {
                None | Some(Value::Null) => {
                    if rule.required {
                        errors.push(FieldError::new(name, format!("{} is required", name)));
                    }
                }
                Some(value) => {
                    if let Some(kind) = rule.kind {
                        if !kind.accepts(value) {
                            errors.push(FieldError::new(
                                name,
                                format!("expected {}, found {}", kind, json_type_name(value)),
                            ));
                        }
                    }
                }
            }
        }
        errors
    }
}

impl Schema for RuleSchema {
    fn check(&self, payload: &Value) -> ValidationResult {
        ValidationResult::from_errors(self.violations(payload))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
