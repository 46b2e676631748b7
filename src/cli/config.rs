//! CLI configuration file
//!
//! ```json
//! {
//!   "engine":     { "default_limit": 20, "log_requests": true },
//!   "document":   { "data_dir": "./data", "flush_on_close": true },
//!   "read_only":  ["auditLog"],
//!   "validation": { "users": { "create": { "email": { "type": "string", "required": true } } } }
//! }
//! ```
//!
//! Every section is optional.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::adapter::DocumentConfig;
use crate::core::{EngineConfig, GuardMiddleware};
use crate::request::Operation;
use crate::validation::{RuleSchema, ValidationRegistry};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub document: DocumentConfig,

    /// Entities that reject create, update and delete
    #[serde(default)]
    pub read_only: Vec<String>,

    /// entity -> operation -> field rules
    #[serde(default)]
    pub validation: BTreeMap<String, BTreeMap<String, RuleSchema>>,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// The file at `path`, or defaults when no path is given
    pub fn load_or_default(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> CliResult<()> {
        if self.engine.default_limit <= 0 {
            return Err(CliError::config_error("engine.default_limit must be > 0"));
        }

        for (entity, rules) in &self.validation {
            for operation in rules.keys() {
                operation.parse::<Operation>().map_err(|_| {
                    CliError::config_error(format!(
                        "Unknown operation '{}' in validation rules for '{}'",
                        operation, entity
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Schemas from the `validation` section; `None` when it is empty
    pub fn validation_registry(&self) -> CliResult<Option<ValidationRegistry>> {
        if self.validation.is_empty() {
            return Ok(None);
        }

        let mut registry = ValidationRegistry::new();
        for (entity, rules) in &self.validation {
            for (operation, schema) in rules {
                let operation = operation
                    .parse::<Operation>()
                    .map_err(|e| CliError::config_error(e.to_string()))?;
                registry.register(entity, operation, schema.clone());
            }
        }
        Ok(Some(registry))
    }

    /// Guard for the `read_only` entities; `None` when there are none
    pub fn guard(&self) -> Option<GuardMiddleware> {
        if self.read_only.is_empty() {
            return None;
        }
        Some(
            self.read_only
                .iter()
                .fold(GuardMiddleware::new(), |guard, entity| guard.read_only(entity.as_str())),
        )
    }
}
