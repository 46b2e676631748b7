//! CLI command implementations
//!
//! Each command is one shot: load config, read one request, print one
//! JSON document, exit. `query` opens a `DocumentAdapter`, runs the
//! request through a fully configured `QueryEngine` and closes the
//! adapter so snapshots are flushed.

use std::path::Path;

use serde_json::{json, Value};

use super::args::Command;
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::{read_json_file, read_request, write_json};
use crate::adapter::DocumentAdapter;
use crate::core::{normalize, validate_shape, QueryEngine};
use crate::observability::Logger;
use crate::request::Request;
use crate::response::Response;

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Query {
            config,
            data,
            request,
        } => query(config.as_deref(), data.as_deref(), request.as_deref()),
        Command::Explain { config, request } => explain(config.as_deref(), request.as_deref()),
        Command::Check { config, request } => check(config.as_deref(), request.as_deref()),
    }
}

/// Execute a single request and print the envelope
pub fn query(
    config_path: Option<&Path>,
    data_path: Option<&Path>,
    request_path: Option<&Path>,
) -> CliResult<()> {
    let config = Config::load_or_default(config_path)?;
    let request = read_request(request_path)?;

    let response = execute(&config, data_path, request)?;
    write_json(&response.to_value())
}

/// Print the native query of a request
pub fn explain(config_path: Option<&Path>, request_path: Option<&Path>) -> CliResult<()> {
    let config = Config::load_or_default(config_path)?;
    let request = read_request(request_path)?;

    write_json(&plan(&config, request)?)
}

/// Shape-check a request and print its normalized form
pub fn check(config_path: Option<&Path>, request_path: Option<&Path>) -> CliResult<()> {
    let config = Config::load_or_default(config_path)?;
    let request = decode(read_request(request_path)?)?;

    validate_shape(&request).map_err(|e| CliError::request_error(&e))?;
    let normalized = normalize(request, &config.engine);

    write_json(&json!({
        "valid": true,
        "request": normalized.to_value(),
    }))
}

/// Run `request` on a document adapter built from `config`, seeded from
/// `data_path`. The adapter is closed before returning.
pub fn execute(config: &Config, data_path: Option<&Path>, request: Value) -> CliResult<Response> {
    let adapter = open_adapter(config, data_path)?;

    let mut engine = QueryEngine::with_config(adapter, config.engine.clone());
    if let Some(registry) = config.validation_registry()? {
        engine = engine.with_validator(registry);
    }
    if let Some(guard) = config.guard() {
        engine = engine.with_middleware(guard);
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime_error(format!("Failed to create tokio runtime: {}", e)))?;

    runtime.block_on(async {
        let response = engine.execute_value(request).await;
        engine
            .close()
            .await
            .map_err(|e| CliError::adapter_error(&e))?;
        Ok(response)
    })
}

/// Translate `request` without executing it
pub fn plan(config: &Config, request: Value) -> CliResult<Value> {
    let request = decode(request)?;
    let adapter = DocumentAdapter::open(config.document.clone())
        .map_err(|e| CliError::adapter_error(&e))?;

    adapter
        .explain(&request)
        .map_err(|e| CliError::request_error(&e))
}

fn decode(value: Value) -> CliResult<Request> {
    Request::from_value(value).map_err(|e| CliError::request_error(&e))
}

fn open_adapter(config: &Config, data_path: Option<&Path>) -> CliResult<DocumentAdapter> {
    let adapter = DocumentAdapter::open(config.document.clone())
        .map_err(|e| CliError::adapter_error(&e))?;

    let Some(path) = data_path else {
        return Ok(adapter);
    };

    let seed = match read_json_file(path)? {
        Value::Object(seed) => seed,
        _ => {
            return Err(CliError::io_error(format!(
                "Seed file {} must be an object of entity -> records",
                path.display()
            )))
        }
    };

    for (entity, records) in seed {
        let records = match records {
            Value::Array(records) => records,
            _ => {
                return Err(CliError::io_error(format!(
                    "Seed records for '{}' must be an array",
                    entity
                )))
            }
        };
        let count = records.len().to_string();
        adapter
            .register_with(&entity, records)
            .map_err(|e| CliError::adapter_error(&e))?;
        Logger::trace("SEED_LOADED", &[("entity", entity.as_str()), ("records", count.as_str())]);
    }

    Ok(adapter)
}
