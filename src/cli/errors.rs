//! CLI-specific error types

use std::fmt;
use std::io;

use crate::core::QueryError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (files, stdin/stdout)
    IoError,
    /// Request could not be decoded or failed shape checks
    RequestError,
    /// Adapter could not be opened, seeded or closed
    AdapterError,
    /// Async runtime could not be started
    RuntimeError,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "RAWQL_CLI_CONFIG_ERROR",
            Self::IoError => "RAWQL_CLI_IO_ERROR",
            Self::RequestError => "RAWQL_CLI_REQUEST_ERROR",
            Self::AdapterError => "RAWQL_CLI_ADAPTER_ERROR",
            Self::RuntimeError => "RAWQL_CLI_RUNTIME_ERROR",
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn request_error(err: &QueryError) -> Self {
        Self::new(CliErrorCode::RequestError, err.to_string())
    }

    pub fn adapter_error(err: &QueryError) -> Self {
        Self::new(CliErrorCode::AdapterError, err.to_string())
    }

    pub fn runtime_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::RuntimeError, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::request_error(&QueryError::shape("`entity` (string) is required"));
        assert_eq!(
            err.to_string(),
            "RAWQL_CLI_REQUEST_ERROR: `entity` (string) is required"
        );
        assert_eq!(err.code(), &CliErrorCode::RequestError);
    }
}
