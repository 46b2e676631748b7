//! JSON I/O handling for the CLI
//!
//! Input is one JSON document, from a file or stdin. Output is one
//! pretty-printed JSON document on stdout.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read a JSON request from `path`, or from stdin when no path is given
pub fn read_request(path: Option<&Path>) -> CliResult<Value> {
    let raw = match path {
        Some(path) => fs::read_to_string(path).map_err(|e| {
            CliError::io_error(format!("Failed to read {}: {}", path.display(), e))
        })?,
        None => {
            let mut buf = String::new();
            io::stdin().lock().read_to_string(&mut buf)?;
            buf
        }
    };

    if raw.trim().is_empty() {
        return Err(CliError::io_error("Empty input"));
    }

    Ok(serde_json::from_str(&raw)?)
}

/// Read and parse a JSON file
pub fn read_json_file(path: &Path) -> CliResult<Value> {
    let raw = fs::read_to_string(path)
        .map_err(|e| CliError::io_error(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| CliError::io_error(format!("Invalid JSON in {}: {}", path.display(), e)))
}

/// Write a JSON value to stdout
pub fn write_json(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_request_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("req.json");
        fs::write(&path, r#"{"entity": "users", "type": "list"}"#).unwrap();

        let value = read_request(Some(&path)).unwrap();
        assert_eq!(value["entity"], "users");
    }

    #[test]
    fn test_empty_file_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("req.json");
        fs::write(&path, "  \n").unwrap();

        assert!(read_request(Some(&path)).is_err());
    }
}
