//! Engine Configuration

use serde::{Deserialize, Serialize};

use crate::observability::Severity;

/// Query engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Page size applied to `list` when the limit is absent or non-positive (default: 10)
    #[serde(default = "default_limit")]
    pub default_limit: i64,

    /// Emit QUERY_BEGIN/QUERY_COMPLETE events (default: false)
    #[serde(default)]
    pub log_requests: bool,

    /// Lowest severity written by the logger (default: info)
    #[serde(default = "default_severity")]
    pub min_log_severity: Severity,
}

fn default_limit() -> i64 {
    10
}

fn default_severity() -> Severity {
    Severity::Info
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            log_requests: false,
            min_log_severity: default_severity(),
        }
    }
}

impl EngineConfig {
    /// Config with request logging switched on
    pub fn verbose() -> Self {
        Self {
            log_requests: true,
            ..Self::default()
        }
    }
}
