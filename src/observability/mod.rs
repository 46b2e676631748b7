//! Observability for the query engine
//!
//! - Structured JSON logging, one event per line
//! - Counter metrics
//! - Scoped begin/complete events
//!
//! Observability is read-only: nothing here changes the outcome of a call.
//!
//! ```ignore
//! use rawql::observability::{Logger, MetricsRegistry, ObservationScope};
//!
//! Logger::info("QUERY_COMPLETE", &[("entity", "users")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_requests_executed();
//!
//! let scope = ObservationScope::new("SNAPSHOT_FLUSH");
//! scope.complete();
//! ```

mod logger;
mod metrics;
mod scope;

pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;
