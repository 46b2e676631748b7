//! Metrics registry
//!
//! Counters only, monotonic, reset on process start.
//! Relaxed atomics; exactness across threads is eventual.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Engine counters
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Calls that returned `status: true`
    requests_executed: AtomicU64,
    /// Calls that returned `status: false`
    requests_failed: AtomicU64,
    /// Malformed request envelopes
    shape_rejections: AtomicU64,
    /// Payloads rejected by the validator
    validation_rejections: AtomicU64,
    /// Chains aborted by a middleware
    middleware_aborts: AtomicU64,
    /// Runtime adapter replacements
    adapter_swaps: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_requests_executed(&self) {
        self.requests_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_requests_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_shape_rejections(&self) {
        self.shape_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_validation_rejections(&self) {
        self.validation_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_middleware_aborts(&self) {
        self.middleware_aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_adapter_swaps(&self) {
        self.adapter_swaps.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_executed: self.requests_executed.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            shape_rejections: self.shape_rejections.load(Ordering::Relaxed),
            validation_rejections: self.validation_rejections.load(Ordering::Relaxed),
            middleware_aborts: self.middleware_aborts.load(Ordering::Relaxed),
            adapter_swaps: self.adapter_swaps.load(Ordering::Relaxed),
        }
    }
}

/// Immutable counter values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_executed: u64,
    pub requests_failed: u64,
    pub shape_rejections: u64,
    pub validation_rejections: u64,
    pub middleware_aborts: u64,
    pub adapter_swaps: u64,
}

impl MetricsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.requests_executed + self.requests_failed
    }
}
