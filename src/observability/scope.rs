//! Begin/complete logging around a unit of work
//!
//! - `{name}_BEGIN` on creation
//! - `{name}_COMPLETE` on `complete()`
//! - `{name}_FAILED` on `fail()`
//! - `{name}_INCOMPLETE` when dropped without either

use std::time::Instant;

use super::logger::Logger;

/// Scoped lifecycle logger
///
/// ```ignore
/// let scope = ObservationScope::with_fields("SNAPSHOT_FLUSH", &[("entity", "users")]);
/// write_snapshot()?;
/// scope.complete_with_fields(&[("records", "12")]);
/// ```
pub struct ObservationScope {
    name: String,
    fields: Vec<(String, String)>,
    started: Instant,
    finished: bool,
}

impl ObservationScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_fields(name, &[])
    }

    /// Scope whose fields are repeated on every event it emits
    pub fn with_fields(name: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        let scope = Self {
            name: name.into(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            started: Instant::now(),
            finished: false,
        };
        Logger::info(&format!("{}_BEGIN", scope.name), &scope.field_refs(&[]));
        scope
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.finished = true;
        let elapsed = self.started.elapsed().as_millis().to_string();
        let mut extra = extra.to_vec();
        extra.push(("duration_ms", elapsed.as_str()));
        Logger::info(&format!("{}_COMPLETE", self.name), &self.field_refs(&extra));
    }

    pub fn fail(mut self, reason: &str) {
        self.finished = true;
        Logger::error(
            &format!("{}_FAILED", self.name),
            &self.field_refs(&[("reason", reason)]),
        );
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn field_refs<'a>(&'a self, extra: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(extra.iter().copied())
            .collect()
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &self.field_refs(&[("reason", "scope dropped without completion")]),
            );
        }
    }
}
