//! Bootstrap error aggregation.
//!
//! An `ErrorArrayHandler`-style in-memory log aggregator: every error
//! raised while constructing Connections (bad routing entries, unknown
//! types, bus setup failures) is appended here rather than aborting
//! construction immediately, so the bootstrap can inspect the whole set
//! once and decide between starting the main loop and entering
//! `locked_out`.

use log::error;

use crate::error::InterlockError;

#[derive(Debug, Clone)]
pub struct RecordedError {
    /// Name of the Connection (or "config") that raised this error.
    pub source: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ErrorArrayHandler {
    errors: Vec<RecordedError>,
}

impl ErrorArrayHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error without interrupting construction. Also logs it at
    /// `error` level immediately, since by the time the bootstrap decision
    /// is made the original context may no longer be on the stack.
    pub fn record(&mut self, source: impl Into<String>, err: impl std::fmt::Display) {
        let source = source.into();
        error!("{source}: {err}");
        self.errors.push(RecordedError {
            source,
            message: err.to_string(),
        });
    }

    pub fn record_interlock_error(&mut self, source: impl Into<String>, err: &InterlockError) {
        self.record(source, err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[RecordedError] {
        &self.errors
    }

    /// `true` when the accumulated errors mean bootstrap should enter
    /// `locked_out` rather than start the main loop.
    pub fn should_lock_out(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_and_runnable() {
        let handler = ErrorArrayHandler::new();
        assert!(handler.is_empty());
        assert!(!handler.should_lock_out());
    }

    #[test]
    fn recording_triggers_lock_out() {
        let mut handler = ErrorArrayHandler::new();
        handler.record("relay", "unknown connection type 'bogus'");
        assert_eq!(handler.len(), 1);
        assert!(handler.should_lock_out());
        assert_eq!(handler.errors()[0].source, "relay");
    }
}
