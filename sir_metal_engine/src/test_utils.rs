//! Shared helpers for unit tests

use std::sync::{Arc, Mutex};
use crate::log::{self, LogEntry, LogSeverity, Logger};

/// Logger that records every entry so tests can assert on logged errors
#[derive(Clone, Default)]
pub struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CaptureLogger {
    /// Install a fresh capture logger as the global logger
    ///
    /// Callers must be `#[serial]`: the logger slot is process-wide.
    /// The console logger comes back when the guard drops.
    pub fn install() -> CaptureGuard {
        let capture = Self::default();
        log::set_logger(capture.clone());
        CaptureGuard { capture }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Whether an entry of `severity` whose message contains `needle` was logged
    pub fn contains(&self, severity: LogSeverity, needle: &str) -> bool {
        self.entries.lock().unwrap()
            .iter()
            .any(|e| e.severity == severity && e.message.contains(needle))
    }
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// Restores the console logger on drop
pub struct CaptureGuard {
    capture: CaptureLogger,
}

impl std::ops::Deref for CaptureGuard {
    type Target = CaptureLogger;
    fn deref(&self) -> &CaptureLogger {
        &self.capture
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        log::reset_logger();
    }
}
