//! Leveled logging seam for greenlight.
//!
//! Every component of the release engine reports through the [`Logger`]
//! trait instead of a global logger, so the embedding runtime decides where
//! lines go (stderr, a webhook framework's log sink, a test buffer). The
//! trait takes `&self` and is `Send + Sync`, which lets parallel release
//! targets share one logger without wrapping it in a lock.
//!
//! # Example
//!
//! ```
//! use greenlight_log::{Logger, MemoryLogger, Level};
//!
//! let log = MemoryLogger::default();
//! log.info("release dispatched");
//! assert!(log.contains(Level::Info, "dispatched"));
//! ```

use std::fmt;
use std::io::Write;
use std::sync::Mutex;

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Verbose diagnostics (child-process output, cache hits).
    Debug,
    /// Normal progress reporting.
    Info,
    /// Recoverable oddities.
    Warn,
    /// Failures surfaced to the operator.
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Debug => write!(f, "debug"),
            Level::Info => write!(f, "info"),
            Level::Warn => write!(f, "warn"),
            Level::Error => write!(f, "error"),
        }
    }
}

/// Sink for engine log lines.
pub trait Logger: Send + Sync + std::fmt::Debug {
    /// Record one line at the given level.
    fn log(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

/// Logger that writes timestamped lines to stderr.
#[derive(Debug)]
pub struct StderrLogger {
    min_level: Level,
}

impl StderrLogger {
    /// Create a logger that drops lines below `min_level`.
    pub fn with_min_level(min_level: Level) -> Self {
        Self { min_level }
    }
}

impl Default for StderrLogger {
    fn default() -> Self {
        Self {
            min_level: Level::Debug,
        }
    }
}

impl Logger for StderrLogger {
    fn log(&self, level: Level, message: &str) {
        if level < self.min_level {
            return;
        }
        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{now} {level:>5} {message}");
    }
}

/// Logger that keeps every record in memory, for assertions in tests and
/// for embedders that forward logs elsewhere after the fact.
#[derive(Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<(Level, String)>>,
}

impl MemoryLogger {
    /// Snapshot of all records in arrival order.
    pub fn records(&self) -> Vec<(Level, String)> {
        self.records.lock().expect("logger poisoned").clone()
    }

    /// All messages, levels dropped.
    pub fn messages(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|(_, message)| message)
            .collect()
    }

    /// Whether any record at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str) {
        self.records
            .lock()
            .expect("logger poisoned")
            .push((level, message.to_string()));
    }
}
