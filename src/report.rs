//! Reporting of non-fatal issues to the user.
//!
//! Components that can degrade gracefully (enclosure synthesis, material
//! loading, project restore) do not print or log on their own. They receive a
//! [`Reporter`] from the caller and send their messages through it.
//!
//! Two sinks are provided:
//! - [`TracingReporter`]: forwards to the `tracing` macros, used by the binary
//! - [`MemoryReporter`]: keeps a bounded in-memory log, the equivalent of a
//!   log panel, and what the tests inspect

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;


/// Maximum number of entries retained by a [`MemoryReporter`].
pub const LOG_CAPACITY: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

/// Sink for user-facing status messages.
pub trait Reporter {
    fn report(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.report(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.report(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.report(Level::Error, message);
    }
}

/// Forwards every message to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, level: Level, message: &str) {
        match level {
            Level::Info => tracing::info!("{}", message),
            Level::Warn => tracing::warn!("{}", message),
            Level::Error => tracing::error!("{}", message),
        }
    }
}

/// Bounded in-memory log. Oldest entries are dropped past [`LOG_CAPACITY`].
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: RefCell<VecDeque<(Level, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.borrow().iter().cloned().collect()
    }

    /// Messages logged at `level`, oldest first.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// The most recent message, shown in a status line.
    pub fn last(&self) -> Option<String> {
        self.entries.borrow().back().map(|(_, m)| m.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, level: Level, message: &str) {
        let mut entries = self.entries.borrow_mut();
        if entries.len() == LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back((level, message.to_string()));
    }
}
