//! # Diagnostics
//!
//! Structured diagnostics for the reincarnation service.
//!
//! ## Philosophy
//!
//! Diagnostics are explicit and structured, not printf-style. The
//! supervision core appends entries to an owned, bounded log; tests
//! inspect it directly instead of scraping console output.

use std::collections::VecDeque;
use std::fmt;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings
    Warn,
    /// Errors
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// A structured log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Creates a new log entry
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field to the log entry
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

/// A bounded, inspectable diagnostics log
///
/// The oldest entries are dropped once the capacity is reached.
#[derive(Debug)]
pub struct DiagnosticsLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    min_level: LogLevel,
}

impl DiagnosticsLog {
    /// Creates a log with the given capacity, recording Info and above
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            min_level: LogLevel::Info,
        }
    }

    /// Lowers the recording threshold to include debug entries
    pub fn verbose(mut self) -> Self {
        self.min_level = LogLevel::Debug;
        self
    }

    /// Appends an entry, dropping the oldest if the log is full
    pub fn record(&mut self, entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Records a debug entry
    pub fn debug(&mut self, message: impl Into<String>) {
        self.record(LogEntry::new(LogLevel::Debug, message));
    }

    /// Records an info entry
    pub fn info(&mut self, message: impl Into<String>) {
        self.record(LogEntry::new(LogLevel::Info, message));
    }

    /// Records a warning entry
    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(LogEntry::new(LogLevel::Warn, message));
    }

    /// Records an error entry
    pub fn error(&mut self, message: impl Into<String>) {
        self.record(LogEntry::new(LogLevel::Error, message));
    }

    /// Returns all retained entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Returns entries whose message contains the given fragment
    pub fn matching<'a>(&'a self, fragment: &'a str) -> impl Iterator<Item = &'a LogEntry> {
        self.entries.iter().filter(move |e| e.message.contains(fragment))
    }

    /// Returns the number of retained entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are retained
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DiagnosticsLog {
    fn default() -> Self {
        Self::new(256)
    }
}
