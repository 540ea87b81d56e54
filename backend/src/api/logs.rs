//! Run logs and real-time log streaming via Server-Sent Events (SSE).
//!
//! Every pipeline run accumulates its own [`RunLog`]: ordered,
//! severity-tagged entries handed back to the caller. Each entry is also
//! mirrored to `tracing`, and the HTTP server republishes finished runs on
//! [`LOG_BROADCASTER`] for connected SSE clients.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Log level, rendered as the entry's prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting level for display (per-resource detail lines are indented)
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    /// Mirror the entry to process logs.
    fn trace(&self) {
        match self.level {
            LogLevel::Info | LogLevel::Success => tracing::info!("{}", self.message),
            LogLevel::Warning => tracing::warn!("{}", self.message),
            LogLevel::Error => tracing::error!("{}", self.message),
        }
    }
}

impl fmt::Display for LogEntry {
    /// `LEVEL: message`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.message)
    }
}

// =============================================================================
// Run Log
// =============================================================================

/// Ordered log of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        entry.trace();
        self.entries.push(entry);
    }

    pub fn info(&mut self, msg: impl Into<String>) {
        self.push(LogEntry::info(msg));
    }

    pub fn success(&mut self, msg: impl Into<String>) {
        self.push(LogEntry::success(msg));
    }

    pub fn warning(&mut self, msg: impl Into<String>) {
        self.push(LogEntry::warning(msg));
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.push(LogEntry::error(msg));
    }

    /// Append another run's entries, keeping their order.
    pub fn extend(&mut self, other: RunLog) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    /// Entries rendered as `LEVEL: message` lines.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

// =============================================================================
// SSE Broadcaster
// =============================================================================

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Broadcasts log entries to all connected SSE clients
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Send a log entry to all subscribers
    pub fn log(&self, entry: LogEntry) {
        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    /// Republish a finished run.
    pub fn publish(&self, log: &RunLog) {
        for entry in log.entries() {
            self.log(entry.clone());
        }
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenient logging functions for server-level events
pub fn log_info(msg: impl Into<String>) {
    let entry = LogEntry::info(msg);
    entry.trace();
    LOG_BROADCASTER.log(entry);
}

pub fn log_error(msg: impl Into<String>) {
    let entry = LogEntry::error(msg);
    entry.trace();
    LOG_BROADCASTER.log(entry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_rendering() {
        assert_eq!(LogEntry::info("Reading rows").to_string(), "INFO: Reading rows");
        assert_eq!(LogEntry::success("Done").to_string(), "SUCCESS: Done");
        assert_eq!(LogEntry::warning("Truncated").to_string(), "WARNING: Truncated");
        assert_eq!(LogEntry::error("Row 2").to_string(), "ERROR: Row 2");
    }

    #[test]
    fn test_run_log_order_and_counts() {
        let mut first = RunLog::new();
        first.info("a");
        first.error("b");

        let mut second = RunLog::new();
        second.warning("c");

        first.extend(second);
        assert_eq!(first.lines(), vec!["INFO: a", "ERROR: b", "WARNING: c"]);
        assert_eq!(first.count(LogLevel::Error), 1);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_entry_serialization() {
        let json = serde_json::to_value(LogEntry::warning("x").with_indent(1)).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["indent"], 1);
    }

    #[test]
    fn test_broadcast_reaches_subscribers() {
        let broadcaster = LogBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        let mut log = RunLog::new();
        log.success("ok");
        broadcaster.publish(&log);

        assert_eq!(rx.try_recv().unwrap(), LogEntry::success("ok"));
    }
}
