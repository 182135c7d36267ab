//! User-facing events emitted by the core.
//!
//! The presentation layer subscribes to a broadcast channel; the core never
//! touches UI state directly. Every log line is mirrored into `tracing`.

use chrono::Local;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::level::InterventionLevel;
use crate::verdict::Verdict;

const CHANNEL_CAPACITY: usize = 256;

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSeverity {
    Info,
    Warn,
    Error,
}

/// A line-stamped log entry, e.g. `[14:03:12] capture complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub severity: LogSeverity,
    pub line: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    Log(LogLine),
    Notification { title: String, message: String },
    Verdict(Verdict),
    Score {
        score: u32,
        level: InterventionLevel,
    },
}

/// Cloneable handle for publishing events.
///
/// Publishing never fails: with no subscribers the event is simply dropped
/// (it has already been written to the tracing log).
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<MonitorEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{message}");
        self.publish_log(LogSeverity::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{message}");
        self.publish_log(LogSeverity::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!("{message}");
        self.publish_log(LogSeverity::Error, message);
    }

    pub fn notify(&self, title: impl Into<String>, message: impl Into<String>) {
        let title = title.into();
        let message = message.into();
        tracing::info!(%title, "{message}");
        let _ = self.tx.send(MonitorEvent::Notification { title, message });
    }

    pub fn verdict(&self, verdict: &Verdict) {
        let _ = self.tx.send(MonitorEvent::Verdict(verdict.clone()));
    }

    pub fn score(&self, score: u32, level: InterventionLevel) {
        let _ = self.tx.send(MonitorEvent::Score { score, level });
    }

    fn publish_log(&self, severity: LogSeverity, message: &str) {
        let line = stamp(message);
        let _ = self.tx.send(MonitorEvent::Log(LogLine { severity, line }));
    }
}

fn stamp(message: &str) -> String {
    format!("[{}] {message}", Local::now().format("%H:%M:%S"))
}
