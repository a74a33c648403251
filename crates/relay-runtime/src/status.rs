//! User-visible status indicator and notices.

#![allow(missing_docs)]

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTone {
    Normal,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Status indicator contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDisplay {
    pub text: String,
    pub tooltip: String,
    pub tone: StatusTone,
}

const LABEL: &str = "Relay";

impl StatusDisplay {
    fn new(tooltip: impl Into<String>, tone: StatusTone) -> Self {
        Self {
            text: LABEL.to_string(),
            tooltip: tooltip.into(),
            tone,
        }
    }

    #[must_use]
    pub fn active() -> Self {
        Self::new("Relay is running", StatusTone::Normal)
    }

    #[must_use]
    pub fn declined() -> Self {
        Self::new(
            "Inactive: another workspace is running Relay (you chose to stay on the old project).",
            StatusTone::Error,
        )
    }

    #[must_use]
    pub fn evicted() -> Self {
        Self::new("Inactive: another workspace is running Relay", StatusTone::Error)
    }

    #[must_use]
    pub fn bind_conflict() -> Self {
        Self::new(
            "Inactive (please verify whether Relay is active in another project or workspace).",
            StatusTone::Error,
        )
    }

    #[must_use]
    pub fn server_error(detail: &str) -> Self {
        Self::new(format!("Server encountered an error: {detail}"), StatusTone::Error)
    }

    #[must_use]
    pub fn stopped() -> Self {
        Self::new("Relay server deactivated", StatusTone::Error)
    }
}

/// Where status and notices go (the editor status bar, or a log).
pub trait StatusSink: Send + Sync {
    fn show_status(&self, status: &StatusDisplay);
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn show_status(&self, status: &StatusDisplay) {
        info!(tone = ?status.tone, "status: {}", status.tooltip);
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => info!("{message}"),
            NoticeLevel::Warning => warn!("{message}"),
            NoticeLevel::Error => error!("{message}"),
        }
    }
}

/// Remembers the latest status and every notice, then forwards to a sink.
pub struct StatusBoard {
    current: Mutex<Option<StatusDisplay>>,
    notices: Mutex<Vec<(NoticeLevel, String)>>,
    sink: Arc<dyn StatusSink>,
}

impl std::fmt::Debug for StatusBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBoard")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}

impl StatusBoard {
    #[must_use]
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            current: Mutex::new(None),
            notices: Mutex::new(Vec::new()),
            sink,
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<StatusDisplay> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    #[must_use]
    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl StatusSink for StatusBoard {
    fn show_status(&self, status: &StatusDisplay) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = Some(status.clone());
        }
        self.sink.show_status(status);
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        if let Ok(mut guard) = self.notices.lock() {
            guard.push((level, message.to_string()));
        }
        self.sink.notify(level, message);
    }
}
