//! Change notification tracker.
//!
//! Tracks which documents are the subject side of an open comparison view and
//! raises a single dirty flag when one of them is edited or saved. The poll
//! route reads and clears the flag in one step.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::identity::{decode_comparison_subject, DocumentKey};

/// Kind of document event that set the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    /// In-memory edit.
    Edit,
    /// Save to disk.
    Save,
}

/// Details of the most recent qualifying event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastChangeInfo {
    /// Normalized subject path.
    pub subject_path: String,
    /// File name shown to users.
    pub display_name: String,
    /// Number of content changes in the event (0 for saves).
    pub edit_count: usize,
    /// Milliseconds since the unix epoch.
    pub timestamp_ms: u64,
    /// Edit or save.
    pub origin: ChangeOrigin,
}

/// Answer of a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    /// At least one qualifying event since the previous drain.
    Modified,
    /// Nothing new.
    Same,
}

impl PollStatus {
    /// Wire text.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Same => "same",
        }
    }

    /// Parse the wire text; unknown values are `None`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "modified" => Some(Self::Modified),
            "same" => Some(Self::Same),
            _ => None,
        }
    }
}

/// A decoded document edit/save notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
    /// Document the event refers to.
    pub key: DocumentKey,
    /// True when the editor reports the document as closed.
    pub is_closed: bool,
    /// Edit or save.
    pub origin: ChangeOrigin,
    /// Number of content changes carried by the event.
    pub change_count: usize,
}

/// Wall clock in milliseconds, injectable for tests.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Watched set plus the dirty flag.
pub struct ChangeTracker {
    watched: HashSet<DocumentKey>,
    dirty: bool,
    last_change: Option<LastChangeInfo>,
    now: Clock,
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("watched", &self.watched)
            .field("dirty", &self.dirty)
            .field("last_change", &self.last_change)
            .finish_non_exhaustive()
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeTracker {
    /// Tracker using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(now_ms))
    }

    /// Tracker with an injected clock.
    #[must_use]
    pub fn with_clock(now: Clock) -> Self {
        Self {
            watched: HashSet::new(),
            dirty: false,
            last_change: None,
            now,
        }
    }

    /// Rebuild the watched set from the currently open tab inputs.
    ///
    /// Only comparison inputs contribute; their `modified` side is the subject.
    /// Malformed entries are skipped. The dirty flag is left untouched.
    pub fn on_topology_changed(&mut self, tabs: &[Value]) {
        self.watched = tabs.iter().filter_map(decode_comparison_subject).collect();
        debug!(watched = self.watched.len(), "comparison views changed");
    }

    /// Add a single subject (a comparison the bridge opened itself).
    pub fn watch(&mut self, key: DocumentKey) {
        self.watched.insert(key);
    }

    /// Feed one document event. Returns true when it set the flag.
    pub fn on_document_event(&mut self, event: &DocumentEvent) -> bool {
        if event.is_closed || !self.watched.contains(&event.key) {
            return false;
        }
        let edit_count = match event.origin {
            ChangeOrigin::Edit => event.change_count,
            ChangeOrigin::Save => 0,
        };
        self.last_change = Some(LastChangeInfo {
            subject_path: event.key.as_str().to_string(),
            display_name: event.key.display_name().to_string(),
            edit_count,
            timestamp_ms: (self.now)(),
            origin: event.origin,
        });
        self.dirty = true;
        debug!(path = %event.key, origin = ?event.origin, "watched document changed");
        true
    }

    /// Read and clear the flag.
    pub fn drain(&mut self) -> PollStatus {
        if std::mem::replace(&mut self.dirty, false) {
            PollStatus::Modified
        } else {
            PollStatus::Same
        }
    }

    /// Flag value without clearing it.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True when `key` is a watched subject.
    #[must_use]
    pub fn is_watched(&self, key: &DocumentKey) -> bool {
        self.watched.contains(key)
    }

    /// Watched keys in sorted order.
    #[must_use]
    pub fn watched(&self) -> Vec<DocumentKey> {
        let mut keys: Vec<DocumentKey> = self.watched.iter().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Most recent qualifying event, kept across drains.
    #[must_use]
    pub fn last_change(&self) -> Option<&LastChangeInfo> {
        self.last_change.as_ref()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
