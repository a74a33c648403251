//! Persisted active-window marker.
//!
//! Names the editor window that last took ownership of the server. The marker
//! is advisory: it only picks the default answer of the takeover prompt. The
//! port probe decides whether a server actually runs.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::{debug, warn};

pub const MARKER_FILE_NAME: &str = "active-window.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindowRecord {
    pub window_id: String,
    pub pid: u32,
    /// Seconds since the unix epoch.
    pub asserted_at: u64,
}

pub struct MarkerStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
    now: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl std::fmt::Debug for MarkerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerStore")
            .field("path", &self.path)
            .finish()
    }
}

impl MarkerStore {
    /// Marker stored as `active-window.json` inside `state_dir`.
    #[must_use]
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::open(state_dir.join(MARKER_FILE_NAME))
    }

    #[must_use]
    pub fn open(path: PathBuf) -> Self {
        Self::with_clock(path, Arc::new(now_secs))
    }

    #[must_use]
    pub fn with_clock(path: PathBuf, now: Arc<dyn Fn() -> u64 + Send + Sync>) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            now,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record; unreadable or malformed files read as absent.
    #[must_use]
    pub fn current(&self) -> Option<ActiveWindowRecord> {
        match load_record(&self.path) {
            Ok(record) => record,
            Err(err) => {
                warn!("failed to read {}: {err}", self.path.display());
                None
            }
        }
    }

    /// True when the marker names `window_id`.
    #[must_use]
    pub fn names(&self, window_id: &str) -> bool {
        self.current()
            .is_some_and(|record| record.window_id == window_id)
    }

    /// Record `window_id` as the owner. Failures are logged and swallowed.
    pub fn assert(&self, window_id: &SmolStr) {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let record = ActiveWindowRecord {
            window_id: window_id.to_string(),
            pid: std::process::id(),
            asserted_at: (self.now)(),
        };
        match save_record(&self.path, &record) {
            Ok(()) => debug!(window = %window_id, "active-window marker asserted"),
            Err(err) => warn!("failed to write {}: {err}", self.path.display()),
        }
    }

    /// Clear the marker if it still names `window_id`.
    ///
    /// A marker asserted by another window is left alone. Returns true when a
    /// record was removed.
    pub fn relinquish(&self, window_id: &str) -> bool {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(record) = self.current() else {
            return false;
        };
        if record.window_id != window_id {
            debug!(owner = %record.window_id, "marker names another window; kept");
            return false;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(window = %window_id, "active-window marker cleared");
                true
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => {
                warn!("failed to remove {}: {err}", self.path.display());
                false
            }
        }
    }
}

fn load_record(path: &Path) -> io::Result<Option<ActiveWindowRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data).ok())
}

fn save_record(path: &Path, record: &ActiveWindowRecord) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(record).map_err(io::Error::other)?;
    fs::write(path, data)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
