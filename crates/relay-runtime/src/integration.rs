//! `editor.json` integration marker shared with the external tool.
//!
//! The external tool reads `<data dir>/Relay/editor.json` to learn which editor
//! integration is installed. Installing claims it for this editor unless a
//! different, unknown integration owns it.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::RelayError;

pub const EDITOR_FILE_NAME: &str = "editor.json";
pub const EDITOR_ID: &str = "vs-code";
/// Integration this one replaces when found.
pub const REPLACED_EDITOR_ID: &str = "android-studio";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Created,
    Switched { from: String },
    Unchanged { ide: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub file_removed: bool,
    pub dir_removed: bool,
}

#[must_use]
pub fn editor_file(dir: &Path) -> PathBuf {
    dir.join(EDITOR_FILE_NAME)
}

/// Create or claim `editor.json` in `dir`.
pub fn ensure_editor_marker(dir: &Path) -> Result<InstallOutcome, RelayError> {
    fs::create_dir_all(dir).map_err(|err| io_error(dir, &err))?;
    let path = editor_file(dir);
    if !path.exists() {
        let mut body = Map::new();
        body.insert("ide".into(), Value::String(EDITOR_ID.into()));
        write_json(&path, &Value::Object(body))?;
        debug!("created {}", path.display());
        return Ok(InstallOutcome::Created);
    }

    let text = fs::read_to_string(&path).map_err(|err| io_error(&path, &err))?;
    let mut body = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(body)) => body,
        Ok(_) | Err(_) => {
            warn!("leaving unreadable {} untouched", path.display());
            return Ok(InstallOutcome::Unchanged { ide: None });
        }
    };
    let current = body.get("ide").and_then(Value::as_str).map(str::to_string);
    if current.as_deref() != Some(REPLACED_EDITOR_ID) {
        return Ok(InstallOutcome::Unchanged { ide: current });
    }
    // Other keys written by the external tool are preserved.
    body.insert("ide".into(), Value::String(EDITOR_ID.into()));
    write_json(&path, &Value::Object(body))?;
    Ok(InstallOutcome::Switched {
        from: REPLACED_EDITOR_ID.to_string(),
    })
}

/// Delete `editor.json` and then `dir` if it is left empty.
pub fn remove_editor_marker(dir: &Path) -> Result<RemoveOutcome, RelayError> {
    let path = editor_file(dir);
    let file_removed = match fs::remove_file(&path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => return Err(io_error(&path, &err)),
    };
    let is_empty = fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    let dir_removed = is_empty
        && match fs::remove_dir(dir) {
            Ok(()) => true,
            Err(err) => {
                warn!("could not remove folder {}: {err}", dir.display());
                false
            }
        };
    Ok(RemoveOutcome {
        file_removed,
        dir_removed,
    })
}

fn write_json(path: &Path, value: &Value) -> Result<(), RelayError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| RelayError::Io(format!("encode {}: {err}", path.display()).into()))?;
    fs::write(path, text).map_err(|err| io_error(path, &err))
}

fn io_error(path: &Path, err: &io::Error) -> RelayError {
    RelayError::Io(format!("{}: {err}", path.display()).into())
}
