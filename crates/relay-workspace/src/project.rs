//! Project kind detection and folder tree rendering.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::files::should_exclude;

/// Project layouts the bridge knows how to scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    /// Dart sources under `lib/`.
    Flutter,
    /// JavaScript/TypeScript sources under `src/`.
    ReactNative,
}

impl ProjectKind {
    /// Directory (relative to the root) holding the project's own sources.
    #[must_use]
    pub fn source_dir(self) -> &'static str {
        match self {
            Self::Flutter => "lib",
            Self::ReactNative => "src",
        }
    }

    /// Parse the free-form `role` hint sent by the external tool.
    #[must_use]
    pub fn from_role(role: &str) -> Option<Self> {
        let role = role.to_ascii_lowercase();
        if role.contains("flutter") {
            Some(Self::Flutter)
        } else if role.contains("react native") {
            Some(Self::ReactNative)
        } else {
            None
        }
    }
}

/// Identify the project kind from marker files under `root`.
#[must_use]
pub fn detect_project_kind(root: &Path) -> Option<ProjectKind> {
    if root.join("pubspec.yaml").is_file() {
        return Some(ProjectKind::Flutter);
    }
    if has_dart_sources(&root.join("lib")) {
        return Some(ProjectKind::Flutter);
    }
    let package_json = root.join("package.json");
    if package_json.is_file() {
        let text = match fs::read_to_string(&package_json) {
            Ok(text) => text,
            Err(err) => {
                warn!("Error identifying project type: {err}");
                return None;
            }
        };
        let manifest: serde_json::Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                warn!("Error identifying project type: {err}");
                return None;
            }
        };
        if manifest
            .get("dependencies")
            .and_then(|deps| deps.get("react-native"))
            .is_some()
        {
            return Some(ProjectKind::ReactNative);
        }
    }
    None
}

fn has_dart_sources(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "dart")
    })
}

/// Render the source directory of the detected project as a text tree.
///
/// Returns an empty string when the kind is unknown or its source directory is
/// missing.
#[must_use]
pub fn render_folder_tree(root: &Path) -> String {
    let Some(kind) = detect_project_kind(root) else {
        debug!("Could not determine project type for directory: {}", root.display());
        return String::new();
    };
    let target = root.join(kind.source_dir());
    if !target.is_dir() {
        debug!("Target directory ({}) does not exist.", target.display());
        return String::new();
    }
    let mut out = format!("{}/\n", kind.source_dir());
    render_dir(&target, "    ", &mut out);
    out
}

fn render_dir(dir: &Path, prefix: &str, out: &mut String) {
    let entries = match sorted_entries(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Error reading directory {}: {err}", dir.display());
            return;
        }
    };
    let count = entries.len();
    for (index, path) in entries.into_iter().enumerate() {
        let is_last = index + 1 == count;
        let branch = if is_last { "└── " } else { "├── " };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if path.is_dir() {
            out.push_str(&format!("{prefix}{branch}{name}/\n"));
            let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
            render_dir(&path, &child_prefix, out);
        } else {
            out.push_str(&format!("{prefix}{branch}{name}\n"));
        }
    }
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| !should_exclude(path))
        .filter(|path| path.is_dir() || path.is_file())
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}
