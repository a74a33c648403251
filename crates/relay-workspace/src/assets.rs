//! Asset folder discovery and listing.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Folder names probed, in order, for project assets.
pub const ASSET_DIR_CANDIDATES: &[&str] = &["assets", "asset", "image"];

/// First existing asset folder under `root`.
#[must_use]
pub fn find_asset_dir(root: &Path) -> Option<PathBuf> {
    ASSET_DIR_CANDIDATES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_dir())
}

/// Every file below `dir`, as paths relative to the asset folder's parent
/// (so entries start with the folder name, e.g. `assets/icons/a.png`).
///
/// Asset listing ignores the exclusion lists: images are the point here.
#[must_use]
pub fn list_asset_files(dir: &Path) -> Vec<String> {
    let base = dir
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_default();
    let mut out = Vec::new();
    walk(dir, &base, &mut out);
    out.sort();
    out
}

fn walk(dir: &Path, relative: &Path, out: &mut Vec<String>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Error reading directory {}: {err}", dir.display());
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let child = relative.join(entry.file_name());
        if path.is_file() {
            out.push(child.display().to_string());
        } else if path.is_dir() {
            walk(&path, &child, out);
        }
    }
}
