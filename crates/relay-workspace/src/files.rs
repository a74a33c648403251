//! Exclusion lists and recursive file collection.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::WorkspaceError;

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    "nbproject",
    "node_modules",
    "bower_components",
    ".vscode-test",
    "debug",
    ".vscode",
    ".flutter-plugins",
    ".flutter-plugins-dependencies",
    ".plugin_symlinks",
    "ephemeral",
    "dist",
    "build",
    ".git",
    "coverage",
    "out",
    "bin",
    "obj",
    "Runner",
    "target",
    "__pycache__",
    ".idea",
    ".gradle",
    ".mvn",
    ".settings",
    ".classpath",
    ".project",
    "CMakeFiles",
    "CMakeCache.txt",
    ".vs",
    "packages",
    ".history",
    ".terraform",
    ".serverless",
    ".pytest_cache",
    ".venv",
    "Pods",
    "DerivedData",
    ".next",
    ".nuxt",
    "vendor",
    ".sass-cache",
    ".cache",
    ".parcel-cache",
    "elm-stuff",
    "_site",
    "public",
    ".docusaurus",
    "static",
    ".expo",
    ".cache-loader",
    ".dart_tool",
    "runner",
];

/// File names never reported.
pub const EXCLUDED_FILES: &[&str] = &[
    ".gitignore",
    "README.md",
    "yarn.lock",
    "package-lock.json",
    ".metadata",
    ".DS_Store",
    ".editorconfig",
    ".gitattributes",
    ".gitkeep",
    ".gitmodules",
    ".npmignore",
    ".prettierignore",
    ".prettierrc",
    ".stylelintrc",
    ".eslintignore",
    ".eslintrc",
    ".babelrc",
    "analysis_options.yaml",
];

/// Lower-case extensions (with the dot) never reported.
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".properties",
    ".lock",
    ".h",
    ".jpg",
    ".jpeg",
    ".iml",
    ".jar",
    ".png",
    ".gif",
    ".bmp",
    ".svg",
    ".ico",
    ".webp",
    ".tif",
    ".tiff",
    ".mp3",
    ".wav",
    ".ogg",
    ".flac",
    ".mp4",
    ".avi",
    ".mkv",
    ".mov",
    ".wmv",
    ".flv",
    ".webm",
    ".m4v",
    ".3gp",
    ".mpg",
    ".mpeg",
    ".pdf",
    ".zip",
    ".tar",
    ".gz",
    ".rar",
    ".7z",
    ".exe",
    ".dll",
    ".so",
    ".dylib",
    ".class",
    ".apk",
    ".aab",
    ".ipa",
    ".war",
    ".ear",
    ".phar",
    ".xcconfig",
];

/// One file returned to the external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDetails {
    pub file_path: String,
    pub content: String,
    pub imports: Vec<String>,
    pub dependencies: Vec<String>,
}

impl FileDetails {
    /// Synthetic entry that carries text rather than a file on disk.
    #[must_use]
    pub fn synthetic(name: &str, content: String) -> Self {
        Self {
            file_path: name.to_string(),
            content,
            imports: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

/// True when the final path component is on one of the exclusion lists.
#[must_use]
pub fn should_exclude(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    if EXCLUDED_DIRS.contains(&name) || EXCLUDED_FILES.contains(&name) {
        return true;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => {
            let ext = format!(".{}", ext.to_ascii_lowercase());
            EXCLUDED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Collect every non-excluded file under `dir`, sorted.
///
/// Unreadable directories and entries are logged and skipped.
#[must_use]
pub fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    walk(dir, &mut files);
    files.sort();
    files
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Error reading directory {}: {err}", dir.display());
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if should_exclude(&path) {
            continue;
        }
        let Ok(file_type) = entry.file_type() else {
            debug!("skipping {}: unknown file type", path.display());
            continue;
        };
        if file_type.is_dir() {
            walk(&path, out);
        } else if file_type.is_file() {
            out.push(path);
        }
    }
}

/// First file whose name matches `name`, ignoring ASCII case.
#[must_use]
pub fn find_by_file_name<'a>(files: &'a [PathBuf], name: &str) -> Option<&'a PathBuf> {
    files.iter().find(|path| {
        path.file_name()
            .and_then(|file| file.to_str())
            .is_some_and(|file| file.eq_ignore_ascii_case(name))
    })
}

/// Read each requested file, located by name anywhere under `root`.
///
/// Fails on the first name that matches nothing.
pub fn read_file_details(
    root: &Path,
    names: &[String],
) -> Result<Vec<FileDetails>, WorkspaceError> {
    let files = collect_files(root);
    let mut details = Vec::with_capacity(names.len());
    for name in names {
        let Some(path) = find_by_file_name(&files, name) else {
            return Err(WorkspaceError::NotFound(name.clone()));
        };
        let content = fs::read_to_string(path).map_err(|err| WorkspaceError::read(path, &err))?;
        debug!("Reading file content for: {name}");
        details.push(FileDetails {
            file_path: path.display().to_string(),
            content,
            imports: Vec::new(),
            dependencies: Vec::new(),
        });
    }
    Ok(details)
}

/// Read every collected file under `dir`; unreadable (e.g. binary) files are skipped.
#[must_use]
pub fn read_all_files(dir: &Path) -> Vec<FileDetails> {
    collect_files(dir)
        .into_iter()
        .filter_map(|path| match fs::read_to_string(&path) {
            Ok(content) => Some(FileDetails {
                file_path: path.display().to_string(),
                content,
                imports: Vec::new(),
                dependencies: Vec::new(),
            }),
            Err(err) => {
                warn!("skipping unreadable file {}: {err}", path.display());
                None
            }
        })
        .collect()
}
