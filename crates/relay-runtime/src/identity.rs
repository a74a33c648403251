//! Document identity decoding.
//!
//! Editor payloads name documents in several shapes. Decoding tries, in order:
//! a direct URI-like object (`{scheme, fsPath | path}`), an object wrapping one
//! under `uri`, then a bare string (`file://` URI or plain path). Anything else
//! decodes to `None` and is ignored by callers.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use serde_json::Value;
use smol_str::SmolStr;

/// Canonical key for a document: a lexically normalized filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey(SmolStr);

impl DocumentKey {
    /// Key for a filesystem path. Empty paths have no key.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return None;
        }
        let normalized = normalize_path(path);
        if normalized.as_os_str().is_empty() {
            return None;
        }
        Some(Self(SmolStr::new(normalized.to_string_lossy())))
    }

    /// Key for a `file://` URI. Other schemes have no key.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        let rest = strip_file_scheme(uri)?;
        // Drop an authority (`file://host/path`); `localhost` and empty mean local.
        let path = match rest.find('/') {
            Some(0) => rest,
            Some(index) => &rest[index..],
            None => return None,
        };
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let decoded = percent_decode_str(path).decode_utf8_lossy();
        Self::from_path(strip_drive_slash(&decoded))
    }

    /// Normalized path text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Final path component, or the whole key when it has none.
    #[must_use]
    pub fn display_name(&self) -> &str {
        Path::new(self.0.as_str())
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(self.0.as_str())
    }

    /// Key as a path.
    #[must_use]
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(self.0.as_str())
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Decode a document identity from any of the accepted payload shapes.
#[must_use]
pub fn decode_identity(value: &Value) -> Option<DocumentKey> {
    decode_direct(value)
        .or_else(|| decode_wrapped(value))
        .or_else(|| value.as_str().and_then(decode_string))
}

/// Subject (right-hand, `modified`) side of a comparison tab input.
///
/// Inputs without both an `original` and a `modified` member are not comparisons.
#[must_use]
pub fn decode_comparison_subject(tab: &Value) -> Option<DocumentKey> {
    let object = tab.as_object()?;
    if !object.contains_key("original") {
        return None;
    }
    decode_identity(object.get("modified")?)
}

fn decode_direct(value: &Value) -> Option<DocumentKey> {
    let object = value.as_object()?;
    object.get("scheme")?.as_str()?;
    let path = object
        .get("fsPath")
        .and_then(Value::as_str)
        .filter(|path| !path.is_empty())
        .or_else(|| object.get("path").and_then(Value::as_str))?;
    DocumentKey::from_path(strip_drive_slash(path))
}

fn decode_wrapped(value: &Value) -> Option<DocumentKey> {
    match value.as_object()?.get("uri")? {
        inner @ Value::Object(_) => decode_direct(inner),
        Value::String(text) => decode_string(text),
        _ => None,
    }
}

fn decode_string(text: &str) -> Option<DocumentKey> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if strip_file_scheme(text).is_some() {
        return DocumentKey::from_uri(text);
    }
    if has_foreign_scheme(text) {
        return None;
    }
    DocumentKey::from_path(text)
}

fn strip_file_scheme(text: &str) -> Option<&str> {
    let (scheme, rest) = text.split_once("://")?;
    scheme.eq_ignore_ascii_case("file").then_some(rest)
}

fn has_foreign_scheme(text: &str) -> bool {
    let Some((scheme, _)) = text.split_once("://") else {
        return false;
    };
    // `C://x` is a Windows drive, not a scheme.
    scheme.len() > 1
        && scheme
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

/// `/C:/dir` (URI path form of a Windows drive) becomes `C:/dir`.
fn strip_drive_slash(path: &str) -> &str {
    let bytes = path.as_bytes();
    let drive_letter = bytes.len() >= 3 && bytes[1].is_ascii_alphabetic() && bytes[2] == b':';
    if drive_letter && bytes[0] == b'/' {
        &path[1..]
    } else {
        path
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            _ => normalized.push(component.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(path: &str) -> DocumentKey {
        DocumentKey::from_path(path).expect("key")
    }

    #[test]
    fn direct_object_prefers_fs_path() {
        let value = json!({ "scheme": "file", "fsPath": "/work/lib/a.dart", "path": "/other" });
        assert_eq!(decode_identity(&value), Some(key("/work/lib/a.dart")));

        let value = json!({ "scheme": "file", "path": "/work/./lib/../lib/b.dart" });
        assert_eq!(decode_identity(&value), Some(key("/work/lib/b.dart")));
    }

    #[test]
    fn wrapped_uri_object_and_string() {
        let value = json!({ "uri": { "scheme": "file", "fsPath": "/work/c.dart" } });
        assert_eq!(decode_identity(&value), Some(key("/work/c.dart")));

        let value = json!({ "uri": "file:///work/my%20file.dart" });
        assert_eq!(decode_identity(&value), Some(key("/work/my file.dart")));
    }

    #[test]
    fn wrapping_is_one_level_deep() {
        let value = json!({ "uri": { "uri": "file:///work/x.dart" } });
        assert_eq!(decode_identity(&value), None);
    }

    #[test]
    fn bare_strings_accept_uris_and_paths() {
        assert_eq!(
            decode_identity(&json!("file:///work/d.dart")),
            Some(key("/work/d.dart"))
        );
        assert_eq!(
            decode_identity(&json!("file://localhost/work/e.dart")),
            Some(key("/work/e.dart"))
        );
        assert_eq!(decode_identity(&json!("/work/f.dart")), Some(key("/work/f.dart")));
        assert_eq!(
            decode_identity(&json!("file:///C:/proj/g.dart")),
            Some(key("C:/proj/g.dart"))
        );
    }

    #[test]
    fn malformed_identities_are_none() {
        assert_eq!(decode_identity(&json!(null)), None);
        assert_eq!(decode_identity(&json!(42)), None);
        assert_eq!(decode_identity(&json!("")), None);
        assert_eq!(decode_identity(&json!({ "fsPath": "/no/scheme" })), None);
        assert_eq!(decode_identity(&json!({ "scheme": "file" })), None);
        assert_eq!(decode_identity(&json!("git://repo/file.dart")), None);
    }

    #[test]
    fn comparison_subject_needs_both_sides() {
        let tab = json!({
            "original": { "scheme": "file", "fsPath": "/work/old.dart" },
            "modified": { "scheme": "file", "fsPath": "/work/new.dart" },
        });
        assert_eq!(decode_comparison_subject(&tab), Some(key("/work/new.dart")));

        let plain = json!({ "uri": "file:///work/new.dart" });
        assert_eq!(decode_comparison_subject(&plain), None);
        let one_sided = json!({ "modified": "/work/new.dart" });
        assert_eq!(decode_comparison_subject(&one_sided), None);
    }

    #[test]
    fn display_name_is_file_name() {
        assert_eq!(key("/work/lib/main.dart").display_name(), "main.dart");
    }
}
