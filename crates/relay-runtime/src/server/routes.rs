//! HTTP routes served on the loopback port.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::thread;

use relay_workspace::assets;
use relay_workspace::files::{collect_files, read_all_files, read_file_details, FileDetails};
use relay_workspace::project::{render_folder_tree, ProjectKind};
use relay_workspace::selection::{group_consecutive_lines, selected_line_numbers};
use serde::Deserialize;
use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response};
use tracing::{debug, warn};

use super::ServerLifecycle;
use crate::edits::{EditProposal, EditReply};
use crate::error::RelayError;
use crate::identity::DocumentKey;
use crate::status::{NoticeLevel, StatusSink};
use crate::tracker::PollStatus;

/// Files compared by name anywhere in the project instead of by `lib/` path.
const SPECIAL_FILES: &[&str] = &["pubspec.yaml", "AndroidManifest.xml"];
const FOLDER_TREE_NAME: &str = "Readme.txt";
const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

pub(super) fn handle(lifecycle: &ServerLifecycle, mut request: Request) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
    debug!(%method, path, "request");

    if method == Method::Post && path == "/modify-code" {
        modify_code(lifecycle, request);
        return;
    }
    let (status, body) = match (&method, path) {
        (Method::Get, "/diff-events") => diff_events(lifecycle),
        (Method::Post, "/shutdown") => shutdown(lifecycle),
        (Method::Get, "/status") => status(lifecycle),
        (Method::Get, "/selected-lines") => selected_lines(lifecycle),
        (Method::Post, "/multiple-file-contents") => match read_json(&mut request) {
            Ok(payload) => multiple_file_contents(lifecycle, &payload),
            Err(err) => error_body(400, err.to_string()),
        },
        (Method::Get, "/all-files") => all_files(lifecycle, query_param(query, "role").as_deref()),
        (Method::Get, "/assets") => list_assets(lifecycle),
        (Method::Post, "/compare-file") => match read_json(&mut request) {
            Ok(payload) => compare_file(lifecycle, &payload),
            Err(err) => error_body(400, err.to_string()),
        },
        (Method::Options, _) => (204, Value::Null),
        _ => (404, json!({ "error": "not found" })),
    };
    respond(request, status, &body);
}

type RouteResult = (u16, Value);

fn error_body(status: u16, message: impl Into<String>) -> RouteResult {
    let message = message.into();
    warn!("Error: {message}");
    (status, json!({ "error": message }))
}

fn diff_events(lifecycle: &ServerLifecycle) -> RouteResult {
    match lifecycle.context().tracker.lock() {
        Ok(mut tracker) => {
            let status = tracker.drain();
            (200, json!({ "status": status.as_str() }))
        }
        Err(_) => {
            warn!("tracker state poisoned; reporting no change");
            (500, json!({ "status": PollStatus::Same.as_str() }))
        }
    }
}

fn shutdown(lifecycle: &ServerLifecycle) -> RouteResult {
    match lifecycle.request_shutdown() {
        Ok(scheduled) => {
            debug!(scheduled, "shutdown requested over http");
            (200, json!({ "message": "Shutting down Relay server" }))
        }
        Err(err) => error_body(500, err.to_string()),
    }
}

fn status(lifecycle: &ServerLifecycle) -> RouteResult {
    let context = lifecycle.context();
    let (watched, dirty, last_change) = match context.tracker.lock() {
        Ok(tracker) => (
            tracker
                .watched()
                .iter()
                .map(|key| key.as_str().to_string())
                .collect::<Vec<_>>(),
            tracker.is_dirty(),
            tracker.last_change().cloned(),
        ),
        Err(_) => return error_body(500, "tracker state poisoned"),
    };
    (
        200,
        json!({
            "state": lifecycle.state().as_str(),
            "port": lifecycle.port(),
            "window_id": context.window_id.as_str(),
            "watched": watched,
            "dirty": dirty,
            "last_change": last_change,
            "indicator": context.status.current(),
        }),
    )
}

fn selected_lines(lifecycle: &ServerLifecycle) -> RouteResult {
    let host = &lifecycle.context().host;
    let mut response = json!({
        "selected": false,
        "file_name": "",
        "file_path": "",
        "project_path": host
            .workspace_root()
            .map(|root| root.display().to_string())
            .unwrap_or_default(),
        "message": "",
        "data": [],
    });
    let Some(editor) = host.active_selection() else {
        response["message"] = json!("No active editor found.");
        return (200, response);
    };
    response["file_name"] = json!(editor
        .file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default());
    response["file_path"] = json!(editor.file_path.display().to_string());

    if editor.selections.is_empty() {
        response["message"] = json!("No lines selected.");
        return (200, response);
    }
    if editor.selections.iter().any(|span| span.is_empty) {
        response["message"] = json!("Empty line selected.");
        return (200, response);
    }

    let file_lines: Vec<&str> = editor.text.lines().collect();
    let lines = selected_line_numbers(&editor.selections, file_lines.len());
    let groups = group_consecutive_lines(&lines, &editor.diagnostics, &file_lines);
    if !groups.is_empty() {
        response["selected"] = json!(true);
        response["data"] = json!(groups);
    }
    (200, response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileContentsRequest {
    file_names: Option<Vec<String>>,
}

fn multiple_file_contents(lifecycle: &ServerLifecycle, payload: &Value) -> RouteResult {
    let names = serde_json::from_value::<FileContentsRequest>(payload.clone())
        .ok()
        .and_then(|request| request.file_names);
    let Some(names) = names else {
        return error_body(400, "fileNames array is required");
    };
    let Some(root) = lifecycle.context().host.workspace_root() else {
        return error_body(400, "No workspace folder open");
    };
    match read_file_details(&root, &names) {
        Ok(mut details) => {
            details.push(FileDetails::synthetic(FOLDER_TREE_NAME, render_folder_tree(&root)));
            (200, json!(details))
        }
        Err(err) => error_body(404, err.to_string()),
    }
}

fn all_files(lifecycle: &ServerLifecycle, role: Option<&str>) -> RouteResult {
    let Some(root) = lifecycle.context().host.workspace_root() else {
        return error_body(400, "No workspace folder open");
    };
    let scope = match role.and_then(ProjectKind::from_role) {
        Some(kind) => root.join(kind.source_dir()),
        None => root.clone(),
    };
    debug!(scope = %scope.display(), "collecting files");
    let mut details = read_all_files(&scope);
    details.push(FileDetails::synthetic(FOLDER_TREE_NAME, render_folder_tree(&root)));
    (200, json!(details))
}

fn list_assets(lifecycle: &ServerLifecycle) -> RouteResult {
    let Some(root) = lifecycle.context().host.workspace_root() else {
        return error_body(400, "No workspace folder open");
    };
    match assets::find_asset_dir(&root) {
        Some(dir) => (200, json!(assets::list_asset_files(&dir))),
        None => error_body(404, "No asset, assets, or image folder found"),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareRequest {
    file_name: Option<String>,
    new_file_path: Option<String>,
}

fn compare_file(lifecycle: &ServerLifecycle, payload: &Value) -> RouteResult {
    let request = serde_json::from_value::<CompareRequest>(payload.clone()).unwrap_or_default();
    let (Some(file_name), Some(new_file_path)) = (
        request.file_name.filter(|name| !name.is_empty()),
        request.new_file_path.filter(|path| !path.is_empty()),
    ) else {
        return error_body(400, "Both fileName and newFilePath are required.");
    };
    let bare_name = Path::new(&file_name).file_name().and_then(|name| name.to_str());
    if bare_name != Some(file_name.as_str()) {
        return error_body(400, "Invalid fileName provided.");
    }
    let context = lifecycle.context();
    let Some(root) = context.host.workspace_root() else {
        return error_body(400, "No workspace folder open.");
    };
    let new_path = {
        let candidate = PathBuf::from(&new_file_path);
        if candidate.is_absolute() {
            candidate
        } else {
            root.join(candidate)
        }
    };
    if !new_path.exists() {
        return error_body(
            400,
            format!("New file does not exist at path: {}", new_path.display()),
        );
    }
    let new_key = DocumentKey::from_path(&new_path);

    let matched = if SPECIAL_FILES.contains(&file_name.as_str()) {
        collect_files(&root)
            .into_iter()
            .find(|path| {
                has_file_name(path, &file_name) && DocumentKey::from_path(path) != new_key
            })
    } else {
        let Some(relative) = lib_relative(&new_path) else {
            return error_body(400, "New file is not inside the lib/ folder.");
        };
        collect_files(&root.join("lib")).into_iter().find(|path| {
            has_file_name(path, &file_name)
                && lib_relative(path).as_deref() == Some(relative.as_str())
                && DocumentKey::from_path(path) != new_key
        })
    };

    match matched {
        Some(existing) => {
            let title = format!("Relay Comparison for {file_name}");
            if let Err(err) = context.host.open_comparison(&new_path, &existing, &title) {
                context
                    .status
                    .notify(NoticeLevel::Error, &format!("Failed to compare or open file: {err}"));
                return error_body(500, "Failed to compare or open file.");
            }
            if let Some(key) = DocumentKey::from_path(&existing) {
                match context.tracker.lock() {
                    Ok(mut tracker) => tracker.watch(key),
                    Err(_) => warn!("tracker state poisoned; comparison not watched"),
                }
            }
            context
                .status
                .notify(NoticeLevel::Info, &format!("Compared: {file_name}"));
            (200, json!({ "message": "Files opened in compare mode." }))
        }
        None => {
            if let Err(err) = context.host.open_document(&new_path) {
                context
                    .status
                    .notify(NoticeLevel::Error, &format!("Failed to compare or open file: {err}"));
                return error_body(500, "Failed to compare or open file.");
            }
            context
                .status
                .notify(NoticeLevel::Info, &format!("Opened new file: {file_name}."));
            (200, json!({ "message": "New file opened. No matching file found." }))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest {
    updated_code: Option<String>,
}

/// `POST /modify-code`: insert the code after the selection and answer once
/// the user accepts or rejects it. The wait happens off the request worker.
fn modify_code(lifecycle: &ServerLifecycle, mut request: Request) {
    let proposed = read_json(&mut request).and_then(|payload| propose_edit(lifecycle, &payload));
    let (id, reply) = match proposed {
        Ok(proposed) => proposed,
        Err(RelayError::InvalidRequest(message)) => {
            let (status, body) = error_body(400, message.as_str());
            return respond(request, status, &body);
        }
        Err(err) => {
            lifecycle
                .context()
                .status
                .notify(NoticeLevel::Error, &format!("Failed to insert code: {err}"));
            let (status, body) = error_body(500, "Failed to insert code.");
            return respond(request, status, &body);
        }
    };
    let spawned = thread::Builder::new()
        .name("relay-edit".into())
        .spawn(move || {
            let (status, body) = match reply.recv() {
                Ok(Ok(decision)) => (200, json!({ "message": decision.message() })),
                Ok(Err(err)) => error_body(500, format!("Failed to apply changes: {err}")),
                Err(_) => error_body(409, "Edit cancelled before a decision was made."),
            };
            respond(request, status, &body);
        });
    if let Err(err) = spawned {
        // The request went into the closure; tiny_http answers it with 500.
        warn!("failed to spawn edit waiter: {err}");
        lifecycle.context().edits.take(id);
    }
}

fn propose_edit(
    lifecycle: &ServerLifecycle,
    payload: &Value,
) -> Result<(u64, Receiver<EditReply>), RelayError> {
    let updated_code = serde_json::from_value::<ModifyRequest>(payload.clone())
        .ok()
        .and_then(|request| request.updated_code)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| RelayError::InvalidRequest("The updatedCode field is required.".into()))?;
    let context = lifecycle.context();
    let editor = context
        .host
        .active_selection()
        .ok_or_else(|| RelayError::InvalidRequest("No active editor found.".into()))?;
    let selection = editor
        .selections
        .first()
        .copied()
        .filter(|span| !span.is_empty)
        .ok_or_else(|| RelayError::InvalidRequest("Please select some code first.".into()))?;

    let id = context.edits.next_id();
    let proposal = EditProposal::after_selection(id, editor.file_path, selection, &updated_code);
    debug!(id, path = %proposal.path.display(), line = proposal.line, "proposing edit");
    let reply = context.edits.register(proposal.clone());
    if let Err(err) = context.host.propose_edit(&proposal) {
        context.edits.take(id);
        return Err(err);
    }
    Ok((id, reply))
}

fn has_file_name(path: &Path, name: &str) -> bool {
    path.file_name()
        .and_then(|file| file.to_str())
        .is_some_and(|file| file.eq_ignore_ascii_case(name))
}

/// Path from the first `lib` component onwards, `/`-joined.
fn lib_relative(path: &Path) -> Option<String> {
    let parts: Vec<_> = path
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    let index = parts.iter().position(|part| part == "lib")?;
    Some(parts[index..].join("/"))
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        if parts.next()? == key {
            let raw = parts.next().unwrap_or("").replace('+', " ");
            Some(
                urlencoding::decode(&raw)
                    .map(|value| value.into_owned())
                    .unwrap_or(raw),
            )
        } else {
            None
        }
    })
}

fn read_json(request: &mut Request) -> Result<Value, RelayError> {
    let mut body = String::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES)
        .read_to_string(&mut body)
        .map_err(|err| RelayError::InvalidRequest(format!("invalid body: {err}").into()))?;
    if body.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(&body)
        .map_err(|err| RelayError::InvalidRequest(format!("invalid json: {err}").into()))
}

fn respond(request: Request, status: u16, body: &Value) {
    let text = if body.is_null() {
        String::new()
    } else {
        body.to_string()
    };
    let mut response = Response::from_string(text).with_status_code(status);
    for (name, value) in [
        ("Content-Type", "application/json"),
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Headers", "Content-Type"),
        ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ] {
        if let Ok(header) = Header::from_bytes(name, value) {
            response = response.with_header(header);
        }
    }
    if let Err(err) = request.respond(response) {
        debug!("failed to send response: {err}");
    }
}
