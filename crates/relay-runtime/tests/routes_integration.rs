mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{
    request, reserve_loopback_port, temp_dir, test_config, url, wait_until, window, TestWindow,
};
use relay_runtime::client;
use relay_runtime::config::ConflictPolicy;
use relay_runtime::coordinator::CoordinatorOutcome;
use relay_runtime::edits::{EditDecision, EditProposal};
use relay_runtime::error::RelayError;
use relay_runtime::events::EditorEvent;
use relay_runtime::host::{
    AcceptDefault, ActiveSelection, EditorHost, HeadlessHost, HostAction,
};
use relay_runtime::marker::MarkerStore;
use relay_runtime::status::{NoticeLevel, StatusBoard};
use relay_runtime::Bridge;
use relay_runtime::tracker::PollStatus;
use relay_workspace::selection::SelectionSpan;
use serde_json::json;

fn flutter_project(name: &str) -> PathBuf {
    let root = temp_dir(name);
    fs::create_dir_all(root.join("lib/screens")).unwrap();
    fs::create_dir_all(root.join("gen/lib/screens")).unwrap();
    fs::create_dir_all(root.join("assets/icons")).unwrap();
    fs::write(root.join("pubspec.yaml"), "name: demo\n").unwrap();
    fs::write(root.join("lib/main.dart"), "void main() {}\n").unwrap();
    fs::write(root.join("lib/screens/home.dart"), "class Home {}\n").unwrap();
    fs::write(root.join("gen/lib/screens/home.dart"), "class Home { }\n").unwrap();
    fs::write(root.join("gen/lib/screens/fresh.dart"), "class Fresh {}\n").unwrap();
    fs::write(root.join("assets/icons/logo.png"), [0u8, 1, 2]).unwrap();
    root
}

fn active_window(name: &str, root: Option<PathBuf>) -> (TestWindow, u16) {
    let port = reserve_loopback_port();
    let marker = Arc::new(MarkerStore::in_dir(&temp_dir(name)));
    let mut test_window = window(port, "window-a", root, ConflictPolicy::Prompt, &marker);
    assert_eq!(
        test_window.bridge.activate(&AcceptDefault),
        CoordinatorOutcome::Active
    );
    (test_window, port)
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

fn span(start_line: u32, end_line: u32) -> SelectionSpan {
    SelectionSpan {
        start_line,
        end_line,
        end_character: 0,
        is_empty: false,
    }
}

fn editor(path: PathBuf, text: &str, selections: Vec<SelectionSpan>) -> ActiveSelection {
    ActiveSelection {
        file_path: path,
        text: text.to_string(),
        selections,
        diagnostics: Vec::new(),
    }
}

/// Host whose workspace lookup panics, as a stand-in for a buggy handler.
#[derive(Debug, Default)]
struct PanickingHost(HeadlessHost);

impl EditorHost for PanickingHost {
    fn workspace_root(&self) -> Option<PathBuf> {
        panic!("workspace lookup exploded");
    }

    fn active_selection(&self) -> Option<ActiveSelection> {
        self.0.active_selection()
    }

    fn open_comparison(&self, left: &Path, right: &Path, title: &str) -> Result<(), RelayError> {
        self.0.open_comparison(left, right, title)
    }

    fn open_document(&self, path: &Path) -> Result<(), RelayError> {
        self.0.open_document(path)
    }

    fn propose_edit(&self, proposal: &EditProposal) -> Result<(), RelayError> {
        self.0.propose_edit(proposal)
    }

    fn finish_edit(
        &self,
        proposal: &EditProposal,
        decision: EditDecision,
    ) -> Result<(), RelayError> {
        self.0.finish_edit(proposal, decision)
    }
}

#[test]
fn saves_collapse_into_one_modified_poll() {
    let (mut a, port) = active_window("poll", None);
    let timeout = Duration::from_secs(2);
    assert_eq!(client::poll_diff_events(port, timeout).unwrap(), PollStatus::Same);

    a.bridge.handle_event(&EditorEvent::TopologyChanged {
        tabs: vec![json!({
            "original": { "scheme": "file", "path": "/w/lib/home.dart" },
            "modified": { "scheme": "file", "fsPath": "/w/gen/lib/home.dart" },
        })],
    });
    for _ in 0..3 {
        a.bridge.handle_event(&EditorEvent::DocumentSaved {
            document: json!("file:///w/gen/lib/home.dart"),
        });
    }
    // Edits to documents outside a comparison are ignored.
    a.bridge.handle_event(&EditorEvent::DocumentChanged {
        document: json!("/w/lib/other.dart"),
        is_closed: false,
        change_count: 1,
    });

    let (status, body) = request("GET", &url(port, "/status"), None);
    assert_eq!(status, 200);
    assert_eq!(body["dirty"], true);
    assert_eq!(body["watched"], json!(["/w/gen/lib/home.dart"]));
    assert_eq!(body["last_change"]["display_name"], "home.dart");

    assert_eq!(client::poll_diff_events(port, timeout).unwrap(), PollStatus::Modified);
    assert_eq!(client::poll_diff_events(port, timeout).unwrap(), PollStatus::Same);
    a.bridge.deactivate();
}

#[test]
fn unknown_routes_and_preflight() {
    let (mut a, port) = active_window("unknown", None);
    let (status, body) = request("GET", &url(port, "/nope"), None);
    assert_eq!(status, 404);
    assert_eq!(body["error"], "not found");

    let response = ureq::request("OPTIONS", &url(port, "/diff-events"))
        .call()
        .expect("preflight");
    assert_eq!(response.status(), 204);
    assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
    a.bridge.deactivate();
}

#[test]
fn workspace_routes_need_an_open_folder() {
    let (mut a, port) = active_window("no-root", None);
    let (status, body) = request("GET", &url(port, "/all-files"), None);
    assert_eq!(status, 400);
    assert_eq!(body["error"], "No workspace folder open");

    let (status, body) = request("GET", &url(port, "/selected-lines"), None);
    assert_eq!(status, 200);
    assert_eq!(body["selected"], false);
    assert_eq!(body["message"], "No active editor found.");
    a.bridge.deactivate();
}

#[test]
fn file_contents_and_listing_append_the_folder_tree() {
    let root = flutter_project("contents");
    let (mut a, port) = active_window("contents-marker", Some(root.clone()));

    let (status, body) = request(
        "POST",
        &url(port, "/multiple-file-contents"),
        Some(&json!({ "fileNames": ["MAIN.dart"] })),
    );
    assert_eq!(status, 200);
    let entries = body.as_array().expect("array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["file_path"], path_string(&root.join("lib/main.dart")));
    assert_eq!(entries[0]["content"], "void main() {}\n");
    assert_eq!(entries[1]["file_path"], "Readme.txt");
    assert!(entries[1]["content"].as_str().unwrap().starts_with("lib/\n"));

    let (status, body) = request(
        "POST",
        &url(port, "/multiple-file-contents"),
        Some(&json!({ "fileNames": ["missing.dart"] })),
    );
    assert_eq!(status, 404);
    assert!(body["error"].as_str().unwrap().contains("missing.dart"));

    let (status, _) = request("POST", &url(port, "/multiple-file-contents"), Some(&json!({})));
    assert_eq!(status, 400);

    let (status, body) = request("GET", &url(port, "/all-files?role=Flutter%20developer"), None);
    assert_eq!(status, 200);
    let paths: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["file_path"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        paths,
        vec![
            path_string(&root.join("lib/main.dart")),
            path_string(&root.join("lib/screens/home.dart")),
            "Readme.txt".to_string(),
        ]
    );

    let (status, body) = request("GET", &url(port, "/assets"), None);
    assert_eq!(status, 200);
    assert_eq!(body, json!(["assets/icons/logo.png"]));

    a.bridge.deactivate();
    let _ = fs::remove_dir_all(root);
}

#[test]
fn selected_lines_reports_grouped_lines() {
    let root = flutter_project("selection");
    let (mut a, port) = active_window("selection-marker", Some(root.clone()));
    a.host.set_selection(Some(ActiveSelection {
        file_path: root.join("lib/main.dart"),
        text: "a\nb\nc\nd\n".to_string(),
        selections: vec![
            span(0, 1),
            span(3, 3),
        ],
        diagnostics: Vec::new(),
    }));

    let (status, body) = request("GET", &url(port, "/selected-lines"), None);
    assert_eq!(status, 200);
    assert_eq!(body["selected"], true);
    assert_eq!(body["file_name"], "main.dart");
    assert_eq!(body["project_path"], path_string(&root));
    let groups = body["data"].as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["start_line"], 1);
    assert_eq!(groups[0]["end_line"], 2);
    assert_eq!(groups[0]["content"], "a\nb");
    assert_eq!(groups[1]["start_line"], 4);

    a.bridge.deactivate();
    let _ = fs::remove_dir_all(root);
}

#[test]
fn compare_file_opens_and_watches_the_match() {
    let root = flutter_project("compare");
    let (mut a, port) = active_window("compare-marker", Some(root.clone()));

    let (status, body) = request(
        "POST",
        &url(port, "/compare-file"),
        Some(&json!({
            "fileName": "home.dart",
            "newFilePath": "gen/lib/screens/home.dart",
        })),
    );
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Files opened in compare mode.");

    let (status, body) = request(
        "POST",
        &url(port, "/compare-file"),
        Some(&json!({
            "fileName": "fresh.dart",
            "newFilePath": path_string(&root.join("gen/lib/screens/fresh.dart")),
        })),
    );
    assert_eq!(status, 200);
    assert_eq!(body["message"], "New file opened. No matching file found.");

    assert_eq!(
        a.host.actions(),
        vec![
            HostAction::Comparison {
                left: root.join("gen/lib/screens/home.dart"),
                right: root.join("lib/screens/home.dart"),
                title: "Relay Comparison for home.dart".to_string(),
            },
            HostAction::Document(root.join("gen/lib/screens/fresh.dart")),
        ]
    );
    let notices: Vec<_> = a
        .status
        .notices()
        .into_iter()
        .filter(|(level, _)| *level == NoticeLevel::Info)
        .map(|(_, message)| message)
        .collect();
    assert_eq!(
        notices,
        vec!["Compared: home.dart".to_string(), "Opened new file: fresh.dart.".to_string()]
    );

    // The opened comparison is watched; saving it is reported once.
    a.bridge.handle_event(&EditorEvent::DocumentSaved {
        document: json!(path_string(&root.join("lib/screens/home.dart"))),
    });
    let timeout = Duration::from_secs(2);
    assert_eq!(client::poll_diff_events(port, timeout).unwrap(), PollStatus::Modified);
    assert_eq!(client::poll_diff_events(port, timeout).unwrap(), PollStatus::Same);

    let (status, body) = request(
        "POST",
        &url(port, "/compare-file"),
        Some(&json!({ "fileName": "../home.dart", "newFilePath": "gen/lib/screens/home.dart" })),
    );
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid fileName provided.");

    let (status, _) = request(
        "POST",
        &url(port, "/compare-file"),
        Some(&json!({ "fileName": "home.dart", "newFilePath": "gen/missing.dart" })),
    );
    assert_eq!(status, 400);

    a.bridge.deactivate();
    let _ = fs::remove_dir_all(root);
}

#[test]
fn selection_at_the_line_limit_is_clamped() {
    let root = flutter_project("huge-selection");
    let (mut a, port) = active_window("huge-selection-marker", Some(root.clone()));
    a.host.set_selection(Some(editor(
        root.join("lib/main.dart"),
        "a\nb\n",
        vec![span(u32::MAX, u32::MAX)],
    )));

    let (status, body) = request("GET", &url(port, "/selected-lines"), None);
    assert_eq!(status, 200);
    assert_eq!(body["selected"], false);
    assert_eq!(body["data"], json!([]));

    let (status, body) = request("GET", &url(port, "/diff-events"), None);
    assert_eq!(status, 200);
    assert_eq!(body["status"], "same");
    a.bridge.deactivate();
    let _ = fs::remove_dir_all(root);
}

#[test]
fn panicking_handler_answers_500_and_keeps_serving() {
    let port = reserve_loopback_port();
    let config = test_config(port, "window-p", None, ConflictPolicy::Prompt);
    let mut bridge = Bridge::with_parts(
        config,
        Arc::new(PanickingHost::default()),
        Arc::new(StatusBoard::default()),
        Arc::new(MarkerStore::in_dir(&temp_dir("panic-marker"))),
    );
    assert_eq!(bridge.activate(&AcceptDefault), CoordinatorOutcome::Active);

    let (status, _) = request("GET", &url(port, "/all-files"), None);
    assert_eq!(status, 500);
    let (status, _) = request("GET", &url(port, "/selected-lines"), None);
    assert_eq!(status, 500);

    let timeout = Duration::from_secs(2);
    assert_eq!(client::poll_diff_events(port, timeout).unwrap(), PollStatus::Same);
    assert_eq!(
        client::send_shutdown(port, timeout).unwrap(),
        "Shutting down Relay server"
    );
    assert!(common::wait_for_state(
        bridge.lifecycle(),
        relay_runtime::ServerState::Stopped,
        Duration::from_secs(3),
    ));
    bridge.deactivate();
}

#[test]
fn modify_code_rejects_incomplete_requests() {
    let root = flutter_project("modify-invalid");
    let (mut a, port) = active_window("modify-invalid-marker", Some(root.clone()));
    let target = url(port, "/modify-code");

    let (status, body) = request("POST", &target, Some(&json!({ "updatedCode": "x();" })));
    assert_eq!(status, 400);
    assert_eq!(body["error"], "No active editor found.");

    let mut empty = span(1, 1);
    empty.is_empty = true;
    a.host.set_selection(Some(editor(root.join("lib/main.dart"), "a\nb\n", vec![empty])));
    let (status, body) = request("POST", &target, Some(&json!({ "updatedCode": "x();" })));
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Please select some code first.");

    a.host.set_selection(Some(editor(root.join("lib/main.dart"), "a\nb\n", vec![span(0, 1)])));
    for payload in [json!({}), json!({ "updatedCode": "" })] {
        let (status, body) = request("POST", &target, Some(&payload));
        assert_eq!(status, 400);
        assert_eq!(body["error"], "The updatedCode field is required.");
    }

    let response = ureq::post(&target)
        .set("Content-Type", "application/json")
        .send_string("{not json");
    assert!(matches!(response, Err(ureq::Error::Status(400, _))));

    assert!(a.bridge.context().edits.pending().is_empty());
    assert!(a.host.actions().is_empty());
    a.bridge.deactivate();
    let _ = fs::remove_dir_all(root);
}

#[test]
fn modify_code_answers_after_the_user_decides() {
    let root = flutter_project("modify");
    let (mut a, port) = active_window("modify-marker", Some(root.clone()));
    let file = root.join("lib/main.dart");
    let mut selection = span(0, 2);
    selection.end_character = 4;
    a.host.set_selection(Some(editor(file.clone(), "a\nb\nccc()\n", vec![selection])));

    let target = url(port, "/modify-code");
    let waiting = thread::spawn(move || {
        request("POST", &target, Some(&json!({ "updatedCode": "d();" })))
    });
    let edits = Arc::clone(&a.bridge.context().edits);
    assert!(wait_until(Duration::from_secs(3), || edits.pending() == [1_u64]));

    // Other routes keep answering while the edit is pending.
    let (status, _) = request("GET", &url(port, "/diff-events"), None);
    assert_eq!(status, 200);
    assert!(!waiting.is_finished());

    let actions = a.host.actions();
    let HostAction::ProposeEdit(proposal) = &actions[0] else {
        panic!("expected a proposed edit");
    };
    assert_eq!(proposal.path, file);
    assert_eq!((proposal.line, proposal.character), (2, 4));
    assert_eq!(proposal.text, "\n/* Relay AI GENERATED CODE BELOW */\nd();");

    assert!(a.bridge.resolve_edit(1, EditDecision::Accept));
    let (status, body) = waiting.join().unwrap();
    assert_eq!(status, 200);
    assert_eq!(
        body["message"],
        "Changes accepted! Original code replaced with updated code."
    );
    assert_eq!(
        a.host.actions()[1],
        HostAction::FinishEdit {
            id: 1,
            decision: EditDecision::Accept,
        }
    );
    assert!(!a.bridge.resolve_edit(1, EditDecision::Reject));
    a.bridge.deactivate();
    let _ = fs::remove_dir_all(root);
}

#[test]
fn pending_edit_is_cancelled_when_the_bridge_deactivates() {
    let root = flutter_project("modify-cancel");
    let (mut a, port) = active_window("modify-cancel-marker", Some(root.clone()));
    a.host.set_selection(Some(editor(root.join("lib/main.dart"), "a\nb\n", vec![span(0, 0)])));

    let target = url(port, "/modify-code");
    let waiting = thread::spawn(move || {
        request("POST", &target, Some(&json!({ "updatedCode": "x();" })))
    });
    let edits = Arc::clone(&a.bridge.context().edits);
    assert!(wait_until(Duration::from_secs(3), || !edits.pending().is_empty()));

    a.bridge.deactivate();
    let (status, body) = waiting.join().unwrap();
    assert_eq!(status, 409);
    assert_eq!(body["error"], "Edit cancelled before a decision was made.");
    assert!(edits.pending().is_empty());
    let _ = fs::remove_dir_all(root);
}
