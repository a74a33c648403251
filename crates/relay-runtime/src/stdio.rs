//! Line-delimited JSON protocol between the editor plugin and the sidecar.
//!
//! Inbound lines (stdin) carry editor events, selection/workspace snapshots,
//! takeover answers, edit decisions and `deactivate`. Outbound lines (stdout)
//! carry status, notices, the takeover question, view requests and proposed
//! edits. Malformed lines are logged and skipped.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::edits::{EditDecision, EditProposal};
use crate::error::RelayError;
use crate::events::EditorEvent;
use crate::host::{ActiveSelection, EditorHost, TakeoverChoice, TakeoverPrompt, TakeoverRequest};
use crate::status::{NoticeLevel, StatusDisplay, StatusSink, StatusTone};

/// Messages the bridge consumes itself rather than forwarding to the tracker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    SelectionChanged {
        #[serde(default)]
        selection: Option<ActiveSelection>,
    },
    WorkspaceChanged {
        #[serde(default)]
        root: Option<PathBuf>,
    },
    TakeoverChoice {
        choice: String,
    },
    AcceptEdit {
        id: u64,
    },
    RejectEdit {
        id: u64,
    },
    Deactivate,
}

impl ControlMessage {
    /// Proposal id and decision for `accept_edit` / `reject_edit`.
    #[must_use]
    pub fn edit_decision(&self) -> Option<(u64, EditDecision)> {
        match *self {
            Self::AcceptEdit { id } => Some((id, EditDecision::Accept)),
            Self::RejectEdit { id } => Some((id, EditDecision::Reject)),
            _ => None,
        }
    }
}

/// Any inbound line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HostMessage {
    Editor(EditorEvent),
    Control(ControlMessage),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound<'a> {
    Status {
        text: &'a str,
        tooltip: &'a str,
        tone: StatusTone,
    },
    Notice {
        level: NoticeLevel,
        message: &'a str,
    },
    PromptTakeover {
        message: &'a str,
        options: [&'a str; 2],
        default: &'a str,
    },
    OpenComparison {
        left: &'a Path,
        right: &'a Path,
        title: &'a str,
    },
    OpenDocument {
        path: &'a Path,
    },
    ApplyEdit {
        id: u64,
        path: &'a Path,
        line: u32,
        character: u32,
        text: &'a str,
    },
    FinishEdit {
        id: u64,
        path: &'a Path,
        decision: EditDecision,
        #[serde(skip_serializing_if = "Option::is_none")]
        replacement: Option<&'a str>,
    },
}

pub struct StdioHost {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
    // Lines read while waiting for a takeover answer, replayed in order.
    pending: Mutex<VecDeque<HostMessage>>,
    root: Mutex<Option<PathBuf>>,
    selection: Mutex<Option<ActiveSelection>>,
}

impl std::fmt::Debug for StdioHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioHost")
            .field("root", &self.root.lock().ok().and_then(|root| root.clone()))
            .finish_non_exhaustive()
    }
}

impl StdioHost {
    #[must_use]
    pub fn new(
        input: Box<dyn BufRead + Send>,
        output: Box<dyn Write + Send>,
        root: Option<PathBuf>,
    ) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
            pending: Mutex::new(VecDeque::new()),
            root: Mutex::new(root),
            selection: Mutex::new(None),
        }
    }

    /// Process stdin/stdout.
    #[must_use]
    pub fn process(root: Option<PathBuf>) -> Self {
        Self::new(
            Box::new(std::io::BufReader::new(std::io::stdin())),
            Box::new(std::io::stdout()),
            root,
        )
    }

    /// Next inbound message, buffered ones first. `Ok(None)` at end of input.
    pub fn next_message(&self) -> Result<Option<HostMessage>, RelayError> {
        if let Some(message) = self.lock_pending().pop_front() {
            return Ok(Some(message));
        }
        self.read_message()
    }

    /// Apply selection and workspace snapshots. Returns false for
    /// `deactivate`, true otherwise.
    pub fn apply_control(&self, message: ControlMessage) -> bool {
        match message {
            ControlMessage::SelectionChanged { selection } => {
                if let Ok(mut guard) = self.selection.lock() {
                    *guard = selection;
                }
            }
            ControlMessage::WorkspaceChanged { root } => {
                debug!(root = ?root, "workspace changed");
                if let Ok(mut guard) = self.root.lock() {
                    *guard = root;
                }
            }
            ControlMessage::TakeoverChoice { choice } => {
                debug!(%choice, "takeover answer outside of a prompt ignored");
            }
            ControlMessage::AcceptEdit { id } | ControlMessage::RejectEdit { id } => {
                debug!(id, "edit decision left to the bridge");
            }
            ControlMessage::Deactivate => return false,
        }
        true
    }

    fn read_message(&self) -> Result<Option<HostMessage>, RelayError> {
        let mut input = self
            .input
            .lock()
            .map_err(|_| RelayError::Editor("host input poisoned".into()))?;
        let mut line = String::new();
        loop {
            line.clear();
            let read = input
                .read_line(&mut line)
                .map_err(|err| RelayError::Io(format!("read host input: {err}").into()))?;
            if read == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<HostMessage>(trimmed) {
                Ok(message) => return Ok(Some(message)),
                Err(err) => warn!("skipping malformed host message: {err}"),
            }
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<HostMessage>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, message: &Outbound<'_>) -> Result<(), RelayError> {
        let line = serde_json::to_string(message)
            .map_err(|err| RelayError::Editor(format!("encode host message: {err}").into()))?;
        let mut output = self
            .output
            .lock()
            .map_err(|_| RelayError::Editor("host output poisoned".into()))?;
        writeln!(output, "{line}")
            .and_then(|()| output.flush())
            .map_err(|err| RelayError::Editor(format!("write host message: {err}").into()))
    }
}

impl EditorHost for StdioHost {
    fn workspace_root(&self) -> Option<PathBuf> {
        self.root.lock().ok().and_then(|guard| guard.clone())
    }

    fn active_selection(&self) -> Option<ActiveSelection> {
        self.selection.lock().ok().and_then(|guard| guard.clone())
    }

    fn open_comparison(&self, left: &Path, right: &Path, title: &str) -> Result<(), RelayError> {
        self.emit(&Outbound::OpenComparison { left, right, title })
    }

    fn open_document(&self, path: &Path) -> Result<(), RelayError> {
        self.emit(&Outbound::OpenDocument { path })
    }

    fn propose_edit(&self, proposal: &EditProposal) -> Result<(), RelayError> {
        self.emit(&Outbound::ApplyEdit {
            id: proposal.id,
            path: &proposal.path,
            line: proposal.line,
            character: proposal.character,
            text: &proposal.text,
        })
    }

    fn finish_edit(
        &self,
        proposal: &EditProposal,
        decision: EditDecision,
    ) -> Result<(), RelayError> {
        let replacement =
            (decision == EditDecision::Accept).then_some(proposal.replacement.as_str());
        self.emit(&Outbound::FinishEdit {
            id: proposal.id,
            path: &proposal.path,
            decision,
            replacement,
        })
    }
}

impl StatusSink for StdioHost {
    fn show_status(&self, status: &StatusDisplay) {
        let message = Outbound::Status {
            text: &status.text,
            tooltip: &status.tooltip,
            tone: status.tone,
        };
        if let Err(err) = self.emit(&message) {
            warn!("{err}");
        }
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        if let Err(err) = self.emit(&Outbound::Notice { level, message }) {
            warn!("{err}");
        }
    }
}

impl TakeoverPrompt for StdioHost {
    fn choose(&self, request: &TakeoverRequest) -> TakeoverChoice {
        let question = Outbound::PromptTakeover {
            message: &request.message,
            options: [TakeoverChoice::Switch.label(), TakeoverChoice::Stay.label()],
            default: request.default.label(),
        };
        if let Err(err) = self.emit(&question) {
            warn!("{err}; staying inactive");
            return TakeoverChoice::Stay;
        }
        loop {
            match self.read_message() {
                Ok(Some(HostMessage::Control(ControlMessage::TakeoverChoice { choice }))) => {
                    // Unrecognized answers count as a dismissal.
                    return TakeoverChoice::parse(&choice).unwrap_or(TakeoverChoice::Stay);
                }
                Ok(Some(other)) => self.lock_pending().push_back(other),
                Ok(None) => {
                    debug!("host input closed while prompting");
                    return TakeoverChoice::Stay;
                }
                Err(err) => {
                    warn!("{err}; staying inactive");
                    return TakeoverChoice::Stay;
                }
            }
        }
    }
}
