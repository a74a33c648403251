//! Editor-side collaborators.
//!
//! The bridge never talks to an editor directly. Document state, comparison
//! views and the takeover dialog are reached through these traits; the sidecar
//! binary implements them over the stdio protocol, tests use [`HeadlessHost`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use relay_workspace::selection::{Diagnostic, SelectionSpan};
use serde::{Deserialize, Serialize};

use crate::edits::{EditDecision, EditProposal};
use crate::error::RelayError;

/// Snapshot of the focused editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSelection {
    /// File shown in the focused editor.
    pub file_path: PathBuf,
    /// Full document text.
    pub text: String,
    /// Current selections (zero-based lines).
    #[serde(default)]
    pub selections: Vec<SelectionSpan>,
    /// Diagnostics reported for the document.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Editor operations the bridge needs.
pub trait EditorHost: Send + Sync {
    /// First workspace folder, if one is open.
    fn workspace_root(&self) -> Option<PathBuf>;

    /// Focused editor and its selections, if any.
    fn active_selection(&self) -> Option<ActiveSelection>;

    /// Open a side-by-side comparison; `right` is the subject side.
    fn open_comparison(&self, left: &Path, right: &Path, title: &str) -> Result<(), RelayError>;

    /// Open a document in an editor tab.
    fn open_document(&self, path: &Path) -> Result<(), RelayError>;

    /// Insert `proposal.text` at its insertion point and offer accept/reject.
    fn propose_edit(&self, proposal: &EditProposal) -> Result<(), RelayError>;

    /// Remove the inserted proposal; on accept also replace the selection
    /// with `proposal.replacement`.
    fn finish_edit(
        &self,
        proposal: &EditProposal,
        decision: EditDecision,
    ) -> Result<(), RelayError>;
}

/// Answer to the takeover question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TakeoverChoice {
    /// Evict the running server and take over.
    Switch,
    /// Leave the other window in charge.
    Stay,
}

impl TakeoverChoice {
    /// Button label offered to the user.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Switch => "Switch to this project",
            Self::Stay => "Stay with previous project",
        }
    }

    /// Parse a wire value or a button label.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        [Self::Switch, Self::Stay].into_iter().find(|choice| {
            text.eq_ignore_ascii_case(choice.label())
                || text.eq_ignore_ascii_case(match choice {
                    Self::Switch => "switch",
                    Self::Stay => "stay",
                })
        })
    }
}

/// Question put to the user when a server is already running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeoverRequest {
    /// Contended port.
    pub port: u16,
    /// Prompt text.
    pub message: String,
    /// Preselected answer.
    pub default: TakeoverChoice,
}

impl TakeoverRequest {
    /// Standard question for `port`.
    #[must_use]
    pub fn new(port: u16, default: TakeoverChoice) -> Self {
        Self {
            port,
            message: "Relay is already active in another editor window. \
                      Do you want to switch it to this project?"
                .to_string(),
            default,
        }
    }
}

/// Source of the takeover decision. Dismissal must map to [`TakeoverChoice::Stay`].
pub trait TakeoverPrompt: Send + Sync {
    /// Ask and wait for an answer.
    fn choose(&self, request: &TakeoverRequest) -> TakeoverChoice;
}

/// Prompt that always gives the same answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedChoice(pub TakeoverChoice);

impl TakeoverPrompt for FixedChoice {
    fn choose(&self, _request: &TakeoverRequest) -> TakeoverChoice {
        self.0
    }
}

/// Prompt that accepts whatever default was offered.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptDefault;

impl TakeoverPrompt for AcceptDefault {
    fn choose(&self, request: &TakeoverRequest) -> TakeoverChoice {
        request.default
    }
}

/// Requests recorded by [`HeadlessHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    /// `open_comparison(left, right, title)`.
    Comparison {
        /// Left (original) side.
        left: PathBuf,
        /// Right (subject) side.
        right: PathBuf,
        /// View title.
        title: String,
    },
    /// `open_document(path)`.
    Document(PathBuf),
    /// `propose_edit(proposal)`.
    ProposeEdit(EditProposal),
    /// `finish_edit(proposal, decision)`.
    FinishEdit {
        /// Proposal id.
        id: u64,
        /// User decision.
        decision: EditDecision,
    },
}

/// In-process host without an editor: fixed root, settable selection and a
/// log of requested views.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    root: Mutex<Option<PathBuf>>,
    selection: Mutex<Option<ActiveSelection>>,
    actions: Mutex<Vec<HostAction>>,
}

impl HeadlessHost {
    /// Host rooted at `root`.
    #[must_use]
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root: Mutex::new(root),
            ..Self::default()
        }
    }

    /// Replace the workspace root.
    pub fn set_root(&self, root: Option<PathBuf>) {
        if let Ok(mut guard) = self.root.lock() {
            *guard = root;
        }
    }

    /// Replace the focused editor snapshot.
    pub fn set_selection(&self, selection: Option<ActiveSelection>) {
        if let Ok(mut guard) = self.selection.lock() {
            *guard = selection;
        }
    }

    /// Views requested so far.
    #[must_use]
    pub fn actions(&self) -> Vec<HostAction> {
        self.actions
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn record(&self, action: HostAction) -> Result<(), RelayError> {
        let mut guard = self
            .actions
            .lock()
            .map_err(|_| RelayError::Editor("host state poisoned".into()))?;
        guard.push(action);
        Ok(())
    }
}

impl EditorHost for HeadlessHost {
    fn workspace_root(&self) -> Option<PathBuf> {
        self.root.lock().ok().and_then(|guard| guard.clone())
    }

    fn active_selection(&self) -> Option<ActiveSelection> {
        self.selection.lock().ok().and_then(|guard| guard.clone())
    }

    fn open_comparison(&self, left: &Path, right: &Path, title: &str) -> Result<(), RelayError> {
        self.record(HostAction::Comparison {
            left: left.to_path_buf(),
            right: right.to_path_buf(),
            title: title.to_string(),
        })
    }

    fn open_document(&self, path: &Path) -> Result<(), RelayError> {
        self.record(HostAction::Document(path.to_path_buf()))
    }

    fn propose_edit(&self, proposal: &EditProposal) -> Result<(), RelayError> {
        self.record(HostAction::ProposeEdit(proposal.clone()))
    }

    fn finish_edit(
        &self,
        proposal: &EditProposal,
        decision: EditDecision,
    ) -> Result<(), RelayError> {
        self.record(HostAction::FinishEdit {
            id: proposal.id,
            decision,
        })
    }
}
