//! Code edits proposed over `POST /modify-code`.
//!
//! The proposal is inserted after the current selection for review. The user
//! accepts (the selection is replaced) or rejects (the proposal is removed)
//! from the editor, and only then does the HTTP request get its answer.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};

use relay_workspace::selection::SelectionSpan;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RelayError;

/// Line inserted above proposed code.
pub const GENERATED_MARKER: &str = "\n/* Relay AI GENERATED CODE BELOW */\n";
/// Header written above accepted code.
pub const ACCEPTED_HEADER: &str = "// Updated code by Relay\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditDecision {
    Accept,
    Reject,
}

impl EditDecision {
    /// Body of the HTTP answer.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Accept => "Changes accepted! Original code replaced with updated code.",
            Self::Reject => "Changes rejected. Original code remains unchanged.",
        }
    }

    /// Notice shown in the editor.
    #[must_use]
    pub fn notice(self) -> &'static str {
        match self {
            Self::Accept => "Changes accepted!",
            Self::Reject => "Changes rejected.",
        }
    }
}

/// Proposed code shown after the selection of `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditProposal {
    pub id: u64,
    pub path: PathBuf,
    /// Selection replaced on accept.
    pub selection: SelectionSpan,
    /// Insertion point (zero-based), the end of the selection.
    pub line: u32,
    pub character: u32,
    /// Inserted text: marker plus code.
    pub text: String,
    /// Text replacing the selection on accept.
    pub replacement: String,
}

impl EditProposal {
    #[must_use]
    pub fn after_selection(
        id: u64,
        path: PathBuf,
        selection: SelectionSpan,
        updated_code: &str,
    ) -> Self {
        let (_, line) = selection.ordered();
        Self {
            id,
            path,
            selection,
            line,
            character: selection.end_character,
            text: format!("{GENERATED_MARKER}{updated_code}"),
            replacement: format!("{ACCEPTED_HEADER}{updated_code}"),
        }
    }
}

/// Outcome delivered to the waiting request.
pub type EditReply = Result<EditDecision, RelayError>;

/// A proposal waiting for the user.
#[derive(Debug)]
pub struct PendingEdit {
    pub proposal: EditProposal,
    reply: Sender<EditReply>,
}

impl PendingEdit {
    /// Hand the outcome to the waiting request, if it is still there.
    pub fn reply(self, outcome: EditReply) {
        if self.reply.send(outcome).is_err() {
            debug!(id = self.proposal.id, "edit request already gone");
        }
    }
}

/// Proposals waiting for a decision, keyed by id.
#[derive(Debug, Default)]
pub struct EditBook {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingEdit>>,
}

impl EditBook {
    /// Fresh proposal id (starting at 1).
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Park `proposal` until [`EditBook::take`] or [`EditBook::cancel_all`].
    pub fn register(&self, proposal: EditProposal) -> Receiver<EditReply> {
        let (reply, receiver) = mpsc::channel();
        self.lock().insert(proposal.id, PendingEdit { proposal, reply });
        receiver
    }

    /// Remove the proposal `id`, if still pending.
    pub fn take(&self, id: u64) -> Option<PendingEdit> {
        self.lock().remove(&id)
    }

    /// Drop every pending proposal; waiting requests see a disconnect.
    pub fn cancel_all(&self) -> usize {
        let cancelled = std::mem::take(&mut *self.lock());
        if !cancelled.is_empty() {
            debug!(count = cancelled.len(), "pending edits cancelled");
        }
        cancelled.len()
    }

    /// Ids still waiting, sorted.
    #[must_use]
    pub fn pending(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingEdit>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
