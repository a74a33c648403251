//! The per-process bridge object.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::coordinator::{Coordinator, CoordinatorOutcome, CoordinatorPhase};
use crate::edits::{EditBook, EditDecision};
use crate::error::RelayError;
use crate::events::EditorEvent;
use crate::host::{EditorHost, TakeoverPrompt};
use crate::marker::MarkerStore;
use crate::probe::WaitOutcome;
use crate::server::{ServerContext, ServerLifecycle, ServerState};
use crate::status::{NoticeLevel, StatusBoard, StatusSink};
use crate::tracker::ChangeTracker;

/// Owns all coordination state for the lifetime of one editor process.
#[derive(Debug)]
pub struct Bridge {
    config: RelayConfig,
    lifecycle: ServerLifecycle,
    phases: Vec<CoordinatorPhase>,
    outcome: Option<CoordinatorOutcome>,
}

impl Bridge {
    /// Bridge reporting to `sink`, with the marker in the configured state dir.
    pub fn new(
        config: RelayConfig,
        host: Arc<dyn EditorHost>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, RelayError> {
        let marker = MarkerStore::in_dir(&config.state_dir()?);
        Ok(Self::with_parts(
            config,
            host,
            Arc::new(StatusBoard::new(sink)),
            Arc::new(marker),
        ))
    }

    /// Bridge over explicit parts.
    #[must_use]
    pub fn with_parts(
        config: RelayConfig,
        host: Arc<dyn EditorHost>,
        status: Arc<StatusBoard>,
        marker: Arc<MarkerStore>,
    ) -> Self {
        let context = ServerContext {
            window_id: config.window_id(),
            tracker: Arc::new(Mutex::new(ChangeTracker::new())),
            host,
            status,
            marker,
            edits: Arc::new(EditBook::default()),
        };
        let lifecycle = ServerLifecycle::new(config.server, config.handoff, context);
        Self {
            config,
            lifecycle,
            phases: Vec::new(),
            outcome: None,
        }
    }

    /// Run the startup coordination. Later calls return the first outcome
    /// while the server is still running.
    pub fn activate(&mut self, prompt: &dyn TakeoverPrompt) -> CoordinatorOutcome {
        if let Some(outcome @ CoordinatorOutcome::Active) = &self.outcome {
            if self.lifecycle.state() == ServerState::Running {
                return outcome.clone();
            }
        }
        let mut coordinator = Coordinator::new(&self.lifecycle, self.config.handoff);
        let outcome = coordinator.run(prompt);
        self.phases = coordinator.phases().to_vec();
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Feed one host event to the tracker.
    pub fn handle_event(&self, event: &EditorEvent) {
        let mut tracker = self
            .context()
            .tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match event {
            EditorEvent::TopologyChanged { tabs } => tracker.on_topology_changed(tabs),
            other => match other.document_event() {
                Some(document) => {
                    tracker.on_document_event(&document);
                }
                None => debug!("ignoring event with undecodable document"),
            },
        }
    }

    /// Apply the user's decision on a pending `/modify-code` proposal and
    /// answer the waiting request. `false` when `id` is not pending.
    pub fn resolve_edit(&self, id: u64, decision: EditDecision) -> bool {
        let context = self.context();
        let Some(pending) = context.edits.take(id) else {
            debug!(id, "no pending edit");
            return false;
        };
        let outcome = context.host.finish_edit(&pending.proposal, decision);
        match &outcome {
            Ok(()) => context.status.notify(NoticeLevel::Info, decision.notice()),
            Err(err) => {
                warn!(id, "failed to finish edit: {err}");
                context
                    .status
                    .notify(NoticeLevel::Error, &format!("Failed to apply changes: {err}"));
            }
        }
        pending.reply(outcome.map(|()| decision));
        true
    }

    /// Close the server (if any) and release the marker.
    pub fn deactivate(&mut self) -> Option<WaitOutcome> {
        let outcome = self.lifecycle.close();
        if outcome.is_some() {
            info!("relay bridge deactivated");
        }
        outcome
    }

    /// Server lifecycle handle.
    #[must_use]
    pub fn lifecycle(&self) -> &ServerLifecycle {
        &self.lifecycle
    }

    /// Shared request context (tracker, host, status, marker).
    #[must_use]
    pub fn context(&self) -> &ServerContext {
        self.lifecycle.context()
    }

    /// Phases visited by the last activation.
    #[must_use]
    pub fn phases(&self) -> &[CoordinatorPhase] {
        &self.phases
    }

    /// Outcome of the last activation.
    #[must_use]
    pub fn outcome(&self) -> Option<&CoordinatorOutcome> {
        self.outcome.as_ref()
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.lifecycle.state() != ServerState::Stopped {
            self.lifecycle.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeadlessHost;
    use crate::tracker::PollStatus;
    use serde_json::json;

    fn bridge() -> Bridge {
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("relay-bridge-{stamp}"));
        Bridge::with_parts(
            RelayConfig::default(),
            Arc::new(HeadlessHost::default()),
            Arc::new(StatusBoard::default()),
            Arc::new(MarkerStore::in_dir(&dir)),
        )
    }

    #[test]
    fn events_flow_into_the_tracker() {
        let bridge = bridge();
        bridge.handle_event(&EditorEvent::TopologyChanged {
            tabs: vec![json!({ "original": "/w/a.dart", "modified": "/w/b.dart" })],
        });
        bridge.handle_event(&EditorEvent::DocumentSaved {
            document: json!("file:///w/b.dart"),
        });
        bridge.handle_event(&EditorEvent::DocumentSaved { document: json!(null) });

        let mut tracker = bridge.context().tracker.lock().unwrap();
        assert_eq!(tracker.drain(), PollStatus::Modified);
        assert_eq!(tracker.drain(), PollStatus::Same);
    }

    #[test]
    fn resolving_an_edit_finishes_it_in_the_host_once() {
        let host = Arc::new(HeadlessHost::default());
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let bridge = Bridge::with_parts(
            RelayConfig::default(),
            host.clone(),
            Arc::new(StatusBoard::default()),
            Arc::new(MarkerStore::in_dir(
                &std::env::temp_dir().join(format!("relay-bridge-edit-{stamp}")),
            )),
        );
        let selection = relay_workspace::selection::SelectionSpan {
            start_line: 0,
            end_line: 1,
            end_character: 3,
            is_empty: false,
        };
        let edits = &bridge.context().edits;
        let id = edits.next_id();
        let reply = edits.register(crate::edits::EditProposal::after_selection(
            id,
            "/w/a.dart".into(),
            selection,
            "b();",
        ));

        assert!(bridge.resolve_edit(id, EditDecision::Reject));
        assert_eq!(reply.recv().unwrap(), Ok(EditDecision::Reject));
        assert!(!bridge.resolve_edit(id, EditDecision::Accept));
        assert_eq!(
            host.actions(),
            vec![crate::host::HostAction::FinishEdit {
                id,
                decision: EditDecision::Reject,
            }]
        );
        let notices = bridge.context().status.notices();
        assert_eq!(notices.last().map(|(_, text)| text.as_str()), Some("Changes rejected."));
    }

    #[test]
    fn deactivate_without_activation_is_safe() {
        let mut bridge = bridge();
        assert_eq!(bridge.deactivate(), None);
        assert_eq!(bridge.lifecycle().state(), ServerState::Stopped);
    }
}
