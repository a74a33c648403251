//! Startup coordination between editor windows.
//!
//! Decides, once per activation, whether this process runs the loopback
//! server. The probe is authoritative: when something already listens the user
//! (or the configured policy) picks between evicting it and staying inactive.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client;
use crate::config::{ConflictPolicy, HandoffConfig};
use crate::error::RelayError;
use crate::host::{TakeoverChoice, TakeoverPrompt, TakeoverRequest};
use crate::probe::PortProbe;
use crate::server::ServerLifecycle;
use crate::status::{StatusDisplay, StatusSink};

/// Timeout for the best-effort `POST /shutdown` sent to the current owner.
const SHUTDOWN_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Phases visited by [`Coordinator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// Not started.
    Idle,
    /// Another server answered the probe.
    Contending,
    /// Asking the current owner to shut down and waiting for the port.
    Evicting,
    /// Binding our own server.
    SoloStart,
    /// Chose to stay; no server in this process.
    Inactive,
    /// Our server is running.
    Active,
    /// Bind failed.
    Failed,
}

/// Terminal result of a coordination run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorOutcome {
    /// This process owns the server.
    Active,
    /// Another window keeps the server.
    Inactive,
    /// Starting the server failed; the status already says why.
    Failed(RelayError),
}

/// One coordination run over a lifecycle.
#[derive(Debug)]
pub struct Coordinator<'a> {
    lifecycle: &'a ServerLifecycle,
    handoff: HandoffConfig,
    phases: Vec<CoordinatorPhase>,
}

impl<'a> Coordinator<'a> {
    /// Coordinator for `lifecycle` using the handoff timings in `handoff`.
    #[must_use]
    pub fn new(lifecycle: &'a ServerLifecycle, handoff: HandoffConfig) -> Self {
        Self {
            lifecycle,
            handoff,
            phases: vec![CoordinatorPhase::Idle],
        }
    }

    /// Phases visited so far, starting with `Idle`.
    #[must_use]
    pub fn phases(&self) -> &[CoordinatorPhase] {
        &self.phases
    }

    /// Probe, negotiate and start. `prompt` is consulted only when the
    /// conflict policy is [`ConflictPolicy::Prompt`].
    pub fn run(&mut self, prompt: &dyn TakeoverPrompt) -> CoordinatorOutcome {
        let port = self.lifecycle.port();
        let probe = PortProbe::new(port, self.handoff.probe_timeout);
        if probe.is_occupied() {
            self.enter(CoordinatorPhase::Contending);
            match self.decide(prompt) {
                TakeoverChoice::Stay => {
                    info!(port, "staying inactive; another window keeps the server");
                    self.lifecycle
                        .context()
                        .status
                        .show_status(&StatusDisplay::declined());
                    self.enter(CoordinatorPhase::Inactive);
                    return CoordinatorOutcome::Inactive;
                }
                TakeoverChoice::Switch => self.evict(&probe),
            }
        } else {
            debug!(port, "no server on port");
        }
        self.solo_start()
    }

    fn decide(&self, prompt: &dyn TakeoverPrompt) -> TakeoverChoice {
        match self.handoff.on_conflict {
            ConflictPolicy::Switch => TakeoverChoice::Switch,
            ConflictPolicy::Stay => TakeoverChoice::Stay,
            ConflictPolicy::Prompt => {
                let context = self.lifecycle.context();
                let default = if context.marker.names(&context.window_id) {
                    TakeoverChoice::Switch
                } else {
                    TakeoverChoice::Stay
                };
                prompt.choose(&TakeoverRequest::new(self.lifecycle.port(), default))
            }
        }
    }

    fn evict(&mut self, probe: &PortProbe) {
        self.enter(CoordinatorPhase::Evicting);
        let port = probe.port();
        if let Err(err) = client::send_shutdown(port, SHUTDOWN_CALL_TIMEOUT) {
            warn!("could not contact existing server for shutdown: {err}");
        }
        let outcome = probe.wait_until_free(self.handoff.poll_interval, self.handoff.free_timeout);
        if !outcome.is_freed() {
            warn!(port, "port still occupied after eviction; starting anyway");
        }
    }

    fn solo_start(&mut self) -> CoordinatorOutcome {
        self.enter(CoordinatorPhase::SoloStart);
        match self.lifecycle.start() {
            Ok(()) => {
                let context = self.lifecycle.context();
                context.marker.assert(&context.window_id);
                context.status.show_status(&StatusDisplay::active());
                info!(window = %context.window_id, "this window now owns the relay server");
                self.enter(CoordinatorPhase::Active);
                CoordinatorOutcome::Active
            }
            Err(err) => {
                self.enter(CoordinatorPhase::Failed);
                CoordinatorOutcome::Failed(err)
            }
        }
    }

    fn enter(&mut self, phase: CoordinatorPhase) {
        debug!(?phase, "coordinator phase");
        self.phases.push(phase);
    }
}
