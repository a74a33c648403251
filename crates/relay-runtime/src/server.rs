//! Server lifecycle: bind, serve, deferred shutdown and synchronous close.
//!
//! One `ServerLifecycle` owns the loopback listener for the whole process.
//! States move `Stopped -> Starting -> Running -> ShuttingDown -> Stopped`.
//! The listener runs on its own thread (tiny_http); the deferred shutdown runs
//! on a timer thread that can be cancelled through a channel.

mod routes;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use smol_str::SmolStr;
use tiny_http::Server;
use tracing::{debug, error, info, warn};

use crate::config::{HandoffConfig, ServerConfig};
use crate::edits::EditBook;
use crate::error::RelayError;
use crate::host::EditorHost;
use crate::marker::MarkerStore;
use crate::probe::{PortProbe, WaitOutcome};
use crate::status::{NoticeLevel, StatusBoard, StatusDisplay, StatusSink};
use crate::tracker::ChangeTracker;

/// Lifecycle state of the loopback server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// No listener.
    Stopped,
    /// Bind in progress.
    Starting,
    /// Listening and answering requests.
    Running,
    /// Close scheduled or in progress.
    ShuttingDown,
}

impl ServerState {
    /// Wire text.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Everything the request handlers need besides the lifecycle itself.
#[derive(Clone)]
pub struct ServerContext {
    /// Identity of this editor window.
    pub window_id: SmolStr,
    /// Shared change tracker.
    pub tracker: Arc<Mutex<ChangeTracker>>,
    /// Editor collaborator.
    pub host: Arc<dyn EditorHost>,
    /// Status indicator.
    pub status: Arc<StatusBoard>,
    /// Active-window marker.
    pub marker: Arc<MarkerStore>,
    /// Code edits waiting for accept/reject.
    pub edits: Arc<EditBook>,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("window_id", &self.window_id)
            .field("marker", &self.marker)
            .finish_non_exhaustive()
    }
}

/// Handle to the process-wide server. Clones share the same server.
#[derive(Clone)]
pub struct ServerLifecycle {
    shared: Arc<LifecycleShared>,
}

impl std::fmt::Debug for ServerLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerLifecycle")
            .field("port", &self.shared.config.port)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct LifecycleShared {
    config: ServerConfig,
    probe: PortProbe,
    poll_interval: Duration,
    free_timeout: Duration,
    context: ServerContext,
    inner: Mutex<LifecycleInner>,
}

struct LifecycleInner {
    state: ServerState,
    server: Option<Arc<Server>>,
    worker: Option<JoinHandle<()>>,
    pending_shutdown: Option<ShutdownTask>,
}

// Kept in `pending_shutdown` until the timer is done, so `close` can join it.
struct ShutdownTask {
    cancel: Sender<()>,
    handle: JoinHandle<Option<WaitOutcome>>,
}

impl ServerLifecycle {
    /// Lifecycle for `config.port`, initially `Stopped`.
    #[must_use]
    pub fn new(config: ServerConfig, handoff: HandoffConfig, context: ServerContext) -> Self {
        Self {
            shared: Arc::new(LifecycleShared {
                config,
                probe: PortProbe::new(config.port, handoff.probe_timeout),
                poll_interval: handoff.poll_interval,
                free_timeout: handoff.free_timeout,
                context,
                inner: Mutex::new(LifecycleInner {
                    state: ServerState::Stopped,
                    server: None,
                    worker: None,
                    pending_shutdown: None,
                }),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.shared.lock().state
    }

    /// Configured port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.shared.config.port
    }

    /// Request handler context.
    #[must_use]
    pub fn context(&self) -> &ServerContext {
        &self.shared.context
    }

    /// Bind the loopback port and start serving.
    ///
    /// A no-op when already `Running` or `Starting`. Bind failures leave the
    /// lifecycle `Stopped`, surface a status and return the error. There is no
    /// retry.
    pub fn start(&self) -> Result<(), RelayError> {
        {
            let mut inner = self.shared.lock();
            match inner.state {
                ServerState::Running | ServerState::Starting => return Ok(()),
                ServerState::ShuttingDown => {
                    return Err(RelayError::Server("shutdown in progress".into()));
                }
                ServerState::Stopped => inner.state = ServerState::Starting,
            }
        }

        let addr = self.shared.config.addr();
        let server = match Server::http(addr) {
            Ok(server) => Arc::new(server),
            Err(err) => {
                let err = bind_error(self.port(), err.as_ref());
                self.shared.lock().state = ServerState::Stopped;
                self.report_bind_failure(&err);
                return Err(err);
            }
        };

        let worker_server = Arc::clone(&server);
        let lifecycle = self.clone();
        let spawned = thread::Builder::new()
            .name("relay-http".into())
            .spawn(move || {
                for request in worker_server.incoming_requests() {
                    // A dropped request is answered with 500 by tiny_http.
                    let handled = panic::catch_unwind(AssertUnwindSafe(|| {
                        routes::handle(&lifecycle, request);
                    }));
                    if handled.is_err() {
                        error!("request handler panicked");
                    }
                }
                debug!("request loop finished");
            });
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                self.shared.lock().state = ServerState::Stopped;
                let err = RelayError::Server(format!("spawn worker: {err}").into());
                self.report_bind_failure(&err);
                return Err(err);
            }
        };

        let mut inner = self.shared.lock();
        inner.server = Some(server);
        inner.worker = Some(worker);
        inner.state = ServerState::Running;
        info!(%addr, "relay server listening");
        Ok(())
    }

    /// Schedule the deferred close requested over `POST /shutdown`.
    ///
    /// Returns `Ok(true)` when a task was scheduled and `Ok(false)` when the
    /// request was a no-op (not running, or a close already pending).
    pub fn request_shutdown(&self) -> Result<bool, RelayError> {
        let mut inner = self.shared.lock();
        if inner.state != ServerState::Running || inner.pending_shutdown.is_some() {
            debug!(state = inner.state.as_str(), "shutdown request ignored");
            return Ok(false);
        }
        let (cancel, cancelled) = mpsc::channel::<()>();
        let delay = self.shared.config.shutdown_delay;
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("relay-shutdown".into())
            .spawn(move || match cancelled.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {
                    let outcome = shared.finish_shutdown(true);
                    if outcome.is_some() {
                        info!("server handed off to another window");
                    }
                    outcome
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("deferred shutdown cancelled");
                    None
                }
            })
            .map_err(|err| RelayError::Server(format!("spawn shutdown timer: {err}").into()))?;
        inner.state = ServerState::ShuttingDown;
        inner.pending_shutdown = Some(ShutdownTask { cancel, handle });
        debug!(?delay, "shutdown scheduled");
        Ok(true)
    }

    /// Close synchronously: cancel any pending deferred close, stop serving
    /// and wait (bounded) until the port is released. Safe when stopped.
    ///
    /// Returns the wait outcome, or `None` when nothing was listening.
    pub fn close(&self) -> Option<WaitOutcome> {
        let pending = self.shared.lock().pending_shutdown.take();
        let mut timer_outcome = None;
        if let Some(task) = pending {
            // A timer already past its delay finishes the close; wait for it.
            let _ = task.cancel.send(());
            match task.handle.join() {
                Ok(outcome) => timer_outcome = outcome,
                Err(_) => warn!("shutdown timer panicked"),
            }
        }
        let outcome = self.shared.finish_shutdown(false).or(timer_outcome);
        // The marker may still name us even when the listener was never up.
        self.shared
            .context
            .marker
            .relinquish(&self.shared.context.window_id);
        outcome
    }

    fn report_bind_failure(&self, err: &RelayError) {
        let status = &self.shared.context.status;
        if err.is_bind_conflict() {
            error!("relay server port {} already in use", self.port());
            status.show_status(&StatusDisplay::bind_conflict());
        } else {
            error!("relay server failed to start: {err}");
            status.show_status(&StatusDisplay::server_error(&err.to_string()));
        }
        status.notify(
            NoticeLevel::Error,
            "Some error occurred starting the Relay server. \
             Please check if another editor window is running the server.",
        );
    }
}

impl LifecycleShared {
    fn lock(&self) -> MutexGuard<'_, LifecycleInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stop the listener, join the worker and wait for the port to free up.
    /// `None` when there was no listener to close.
    ///
    /// `evicted` is set on the timer thread of a `/shutdown` request.
    fn finish_shutdown(&self, evicted: bool) -> Option<WaitOutcome> {
        let (server, worker) = {
            let mut inner = self.lock();
            let Some(server) = inner.server.take() else {
                if evicted {
                    inner.pending_shutdown = None;
                }
                return None;
            };
            inner.state = ServerState::ShuttingDown;
            (server, inner.worker.take())
        };
        // Waiting `/modify-code` requests are answered before the listener goes.
        self.context.edits.cancel_all();
        server.unblock();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("request worker panicked");
            }
        }
        drop(server);

        let outcome = self.probe.wait_until_free(self.poll_interval, self.free_timeout);
        if !outcome.is_freed() {
            warn!(port = self.config.port, "port still held after close");
        }
        if evicted {
            self.context.status.show_status(&StatusDisplay::evicted());
        }
        {
            let mut inner = self.lock();
            inner.state = ServerState::Stopped;
            if evicted {
                // Dropping our own handle detaches the timer thread.
                inner.pending_shutdown = None;
            }
        }
        self.context.marker.relinquish(&self.context.window_id);
        info!(port = self.config.port, "relay server stopped");
        Some(outcome)
    }
}

fn bind_error(port: u16, err: &(dyn std::error::Error + Send + Sync + 'static)) -> RelayError {
    match err.downcast_ref::<io::Error>() {
        Some(io_err) if io_err.kind() == io::ErrorKind::AddrInUse => RelayError::PortInUse(port),
        _ => RelayError::Server(format!("bind 127.0.0.1:{port}: {err}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::host::HeadlessHost;
    use crate::status::StatusTone;
    use std::net::TcpListener;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn reserve_loopback_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);
        port
    }

    fn lifecycle(port: u16, window: &str) -> ServerLifecycle {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let state_dir = std::env::temp_dir().join(format!("relay-server-{window}-{stamp}"));
        let mut config = RelayConfig::default();
        config.server.port = port;
        config.server.shutdown_delay = Duration::from_millis(150);
        config.handoff.poll_interval = Duration::from_millis(10);
        config.handoff.free_timeout = Duration::from_secs(2);
        let context = ServerContext {
            window_id: SmolStr::new(window),
            tracker: Arc::new(Mutex::new(ChangeTracker::new())),
            host: Arc::new(HeadlessHost::default()),
            status: Arc::new(StatusBoard::default()),
            marker: Arc::new(MarkerStore::in_dir(&state_dir)),
            edits: Arc::new(EditBook::default()),
        };
        ServerLifecycle::new(config.server, config.handoff, context)
    }

    #[test]
    fn start_is_idempotent_and_close_frees_port() {
        let port = reserve_loopback_port();
        let server = lifecycle(port, "a");
        server.start().unwrap();
        server.start().unwrap();
        assert_eq!(server.state(), ServerState::Running);
        assert!(PortProbe::new(port, Duration::from_millis(200)).is_occupied());

        let outcome = server.close().expect("was listening");
        assert!(outcome.is_freed());
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.close().is_none());
    }

    #[test]
    fn bind_conflict_is_fatal_and_reported() {
        let holder = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = holder.local_addr().unwrap().port();
        let server = lifecycle(port, "b");
        let err = server.start().unwrap_err();
        assert_eq!(err, RelayError::PortInUse(port));
        assert_eq!(server.state(), ServerState::Stopped);
        let status = server.context().status.current().unwrap();
        assert_eq!(status, StatusDisplay::bind_conflict());
        assert_eq!(status.tone, StatusTone::Error);
        assert_eq!(server.context().status.notices().len(), 1);
    }

    #[test]
    fn request_shutdown_runs_once_after_delay() {
        let port = reserve_loopback_port();
        let server = lifecycle(port, "c");
        assert!(!server.request_shutdown().unwrap());
        server.start().unwrap();
        assert!(server.request_shutdown().unwrap());
        assert!(!server.request_shutdown().unwrap());
        assert_eq!(server.state(), ServerState::ShuttingDown);

        let probe = PortProbe::new(port, Duration::from_millis(200));
        let outcome = probe.wait_until_free(Duration::from_millis(10), Duration::from_secs(3));
        assert!(outcome.is_freed());
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while server.state() != ServerState::Stopped && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(server.context().status.current(), Some(StatusDisplay::evicted()));
        assert!(!server.request_shutdown().unwrap());
    }

    #[test]
    fn close_cancels_pending_shutdown() {
        let port = reserve_loopback_port();
        let server = lifecycle(port, "d");
        server.start().unwrap();
        server.request_shutdown().unwrap();
        let outcome = server.close().expect("was listening");
        assert!(outcome.is_freed());
        assert_eq!(server.state(), ServerState::Stopped);
        // The cancelled timer never showed the eviction status.
        assert_ne!(server.context().status.current(), Some(StatusDisplay::evicted()));
    }

    #[test]
    fn close_waits_for_a_shutdown_already_in_progress() {
        let port = reserve_loopback_port();
        let server = lifecycle(port, "f");
        server.start().unwrap();

        // Holding the tracker keeps the worker busy inside `/diff-events`.
        let tracker = Arc::clone(&server.context().tracker);
        let guard = tracker.lock().unwrap();
        let poller =
            thread::spawn(move || crate::client::poll_diff_events(port, Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(100));
        assert!(server.request_shutdown().unwrap());
        // Past the delay, the timer is stuck joining the busy worker.
        thread::sleep(Duration::from_millis(300));

        let closer = {
            let server = server.clone();
            thread::spawn(move || server.close())
        };
        thread::sleep(Duration::from_millis(150));
        assert!(!closer.is_finished());
        assert_eq!(server.state(), ServerState::ShuttingDown);

        drop(guard);
        let outcome = closer.join().unwrap();
        assert!(outcome.is_some_and(WaitOutcome::is_freed));
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(!PortProbe::new(port, Duration::from_millis(200)).is_occupied());
        assert_eq!(poller.join().unwrap(), Ok(crate::tracker::PollStatus::Same));
    }

    #[test]
    fn racing_lifecycles_yield_one_listener() {
        let port = reserve_loopback_port();
        let first = lifecycle(port, "g1");
        let second = lifecycle(port, "g2");
        let (first_result, second_result) = thread::scope(|scope| {
            let a = scope.spawn(|| first.start());
            let b = scope.spawn(|| second.start());
            (a.join().unwrap(), b.join().unwrap())
        });
        let results = [
            (first_result, first.state()),
            (second_result, second.state()),
        ];
        let running = results
            .iter()
            .filter(|(result, state)| result.is_ok() && *state == ServerState::Running)
            .count();
        let refused = results
            .iter()
            .filter(|(result, state)| {
                *result == Err(RelayError::PortInUse(port)) && *state == ServerState::Stopped
            })
            .count();
        assert_eq!((running, refused), (1, 1));
        first.close();
        second.close();
    }

    #[test]
    fn concurrent_starts_on_one_lifecycle_are_idempotent() {
        let port = reserve_loopback_port();
        let server = lifecycle(port, "e");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let server = server.clone();
                thread::spawn(move || server.start())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(server.state(), ServerState::Running);
        server.close();
    }
}
