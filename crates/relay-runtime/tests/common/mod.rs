#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use relay_runtime::config::ConflictPolicy;
use relay_runtime::host::HeadlessHost;
use relay_runtime::marker::MarkerStore;
use relay_runtime::status::StatusBoard;
use relay_runtime::{Bridge, RelayConfig, ServerLifecycle, ServerState};
use serde_json::Value;
use smol_str::SmolStr;

pub fn reserve_loopback_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

pub fn temp_dir(name: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("relay-it-{name}-{stamp}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn test_config(
    port: u16,
    window: &str,
    root: Option<PathBuf>,
    policy: ConflictPolicy,
) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.server.port = port;
    config.server.shutdown_delay = Duration::from_millis(300);
    config.handoff.probe_timeout = Duration::from_millis(200);
    config.handoff.poll_interval = Duration::from_millis(10);
    config.handoff.free_timeout = Duration::from_secs(1);
    config.handoff.on_conflict = policy;
    config.workspace.window_id = Some(SmolStr::new(window));
    config.workspace.root = root;
    config
}

pub struct TestWindow {
    pub bridge: Bridge,
    pub host: Arc<HeadlessHost>,
    pub status: Arc<StatusBoard>,
}

pub fn window(
    port: u16,
    window: &str,
    root: Option<PathBuf>,
    policy: ConflictPolicy,
    marker: &Arc<MarkerStore>,
) -> TestWindow {
    let config = test_config(port, window, root.clone(), policy);
    let host = Arc::new(HeadlessHost::new(root));
    let status = Arc::new(StatusBoard::default());
    let bridge = Bridge::with_parts(config, host.clone(), status.clone(), Arc::clone(marker));
    TestWindow {
        bridge,
        host,
        status,
    }
}

pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

pub fn wait_for_state(lifecycle: &ServerLifecycle, state: ServerState, timeout: Duration) -> bool {
    wait_until(timeout, || lifecycle.state() == state)
}

pub fn request(method: &str, url: &str, body: Option<&Value>) -> (u16, Value) {
    let agent = ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(5))
        .build();
    let req = agent.request(method, url);
    let result = match body {
        Some(body) => req
            .set("Content-Type", "application/json")
            .send_string(&body.to_string()),
        None => req.call(),
    };
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => panic!("request to {url} failed: {err}"),
    };
    let status = response.status();
    let text = response.into_string().unwrap_or_default();
    (status, serde_json::from_str(&text).unwrap_or(Value::Null))
}

pub fn url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}
