//! Bridge configuration loading (`relay.toml`).

#![allow(missing_docs)]

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use smol_str::SmolStr;

use crate::error::RelayError;

/// Well-known loopback port shared by every editor window.
pub const DEFAULT_PORT: u16 = 45678;
pub const DEFAULT_SHUTDOWN_DELAY_MS: u64 = 100;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 250;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_FREE_TIMEOUT_MS: u64 = 5000;
/// Folder created under the platform data directory.
pub const APP_DIR_NAME: &str = "Relay";
pub const CONFIG_FILE_NAME: &str = "relay.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub handoff: HandoffConfig,
    pub workspace: WorkspaceConfig,
    pub log_level: SmolStr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// Delay between acknowledging `/shutdown` and closing the socket.
    pub shutdown_delay: Duration,
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffConfig {
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    /// Upper bound on waiting for an evicted server to release the port.
    pub free_timeout: Duration,
    pub on_conflict: ConflictPolicy,
}

/// What to do when another window already runs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Prompt,
    Switch,
    Stay,
}

impl ConflictPolicy {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "prompt" | "ask" => Ok(Self::Prompt),
            "switch" => Ok(Self::Switch),
            "stay" => Ok(Self::Stay),
            _ => Err(RelayError::InvalidConfig(
                format!("invalid handoff.on_conflict '{text}' (expected prompt, switch or stay)")
                    .into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceConfig {
    pub root: Option<PathBuf>,
    pub window_id: Option<SmolStr>,
    pub state_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: DEFAULT_PORT,
                shutdown_delay: Duration::from_millis(DEFAULT_SHUTDOWN_DELAY_MS),
            },
            handoff: HandoffConfig {
                probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
                poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
                free_timeout: Duration::from_millis(DEFAULT_FREE_TIMEOUT_MS),
                on_conflict: ConflictPolicy::Prompt,
            },
            workspace: WorkspaceConfig::default(),
            log_level: SmolStr::new("info"),
        }
    }
}

impl RelayConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| {
                RelayError::InvalidConfig(format!("{}: {err}", path.display()).into())
            })?;
        let mut config = Self::from_toml_str(&text)?;
        // Relative roots are relative to the config file, not the cwd.
        if let (Some(root), Some(parent)) = (config.workspace.root.as_ref(), path.parent()) {
            if root.is_relative() {
                config.workspace.root = Some(parent.join(root));
            }
        }
        Ok(config)
    }

    /// Load `relay.toml` from `dir` when present, defaults otherwise.
    pub fn load_or_default(dir: &Path) -> Result<Self, RelayError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RelayError> {
        let raw: RelayToml = toml::from_str(text)
            .map_err(|err| RelayError::InvalidConfig(format!("relay.toml: {err}").into()))?;
        raw.into_config()
    }

    /// Identity of this editor window: explicit id, else workspace root, else `unknown`.
    #[must_use]
    pub fn window_id(&self) -> SmolStr {
        if let Some(id) = self.workspace.window_id.as_ref() {
            return id.clone();
        }
        self.workspace
            .root
            .as_ref()
            .map(|root| SmolStr::new(root.display().to_string()))
            .unwrap_or_else(|| SmolStr::new("unknown"))
    }

    /// Directory holding `active-window.json` (config override, else the platform dir).
    pub fn state_dir(&self) -> Result<PathBuf, RelayError> {
        match self.workspace.state_dir.as_ref() {
            Some(dir) => Ok(dir.clone()),
            None => platform_data_dir(),
        }
    }
}

/// `<platform data dir>/Relay`.
///
/// Windows uses `%LOCALAPPDATA%`, macOS `~/Library/Application Support`, other
/// unix systems `$XDG_CONFIG_HOME` or `~/.config`.
pub fn platform_data_dir() -> Result<PathBuf, RelayError> {
    let home = home::home_dir();
    let base = if cfg!(windows) {
        std::env::var_os("LOCALAPPDATA")
            .map(PathBuf::from)
            .or_else(|| home.map(|home| home.join("AppData").join("Local")))
    } else if cfg!(target_os = "macos") {
        home.map(|home| home.join("Library").join("Application Support"))
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| home.map(|home| home.join(".config")))
    };
    base.map(|base| base.join(APP_DIR_NAME))
        .ok_or_else(|| RelayError::Unsupported("no home directory for relay state".into()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RelayToml {
    server: Option<ServerSection>,
    handoff: Option<HandoffSection>,
    workspace: Option<WorkspaceSection>,
    log: Option<LogSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    port: Option<u16>,
    shutdown_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HandoffSection {
    probe_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    timeout_ms: Option<u64>,
    on_conflict: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkspaceSection {
    root: Option<PathBuf>,
    window_id: Option<String>,
    state_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    level: Option<String>,
}

impl RelayToml {
    fn into_config(self) -> Result<RelayConfig, RelayError> {
        let mut config = RelayConfig::default();
        if let Some(server) = self.server {
            if let Some(port) = server.port {
                if port == 0 {
                    return Err(RelayError::InvalidConfig(
                        "server.port must be a fixed, non-zero port".into(),
                    ));
                }
                config.server.port = port;
            }
            if let Some(delay) = server.shutdown_delay_ms {
                config.server.shutdown_delay = Duration::from_millis(delay);
            }
        }
        if let Some(handoff) = self.handoff {
            if let Some(ms) = handoff.probe_timeout_ms {
                config.handoff.probe_timeout = positive_ms("handoff.probe_timeout_ms", ms)?;
            }
            if let Some(ms) = handoff.poll_interval_ms {
                config.handoff.poll_interval = positive_ms("handoff.poll_interval_ms", ms)?;
            }
            if let Some(ms) = handoff.timeout_ms {
                config.handoff.free_timeout = Duration::from_millis(ms);
            }
            if let Some(policy) = handoff.on_conflict {
                config.handoff.on_conflict = ConflictPolicy::parse(&policy)?;
            }
        }
        if let Some(workspace) = self.workspace {
            config.workspace = WorkspaceConfig {
                root: workspace.root,
                window_id: workspace
                    .window_id
                    .filter(|id| !id.trim().is_empty())
                    .map(SmolStr::new),
                state_dir: workspace.state_dir,
            };
        }
        if let Some(level) = self.log.and_then(|log| log.level) {
            config.log_level = SmolStr::new(level.trim().to_ascii_lowercase());
        }
        Ok(config)
    }
}

fn positive_ms(key: &str, ms: u64) -> Result<Duration, RelayError> {
    if ms == 0 {
        return Err(RelayError::InvalidConfig(format!("{key} must be > 0").into()));
    }
    Ok(Duration::from_millis(ms))
}
