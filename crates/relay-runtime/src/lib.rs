//! `relay-runtime` - loopback bridge between an editor and an external coding tool.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Owned per-process bridge object.
pub mod bridge;
/// HTTP client for a running bridge server.
pub mod client;
/// Bridge configuration loading.
pub mod config;
/// Startup coordination between editor windows.
pub mod coordinator;
/// Code edits waiting for the user's decision.
pub mod edits;
/// Bridge errors.
pub mod error;
/// Editor events fed to the tracker.
pub mod events;
/// Editor-side collaborator traits.
pub mod host;
/// Document identity decoding.
pub mod identity;
/// `editor.json` installation glue.
pub mod integration;
/// Persisted active-window marker.
pub mod marker;
/// Loopback port probe.
pub mod probe;
/// Server lifecycle and HTTP routes.
pub mod server;
/// Status indicator and notices.
pub mod status;
/// Stdio protocol host.
pub mod stdio;
/// Change notification tracker.
pub mod tracker;

pub use bridge::Bridge;
pub use config::RelayConfig;
pub use error::RelayError;
pub use server::{ServerLifecycle, ServerState};
