//! Bridge errors.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

/// Errors surfaced by the coordinator, the server lifecycle and the host glue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Another process already holds the loopback port.
    #[error("port {0} is already in use")]
    PortInUse(u16),

    /// Any other server-side failure (bind, serve, shutdown).
    #[error("server error: {0}")]
    Server(SmolStr),

    /// Control call to a running server failed.
    #[error("control call failed: {0}")]
    Control(SmolStr),

    /// Invalid configuration value or file.
    #[error("invalid config: {0}")]
    InvalidConfig(SmolStr),

    /// The host environment lacks something the bridge needs.
    #[error("unsupported environment: {0}")]
    Unsupported(SmolStr),

    /// The attached editor refused or failed an operation.
    #[error("editor error: {0}")]
    Editor(SmolStr),

    /// Malformed HTTP request payload.
    #[error("{0}")]
    InvalidRequest(SmolStr),

    /// Filesystem failure.
    #[error("i/o error: {0}")]
    Io(SmolStr),
}

impl RelayError {
    /// True for the fatal bind conflict (no retry).
    #[must_use]
    pub fn is_bind_conflict(&self) -> bool {
        matches!(self, Self::PortInUse(_))
    }
}
