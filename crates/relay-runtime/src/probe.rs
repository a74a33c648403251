//! Loopback port probe.
//!
//! A successful TCP connect to the well-known port is the authoritative signal
//! that some bridge server is running. Probe failures of any kind (refused,
//! timed out, unreachable) read as "absent".

use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// Result of [`PortProbe::wait_until_free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The port stopped accepting connections.
    Freed {
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// The bound elapsed while the port was still occupied.
    TimedOut {
        /// Time spent waiting.
        elapsed: Duration,
    },
}

impl WaitOutcome {
    /// True when the port was observed free.
    #[must_use]
    pub fn is_freed(self) -> bool {
        matches!(self, Self::Freed { .. })
    }
}

/// Connect-based probe for a fixed loopback port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortProbe {
    port: u16,
    connect_timeout: Duration,
}

impl PortProbe {
    /// Probe `127.0.0.1:port`, giving each connect attempt `connect_timeout`.
    #[must_use]
    pub fn new(port: u16, connect_timeout: Duration) -> Self {
        Self {
            port,
            connect_timeout,
        }
    }

    /// Probed port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// True iff a server currently accepts connections on the port.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.connect_within(self.connect_timeout)
    }

    /// Probe until the port is free or `timeout` elapses. Always returns.
    ///
    /// After [`WaitOutcome::TimedOut`] the port may still be held.
    #[must_use]
    pub fn wait_until_free(&self, poll_interval: Duration, timeout: Duration) -> WaitOutcome {
        let started = Instant::now();
        loop {
            let elapsed = started.elapsed();
            let Some(remaining) = timeout.checked_sub(elapsed).filter(|left| !left.is_zero())
            else {
                debug!(port = self.port, ?elapsed, "port still occupied at deadline");
                return WaitOutcome::TimedOut { elapsed };
            };
            let budget = self
                .connect_timeout
                .min(remaining)
                .max(Duration::from_millis(1));
            if !self.connect_within(budget) {
                let elapsed = started.elapsed();
                debug!(port = self.port, ?elapsed, "port released");
                return WaitOutcome::Freed { elapsed };
            }
            let left = timeout.saturating_sub(started.elapsed());
            if left.is_zero() {
                let elapsed = started.elapsed();
                debug!(port = self.port, ?elapsed, "port still occupied at deadline");
                return WaitOutcome::TimedOut { elapsed };
            }
            thread::sleep(poll_interval.min(left));
        }
    }

    fn connect_within(&self, budget: Duration) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        match TcpStream::connect_timeout(&addr, budget) {
            Ok(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
                true
            }
            Err(_) => false,
        }
    }
}
