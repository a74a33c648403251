//! HTTP client for a bridge server on the loopback port.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::RelayError;
use crate::tracker::PollStatus;

fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

/// Ask the server on `port` to shut down. Returns its acknowledgement message.
pub fn send_shutdown(port: u16, timeout: Duration) -> Result<String, RelayError> {
    let url = format!("{}/shutdown", base_url(port));
    let response = agent(timeout)
        .post(&url)
        .set("Content-Type", "application/json")
        .send_string("{}")
        .map_err(control_error)?;
    let text = response
        .into_string()
        .map_err(|err| RelayError::Control(format!("read response: {err}").into()))?;
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(text);
    debug!(port, %message, "shutdown acknowledged");
    Ok(message)
}

/// Poll `GET /diff-events`. A 500 answer still carries a status body.
pub fn poll_diff_events(port: u16, timeout: Duration) -> Result<PollStatus, RelayError> {
    let url = format!("{}/diff-events", base_url(port));
    let text = match agent(timeout).get(&url).call() {
        Ok(response) => response.into_string(),
        Err(ureq::Error::Status(500, response)) => response.into_string(),
        Err(err) => return Err(control_error(err)),
    }
    .map_err(|err| RelayError::Control(format!("read response: {err}").into()))?;
    let body: Value = serde_json::from_str(&text)
        .map_err(|err| RelayError::Control(format!("invalid response: {err}").into()))?;
    body.get("status")
        .and_then(Value::as_str)
        .and_then(PollStatus::parse)
        .ok_or_else(|| RelayError::Control(format!("unexpected response: {text}").into()))
}

/// Fetch `GET /status` as raw JSON.
pub fn fetch_status(port: u16, timeout: Duration) -> Result<Value, RelayError> {
    let url = format!("{}/status", base_url(port));
    let text = agent(timeout)
        .get(&url)
        .call()
        .map_err(control_error)?
        .into_string()
        .map_err(|err| RelayError::Control(format!("read response: {err}").into()))?;
    serde_json::from_str(&text)
        .map_err(|err| RelayError::Control(format!("invalid response: {err}").into()))
}

fn control_error(err: ureq::Error) -> RelayError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            RelayError::Control(format!("http {code}: {body}").into())
        }
        ureq::Error::Transport(transport) => RelayError::Control(transport.to_string().into()),
    }
}
