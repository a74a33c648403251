//! Control commands against a running server.

use std::time::Duration;

use relay_runtime::client;
use relay_runtime::probe::PortProbe;
use relay_runtime::tracker::PollStatus;
use relay_runtime::RelayConfig;

use crate::style;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(2);

fn resolve_port(config: &RelayConfig, port: Option<u16>) -> u16 {
    port.unwrap_or(config.server.port)
}

pub fn run_probe(config: &RelayConfig, port: Option<u16>) -> anyhow::Result<()> {
    let port = resolve_port(config, port);
    let probe = PortProbe::new(port, config.handoff.probe_timeout);
    if probe.is_occupied() {
        println!("{}", style::success(format!("port {port}: server running")));
    } else {
        println!("{}", style::warning(format!("port {port}: free")));
    }
    Ok(())
}

pub fn run_poll(config: &RelayConfig, port: Option<u16>) -> anyhow::Result<()> {
    let port = resolve_port(config, port);
    let status = client::poll_diff_events(port, CONTROL_TIMEOUT)?;
    match status {
        PollStatus::Modified => println!("{}", style::success(status.as_str())),
        PollStatus::Same => println!("{}", status.as_str()),
    }
    Ok(())
}

pub fn run_shutdown(config: &RelayConfig, port: Option<u16>) -> anyhow::Result<()> {
    let port = resolve_port(config, port);
    let message = client::send_shutdown(port, CONTROL_TIMEOUT)?;
    println!("{}", style::success(message));
    let probe = PortProbe::new(port, config.handoff.probe_timeout);
    let outcome = probe.wait_until_free(config.handoff.poll_interval, config.handoff.free_timeout);
    if !outcome.is_freed() {
        println!("{}", style::warning(format!("port {port} still in use")));
    }
    Ok(())
}

pub fn run_status(config: &RelayConfig, port: Option<u16>) -> anyhow::Result<()> {
    let port = resolve_port(config, port);
    let status = client::fetch_status(port, CONTROL_TIMEOUT)?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
