//! `relay-runtime serve`: one editor window's bridge.

use std::io::BufRead;
use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use relay_runtime::config::ConflictPolicy;
use relay_runtime::coordinator::CoordinatorOutcome;
use relay_runtime::host::{AcceptDefault, HeadlessHost, TakeoverPrompt};
use relay_runtime::status::LogSink;
use relay_runtime::stdio::{HostMessage, StdioHost};
use relay_runtime::{Bridge, RelayConfig};
use smol_str::SmolStr;
use tracing::{debug, info};

use crate::cli::{ConflictArg, ServeArgs};
use crate::prompt::TerminalPrompt;

pub fn run_serve(mut config: RelayConfig, args: ServeArgs) -> anyhow::Result<()> {
    apply_overrides(&mut config, &args);
    if args.headless {
        return run_headless(config);
    }

    let host = Arc::new(StdioHost::process(config.workspace.root.clone()));
    let mut bridge = Bridge::new(config, host.clone(), host.clone())
        .context("failed to initialise bridge")?;
    let outcome = if use_terminal_prompt() {
        bridge.activate(&TerminalPrompt)
    } else {
        bridge.activate(host.as_ref())
    };
    log_outcome(&outcome);

    while let Some(message) = host.next_message()? {
        match message {
            HostMessage::Editor(event) => bridge.handle_event(&event),
            HostMessage::Control(control) => {
                if let Some((id, decision)) = control.edit_decision() {
                    if !bridge.resolve_edit(id, decision) {
                        debug!(id, "edit decision for an unknown proposal");
                    }
                } else if !host.apply_control(control) {
                    debug!("deactivate requested by host");
                    break;
                }
            }
        }
    }
    bridge.deactivate();
    Ok(())
}

fn run_headless(config: RelayConfig) -> anyhow::Result<()> {
    let host = Arc::new(HeadlessHost::new(config.workspace.root.clone()));
    let mut bridge =
        Bridge::new(config, host, Arc::new(LogSink)).context("failed to initialise bridge")?;
    let prompt: &dyn TakeoverPrompt = if use_terminal_prompt() {
        &TerminalPrompt
    } else {
        &AcceptDefault
    };
    let outcome = bridge.activate(prompt);
    log_outcome(&outcome);
    if matches!(outcome, CoordinatorOutcome::Active) {
        info!("serving until end of input");
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if line.is_err() {
                break;
            }
        }
    }
    bridge.deactivate();
    if let CoordinatorOutcome::Failed(err) = outcome {
        return Err(err.into());
    }
    Ok(())
}

fn apply_overrides(config: &mut RelayConfig, args: &ServeArgs) {
    if let Some(root) = args.root.as_ref() {
        config.workspace.root = Some(root.clone());
    }
    if let Some(window_id) = args.window_id.as_ref() {
        config.workspace.window_id = Some(SmolStr::new(window_id));
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(policy) = args.on_conflict {
        config.handoff.on_conflict = match policy {
            ConflictArg::Prompt => ConflictPolicy::Prompt,
            ConflictArg::Switch => ConflictPolicy::Switch,
            ConflictArg::Stay => ConflictPolicy::Stay,
        };
    }
}

fn use_terminal_prompt() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

fn log_outcome(outcome: &CoordinatorOutcome) {
    match outcome {
        CoordinatorOutcome::Active => info!("bridge active"),
        CoordinatorOutcome::Inactive => info!("bridge inactive; another window owns the server"),
        CoordinatorOutcome::Failed(err) => info!("bridge failed to start: {err}"),
    }
}
