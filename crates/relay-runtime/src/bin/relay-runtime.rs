//! CLI entrypoint for the relay bridge sidecar.

#[path = "relay-runtime/cli.rs"]
mod cli;
#[path = "relay-runtime/ctl.rs"]
mod ctl;
#[path = "relay-runtime/install.rs"]
mod install;
#[path = "relay-runtime/prompt.rs"]
mod prompt;
#[path = "relay-runtime/serve.rs"]
mod serve;
#[path = "relay-runtime/style.rs"]
mod style;

use std::path::Path;

use clap::Parser;
use relay_runtime::RelayConfig;

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    if let Err(err) = run() {
        eprintln!("{}", style::error(format!("Error: {err:#}")));
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::load_or_default(Path::new("."))?,
    };
    init_logging(&config, cli.verbose);

    match cli.command {
        Command::Serve(args) => serve::run_serve(config, args),
        Command::Probe { port } => ctl::run_probe(&config, port),
        Command::Poll { port } => ctl::run_poll(&config, port),
        Command::Shutdown { port } => ctl::run_shutdown(&config, port),
        Command::Status { port } => ctl::run_status(&config, port),
        Command::Install { dir } => install::run_install(dir),
        Command::Uninstall { dir } => install::run_uninstall(dir),
    }
}

fn init_logging(config: &RelayConfig, verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config
            .log_level
            .parse::<tracing::Level>()
            .unwrap_or(tracing::Level::INFO)
    };
    // stdout carries the host protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
