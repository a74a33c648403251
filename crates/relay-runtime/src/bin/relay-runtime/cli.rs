//! CLI definitions for relay-runtime.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "relay-runtime",
    version,
    about = "Loopback bridge between an editor and an external coding tool",
    after_help = concat!(
        "Examples:\n",
        "  relay-runtime serve --root ./my-app      # sidecar for the editor plugin\n",
        "  relay-runtime poll                       # one /diff-events poll\n",
        "  relay-runtime shutdown                   # ask the running server to stop",
    )
)]
pub struct Cli {
    /// Show debug logging on stderr.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    /// Config file (defaults to ./relay.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge for one editor window (stdio host protocol).
    Serve(ServeArgs),
    /// Report whether a server listens on the port.
    Probe {
        /// Port override.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Poll /diff-events once.
    Poll {
        /// Port override.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ask the running server to shut down.
    Shutdown {
        /// Port override.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the running server's /status.
    Status {
        /// Port override.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Write the editor.json integration marker.
    Install {
        /// Folder override (defaults to the platform data folder).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Remove the editor.json integration marker.
    Uninstall {
        /// Folder override (defaults to the platform data folder).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Workspace root (overrides config).
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Window identity (defaults to the workspace root).
    #[arg(long)]
    pub window_id: Option<String>,
    /// Port override.
    #[arg(long)]
    pub port: Option<u16>,
    /// What to do when another window runs the server.
    #[arg(long, value_enum)]
    pub on_conflict: Option<ConflictArg>,
    /// Run without the stdio protocol; stops on Ctrl-D / end of input.
    #[arg(long)]
    pub headless: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictArg {
    Prompt,
    Switch,
    Stay,
}
