//! repohandle: converge hosted repositories to their community manifests.
//!
//! # Usage
//!
//! ```text
//! repohandle [--config PATH] daemon start|stop|status
//! repohandle push <event.json>
//! repohandle sync [--dry-run] [--local DIR | --daemon]
//! repohandle check <manifest> [--kind repos|sigs]
//! repohandle status [--json]
//! ```

mod commands;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs, daemon::DaemonCommand, push::PushArgs, status::StatusArgs, sync::SyncArgs,
};
use repohandle_core::ManifestKind;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "repohandle",
    version,
    about = "Reconcile hosted repositories against community manifests",
    long_about = None,
)]
struct Cli {
    /// Config file (default: ~/.repohandle/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or query the background reconciliation daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Forward a push webhook payload to the running daemon.
    Push(PushArgs),

    /// Run one full, hash-gated reconciliation pass in-process.
    Sync(SyncArgs),

    /// Decode and validate a manifest file.
    Check(CheckArgs),

    /// Show tracked manifest files and their cached hashes.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Manifest kind argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse the decodable manifest kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestKindArg(pub ManifestKind);

impl FromStr for ManifestKindArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "repos" => Ok(Self(ManifestKind::Repos)),
            "sigs" => Ok(Self(ManifestKind::Sigs)),
            other => Err(format!("unknown manifest kind '{other}'; expected: repos, sigs")),
        }
    }
}

impl fmt::Display for ManifestKindArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command, config),
        Commands::Push(args) => args.run(),
        Commands::Sync(args) => args.run(config),
        Commands::Check(args) => args.run(),
        Commands::Status(args) => args.run(config),
    }
}
