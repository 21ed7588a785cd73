//! `repohandle daemon`: background reconciler lifecycle.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use repohandle_daemon::paths::socket_path;
use repohandle_daemon::{request_status, request_stop, start_blocking, DaemonError};

use super::{home_dir, load_config};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (socket server + push tasks).
    Start,
    /// Request graceful shutdown; in-flight passes finish first.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
}

pub fn run(command: DaemonCommand, config: Option<&Path>) -> Result<()> {
    let home = home_dir()?;

    match command {
        DaemonCommand::Start => {
            let config = load_config(&home, config)?;
            start_blocking(&home, config).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(reply) => {
                let pending = reply["in_flight"].as_u64().unwrap_or(0);
                if pending > 0 {
                    println!("daemon stop requested ({pending} pass(es) draining)");
                } else {
                    println!("daemon stop requested");
                }
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
    }

    Ok(())
}
