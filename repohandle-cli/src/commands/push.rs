//! `repohandle push <event.json>`: hand a push payload to the daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use repohandle_core::PushEvent;
use repohandle_daemon::{request_push, DaemonError};

use super::home_dir;

/// Arguments for `repohandle push`.
#[derive(Args, Debug)]
pub struct PushArgs {
    /// Push webhook payload (JSON). Only ref, repository and commits are read.
    pub event: PathBuf,
}

impl PushArgs {
    pub fn run(self) -> Result<()> {
        let raw = std::fs::read(&self.event)
            .with_context(|| format!("cannot read {}", self.event.display()))?;
        let event: PushEvent = serde_json::from_slice(&raw)
            .with_context(|| format!("{} is not a push event", self.event.display()))?;

        let home = home_dir()?;
        match request_push(&home, event) {
            Ok(_) => {
                println!("✓ push accepted by daemon");
                Ok(())
            }
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                Err(err).context("start it with `repohandle daemon start`")
            }
            Err(err) => Err(err).context("failed to forward push event"),
        }
    }
}
