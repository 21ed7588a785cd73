pub mod check;
pub mod daemon;
pub mod push;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use repohandle_core::{config, Config};

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Load `--config` when given, else `<home>/.repohandle/config.yaml`.
pub fn load_config(home: &Path, explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => config::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => config::load_at(home).with_context(|| {
            format!(
                "failed to load config; create {} or pass --config",
                config::config_path_at(home).display()
            )
        }),
    }
}
