//! Error types for repohandle-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can arise while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// The file parsed but violates a config rule.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors that can arise while decoding a manifest revision.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The bytes are not valid YAML for the expected shape (includes unknown fields).
    #[error("manifest decode error: {0}")]
    Decode(#[from] serde_yaml::Error),

    /// The manifest decoded but misses a required field.
    #[error("malformed manifest: {0}")]
    Malformed(String),
}
