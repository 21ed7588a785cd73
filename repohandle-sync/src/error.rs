//! Error types for repohandle-sync.

use std::path::PathBuf;

use thiserror::Error;

use repohandle_core::{ConfigError, ManifestError};

/// Failure reported by a provider or manifest-source call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network failure, rate limiting, or a provider-side 5xx.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The provider refused the call (authorization, validation, conflict).
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The provider answered with a body that could not be interpreted.
    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether repeating the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// All errors that can arise from a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A manifest revision could not be decoded or is malformed.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A provider or manifest-source call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// `rename_from` names a repository that does not exist either.
    #[error("repository defined by rename_from does not exist: {community}/{name}")]
    RenameSourceMissing { community: String, name: String },

    /// The provider snapshot carries no owner namespace to update against.
    #[error("repository {0} information not obtained: empty namespace")]
    MissingNamespace(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (change cache).
    #[error("change cache JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// True when the cache file simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
