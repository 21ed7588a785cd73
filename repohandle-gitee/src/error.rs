//! Error types for repohandle-gitee.

use thiserror::Error;

/// Failure to construct a client. Call failures are
/// [`repohandle_sync::ProviderError`]s.
#[derive(Debug, Error)]
pub enum GiteeError {
    #[error("access token variable {0} is not set")]
    MissingToken(String),

    #[error("invalid provider base URL: {0:?}")]
    InvalidBaseUrl(String),
}
