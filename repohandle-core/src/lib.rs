//! repohandle core library: domain types, manifest decoding, configuration, errors.
//!
//! - [`types`]: tracked files, desired and actual repository state, push events
//! - [`manifest`]: strict community / sigs manifest decoding
//! - [`config`]: `config.yaml` load and validation
//! - [`error`]: [`ConfigError`], [`ManifestError`]

pub mod config;
pub mod error;
pub mod manifest;
pub mod types;

pub use config::{Config, ProviderConfig};
pub use error::{ConfigError, ManifestError};
pub use types::{
    BranchState, CommunityManifest, ManifestKind, NewRepository, ProviderRepository, PushCommit,
    PushEvent, PushRepository, RepositorySettings, RepositorySpec, SigManifest, SigRecord,
    TrackedFile, Visibility,
};
