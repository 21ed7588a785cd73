//! # repohandle-sync
//!
//! Hash-gated reconciliation of repository manifests against a hosting
//! provider.
//!
//! Build a [`Reconciler`] from a [`ProviderClient`], a [`ManifestSource`], a
//! [`ChangeCache`] and a [`SigIndex`], then call
//! [`Reconciler::handle_push`] for a push event or [`Reconciler::handle_all`]
//! for a full pass.

pub mod cache;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod reconcile;
pub mod sig_index;
pub mod trigger;

pub use cache::ChangeCache;
pub use error::{ProviderError, SyncError};
pub use pipeline::{FileOutcome, FileReport, PassOptions, PassReport, Reconciler, RepoFailure};
pub use provider::{DirManifestSource, ManifestContent, ManifestSource, ProviderClient};
pub use reconcile::{Engine, OpOutcome, Operation, RepoOutcome};
pub use sig_index::SigIndex;
pub use trigger::select_changed_files;
