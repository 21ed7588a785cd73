//! # repohandle-gitee
//!
//! Gitee v5 REST implementation of the provider and manifest-source
//! collaborators used by `repohandle-sync`.

pub mod client;
pub mod error;
mod wire;

pub use client::GiteeClient;
pub use error::GiteeError;
