//! Collaborator traits: the hosting provider and the manifest source.
//!
//! Implementations are injected at construction; the engine never knows
//! which transport sits behind them. All calls are blocking and may fail
//! with transient or permanent [`ProviderError`]s.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use repohandle_core::{
    BranchState, NewRepository, ProviderRepository, RepositorySettings, TrackedFile,
};

use crate::error::ProviderError;

/// Repository operations the reconciliation engine needs.
pub trait ProviderClient: Send + Sync {
    /// `Ok(None)` when no repository named `name` exists under `owner`.
    fn find_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<ProviderRepository>, ProviderError>;

    fn create_repository(
        &self,
        owner: &str,
        repo: &NewRepository,
    ) -> Result<ProviderRepository, ProviderError>;

    fn rename_repository(&self, owner: &str, from: &str, to: &str) -> Result<(), ProviderError>;

    fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<BranchState>, ProviderError>;

    fn protect_branch(&self, owner: &str, repo: &str, branch: &str) -> Result<(), ProviderError>;

    fn unprotect_branch(&self, owner: &str, repo: &str, branch: &str)
        -> Result<(), ProviderError>;

    fn update_settings(
        &self,
        owner: &str,
        repo: &str,
        settings: &RepositorySettings,
    ) -> Result<(), ProviderError>;

    fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        from_ref: &str,
        branch: &str,
    ) -> Result<(), ProviderError>;
}

/// A manifest revision plus the digest identifying its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestContent {
    pub sha: String,
    pub bytes: Vec<u8>,
}

impl ManifestContent {
    /// Nothing to process: no digest or no content.
    pub fn is_empty(&self) -> bool {
        self.sha.is_empty() || self.bytes.is_empty()
    }
}

/// Reads tracked manifest files at a ref.
pub trait ManifestSource: Send + Sync {
    fn fetch(&self, file: &TrackedFile, git_ref: &str) -> Result<ManifestContent, ProviderError>;
}

/// Manifest source backed by a local checkout tree.
///
/// Reads `<root>/<owner>/<repo>/<path>`; the ref is ignored. The content
/// digest is the SHA-256 of the raw bytes, hex encoded.
#[derive(Debug, Clone)]
pub struct DirManifestSource {
    root: PathBuf,
}

impl DirManifestSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, file: &TrackedFile) -> PathBuf {
        self.root.join(&file.owner).join(&file.repo).join(&file.path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ManifestSource for DirManifestSource {
    fn fetch(&self, file: &TrackedFile, _git_ref: &str) -> Result<ManifestContent, ProviderError> {
        let path = self.path_of(file);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::NotFound(path.display().to_string()));
            }
            Err(err) => {
                return Err(ProviderError::Transient(format!("{}: {err}", path.display())));
            }
        };
        Ok(ManifestContent {
            sha: content_digest(&bytes),
            bytes,
        })
    }
}

/// SHA-256 hex digest used as the content identity of local manifests.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn dir_source_reads_and_hashes() {
        let tmp = TempDir::new().unwrap();
        let source = DirManifestSource::new(tmp.path());
        let file = TrackedFile::new("openeuler", "community", "repository/a.yaml", "");
        let path = source.path_of(&file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "community: x\n").unwrap();

        let content = source.fetch(&file, "master").unwrap();
        assert_eq!(content.bytes, b"community: x\n");
        assert_eq!(content.sha.len(), 64);
        assert_eq!(content.sha, content_digest(b"community: x\n"));
        assert!(!content.is_empty());
    }

    #[test]
    fn dir_source_missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let source = DirManifestSource::new(tmp.path());
        let file = TrackedFile::new("o", "r", "nope.yaml", "");
        assert!(matches!(
            source.fetch(&file, "master"),
            Err(ProviderError::NotFound(_))
        ));
    }

    #[test]
    fn digest_changes_with_content() {
        assert_ne!(content_digest(b"a"), content_digest(b"b"));
        assert_eq!(content_digest(b"a"), content_digest(b"a"));
    }
}
