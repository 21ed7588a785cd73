//! Domain types for repository-configuration reconciliation.
//!
//! Desired state comes from manifests (`CommunityManifest`, `SigManifest`);
//! actual state comes from the hosting provider (`ProviderRepository`,
//! `BranchState`). All manifest types decode strictly: unknown fields are
//! rejected so typos surface before anything is applied.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tracked files
// ---------------------------------------------------------------------------

/// What a tracked manifest file declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    /// A community manifest listing desired repositories.
    #[default]
    Repos,
    /// A list of sigs and the repositories each one owns.
    Sigs,
    /// The ownership file of a single sig. Only its hash is watched.
    Owners,
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestKind::Repos => write!(f, "repos"),
            ManifestKind::Sigs => write!(f, "sigs"),
            ManifestKind::Owners => write!(f, "owners"),
        }
    }
}

/// A manifest file watched for content changes.
///
/// Identity is `(owner, repo, path, ref)`; `hash` is the content digest of
/// the last revision that was fully walked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackedFile {
    pub owner: String,
    pub repo: String,
    pub path: String,
    #[serde(rename = "ref", default, skip_serializing_if = "String::is_empty")]
    pub git_ref: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    #[serde(default)]
    pub kind: ManifestKind,
    /// Owning sig, required for [`ManifestKind::Owners`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

impl TrackedFile {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        path: impl Into<String>,
        git_ref: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            path: path.into(),
            git_ref: git_ref.into(),
            hash: String::new(),
            kind: ManifestKind::Repos,
            sig: None,
        }
    }

    pub fn with_kind(mut self, kind: ManifestKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_sig(mut self, sig: impl Into<String>) -> Self {
        self.sig = Some(sig.into());
        self
    }

    /// Same `(owner, repo, path, ref)`; hash and kind are ignored.
    pub fn same_identity(&self, other: &TrackedFile) -> bool {
        self.owner == other.owner
            && self.repo == other.repo
            && self.path == other.path
            && self.git_ref == other.git_ref
    }

    /// The ref to read, falling back to `default_ref` when unset.
    pub fn effective_ref<'a>(&'a self, default_ref: &'a str) -> &'a str {
        if self.git_ref.is_empty() {
            default_ref
        } else {
            &self.git_ref
        }
    }
}

impl fmt::Display for TrackedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.repo, self.path)?;
        if !self.git_ref.is_empty() {
            write!(f, "@{}", self.git_ref)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Desired state
// ---------------------------------------------------------------------------

/// Repository visibility as declared in a manifest (`type:`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn is_private(self) -> bool {
        matches!(self, Visibility::Private)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

/// Desired state of one repository, decoded from a manifest revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub visibility: Visibility,
    /// Only an explicit `true` makes a repository commentable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentable: Option<bool>,
    #[serde(default)]
    pub protected_branches: Vec<String>,
    #[serde(rename = "autoInit", default)]
    pub auto_init: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_from: Option<String>,
    #[serde(default)]
    pub managers: Vec<String>,
    #[serde(default)]
    pub developers: Vec<String>,
    #[serde(default)]
    pub viewers: Vec<String>,
    #[serde(default)]
    pub reporters: Vec<String>,
}

impl RepositorySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            visibility: Visibility::Public,
            commentable: None,
            protected_branches: vec![],
            auto_init: false,
            rename_from: None,
            managers: vec![],
            developers: vec![],
            viewers: vec![],
            reporters: vec![],
        }
    }

    pub fn is_commentable(&self) -> bool {
        self.commentable == Some(true)
    }

    /// `rename_from`, if set and non-empty.
    pub fn rename_source(&self) -> Option<&str> {
        self.rename_from.as_deref().filter(|name| !name.is_empty())
    }
}

/// A community manifest: the repositories a community wants to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommunityManifest {
    pub community: String,
    #[serde(default)]
    pub repositories: Vec<RepositorySpec>,
}

/// A sig and the repositories it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigRecord {
    pub name: String,
    #[serde(default)]
    pub repositories: Vec<String>,
}

/// Root of a sigs manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SigManifest {
    #[serde(default)]
    pub sigs: Vec<SigRecord>,
}

// ---------------------------------------------------------------------------
// Actual state (provider snapshots, never cached)
// ---------------------------------------------------------------------------

/// A repository as the hosting provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRepository {
    pub name: String,
    /// Owner path (organisation or user) the repository lives under.
    pub namespace: String,
    pub private: bool,
    pub can_comment: bool,
    pub default_branch: String,
}

/// A live branch and its protection flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchState {
    pub name: String,
    pub protected: bool,
}

/// Parameters of a repository creation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub auto_init: bool,
}

impl From<&RepositorySpec> for NewRepository {
    fn from(spec: &RepositorySpec) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            private: spec.visibility.is_private(),
            auto_init: spec.auto_init,
        }
    }
}

/// The two settings reconciled by a single update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySettings {
    pub private: bool,
    pub can_comment: bool,
}

// ---------------------------------------------------------------------------
// Inbound push events
// ---------------------------------------------------------------------------

/// Repository identity carried by a push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PushRepository {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

/// One commit of a push; only the touched paths matter here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PushCommit {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

/// The subset of a push webhook payload used for change detection.
///
/// Unknown payload fields are ignored; webhook bodies carry far more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PushEvent {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub repository: PushRepository,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
