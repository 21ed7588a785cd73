//! Reconciliation engine: converge one repository to its manifest entry.
//!
//! ## Step sequence
//!
//! 1. Look the repository up by its desired name.
//! 2. Missing + `rename_from` set → rename the source and stop for this pass.
//! 3. Missing otherwise → create it, then create each declared protected
//!    branch from the default branch (per-branch failures are logged).
//! 4. Two-sided branch protection diff against the live branch list.
//! 5. One combined settings update if visibility or comment policy differ.
//!
//! Every step is idempotent: a second run against unchanged provider state
//! issues no mutating calls. Errors from steps 1–3, the branch listing and
//! the settings update abort this repository only; individual
//! protect/unprotect/create-branch failures are logged and recorded.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use repohandle_core::{
    NewRepository, ProviderRepository, RepositorySettings, RepositorySpec,
};

use crate::error::{ProviderError, SyncError};
use crate::provider::ProviderClient;

// ---------------------------------------------------------------------------
// Operations and outcomes
// ---------------------------------------------------------------------------

/// A mutating provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Rename { from: String, to: String },
    Create { name: String, private: bool },
    CreateBranch { branch: String, from: String },
    Protect { branch: String },
    Unprotect { branch: String },
    UpdateSettings { private: bool, can_comment: bool },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Rename { from, to } => write!(f, "rename {from} -> {to}"),
            Operation::Create { name, private } => {
                let visibility = if *private { "private" } else { "public" };
                write!(f, "create {visibility} repository {name}")
            }
            Operation::CreateBranch { branch, from } => {
                write!(f, "create branch {branch} from {from}")
            }
            Operation::Protect { branch } => write!(f, "protect branch {branch}"),
            Operation::Unprotect { branch } => write!(f, "unprotect branch {branch}"),
            Operation::UpdateSettings {
                private,
                can_comment,
            } => write!(f, "update settings private={private} can_comment={can_comment}"),
        }
    }
}

/// What happened to one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OpOutcome {
    /// The provider accepted the call.
    Applied { operation: Operation },
    /// Dry-run: the call would have been made.
    WouldApply { operation: Operation },
    /// The provider rejected the call; the pass carried on.
    Failed { operation: Operation, error: String },
}

impl OpOutcome {
    pub fn operation(&self) -> &Operation {
        match self {
            OpOutcome::Applied { operation }
            | OpOutcome::WouldApply { operation }
            | OpOutcome::Failed { operation, .. } => operation,
        }
    }
}

/// Operations issued while reconciling one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOutcome {
    pub repository: String,
    pub outcomes: Vec<OpOutcome>,
}

impl RepoOutcome {
    fn new(repository: &str) -> Self {
        Self {
            repository: repository.to_string(),
            outcomes: Vec::new(),
        }
    }

    /// No mutating call was needed.
    pub fn is_noop(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, OpOutcome::Applied { .. } | OpOutcome::WouldApply { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, OpOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&OpOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Applies manifest entries against a provider.
pub struct Engine<'a> {
    provider: &'a dyn ProviderClient,
    dry_run: bool,
}

impl<'a> Engine<'a> {
    pub fn new(provider: &'a dyn ProviderClient, dry_run: bool) -> Self {
        Self { provider, dry_run }
    }

    /// Converge the repository described by `spec` under `community`.
    pub fn reconcile(
        &self,
        community: &str,
        spec: &RepositorySpec,
    ) -> Result<RepoOutcome, SyncError> {
        let mut outcome = RepoOutcome::new(&spec.name);

        let repo = match self.provider.find_repository(community, &spec.name)? {
            Some(repo) => repo,
            None => {
                if let Some(source) = spec.rename_source() {
                    self.rename(community, source, spec, &mut outcome)?;
                    return Ok(outcome);
                }
                match self.create(community, spec, &mut outcome)? {
                    Some(repo) => repo,
                    // Dry-run: nothing exists to diff against yet.
                    None => return Ok(outcome),
                }
            }
        };

        self.reconcile_branches(community, spec, &mut outcome)?;
        self.reconcile_settings(&repo, spec, &mut outcome)?;
        Ok(outcome)
    }

    fn rename(
        &self,
        community: &str,
        source: &str,
        spec: &RepositorySpec,
        outcome: &mut RepoOutcome,
    ) -> Result<(), SyncError> {
        let Some(existing) = self.provider.find_repository(community, source)? else {
            return Err(SyncError::RenameSourceMissing {
                community: community.to_string(),
                name: source.to_string(),
            });
        };
        let op = Operation::Rename {
            from: existing.name.clone(),
            to: spec.name.clone(),
        };
        self.apply(community, outcome, op, || {
            self.provider
                .rename_repository(community, &existing.name, &spec.name)
        })?;
        Ok(())
    }

    /// Create the repository and its declared branches. `None` in dry-run.
    fn create(
        &self,
        community: &str,
        spec: &RepositorySpec,
        outcome: &mut RepoOutcome,
    ) -> Result<Option<ProviderRepository>, SyncError> {
        let request = NewRepository::from(spec);
        let op = Operation::Create {
            name: request.name.clone(),
            private: request.private,
        };
        let Some(repo) = self.apply(community, outcome, op, || {
            self.provider.create_repository(community, &request)
        })?
        else {
            return Ok(None);
        };

        let mut seen = BTreeSet::new();
        for branch in &spec.protected_branches {
            if branch.is_empty() || *branch == repo.default_branch || !seen.insert(branch) {
                continue;
            }
            let op = Operation::CreateBranch {
                branch: branch.clone(),
                from: repo.default_branch.clone(),
            };
            if let Err(err) = self.apply(community, outcome, op, || {
                self.provider
                    .create_branch(community, &repo.name, &repo.default_branch, branch)
            }) {
                tracing::error!(
                    "{community}/{}: failed to create branch {branch}: {err}",
                    repo.name
                );
            }
        }
        Ok(Some(repo))
    }

    fn reconcile_branches(
        &self,
        community: &str,
        spec: &RepositorySpec,
        outcome: &mut RepoOutcome,
    ) -> Result<(), SyncError> {
        let mut branches = self.provider.list_branches(community, &spec.name)?;
        let desired: BTreeSet<&str> = spec
            .protected_branches
            .iter()
            .map(String::as_str)
            .filter(|b| !b.is_empty())
            .collect();

        for branch in branches
            .iter_mut()
            .filter(|b| b.protected && !desired.contains(b.name.as_str()))
        {
            let op = Operation::Unprotect {
                branch: branch.name.clone(),
            };
            match self.apply(community, outcome, op, || {
                self.provider
                    .unprotect_branch(community, &spec.name, &branch.name)
            }) {
                Ok(Some(())) => branch.protected = false,
                Ok(None) => {}
                Err(err) => tracing::error!(
                    "{community}/{}: failed to unprotect {}: {err}",
                    spec.name,
                    branch.name
                ),
            }
        }

        let current: HashMap<&str, bool> = branches
            .iter()
            .map(|b| (b.name.as_str(), b.protected))
            .collect();
        for name in desired {
            // Branches not yet created are picked up on a later pass.
            if current.get(name) != Some(&false) {
                continue;
            }
            let op = Operation::Protect {
                branch: name.to_string(),
            };
            if let Err(err) = self.apply(community, outcome, op, || {
                self.provider.protect_branch(community, &spec.name, name)
            }) {
                tracing::error!(
                    "{community}/{}: failed to protect {name}: {err}",
                    spec.name
                );
            }
        }
        Ok(())
    }

    fn reconcile_settings(
        &self,
        repo: &ProviderRepository,
        spec: &RepositorySpec,
        outcome: &mut RepoOutcome,
    ) -> Result<(), SyncError> {
        if repo.namespace.is_empty() {
            return Err(SyncError::MissingNamespace(spec.name.clone()));
        }
        let want_private = spec.visibility.is_private();
        let want_comment = spec.is_commentable();
        let type_change = repo.private != want_private;
        let comment_change = repo.can_comment != want_comment;
        if !type_change && !comment_change {
            return Ok(());
        }

        // The unchanged attribute is sent with its current value.
        let settings = RepositorySettings {
            private: if type_change { want_private } else { repo.private },
            can_comment: if comment_change {
                want_comment
            } else {
                repo.can_comment
            },
        };
        let op = Operation::UpdateSettings {
            private: settings.private,
            can_comment: settings.can_comment,
        };
        self.apply(&repo.namespace, outcome, op, || {
            self.provider
                .update_settings(&repo.namespace, &spec.name, &settings)
        })?;
        Ok(())
    }

    /// Record and (unless dry-run) perform one mutating call.
    ///
    /// `Ok(None)` means the call was skipped for dry-run.
    fn apply<T>(
        &self,
        owner: &str,
        outcome: &mut RepoOutcome,
        operation: Operation,
        call: impl FnOnce() -> Result<T, ProviderError>,
    ) -> Result<Option<T>, ProviderError> {
        if self.dry_run {
            tracing::info!("[dry-run] {owner}/{}: would {operation}", outcome.repository);
            outcome.outcomes.push(OpOutcome::WouldApply { operation });
            return Ok(None);
        }
        match call() {
            Ok(value) => {
                tracing::info!("{owner}/{}: {operation}", outcome.repository);
                outcome.outcomes.push(OpOutcome::Applied { operation });
                Ok(Some(value))
            }
            Err(err) => {
                outcome.outcomes.push(OpOutcome::Failed {
                    operation,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}
