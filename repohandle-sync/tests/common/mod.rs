//! In-memory provider that records every call.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use repohandle_core::{BranchState, NewRepository, ProviderRepository, RepositorySettings};
use repohandle_sync::{ProviderClient, ProviderError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Find(String),
    Create(String),
    Rename(String, String),
    ListBranches(String),
    Protect(String, String),
    Unprotect(String, String),
    UpdateSettings(String, RepositorySettings),
    CreateBranch(String, String),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Call::Find(_) | Call::ListBranches(_))
    }
}

#[derive(Debug, Clone)]
struct FakeRepo {
    repo: ProviderRepository,
    branches: Vec<BranchState>,
}

#[derive(Default)]
struct State {
    repos: BTreeMap<String, FakeRepo>,
    calls: Vec<Call>,
    failures: HashSet<String>,
}

/// Keys repositories by name; the owner must match the repo's namespace.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<State>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(
        self,
        owner: &str,
        name: &str,
        private: bool,
        can_comment: bool,
        branches: &[(&str, bool)],
    ) -> Self {
        self.state.lock().unwrap().repos.insert(
            name.to_string(),
            FakeRepo {
                repo: ProviderRepository {
                    name: name.to_string(),
                    namespace: owner.to_string(),
                    private,
                    can_comment,
                    default_branch: "master".to_string(),
                },
                branches: branches
                    .iter()
                    .map(|(b, p)| BranchState {
                        name: b.to_string(),
                        protected: *p,
                    })
                    .collect(),
            },
        );
        self
    }

    /// Make a call fail, keyed `"<kind>:<target>"`, e.g. `"protect:release"`.
    pub fn fail_on(self, key: &str) -> Self {
        self.state.lock().unwrap().failures.insert(key.to_string());
        self
    }

    /// Start failing `key` on an already shared provider.
    pub fn fail(&self, key: &str) {
        self.state.lock().unwrap().failures.insert(key.to_string());
    }

    pub fn heal(&self, key: &str) {
        self.state.lock().unwrap().failures.remove(key);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn protected_branches(&self, name: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<String> = state.repos[name]
            .branches
            .iter()
            .filter(|b| b.protected)
            .map(|b| b.name.clone())
            .collect();
        out.sort();
        out
    }

    pub fn repository(&self, name: &str) -> Option<ProviderRepository> {
        self.state
            .lock()
            .unwrap()
            .repos
            .get(name)
            .map(|r| r.repo.clone())
    }

    fn record(&self, call: Call, key: String) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failures.contains(&key) {
            return Err(ProviderError::Rejected {
                status: 403,
                message: format!("injected failure for {key}"),
            });
        }
        Ok(())
    }

    fn with_branches<T>(
        &self,
        repo: &str,
        f: impl FnOnce(&mut Vec<BranchState>) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut state = self.state.lock().unwrap();
        match state.repos.get_mut(repo) {
            Some(r) => f(&mut r.branches),
            None => Err(ProviderError::NotFound(repo.to_string())),
        }
    }
}

impl ProviderClient for FakeProvider {
    fn find_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<ProviderRepository>, ProviderError> {
        self.record(Call::Find(name.to_string()), format!("find:{name}"))?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .repos
            .get(name)
            .filter(|r| r.repo.namespace == owner)
            .map(|r| r.repo.clone()))
    }

    fn create_repository(
        &self,
        owner: &str,
        repo: &NewRepository,
    ) -> Result<ProviderRepository, ProviderError> {
        self.record(Call::Create(repo.name.clone()), format!("create:{}", repo.name))?;
        let created = ProviderRepository {
            name: repo.name.clone(),
            namespace: owner.to_string(),
            private: repo.private,
            can_comment: false,
            default_branch: "master".to_string(),
        };
        let branches = if repo.auto_init {
            vec![BranchState {
                name: "master".to_string(),
                protected: false,
            }]
        } else {
            vec![]
        };
        self.state.lock().unwrap().repos.insert(
            repo.name.clone(),
            FakeRepo {
                repo: created.clone(),
                branches,
            },
        );
        Ok(created)
    }

    fn rename_repository(&self, _owner: &str, from: &str, to: &str) -> Result<(), ProviderError> {
        self.record(
            Call::Rename(from.to_string(), to.to_string()),
            format!("rename:{from}"),
        )?;
        let mut state = self.state.lock().unwrap();
        let mut moved = state
            .repos
            .remove(from)
            .ok_or_else(|| ProviderError::NotFound(from.to_string()))?;
        moved.repo.name = to.to_string();
        state.repos.insert(to.to_string(), moved);
        Ok(())
    }

    fn list_branches(&self, _owner: &str, repo: &str) -> Result<Vec<BranchState>, ProviderError> {
        self.record(Call::ListBranches(repo.to_string()), format!("list_branches:{repo}"))?;
        self.with_branches(repo, |branches| Ok(branches.clone()))
    }

    fn protect_branch(&self, _owner: &str, repo: &str, branch: &str) -> Result<(), ProviderError> {
        self.record(
            Call::Protect(repo.to_string(), branch.to_string()),
            format!("protect:{branch}"),
        )?;
        self.with_branches(repo, |branches| set_protected(branches, branch, true))
    }

    fn unprotect_branch(
        &self,
        _owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<(), ProviderError> {
        self.record(
            Call::Unprotect(repo.to_string(), branch.to_string()),
            format!("unprotect:{branch}"),
        )?;
        self.with_branches(repo, |branches| set_protected(branches, branch, false))
    }

    fn update_settings(
        &self,
        _owner: &str,
        repo: &str,
        settings: &RepositorySettings,
    ) -> Result<(), ProviderError> {
        self.record(
            Call::UpdateSettings(repo.to_string(), *settings),
            format!("update_settings:{repo}"),
        )?;
        let mut state = self.state.lock().unwrap();
        let entry = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| ProviderError::NotFound(repo.to_string()))?;
        entry.repo.private = settings.private;
        entry.repo.can_comment = settings.can_comment;
        Ok(())
    }

    fn create_branch(
        &self,
        _owner: &str,
        repo: &str,
        _from_ref: &str,
        branch: &str,
    ) -> Result<(), ProviderError> {
        self.record(
            Call::CreateBranch(repo.to_string(), branch.to_string()),
            format!("create_branch:{branch}"),
        )?;
        self.with_branches(repo, |branches| {
            branches.push(BranchState {
                name: branch.to_string(),
                protected: false,
            });
            Ok(())
        })
    }
}

fn set_protected(
    branches: &mut [BranchState],
    branch: &str,
    protected: bool,
) -> Result<(), ProviderError> {
    match branches.iter_mut().find(|b| b.name == branch) {
        Some(b) => {
            b.protected = protected;
            Ok(())
        }
        None => Err(ProviderError::NotFound(branch.to_string())),
    }
}
