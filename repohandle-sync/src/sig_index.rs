//! In-memory index from repository name to owning sig.
//!
//! `rebuild` replaces the whole map (cold load); `diff` patches it in place
//! and reports what moved (incremental update). Each repository maps to at
//! most one sig; when a sigs list names a repository twice, the later sig
//! wins.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use repohandle_core::SigRecord;

#[derive(Debug, Default)]
pub struct SigIndex {
    map: Mutex<HashMap<String, String>>,
}

impl SigIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole index with the ownership declared in `sigs`.
    pub fn rebuild(&self, sigs: &[SigRecord]) {
        let mut fresh = HashMap::new();
        for sig in sigs {
            for repo in &sig.repositories {
                fresh.insert(repo.clone(), sig.name.clone());
            }
        }
        *self.guard() = fresh;
    }

    /// Repositories in `sigs` that are new to the index or changed owning
    /// sig, in first-seen order. The index is updated as it goes.
    ///
    /// Repositories absent from `sigs` keep their previous owner.
    pub fn diff(&self, sigs: &[SigRecord]) -> Vec<String> {
        let mut map = self.guard();
        let changed = moved_repositories(&map, sigs);
        for sig in sigs {
            for repo in &sig.repositories {
                map.insert(repo.clone(), sig.name.clone());
            }
        }
        changed
    }

    /// What [`diff`](Self::diff) would report, leaving the index untouched.
    pub fn preview_diff(&self, sigs: &[SigRecord]) -> Vec<String> {
        moved_repositories(&self.guard(), sigs)
    }

    /// All repositories currently attributed to `sig`, sorted.
    pub fn owner_changed(&self, sig: &str) -> Vec<String> {
        if sig.is_empty() {
            return Vec::new();
        }
        self.guard()
            .iter()
            .filter(|(_, owner)| owner.as_str() == sig)
            .map(|(repo, _)| repo.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Owning sig of `repo`, if known.
    pub fn sig_of(&self, repo: &str) -> Option<String> {
        self.guard().get(repo).cloned()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // Every mutation is a single insert or a whole-map swap, so a
        // poisoned map is still consistent.
        self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn moved_repositories(map: &HashMap<String, String>, sigs: &[SigRecord]) -> Vec<String> {
    // Owners assigned earlier in the same list shadow the index.
    let mut pending: HashMap<&str, &str> = HashMap::new();
    let mut changed = Vec::new();
    for sig in sigs {
        for repo in &sig.repositories {
            let owner = pending
                .get(repo.as_str())
                .copied()
                .or_else(|| map.get(repo).map(String::as_str));
            if owner != Some(sig.name.as_str()) {
                pending.insert(repo.as_str(), sig.name.as_str());
                if !changed.contains(repo) {
                    changed.push(repo.clone());
                }
            }
        }
    }
    changed
}
