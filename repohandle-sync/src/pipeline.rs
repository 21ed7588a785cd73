//! Pass driver shared by the CLI and the daemon.
//!
//! ## One pass
//!
//! 1. Merge configured tracked files with cached hashes.
//! 2. Select the files to process (push-triggered subset, or all).
//! 3. Per file, sequentially: fetch, skip if the digest is unchanged, then
//!    decode and apply (repos), or re-evaluate the repositories whose owning
//!    sig moved (sigs / owners).
//! 4. Advance the file's hash, and for sigs files commit the index change,
//!    once its revision is done or `advance_hash_on_failure` allows it.
//! 5. Record advanced hashes in the change cache.
//!
//! Dry-run passes leave the cache and the sig index untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repohandle_core::{manifest, ManifestKind, PushEvent, SigRecord, TrackedFile};

use crate::cache::{merge_cached_hashes, ChangeCache};
use crate::error::SyncError;
use crate::provider::{ManifestSource, ProviderClient};
use crate::reconcile::{Engine, RepoOutcome};
use crate::sig_index::SigIndex;
use crate::trigger::select_changed_files;

/// Knobs for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOptions {
    pub default_ref: String,
    /// Advance a manifest's hash even if some of its repositories failed.
    pub advance_hash_on_failure: bool,
    pub dry_run: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            default_ref: repohandle_core::config::DEFAULT_REF.to_string(),
            advance_hash_on_failure: true,
            dry_run: false,
        }
    }
}

impl PassOptions {
    pub fn from_config(config: &repohandle_core::Config, dry_run: bool) -> Self {
        Self {
            default_ref: config.default_ref.clone(),
            advance_hash_on_failure: config.advance_hash_on_failure,
            dry_run,
        }
    }
}

/// What a pass did with one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Content digest matches the cache; nothing decoded or applied.
    Unchanged,
    /// A repos manifest was walked.
    Reconciled {
        repositories: Vec<RepoOutcome>,
        failed: Vec<RepoFailure>,
    },
    /// A sigs or owners file moved ownership of these repositories.
    OwnershipChanged { repositories: Vec<String> },
    /// The file could not be fetched or decoded; its hash was not advanced.
    Failed { error: String },
}

/// A repository entry whose reconciliation aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFailure {
    pub repository: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub file: String,
    pub kind: ManifestKind,
    pub outcome: FileOutcome,
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub files: Vec<FileReport>,
    /// Repositories re-reconciled because their owning sig moved.
    pub reevaluated: Vec<RepoOutcome>,
    pub reevaluation_failures: Vec<RepoFailure>,
}

impl PassReport {
    fn new(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            dry_run,
            files: Vec::new(),
            reevaluated: Vec::new(),
            reevaluation_failures: Vec::new(),
        }
    }

    /// Mutating operations applied (or planned, in dry-run).
    pub fn applied(&self) -> usize {
        self.repo_outcomes().map(RepoOutcome::applied).sum()
    }

    /// Repository entries or operations that failed.
    pub fn failed(&self) -> usize {
        let ops: usize = self.repo_outcomes().map(RepoOutcome::failed).sum();
        let entries: usize = self
            .files
            .iter()
            .map(|f| match &f.outcome {
                FileOutcome::Reconciled { failed, .. } => failed.len(),
                FileOutcome::Failed { .. } => 1,
                _ => 0,
            })
            .sum();
        ops + entries + self.reevaluation_failures.len()
    }

    fn repo_outcomes(&self) -> impl Iterator<Item = &RepoOutcome> {
        self.files
            .iter()
            .filter_map(|f| match &f.outcome {
                FileOutcome::Reconciled { repositories, .. } => Some(repositories.iter()),
                _ => None,
            })
            .flatten()
            .chain(self.reevaluated.iter())
    }
}

/// Wires the collaborators of a pass together.
pub struct Reconciler<'a> {
    provider: &'a dyn ProviderClient,
    source: &'a dyn ManifestSource,
    cache: &'a ChangeCache,
    sigs: &'a SigIndex,
    options: PassOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        provider: &'a dyn ProviderClient,
        source: &'a dyn ManifestSource,
        cache: &'a ChangeCache,
        sigs: &'a SigIndex,
        options: PassOptions,
    ) -> Self {
        Self {
            provider,
            source,
            cache,
            sigs,
            options,
        }
    }

    /// Configured files enriched with cached hashes.
    ///
    /// An absent or unreadable cache means nothing was reconciled yet.
    pub fn tracked_files(&self, configured: &[TrackedFile]) -> Vec<TrackedFile> {
        match self.cache.load() {
            Ok(cached) => merge_cached_hashes(configured, &cached),
            Err(err) => {
                if err.is_not_found() {
                    tracing::debug!("no change cache yet at {}", self.cache.path().display());
                } else {
                    tracing::warn!("ignoring change cache: {err}");
                }
                configured.to_vec()
            }
        }
    }

    /// Rebuild the sig index from every tracked sigs manifest, ignoring hashes.
    pub fn warm_sig_index(&self, configured: &[TrackedFile]) -> Result<usize, SyncError> {
        let mut records = Vec::new();
        for file in configured.iter().filter(|f| f.kind == ManifestKind::Sigs) {
            let content = self
                .source
                .fetch(file, file.effective_ref(&self.options.default_ref))?;
            if content.is_empty() {
                continue;
            }
            records.extend(manifest::decode_sigs(&content.bytes)?.sigs);
        }
        self.sigs.rebuild(&records);
        tracing::info!("sig index warmed with {} repositories", self.sigs.len());
        Ok(self.sigs.len())
    }

    /// Process the tracked files touched by `event`.
    pub fn handle_push(
        &self,
        event: &PushEvent,
        configured: &[TrackedFile],
    ) -> Result<PassReport, SyncError> {
        let mut files = self.tracked_files(configured);
        let (indices, found) = select_changed_files(event, &files, &self.options.default_ref);
        if !found {
            return Ok(PassReport::new(self.options.dry_run));
        }
        self.run_pass(&mut files, &indices, configured)
    }

    /// Process every tracked file (hash-gated).
    pub fn handle_all(&self, configured: &[TrackedFile]) -> Result<PassReport, SyncError> {
        let mut files = self.tracked_files(configured);
        let indices: Vec<usize> = (0..files.len()).collect();
        self.run_pass(&mut files, &indices, configured)
    }

    fn run_pass(
        &self,
        files: &mut [TrackedFile],
        indices: &[usize],
        configured: &[TrackedFile],
    ) -> Result<PassReport, SyncError> {
        let mut report = PassReport::new(self.options.dry_run);
        let mut advanced = Vec::new();

        for &idx in indices {
            let file = &mut files[idx];
            let before = file.hash.clone();
            let outcome = match self.process_file(file, configured, &mut report) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!("{file}: {err}");
                    FileOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            if file.hash != before {
                advanced.push(file.clone());
            }
            report.files.push(FileReport {
                file: file.to_string(),
                kind: file.kind,
                outcome,
            });
        }

        if !self.options.dry_run && !advanced.is_empty() {
            self.cache.record(&advanced)?;
        }
        Ok(report)
    }

    /// Handle one file; advances `file.hash` when its revision is done.
    fn process_file(
        &self,
        file: &mut TrackedFile,
        configured: &[TrackedFile],
        report: &mut PassReport,
    ) -> Result<FileOutcome, SyncError> {
        let git_ref = file.effective_ref(&self.options.default_ref).to_string();
        let content = self.source.fetch(file, &git_ref)?;
        if content.is_empty() || content.sha == file.hash {
            tracing::info!("{file} configuration does not need to be processed");
            return Ok(FileOutcome::Unchanged);
        }

        let mut index_update = None;
        let (outcome, complete) = match file.kind {
            ManifestKind::Repos => {
                let community = manifest::decode_community(&content.bytes)?;
                let engine = Engine::new(self.provider, self.options.dry_run);
                let mut repositories = Vec::new();
                let mut failed = Vec::new();
                for spec in &community.repositories {
                    match engine.reconcile(&community.community, spec) {
                        Ok(outcome) => repositories.push(outcome),
                        Err(err) => {
                            tracing::error!(
                                "{file}: {}/{}: {err}",
                                community.community,
                                spec.name
                            );
                            failed.push(RepoFailure {
                                repository: spec.name.clone(),
                                error: err.to_string(),
                            });
                        }
                    }
                }
                let complete = failed.is_empty();
                (
                    FileOutcome::Reconciled {
                        repositories,
                        failed,
                    },
                    complete,
                )
            }
            ManifestKind::Sigs => {
                let sigs = manifest::decode_sigs(&content.bytes)?.sigs;
                let (repositories, update) = if self.sigs.is_empty() {
                    (Vec::new(), IndexUpdate::Rebuild(sigs))
                } else {
                    (self.sigs.preview_diff(&sigs), IndexUpdate::Diff(sigs))
                };
                index_update = Some(update);
                let complete = self.reevaluate(&repositories, configured, report);
                (FileOutcome::OwnershipChanged { repositories }, complete)
            }
            ManifestKind::Owners => {
                let sig = file.sig.as_deref().unwrap_or_default();
                let repositories = self.sigs.owner_changed(sig);
                let complete = self.reevaluate(&repositories, configured, report);
                (FileOutcome::OwnershipChanged { repositories }, complete)
            }
        };

        if !self.options.dry_run && (complete || self.options.advance_hash_on_failure) {
            match index_update {
                Some(IndexUpdate::Rebuild(sigs)) => self.sigs.rebuild(&sigs),
                Some(IndexUpdate::Diff(sigs)) => {
                    self.sigs.diff(&sigs);
                }
                None => {}
            }
            file.hash = content.sha;
        }
        Ok(outcome)
    }

    /// Re-reconcile the named repositories from every tracked repos manifest.
    ///
    /// Returns `false` if any of them could not be re-reconciled.
    fn reevaluate(
        &self,
        names: &[String],
        configured: &[TrackedFile],
        report: &mut PassReport,
    ) -> bool {
        if names.is_empty() {
            return true;
        }
        let engine = Engine::new(self.provider, self.options.dry_run);
        let mut complete = true;
        for file in configured.iter().filter(|f| f.kind == ManifestKind::Repos) {
            let community = match self
                .source
                .fetch(file, file.effective_ref(&self.options.default_ref))
                .map_err(SyncError::from)
                .and_then(|c| manifest::decode_community(&c.bytes).map_err(SyncError::from))
            {
                Ok(community) => community,
                Err(err) => {
                    tracing::error!("{file}: re-evaluation skipped: {err}");
                    complete = false;
                    continue;
                }
            };
            for spec in community
                .repositories
                .iter()
                .filter(|s| names.contains(&s.name))
            {
                match engine.reconcile(&community.community, spec) {
                    Ok(outcome) => report.reevaluated.push(outcome),
                    Err(err) => {
                        tracing::error!("{}/{}: {err}", community.community, spec.name);
                        complete = false;
                        report.reevaluation_failures.push(RepoFailure {
                            repository: spec.name.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }
        complete
    }
}

/// Sig index change held back until the sigs file's hash advances.
enum IndexUpdate {
    Rebuild(Vec<SigRecord>),
    Diff(Vec<SigRecord>),
}
