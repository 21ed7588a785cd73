//! `repohandle sync`: one full reconciliation pass.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use repohandle_daemon::request_sync;
use repohandle_gitee::GiteeClient;
use repohandle_sync::{
    ChangeCache, DirManifestSource, FileOutcome, ManifestSource, OpOutcome, PassOptions,
    PassReport, Reconciler, RepoOutcome, SigIndex,
};

use super::{home_dir, load_config};

/// Arguments for `repohandle sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Report what would change without calling mutating provider operations.
    #[arg(long)]
    pub dry_run: bool,

    /// Read manifests from a local checkout laid out as <DIR>/<owner>/<repo>/<path>.
    #[arg(long, value_name = "DIR", conflicts_with = "daemon")]
    pub local: Option<PathBuf>,

    /// Run the pass inside the running daemon instead of in-process.
    #[arg(long)]
    pub daemon: bool,
}

impl SyncArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let home = home_dir()?;

        if self.daemon {
            let reply = request_sync(&home, self.dry_run).context("daemon sync failed")?;
            let report: PassReport = serde_json::from_value(reply["report"].clone())
                .context("daemon returned an unreadable pass report")?;
            return finish(&report);
        }

        let config = load_config(&home, config)?;
        init_logging();

        let client =
            GiteeClient::from_config(&config.provider).context("failed to set up Gitee client")?;
        let local = self.local.as_ref().map(DirManifestSource::new);
        let source: &dyn ManifestSource = match &local {
            Some(dir) => dir,
            None => &client,
        };
        let cache = ChangeCache::new(config.cache_path_at(&home));
        let sigs = SigIndex::new();
        let reconciler = Reconciler::new(
            &client,
            source,
            &cache,
            &sigs,
            PassOptions::from_config(&config, self.dry_run),
        );

        if let Err(err) = reconciler.warm_sig_index(&config.files) {
            eprintln!("{} sig index warm-up failed: {err}", "warning:".yellow().bold());
        }
        let report = reconciler
            .handle_all(&config.files)
            .context("reconciliation pass failed")?;
        finish(&report)
    }
}

fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("warn");
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn finish(report: &PassReport) -> Result<()> {
    print_report(report);
    let failed = report.failed();
    if failed > 0 {
        bail!("{failed} failure(s) during reconciliation");
    }
    Ok(())
}

fn print_report(report: &PassReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };

    for file in &report.files {
        match &file.outcome {
            FileOutcome::Unchanged => println!("{prefix}·  {} unchanged", file.file),
            FileOutcome::Reconciled {
                repositories,
                failed,
            } => {
                println!("{prefix}✓  {}", file.file);
                print_repositories(repositories);
                for failure in failed {
                    println!("    {} {}: {}", "✗".red(), failure.repository, failure.error);
                }
            }
            FileOutcome::OwnershipChanged { repositories } => {
                println!(
                    "{prefix}⟳  {} ({} repositories changed owner)",
                    file.file,
                    repositories.len()
                );
            }
            FileOutcome::Failed { error } => {
                println!("{prefix}{}  {}: {error}", "✗".red(), file.file);
            }
        }
    }

    if !report.reevaluated.is_empty() || !report.reevaluation_failures.is_empty() {
        println!("{prefix}⟳  re-evaluated after ownership changes");
        print_repositories(&report.reevaluated);
        for failure in &report.reevaluation_failures {
            println!("    {} {}: {}", "✗".red(), failure.repository, failure.error);
        }
    }

    println!(
        "{prefix}{} operation(s) {}, {} failure(s)",
        report.applied(),
        if report.dry_run { "planned" } else { "applied" },
        report.failed()
    );
}

fn print_repositories(repositories: &[RepoOutcome]) {
    for repo in repositories.iter().filter(|r| !r.is_noop()) {
        for outcome in &repo.outcomes {
            match outcome {
                OpOutcome::Applied { operation } => {
                    println!("    ✎  {}: {operation}", repo.repository)
                }
                OpOutcome::WouldApply { operation } => {
                    println!("    ~  {}: {operation}", repo.repository)
                }
                OpOutcome::Failed { operation, error } => {
                    println!("    {} {}: {operation}: {error}", "✗".red(), repo.repository)
                }
            }
        }
    }
}
