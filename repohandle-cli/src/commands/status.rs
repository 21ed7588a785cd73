//! `repohandle status`: tracked manifest files and their cached hashes.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use repohandle_core::{Config, ManifestKind, TrackedFile};
use repohandle_sync::cache::merge_cached_hashes;
use repohandle_sync::ChangeCache;

use super::{home_dir, load_config};

/// Arguments for `repohandle status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let home = home_dir()?;
        let config = load_config(&home, config)?;
        let cache = ChangeCache::new(config.cache_path_at(&home));

        let cached = match cache.load() {
            Ok(cached) => cached,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read change cache {}", cache.path().display())
                })
            }
        };
        let files = merge_cached_hashes(&config.files, &cached);

        if self.json {
            return print_json(&config, &cache, &files);
        }
        print_table(&config, &cache, &files);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    summary: SummaryJson,
    cache: String,
    files: Vec<FileJson<'a>>,
}

#[derive(Serialize)]
struct SummaryJson {
    files: usize,
    reconciled: usize,
    pending: usize,
}

#[derive(Serialize)]
struct FileJson<'a> {
    owner: &'a str,
    repo: &'a str,
    path: &'a str,
    #[serde(rename = "ref")]
    git_ref: &'a str,
    kind: ManifestKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    sig: Option<&'a str>,
    hash: Option<&'a str>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "")]
    indicator: String,
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "ref")]
    git_ref: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "hash")]
    hash: String,
}

fn summary(files: &[TrackedFile]) -> SummaryJson {
    let reconciled = files.iter().filter(|f| !f.hash.is_empty()).count();
    SummaryJson {
        files: files.len(),
        reconciled,
        pending: files.len() - reconciled,
    }
}

fn print_json(config: &Config, cache: &ChangeCache, files: &[TrackedFile]) -> Result<()> {
    let payload = StatusJson {
        summary: summary(files),
        cache: cache.path().display().to_string(),
        files: files
            .iter()
            .map(|f| FileJson {
                owner: &f.owner,
                repo: &f.repo,
                path: &f.path,
                git_ref: f.effective_ref(&config.default_ref),
                kind: f.kind,
                sig: f.sig.as_deref(),
                hash: (!f.hash.is_empty()).then_some(f.hash.as_str()),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
    );
    Ok(())
}

fn print_table(config: &Config, cache: &ChangeCache, files: &[TrackedFile]) {
    if files.is_empty() {
        println!("No tracked files configured.");
        return;
    }

    let rows: Vec<StatusTableRow> = files
        .iter()
        .map(|f| {
            let (indicator, hash) = if f.hash.is_empty() {
                (
                    "■".bright_black().bold().to_string(),
                    "never reconciled".to_string(),
                )
            } else {
                ("■".green().bold().to_string(), short_hash(&f.hash))
            };
            let kind = match &f.sig {
                Some(sig) => format!("{} ({sig})", f.kind),
                None => f.kind.to_string(),
            };
            StatusTableRow {
                indicator,
                file: format!("{}/{}/{}", f.owner, f.repo, f.path),
                git_ref: f.effective_ref(&config.default_ref).to_string(),
                kind,
                hash,
            }
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let s = summary(files);
    println!(
        "{} tracked, {} reconciled, {} pending  (cache: {})",
        s.files,
        s.reconciled,
        s.pending,
        cache.path().display()
    );
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(12).collect()
}
