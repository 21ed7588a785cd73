//! `repohandle check <manifest> [--kind repos|sigs]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use repohandle_core::{manifest, ManifestKind};

use super::super::ManifestKindArg;

/// Decode a manifest with the same rules a reconciliation pass applies.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Manifest file to validate.
    pub manifest: PathBuf,

    /// Manifest kind: repos | sigs.
    #[arg(long, default_value = "repos", value_name = "KIND")]
    pub kind: ManifestKindArg,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let raw = std::fs::read(&self.manifest)
            .with_context(|| format!("cannot read {}", self.manifest.display()))?;
        let shown = self.manifest.display();

        match self.kind.0 {
            ManifestKind::Sigs => {
                let sigs = manifest::decode_sigs(&raw)
                    .with_context(|| format!("{shown} is not a valid sigs manifest"))?;
                let repos: usize = sigs.sigs.iter().map(|s| s.repositories.len()).sum();
                println!("✓ {shown}: {} sigs, {repos} repositories", sigs.sigs.len());
                for sig in &sigs.sigs {
                    println!("  {:<24} {} repositories", sig.name, sig.repositories.len());
                }
            }
            _ => {
                let community = manifest::decode_community(&raw)
                    .with_context(|| format!("{shown} is not a valid repository manifest"))?;
                println!(
                    "✓ {shown}: community '{}', {} repositories",
                    community.community,
                    community.repositories.len()
                );
                for repo in &community.repositories {
                    let mut line = format!("  {:<24} {}", repo.name, repo.visibility);
                    if !repo.protected_branches.is_empty() {
                        line.push_str(&format!(" [{}]", repo.protected_branches.join(", ")));
                    }
                    if let Some(source) = repo.rename_source() {
                        line.push_str(&format!(" (renamed from {source})"));
                    }
                    println!("{line}");
                }
            }
        }
        Ok(())
    }
}
