//! Strict manifest decoding.
//!
//! Manifests are YAML. Decoding fails closed: unknown fields are rejected,
//! and a manifest that decodes but lacks its required content is reported as
//! [`ManifestError::Malformed`] so the whole file is abandoned before any
//! repository is touched.

use crate::error::ManifestError;
use crate::types::{CommunityManifest, SigManifest};

/// Decode a community manifest and check its required fields.
///
/// Requires a non-empty `community`, at least one repository, and a
/// non-empty `name` on every repository entry.
pub fn decode_community(raw: &[u8]) -> Result<CommunityManifest, ManifestError> {
    let manifest: CommunityManifest = serde_yaml::from_slice(raw)?;
    if manifest.community.trim().is_empty() {
        return Err(ManifestError::Malformed(
            "community name is empty".to_string(),
        ));
    }
    if manifest.repositories.is_empty() {
        return Err(ManifestError::Malformed(format!(
            "community '{}' declares no repositories",
            manifest.community
        )));
    }
    if let Some(idx) = manifest
        .repositories
        .iter()
        .position(|r| r.name.trim().is_empty())
    {
        return Err(ManifestError::Malformed(format!(
            "repository #{idx} of community '{}' has an empty name",
            manifest.community
        )));
    }
    Ok(manifest)
}

/// Decode a sigs manifest.
///
/// Every sig needs a name; an empty sig list is valid (nothing is owned).
pub fn decode_sigs(raw: &[u8]) -> Result<SigManifest, ManifestError> {
    let manifest: SigManifest = serde_yaml::from_slice(raw)?;
    if manifest.sigs.iter().any(|s| s.name.trim().is_empty()) {
        return Err(ManifestError::Malformed("sig with empty name".to_string()));
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Visibility;

    const COMMUNITY: &str = r#"
community: openeuler
repositories:
- name: foo
  description: "foo repo"
  type: private
  commentable: true
  protected_branches: [main, release]
  autoInit: true
  managers: [alice]
- name: bar
  rename_from: baz
"#;

    #[test]
    fn decodes_full_community_manifest() {
        let manifest = decode_community(COMMUNITY.as_bytes()).expect("decode");
        assert_eq!(manifest.community, "openeuler");
        assert_eq!(manifest.repositories.len(), 2);

        let foo = &manifest.repositories[0];
        assert_eq!(foo.visibility, Visibility::Private);
        assert!(foo.is_commentable());
        assert!(foo.auto_init);
        assert_eq!(foo.protected_branches, vec!["main", "release"]);
        assert_eq!(foo.managers, vec!["alice"]);

        let bar = &manifest.repositories[1];
        assert_eq!(bar.visibility, Visibility::Public);
        assert_eq!(bar.rename_source(), Some("baz"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let raw = "community: x\nrepositories:\n- name: a\n  protected_branch: [main]\n";
        let err = decode_community(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestError::Decode(_)), "got: {err}");
    }

    #[test]
    fn empty_community_is_malformed() {
        let raw = "community: ''\nrepositories:\n- name: a\n";
        let err = decode_community(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed(_)), "got: {err}");
    }

    #[test]
    fn no_repositories_is_malformed() {
        let err = decode_community(b"community: openeuler\n").unwrap_err();
        assert!(err.to_string().contains("no repositories"));
    }

    #[test]
    fn empty_repository_name_is_malformed() {
        let raw = "community: x\nrepositories:\n- name: ''\n";
        let err = decode_community(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed(_)));
    }

    #[test]
    fn unknown_visibility_is_rejected() {
        let raw = "community: x\nrepositories:\n- name: a\n  type: internal\n";
        assert!(decode_community(raw.as_bytes()).is_err());
    }

    #[test]
    fn decodes_sigs_manifest() {
        let raw = "sigs:\n- name: Kernel\n  repositories: [kernel, kmod]\n- name: Infra\n";
        let manifest = decode_sigs(raw.as_bytes()).expect("decode");
        assert_eq!(manifest.sigs.len(), 2);
        assert_eq!(manifest.sigs[0].repositories, vec!["kernel", "kmod"]);
        assert!(manifest.sigs[1].repositories.is_empty());
    }

    #[test]
    fn sig_without_name_is_malformed() {
        let raw = "sigs:\n- name: ' '\n  repositories: [a]\n";
        assert!(matches!(
            decode_sigs(raw.as_bytes()),
            Err(ManifestError::Malformed(_))
        ));
    }
}
