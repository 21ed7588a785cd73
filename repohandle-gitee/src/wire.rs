//! JSON shapes of the Gitee v5 API, and their conversion to domain types.

use base64::Engine as _;
use serde::Deserialize;

use repohandle_core::{BranchState, ProviderRepository};
use repohandle_sync::{ManifestContent, ProviderError};

#[derive(Debug, Deserialize)]
pub(crate) struct RepoJson {
    /// URL path segment; the display `name` may differ.
    pub path: String,
    #[serde(default)]
    pub namespace: Option<NamespaceJson>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub can_comment: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NamespaceJson {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BranchJson {
    pub name: String,
    #[serde(default)]
    pub protected: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentJson {
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub content: String,
}

impl From<RepoJson> for ProviderRepository {
    fn from(repo: RepoJson) -> Self {
        Self {
            name: repo.path,
            namespace: repo.namespace.map(|ns| ns.path).unwrap_or_default(),
            private: repo.private,
            can_comment: repo.can_comment,
            default_branch: repo
                .default_branch
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| "master".to_string()),
        }
    }
}

impl From<BranchJson> for BranchState {
    fn from(branch: BranchJson) -> Self {
        Self {
            name: branch.name,
            protected: branch.protected,
        }
    }
}

impl ContentJson {
    /// Decode the base64 body. Gitee wraps long payloads across lines.
    pub fn into_content(self) -> Result<ManifestContent, ProviderError> {
        let packed: String = self
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(packed)
            .map_err(|e| ProviderError::Decode(format!("file content is not base64: {e}")))?;
        Ok(ManifestContent {
            sha: self.sha,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_takes_path_and_namespace() {
        let json = r#"{
            "name": "Kernel Modules",
            "path": "kmod",
            "namespace": {"path": "openeuler", "name": "openEuler"},
            "private": true,
            "can_comment": false,
            "default_branch": "main",
            "stargazers_count": 4
        }"#;
        let repo: ProviderRepository = serde_json::from_str::<RepoJson>(json).unwrap().into();
        assert_eq!(repo.name, "kmod");
        assert_eq!(repo.namespace, "openeuler");
        assert!(repo.private);
        assert_eq!(repo.default_branch, "main");
    }

    #[test]
    fn missing_namespace_and_branch_default() {
        let repo: ProviderRepository =
            serde_json::from_str::<RepoJson>(r#"{"path": "x", "default_branch": null}"#)
                .unwrap()
                .into();
        assert_eq!(repo.namespace, "");
        assert_eq!(repo.default_branch, "master");
    }

    #[test]
    fn content_decodes_wrapped_base64() {
        let body = ContentJson {
            sha: "abc".to_string(),
            content: "Y29tbXVu\naXR5OiB4\n".to_string(),
        };
        let content = body.into_content().unwrap();
        assert_eq!(content.sha, "abc");
        assert_eq!(content.bytes, b"community: x");
    }

    #[test]
    fn garbage_content_is_decode_error() {
        let body = ContentJson {
            sha: "abc".to_string(),
            content: "%%%".to_string(),
        };
        assert!(matches!(body.into_content(), Err(ProviderError::Decode(_))));
    }
}
