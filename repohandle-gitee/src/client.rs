//! Blocking Gitee v5 client.
//!
//! The access token travels as the `access_token` query parameter on every
//! call and is never logged. Status mapping:
//!
//! | Response              | [`ProviderError`] |
//! |-----------------------|-------------------|
//! | 404                   | `NotFound`        |
//! | 429, 5xx, transport   | `Transient`       |
//! | any other non-2xx     | `Rejected`        |
//!
//! Owner, repository, branch and file path components are percent-encoded
//! one path segment at a time.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use url::Url;

use repohandle_core::{
    BranchState, NewRepository, ProviderConfig, ProviderRepository, RepositorySettings,
    TrackedFile,
};
use repohandle_sync::{ManifestContent, ManifestSource, ProviderClient, ProviderError};

use crate::error::GiteeError;
use crate::wire::{BranchJson, ContentJson, RepoJson};

pub struct GiteeClient {
    agent: ureq::Agent,
    base_url: Url,
    token: String,
}

impl GiteeClient {
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GiteeError> {
        let parsed = Url::parse(base_url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| GiteeError::InvalidBaseUrl(base_url.to_string()))?;
        Ok(Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: parsed,
            token: token.into(),
        })
    }

    /// Build from config, reading the token from the configured variable.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, GiteeError> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GiteeError::MissingToken(config.token_env.clone()))?;
        Self::new(
            &config.base_url,
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Base URL extended by `segments`, each encoded on its own.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // http(s) URLs always have a path to extend.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: &str, segments: &[&str]) -> ureq::Request {
        let url = self.url(segments);
        tracing::debug!(method, url = %url, "provider request");
        self.agent
            .request_url(method, &url)
            .query("access_token", &self.token)
    }

    fn call(
        &self,
        method: &str,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<ureq::Response, ProviderError> {
        let request = self.request(method, segments);
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        result.map_err(|err| map_error(&segments.join("/"), err))
    }

    fn json<T: DeserializeOwned>(
        &self,
        method: &str,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<T, ProviderError> {
        self.call(method, segments, body)?
            .into_json()
            .map_err(|e| ProviderError::Decode(format!("{}: {e}", segments.join("/"))))
    }
}

impl ProviderClient for GiteeClient {
    fn find_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<ProviderRepository>, ProviderError> {
        match self.json::<RepoJson>("GET", &["repos", owner, name], None) {
            Ok(repo) => Ok(Some(repo.into())),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn create_repository(
        &self,
        owner: &str,
        repo: &NewRepository,
    ) -> Result<ProviderRepository, ProviderError> {
        let body = json!({
            "name": repo.name,
            "path": repo.name,
            "description": repo.description,
            "private": repo.private,
            "auto_init": repo.auto_init,
        });
        let created: RepoJson = self.json("POST", &["orgs", owner, "repos"], Some(body))?;
        Ok(created.into())
    }

    fn rename_repository(&self, owner: &str, from: &str, to: &str) -> Result<(), ProviderError> {
        let body = json!({ "name": to, "path": to });
        self.call("PATCH", &["repos", owner, from], Some(body))?;
        Ok(())
    }

    fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<BranchState>, ProviderError> {
        let branches: Vec<BranchJson> =
            self.json("GET", &["repos", owner, repo, "branches"], None)?;
        Ok(branches.into_iter().map(BranchState::from).collect())
    }

    fn protect_branch(&self, owner: &str, repo: &str, branch: &str) -> Result<(), ProviderError> {
        self.call("PUT", &protection_path(owner, repo, branch), None)?;
        Ok(())
    }

    fn unprotect_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<(), ProviderError> {
        self.call("DELETE", &protection_path(owner, repo, branch), None)?;
        Ok(())
    }

    fn update_settings(
        &self,
        owner: &str,
        repo: &str,
        settings: &RepositorySettings,
    ) -> Result<(), ProviderError> {
        let body = json!({
            "name": repo,
            "private": settings.private,
            "can_comment": settings.can_comment,
        });
        self.call("PATCH", &["repos", owner, repo], Some(body))?;
        Ok(())
    }

    fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        from_ref: &str,
        branch: &str,
    ) -> Result<(), ProviderError> {
        let body = json!({ "refs": from_ref, "branch_name": branch });
        self.call("POST", &["repos", owner, repo, "branches"], Some(body))?;
        Ok(())
    }
}

impl ManifestSource for GiteeClient {
    fn fetch(&self, file: &TrackedFile, git_ref: &str) -> Result<ManifestContent, ProviderError> {
        let segments = contents_path(file);
        let path = segments.join("/");
        let url = self.url(&segments);
        tracing::debug!(url = %url, git_ref, "fetch manifest");
        let body: ContentJson = self
            .agent
            .request_url("GET", &url)
            .query("access_token", &self.token)
            .query("ref", git_ref)
            .call()
            .map_err(|err| map_error(&path, err))?
            .into_json()
            .map_err(|e| ProviderError::Decode(format!("{path}: {e}")))?;
        body.into_content()
    }
}

fn protection_path<'a>(owner: &'a str, repo: &'a str, branch: &'a str) -> [&'a str; 6] {
    ["repos", owner, repo, "branches", branch, "protection"]
}

fn contents_path(file: &TrackedFile) -> Vec<&str> {
    let mut segments = vec!["repos", file.owner.as_str(), file.repo.as_str(), "contents"];
    segments.extend(file.path.split('/').filter(|s| !s.is_empty()));
    segments
}

fn map_error(path: &str, err: ureq::Error) -> ProviderError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response.into_string().unwrap_or_default();
            classify(status, path, message)
        }
        ureq::Error::Transport(transport) => {
            ProviderError::Transient(format!("{path}: {transport}"))
        }
    }
}

fn classify(status: u16, path: &str, message: String) -> ProviderError {
    match status {
        404 => ProviderError::NotFound(path.to_string()),
        429 | 500..=599 => ProviderError::Transient(format!("{path}: HTTP {status}: {message}")),
        _ => ProviderError::Rejected { status, message },
    }
}
