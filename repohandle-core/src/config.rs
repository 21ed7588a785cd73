//! YAML configuration: provider access and the set of tracked manifest files.
//!
//! # Storage layout
//!
//! ```text
//! ~/.repohandle/
//!   config.yaml     (this file)
//!   cache.json      (default change-cache location)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(home: &Path)`: explicit home; used in tests with `TempDir`
//! - `load_from(path)`: explicit file, used by `--config`
//! - `load()`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ManifestKind, TrackedFile};

pub const DEFAULT_BASE_URL: &str = "https://gitee.com/api/v5";
pub const DEFAULT_TOKEN_ENV: &str = "GITEE_TOKEN";
pub const DEFAULT_REF: &str = "master";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Hosting-provider access settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Baseline branch for tracked files that declare no ref.
    #[serde(default = "default_ref")]
    pub default_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    /// Advance a manifest's hash even when some of its repositories failed.
    #[serde(default = "default_true")]
    pub advance_hash_on_failure: bool,
    #[serde(default)]
    pub files: Vec<TrackedFile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            default_ref: default_ref(),
            cache_path: None,
            advance_hash_on_failure: true,
            files: vec![],
        }
    }
}

impl Config {
    /// Cache location: the configured path, else `<home>/.repohandle/cache.json`.
    pub fn cache_path_at(&self, home: &Path) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| root_at(home).join("cache.json"))
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.repohandle/`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".repohandle")
}

/// `<home>/.repohandle/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    root_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load and validate the config file at `path`.
///
/// Returns `ConfigError::ConfigNotFound` if absent, `ConfigError::Parse`
/// (with path + line context) if malformed YAML.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    normalize(config)
}

/// Load `<home>/.repohandle/config.yaml`.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Drop incomplete tracked files and reject rule violations.
fn normalize(mut config: Config) -> Result<Config, ConfigError> {
    if config.default_ref.trim().is_empty() {
        return Err(ConfigError::Invalid("default_ref is empty".to_string()));
    }
    config
        .files
        .retain(|f| !f.owner.is_empty() && !f.repo.is_empty() && !f.path.is_empty());

    for file in &config.files {
        let has_sig = file.sig.as_deref().is_some_and(|s| !s.trim().is_empty());
        if file.kind == ManifestKind::Owners && !has_sig {
            return Err(ConfigError::Invalid(format!(
                "owners file {file} needs a sig"
            )));
        }
        // Hashes belong to the cache, not to static config.
        if !file.hash.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{file} sets a hash; hashes are tracked in the cache"
            )));
        }
    }

    for (i, a) in config.files.iter().enumerate() {
        if config.files[..i].iter().any(|b| a.same_identity(b)) {
            return Err(ConfigError::Invalid(format!("{a} is tracked twice")));
        }
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_ref() -> String {
    DEFAULT_REF.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
