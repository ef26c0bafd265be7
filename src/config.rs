use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::git::{GitIdentity, RepoSlug};

pub const DEFAULT_CONFIG_FILE: &str = "merge-relay.toml";
pub const DEFAULT_TARGET_REPO_PATH: &str = "/tmp/target_repo";
pub const DEFAULT_SOURCE_REPO_PATH: &str = "/tmp/source_repo";
pub const DEFAULT_SOURCE_REMOTE_NAME: &str = "source_repo";
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 300;

/// Inputs that must be present and non-empty before anything touches git
pub const REQUIRED_KEYS: [&str; 5] = [
    "TARGET_REPO_URL",
    "SOURCE_REPO_URL",
    "TARGET_BRANCH",
    "SOURCE_BRANCH",
    "GITHUB_TOKEN",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .keys.join(", "))]
    Missing { keys: Vec<&'static str> },
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("failed to load .env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

/// What to do when an earlier escalation branch is still around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingConflictPolicy {
    /// Stop before merging and report the pending branch
    #[default]
    Abort,
    /// Carry on; an identical escalation is not repeated
    Ignore,
}

impl FromStr for ExistingConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "ignore" => Ok(Self::Ignore),
            _ => Err("expected 'abort' or 'ignore'".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err("expected 'text' or 'json'".to_string()),
        }
    }
}

/// Configuration exactly as read from file and environment, before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    target_repo_url: Option<String>,
    source_repo_url: Option<String>,
    target_branch: Option<String>,
    source_branch: Option<String>,
    github_token: Option<String>,
    git_user_name: Option<String>,
    git_user_email: Option<String>,
    target_repo_path: Option<PathBuf>,
    source_repo_path: Option<PathBuf>,
    source_remote_name: Option<String>,
    network_timeout_secs: Option<u64>,
    github_api_url: Option<String>,
    existing_conflict_policy: Option<String>,
    log_format: Option<String>,
}

/// Validated settings for one merge run
#[derive(Clone, Serialize)]
pub struct MergeSettings {
    pub target_repo_url: String,
    pub source_repo_url: String,
    pub target_branch: String,
    pub source_branch: String,
    #[serde(skip)]
    pub github_token: String,
    pub identity: Option<GitIdentity>,
    pub target_repo_path: PathBuf,
    /// Accepted for compatibility; the source is linked as a remote and never cloned
    pub source_repo_path: PathBuf,
    pub source_remote_name: String,
    #[serde(serialize_with = "serialize_secs")]
    pub network_timeout: Duration,
    pub github_api_url: Option<String>,
    pub existing_conflict_policy: ExistingConflictPolicy,
    pub log_format: LogFormat,
    #[serde(skip)]
    pub target_slug: RepoSlug,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl fmt::Debug for MergeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeSettings")
            .field("target_repo_url", &self.target_repo_url)
            .field("source_repo_url", &self.source_repo_url)
            .field("target_branch", &self.target_branch)
            .field("source_branch", &self.source_branch)
            .field("github_token", &"<redacted>")
            .field("identity", &self.identity)
            .field("target_repo_path", &self.target_repo_path)
            .field("source_repo_path", &self.source_repo_path)
            .field("source_remote_name", &self.source_remote_name)
            .field("network_timeout", &self.network_timeout)
            .field("github_api_url", &self.github_api_url)
            .field("existing_conflict_policy", &self.existing_conflict_policy)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl MergeSettings {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`--config <path>` or ./merge-relay.toml)
    /// 3. Process environment variables
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(config_file, None)
    }

    /// Same as [`MergeSettings::load`] but reading variables from `env`
    /// instead of the process environment when given
    pub fn load_from(
        config_file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = match config_file {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        builder = builder.add_source(Environment::default().source(env));

        let raw: RawSettings = builder.build()?.try_deserialize()?;
        Self::validate(raw)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<bool, ConfigError> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn validate(raw: RawSettings) -> Result<Self, ConfigError> {
        fn present(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        let target_repo_url = present(raw.target_repo_url);
        let source_repo_url = present(raw.source_repo_url);
        let target_branch = present(raw.target_branch);
        let source_branch = present(raw.source_branch);
        let github_token = present(raw.github_token);

        let missing: Vec<&'static str> = REQUIRED_KEYS
            .iter()
            .zip([
                target_repo_url.is_none(),
                source_repo_url.is_none(),
                target_branch.is_none(),
                source_branch.is_none(),
                github_token.is_none(),
            ])
            .filter_map(|(key, absent)| absent.then_some(*key))
            .collect();

        let (
            Some(target_repo_url),
            Some(source_repo_url),
            Some(target_branch),
            Some(source_branch),
            Some(github_token),
        ) = (
            target_repo_url,
            source_repo_url,
            target_branch,
            source_branch,
            github_token,
        )
        else {
            return Err(ConfigError::Missing { keys: missing });
        };

        let target_slug =
            RepoSlug::parse(&target_repo_url).ok_or_else(|| ConfigError::Invalid {
                key: "TARGET_REPO_URL",
                value: target_repo_url.clone(),
                reason: "cannot derive owner/repo from this URL".to_string(),
            })?;

        let source_remote_name = present(raw.source_remote_name)
            .unwrap_or_else(|| DEFAULT_SOURCE_REMOTE_NAME.to_string());
        if !git2::Remote::is_valid_name(&source_remote_name) || source_remote_name == "origin" {
            return Err(ConfigError::Invalid {
                key: "SOURCE_REMOTE_NAME",
                value: source_remote_name,
                reason: "must be a valid remote name other than 'origin'".to_string(),
            });
        }

        let network_timeout_secs = raw
            .network_timeout_secs
            .unwrap_or(DEFAULT_NETWORK_TIMEOUT_SECS);
        if network_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "NETWORK_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            });
        }

        let existing_conflict_policy = match present(raw.existing_conflict_policy) {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                key: "EXISTING_CONFLICT_POLICY",
                value,
                reason,
            })?,
            None => ExistingConflictPolicy::default(),
        };

        let log_format = match present(raw.log_format) {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                key: "LOG_FORMAT",
                value,
                reason,
            })?,
            None => LogFormat::default(),
        };

        // Identity is recommended, not required; a half-set identity is ignored
        let identity = match (present(raw.git_user_name), present(raw.git_user_email)) {
            (Some(name), Some(email)) => Some(GitIdentity { name, email }),
            _ => None,
        };

        Ok(MergeSettings {
            target_repo_url,
            source_repo_url,
            target_branch,
            source_branch,
            github_token,
            identity,
            target_repo_path: raw
                .target_repo_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_REPO_PATH)),
            source_repo_path: raw
                .source_repo_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_REPO_PATH)),
            source_remote_name,
            network_timeout: Duration::from_secs(network_timeout_secs),
            github_api_url: present(raw.github_api_url),
            existing_conflict_policy,
            log_format,
            target_slug,
        })
    }

    /// Remote-tracking name of the source branch once the source remote is fetched
    pub fn source_tracking_ref(&self) -> String {
        format!("{}/{}", self.source_remote_name, self.source_branch)
    }

    /// Settings rendered as TOML with the token left out
    pub fn to_redacted_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
