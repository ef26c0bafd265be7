use thiserror::Error;

use crate::config::ConfigError;
use crate::git::GitError;
use crate::github::GitHubError;
use crate::lock::LockError;

#[derive(Debug, Error)]
pub enum EscalationFailure {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    GitHub(#[from] GitHubError),
}

/// Why a run ended without reaching a successful terminal state
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("repository access failed while trying to {step}: {source}")]
    RepositoryAccess {
        step: &'static str,
        #[source]
        source: GitError,
    },

    #[error(
        "unresolved merge conflict branch pending: {}; resolve or delete it before merging again",
        .branches.join(", ")
    )]
    ConflictBranchPending { branches: Vec<String> },

    #[error("escalation failed while trying to {step} (manual intervention required): {source}")]
    Escalation {
        step: &'static str,
        #[source]
        source: EscalationFailure,
    },

    #[error("cannot set up the GitHub client: {0}")]
    ClientSetup(#[source] GitHubError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl RelayError {
    pub(crate) fn access(step: &'static str) -> impl FnOnce(GitError) -> Self {
        move |source| RelayError::RepositoryAccess { step, source }
    }

    pub(crate) fn escalation<E: Into<EscalationFailure>>(
        step: &'static str,
    ) -> impl FnOnce(E) -> Self {
        move |source| RelayError::Escalation {
            step,
            source: source.into(),
        }
    }

    /// Classify a failure to build the hosting API client
    ///
    /// A malformed `GITHUB_API_URL` is a configuration error; anything else
    /// happened before any repository work and is reported as such.
    pub fn client_setup(err: GitHubError) -> Self {
        match err {
            GitHubError::InvalidBaseUrl { url, message } => {
                RelayError::Configuration(ConfigError::Invalid {
                    key: "GITHUB_API_URL",
                    value: url,
                    reason: message,
                })
            }
            other => RelayError::ClientSetup(other),
        }
    }

    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            RelayError::Configuration(_) => 2,
            _ => 1,
        }
    }
}
