use octocrab::Error as OctocrabError;

#[derive(Debug)]
pub enum GitHubError {
    ApiError(OctocrabError),
    Timeout {
        operation: String,
        duration_ms: u64,
    },
    InvalidBaseUrl {
        url: String,
        message: String,
    },
}

impl GitHubError {
    /// HTTP status reported by the API, when the failure came from a response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GitHubError::ApiError(OctocrabError::GitHub { source, .. }) => {
                Some(source.status_code.as_u16())
            }
            _ => None,
        }
    }
}

impl From<OctocrabError> for GitHubError {
    fn from(err: OctocrabError) -> Self {
        GitHubError::ApiError(err)
    }
}

impl std::fmt::Display for GitHubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitHubError::ApiError(octocrab_err) => {
                writeln!(f, "GitHub API Error")?;
                writeln!(f, "────────────────")?;

                match octocrab_err {
                    OctocrabError::GitHub { source, .. } => {
                        writeln!(f, "HTTP {}: {}", source.status_code, source.message)?;
                        if let Some(errors) = &source.errors {
                            for detail in errors {
                                writeln!(f, "  {detail}")?;
                            }
                        }
                        writeln!(f)?;

                        match source.status_code.as_u16() {
                            401 => {
                                writeln!(f, "AUTHENTICATION FAILED:")?;
                                writeln!(f, "   → GITHUB_TOKEN is invalid or expired")?;
                                write!(f, "   → Or export GITHUB_TOKEN=\"$(gh auth token)\"")
                            }
                            403 => {
                                writeln!(f, "PERMISSION DENIED:")?;
                                writeln!(f, "   → Token lacks permission to open pull requests")?;
                                write!(
                                    f,
                                    "   → Needs 'repo' scope (or 'pull_requests: write' for fine-grained tokens)"
                                )
                            }
                            404 => {
                                writeln!(f, "RESOURCE NOT FOUND:")?;
                                writeln!(f, "   → Repository may not exist or be private")?;
                                write!(f, "   → Check TARGET_REPO_URL points at the right repository")
                            }
                            422 => {
                                writeln!(f, "VALIDATION ERROR:")?;
                                writeln!(f, "   → A pull request for this branch may already exist")?;
                                write!(f, "   → Or the head branch was not pushed")
                            }
                            _ => {
                                writeln!(f, "TROUBLESHOOTING:")?;
                                writeln!(f, "   → Check authentication: gh auth status")?;
                                write!(f, "   → Check rate limits: gh api rate_limit")
                            }
                        }
                    }
                    _ => {
                        write!(f, "{octocrab_err}\n\n")?;
                        writeln!(f, "TROUBLESHOOTING:")?;
                        writeln!(f, "   → Test connection: curl -I https://api.github.com")?;
                        write!(f, "   → Check GITHUB_API_URL if using GitHub Enterprise")
                    }
                }
            }
            GitHubError::Timeout {
                operation,
                duration_ms,
            } => {
                write!(f, "GitHub API request '{operation}' timed out after {duration_ms}ms")
            }
            GitHubError::InvalidBaseUrl { url, message } => {
                write!(f, "Invalid GitHub API base URL '{url}': {message}")
            }
        }
    }
}

impl std::error::Error for GitHubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GitHubError::ApiError(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = GitHubError::Timeout {
            operation: "create_pull_request".to_string(),
            duration_ms: 30_000,
        };
        assert_eq!(
            err.to_string(),
            "GitHub API request 'create_pull_request' timed out after 30000ms"
        );
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_invalid_base_url_display() {
        let err = GitHubError::InvalidBaseUrl {
            url: "not a url".to_string(),
            message: "invalid uri character".to_string(),
        };
        assert!(err.to_string().contains("'not a url'"));
    }
}
