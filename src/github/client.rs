use octocrab::Octocrab;
use std::time::Duration;
use tracing::debug;

use super::errors::GitHubError;

/// Authenticated handle on the hosting API
#[derive(Debug, Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
    timeout: Duration,
}

impl GitHubClient {
    /// Build a client from a personal access token
    ///
    /// `api_base` overrides `https://api.github.com` for GitHub Enterprise or a
    /// local test server.
    pub fn new(token: &str, api_base: Option<&str>, timeout: Duration) -> Result<Self, GitHubError> {
        let mut builder = Octocrab::builder().personal_token(token.to_string());

        if let Some(base) = api_base {
            debug!(api_base = base, "using custom GitHub API base URL");
            builder = builder
                .base_uri(base)
                .map_err(|e| GitHubError::InvalidBaseUrl {
                    url: base.to_string(),
                    message: e.to_string(),
                })?;
        }

        Ok(GitHubClient {
            octocrab: builder.build()?,
            timeout,
        })
    }

    pub(crate) fn octocrab(&self) -> &Octocrab {
        &self.octocrab
    }

    /// Run an API call under the configured request timeout
    pub(crate) async fn with_timeout<T, F>(&self, operation: &str, call: F) -> Result<T, GitHubError>
    where
        F: std::future::Future<Output = Result<T, octocrab::Error>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GitHubError::Timeout {
                operation: operation.to_string(),
                duration_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_accepts_custom_base_url() {
        let client = GitHubClient::new(
            "test-token",
            Some("http://127.0.0.1:9/"),
            Duration::from_secs(5),
        );
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_client_rejects_invalid_base_url() {
        let err = GitHubClient::new("test-token", Some("not a url"), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, GitHubError::InvalidBaseUrl { .. }));
    }

    #[tokio::test]
    async fn test_with_timeout_reports_operation() {
        let client = GitHubClient::new("test-token", None, Duration::from_millis(20)).unwrap();
        let result: Result<(), GitHubError> = client
            .with_timeout("slow_call", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(GitHubError::Timeout {
                operation,
                duration_ms,
            }) => {
                assert_eq!(operation, "slow_call");
                assert_eq!(duration_ms, 20);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
