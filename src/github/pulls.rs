use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::{client::GitHubClient, errors::GitHubError};
use crate::git::RepoSlug;

/// Everything the hosting API needs to open a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestDescriptor {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedPullRequest {
    pub number: u64,
    pub html_url: String,
}

/// Seam over pull request creation so the workflow can run against a mock
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PullRequestCreator: Send + Sync {
    async fn create_pull_request(
        &self,
        repo: &RepoSlug,
        descriptor: &PullRequestDescriptor,
    ) -> Result<CreatedPullRequest, GitHubError>;
}

#[async_trait]
impl PullRequestCreator for GitHubClient {
    async fn create_pull_request(
        &self,
        repo: &RepoSlug,
        descriptor: &PullRequestDescriptor,
    ) -> Result<CreatedPullRequest, GitHubError> {
        let route = format!("/repos/{}/{}/pulls", repo.owner, repo.repo);

        let pr: CreatedPullRequest = self
            .with_timeout(
                "create_pull_request",
                self.octocrab().post(route, Some(descriptor)),
            )
            .await?;

        info!(
            pr.number = pr.number,
            pr.url = %pr.html_url,
            head = %descriptor.head,
            base = %descriptor.base,
            "created pull request"
        );
        Ok(pr)
    }
}
