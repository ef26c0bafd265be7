pub mod client;
pub mod errors;
pub mod pulls;

pub use client::GitHubClient;
pub use errors::GitHubError;
pub use pulls::{CreatedPullRequest, PullRequestCreator, PullRequestDescriptor};

#[cfg(any(test, feature = "testing"))]
pub use pulls::MockPullRequestCreator;
