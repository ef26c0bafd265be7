// Merge Relay Library - merges a source repository branch into a target
// repository and escalates conflicts as pull requests

pub mod config;
pub mod external;
pub mod git;
pub mod github;
pub mod lock;
pub mod orchestrator;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{ConfigError, ExistingConflictPolicy, LogFormat, MergeSettings};
pub use external::{CommandExecutor, ProcessCommandExecutor};
pub use git::{CommitRef, GitError, GitWorkspace, MergeOutcome, RepoSlug, RepositoryOperations};
pub use github::{GitHubClient, GitHubError, PullRequestCreator};
pub use lock::{LockError, WorkspaceLock};
pub use orchestrator::{MergeOrchestrator, RelayError, RunOutcome, RunState};
pub use telemetry::{create_run_span, generate_correlation_id, init_telemetry};
