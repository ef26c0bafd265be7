//! Git operations module
//!
//! Trait-based interface over one local working copy. Local typed queries
//! (remotes, refs, branch lists, conflicted paths) use libgit2 bindings; clone,
//! pull, fetch, push and merge go through the `git` CLI so credential helpers
//! apply and the merge tool's own diagnostics are preserved.

pub mod operations;
pub mod types;
pub mod url;

pub use operations::{GitError, GitWorkspace, RepositoryOperations};
pub use types::{AcquireKind, BranchKind, CommitRef, GitIdentity, MergeOutcome};
pub use url::RepoSlug;

#[cfg(any(test, feature = "testing"))]
pub use operations::MockRepositoryOperations;
