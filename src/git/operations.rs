use async_trait::async_trait;
use git2::{BranchType, ErrorCode, Repository, RepositoryState, Signature};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::types::{AcquireKind, BranchKind, CommitRef, GitIdentity, MergeOutcome};
use crate::external::{CommandError, CommandExecutor, CommandOutput};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("{path} exists but is not a usable git working copy")]
    RepositoryNotFound { path: String },
    #[error("Branch not found: {branch}")]
    BranchNotFound { branch: String },
    #[error("Reference not found: {reference}")]
    ReferenceNotFound { reference: String },
    #[error("Merge of {reference} was refused before it started: {message}")]
    MergeRefused { reference: String, message: String },
    #[error("`git {command}` failed: {message}")]
    CommandFailed { command: String, message: String },
    #[error("Command execution error: {source}")]
    Command {
        #[from]
        source: CommandError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("libgit2 error: {0}")]
    Libgit2(#[from] git2::Error),
}

/// Operations on one local working copy
///
/// Each implementation is bound to a single path for its whole lifetime.
/// Network-bound calls are async and time-limited; local queries are plain
/// synchronous calls.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RepositoryOperations: Send + Sync {
    /// Clone `url` if no working copy exists yet, otherwise pull the current branch
    async fn clone_or_update(&self, url: &str) -> Result<AcquireKind, GitError>;

    fn has_remote(&self, name: &str) -> Result<bool, GitError>;

    /// Returns `false` when a remote with that name already existed
    fn add_remote(&self, name: &str, url: &str) -> Result<bool, GitError>;

    async fn fetch(&self, remote: &str) -> Result<(), GitError>;

    async fn checkout(&self, branch: &str) -> Result<(), GitError>;

    fn current_branch(&self) -> Result<Option<String>, GitError>;

    fn resolve_ref(&self, reference: &str) -> Result<CommitRef, GitError>;

    /// Commits reachable from `include` but not from `exclude`, newest first
    fn list_commits_between(
        &self,
        exclude: &str,
        include: &str,
    ) -> Result<Vec<CommitRef>, GitError>;

    async fn merge(&self, reference: &str, allow_unrelated: bool)
        -> Result<MergeOutcome, GitError>;

    /// Restore the working tree to the pre-merge head. No-op when no merge is in progress.
    async fn abort_merge(&self) -> Result<(), GitError>;

    /// Record the conflicted working tree as a merge commit on a new branch
    ///
    /// The commit's parents are the current `HEAD` and `other_parent`. Neither
    /// `HEAD` nor the checked-out branch moves.
    async fn commit_conflict_snapshot(
        &self,
        branch: &str,
        other_parent: &CommitRef,
        message: &str,
    ) -> Result<CommitRef, GitError>;

    fn list_branches(&self, kind: BranchKind) -> Result<BTreeSet<String>, GitError>;

    async fn push(&self, remote: &str, refspec: &str) -> Result<(), GitError>;

    /// Idempotent; removing an absent remote succeeds
    fn remove_remote(&self, name: &str) -> Result<(), GitError>;

    fn delete_branch(&self, branch: &str) -> Result<(), GitError>;

    /// Move the checked-out branch and working tree back to `commit`
    async fn reset_to(&self, commit: &CommitRef) -> Result<(), GitError>;
}

/// Working copy driven by libgit2 for local queries and the `git` CLI for
/// network transfers and merges
pub struct GitWorkspace {
    path: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    identity: Option<GitIdentity>,
    network_timeout: Duration,
}

impl GitWorkspace {
    pub fn new<P: AsRef<Path>>(
        path: P,
        executor: Arc<dyn CommandExecutor>,
        identity: Option<GitIdentity>,
        network_timeout: Duration,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            executor,
            identity,
            network_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Repository, GitError> {
        Repository::open(&self.path).map_err(|_| GitError::RepositoryNotFound {
            path: self.path.display().to_string(),
        })
    }

    fn signature(&self, repo: &Repository) -> Result<Signature<'static>, GitError> {
        match &self.identity {
            Some(identity) => Ok(Signature::now(&identity.name, &identity.email)?),
            // Fall back to whatever the user's git config provides
            None => match repo.signature() {
                Ok(sig) => Ok(sig.to_owned()),
                Err(_) => Ok(Signature::now("merge-relay", "merge-relay@localhost")?),
            },
        }
    }

    /// Run git inside the working copy, returning raw output regardless of exit status
    async fn git_raw(
        &self,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, GitError> {
        let path = self.path.to_string_lossy().into_owned();
        let identity_args = self.identity.as_ref().map(|id| {
            [
                format!("user.name={}", id.name),
                format!("user.email={}", id.email),
            ]
        });

        let mut full_args: Vec<&str> = vec!["-C", path.as_str()];
        if let Some([name, email]) = &identity_args {
            full_args.extend(["-c", name.as_str(), "-c", email.as_str()]);
        }
        full_args.extend_from_slice(args);

        Ok(self.executor.execute("git", &full_args, timeout).await?)
    }

    /// Run git inside the working copy and fail on a non-zero exit
    async fn git(&self, args: &[&str], timeout: Option<Duration>) -> Result<String, GitError> {
        let output = self.git_raw(args, timeout).await?;
        if !output.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                message: output.combined(),
            });
        }
        Ok(output.stdout.trim().to_string())
    }

    fn needs_clone(&self) -> bool {
        if !self.path.exists() {
            return true;
        }
        // An empty directory is a valid clone destination
        std::fs::read_dir(&self.path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
    }

    fn conflicted_paths(repo: &Repository) -> Result<Vec<String>, GitError> {
        let index = repo.index()?;
        if !index.has_conflicts() {
            return Ok(Vec::new());
        }

        let mut paths = BTreeSet::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            if let Some(entry) = entry {
                paths.insert(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        Ok(paths.into_iter().collect())
    }
}

#[async_trait]
impl RepositoryOperations for GitWorkspace {
    async fn clone_or_update(&self, url: &str) -> Result<AcquireKind, GitError> {
        if self.needs_clone() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let path = self.path.to_string_lossy().into_owned();
            info!(url, path = %path, "cloning repository");
            let output = self
                .executor
                .execute("git", &["clone", url, &path], Some(self.network_timeout))
                .await?;
            if !output.success() {
                return Err(GitError::CommandFailed {
                    command: "clone".to_string(),
                    message: output.combined(),
                });
            }
            return Ok(AcquireKind::Cloned);
        }

        // Fail early on a directory that is not a repository
        let state = self.open()?.state();
        if state != RepositoryState::Clean {
            warn!(?state, "working copy was left mid-operation by an earlier run, resetting it");
            self.abort_merge().await?;
        }

        info!(path = %self.path.display(), "updating existing working copy");
        self.git(&["pull", "--ff-only", "--prune"], Some(self.network_timeout))
            .await?;
        Ok(AcquireKind::Updated)
    }

    fn has_remote(&self, name: &str) -> Result<bool, GitError> {
        let repo = self.open()?;
        let remotes = repo.remotes()?;
        Ok(remotes.iter().flatten().any(|remote| remote == name))
    }

    fn add_remote(&self, name: &str, url: &str) -> Result<bool, GitError> {
        let repo = self.open()?;

        let added = match repo.find_remote(name) {
            Ok(existing) => {
                if existing.url() != Some(url) {
                    warn!(
                        remote = name,
                        old_url = existing.url().unwrap_or_default(),
                        "remote already exists with a different URL, repointing it"
                    );
                    repo.remote_set_url(name, url)?;
                }
                Ok(false)
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                repo.remote(name, url)?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        };
        added
    }

    async fn fetch(&self, remote: &str) -> Result<(), GitError> {
        self.git(&["fetch", "--prune", remote], Some(self.network_timeout))
            .await?;
        Ok(())
    }

    async fn checkout(&self, branch: &str) -> Result<(), GitError> {
        match self.git(&["checkout", branch], None).await {
            Ok(_) => Ok(()),
            Err(GitError::CommandFailed { message, .. })
                if message.contains("did not match any")
                    || message.contains("invalid reference") =>
            {
                Err(GitError::BranchNotFound {
                    branch: branch.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn current_branch(&self) -> Result<Option<String>, GitError> {
        let repo = self.open()?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(str::to_string))
    }

    fn resolve_ref(&self, reference: &str) -> Result<CommitRef, GitError> {
        let repo = self.open()?;
        let object = repo
            .revparse_single(reference)
            .map_err(|_| GitError::ReferenceNotFound {
                reference: reference.to_string(),
            })?;
        let id = object.peel_to_commit()?.id();
        Ok(id.into())
    }

    fn list_commits_between(
        &self,
        exclude: &str,
        include: &str,
    ) -> Result<Vec<CommitRef>, GitError> {
        let repo = self.open()?;
        let include_oid = self.resolve_ref(include)?;
        let exclude_oid = self.resolve_ref(exclude)?;

        let mut revwalk = repo.revwalk()?;
        revwalk.push(git2::Oid::from_str(include_oid.as_str())?)?;
        revwalk.hide(git2::Oid::from_str(exclude_oid.as_str())?)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            commits.push(oid?.into());
        }
        Ok(commits)
    }

    async fn merge(
        &self,
        reference: &str,
        allow_unrelated: bool,
    ) -> Result<MergeOutcome, GitError> {
        let mut args = vec!["merge", "--no-edit"];
        if allow_unrelated {
            args.push("--allow-unrelated-histories");
        }
        args.push(reference);

        let output = self.git_raw(&args, None).await?;

        let repo = self.open()?;
        if output.success() {
            let head = repo.head()?.peel_to_commit()?.id();
            return Ok(MergeOutcome::Success {
                commit: head.into(),
            });
        }

        if repo.state() != RepositoryState::Merge {
            // Nothing was touched: dirty tree, overwritten untracked files, ...
            return Err(GitError::MergeRefused {
                reference: reference.to_string(),
                message: output.combined(),
            });
        }

        let conflicted_paths = Self::conflicted_paths(&repo)?;
        debug!(?conflicted_paths, "merge stopped with conflicts");
        Ok(MergeOutcome::Conflict {
            details: output.combined(),
            conflicted_paths,
        })
    }

    async fn abort_merge(&self) -> Result<(), GitError> {
        let state = self.open()?.state();
        if state == RepositoryState::Clean {
            return Ok(());
        }

        if let Err(e) = self.git(&["merge", "--abort"], None).await {
            warn!(error = %e, "merge --abort failed, falling back to a hard reset");
            self.git(&["reset", "--hard", "HEAD"], None).await?;
        }
        Ok(())
    }

    async fn commit_conflict_snapshot(
        &self,
        branch: &str,
        other_parent: &CommitRef,
        message: &str,
    ) -> Result<CommitRef, GitError> {
        // Stage everything, conflict markers included, so the index has no unmerged entries
        self.git(&["add", "--all"], None).await?;

        let repo = self.open()?;
        let tree_id = repo.index()?.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let head = repo.head()?.peel_to_commit()?;
        let other = repo.find_commit(git2::Oid::from_str(other_parent.as_str())?)?;
        let signature = self.signature(&repo)?;

        let commit_id = repo.commit(
            None,
            &signature,
            &signature,
            message,
            &tree,
            &[&head, &other],
        )?;
        let commit = repo.find_commit(commit_id)?;
        repo.branch(branch, &commit, false)?;

        Ok(commit_id.into())
    }

    fn list_branches(&self, kind: BranchKind) -> Result<BTreeSet<String>, GitError> {
        let repo = self.open()?;
        let branch_type = match kind {
            BranchKind::Local => BranchType::Local,
            BranchKind::Remote => BranchType::Remote,
        };

        let mut names = BTreeSet::new();
        for branch in repo.branches(Some(branch_type))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                // `origin/HEAD` is a symbolic alias, not a branch
                if !name.ends_with("/HEAD") {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names)
    }

    async fn push(&self, remote: &str, refspec: &str) -> Result<(), GitError> {
        self.git(&["push", remote, refspec], Some(self.network_timeout))
            .await?;
        Ok(())
    }

    fn remove_remote(&self, name: &str) -> Result<(), GitError> {
        let repo = self.open()?;
        match repo.remote_delete(name) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_branch(&self, branch: &str) -> Result<(), GitError> {
        let repo = self.open()?;
        let mut local = repo
            .find_branch(branch, BranchType::Local)
            .map_err(|_| GitError::BranchNotFound {
                branch: branch.to_string(),
            })?;
        local.delete()?;
        Ok(())
    }

    async fn reset_to(&self, commit: &CommitRef) -> Result<(), GitError> {
        self.git(&["reset", "--hard", commit.as_str()], None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ProcessCommandExecutor;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_repo() -> (TempDir, GitWorkspace) {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();

        let signature = Signature::now("Test", "test@example.com").unwrap();
        fs::write(temp_dir.path().join("README.md"), "hello\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();

        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            "Initial commit",
            &tree,
            &[],
        )
        .unwrap();

        let workspace = GitWorkspace::new(
            temp_dir.path(),
            Arc::new(ProcessCommandExecutor),
            Some(GitIdentity {
                name: "Test".to_string(),
                email: "test@example.com".to_string(),
            }),
            Duration::from_secs(30),
        );
        (temp_dir, workspace)
    }

    #[test]
    fn test_add_remote_is_idempotent() {
        let (_temp_dir, workspace) = create_test_repo();

        assert!(!workspace.has_remote("source_repo").unwrap());
        assert!(workspace
            .add_remote("source_repo", "https://github.com/owner/source.git")
            .unwrap());
        assert!(!workspace
            .add_remote("source_repo", "https://github.com/owner/source.git")
            .unwrap());
        assert!(workspace.has_remote("source_repo").unwrap());
    }

    #[test]
    fn test_add_remote_repoints_changed_url() {
        let (temp_dir, workspace) = create_test_repo();

        workspace
            .add_remote("source_repo", "https://github.com/owner/old.git")
            .unwrap();
        assert!(!workspace
            .add_remote("source_repo", "https://github.com/owner/new.git")
            .unwrap());

        let repo = Repository::open(temp_dir.path()).unwrap();
        let remote = repo.find_remote("source_repo").unwrap();
        assert_eq!(remote.url(), Some("https://github.com/owner/new.git"));
    }

    #[test]
    fn test_remove_remote_tolerates_missing_remote() {
        let (_temp_dir, workspace) = create_test_repo();

        workspace
            .add_remote("source_repo", "https://github.com/owner/source.git")
            .unwrap();
        workspace.remove_remote("source_repo").unwrap();
        assert!(!workspace.has_remote("source_repo").unwrap());

        assert!(workspace.remove_remote("source_repo").is_ok());
    }

    #[test]
    fn test_resolve_ref_and_empty_range() {
        let (_temp_dir, workspace) = create_test_repo();

        let head = workspace.resolve_ref("HEAD").unwrap();
        assert_eq!(head.as_str().len(), 40);
        assert!(workspace
            .list_commits_between("HEAD", "HEAD")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_resolve_missing_ref() {
        let (_temp_dir, workspace) = create_test_repo();

        let err = workspace.resolve_ref("source_repo/main").unwrap_err();
        assert!(matches!(err, GitError::ReferenceNotFound { .. }));
    }

    #[test]
    fn test_list_branches_and_delete() {
        let (temp_dir, workspace) = create_test_repo();
        let repo = Repository::open(temp_dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("merge-conflict-abcdef1", &head, false).unwrap();

        let branches = workspace.list_branches(BranchKind::Local).unwrap();
        assert!(branches.contains("merge-conflict-abcdef1"));
        assert!(workspace.list_branches(BranchKind::Remote).unwrap().is_empty());

        workspace.delete_branch("merge-conflict-abcdef1").unwrap();
        let branches = workspace.list_branches(BranchKind::Local).unwrap();
        assert!(!branches.contains("merge-conflict-abcdef1"));
    }

    #[test]
    fn test_current_branch() {
        let (temp_dir, workspace) = create_test_repo();
        let repo = Repository::open(temp_dir.path()).unwrap();
        let expected = repo.head().unwrap().shorthand().unwrap().to_string();

        assert_eq!(workspace.current_branch().unwrap(), Some(expected));
    }

    #[test]
    fn test_open_non_repository() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("file.txt"), "not a repo").unwrap();
        let workspace = GitWorkspace::new(
            temp_dir.path(),
            Arc::new(ProcessCommandExecutor),
            None,
            Duration::from_secs(30),
        );

        assert!(!workspace.needs_clone());
        assert!(matches!(
            workspace.has_remote("origin").unwrap_err(),
            GitError::RepositoryNotFound { .. }
        ));
    }

    #[test]
    fn test_needs_clone_for_missing_or_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        let missing = GitWorkspace::new(
            temp_dir.path().join("target_repo"),
            Arc::new(ProcessCommandExecutor),
            None,
            Duration::from_secs(30),
        );
        assert!(missing.needs_clone());

        let empty = GitWorkspace::new(
            temp_dir.path(),
            Arc::new(ProcessCommandExecutor),
            None,
            Duration::from_secs(30),
        );
        assert!(empty.needs_clone());
    }
}
