use std::collections::BTreeSet;
use tracing::{error, info, warn, Instrument};

use super::errors::RelayError;
use super::escalation::{conflict_branch_refs, conflict_branch_name, ConflictReport};
use super::state::{RunOutcome, RunState};
use crate::config::{ExistingConflictPolicy, MergeSettings};
use crate::git::{BranchKind, CommitRef, MergeOutcome, RepositoryOperations};
use crate::github::{CreatedPullRequest, PullRequestCreator};
use crate::telemetry::{create_run_span, generate_correlation_id};

/// Remote the target working copy was cloned from
pub const ORIGIN: &str = "origin";

/// Drives one merge of the source branch into the target branch
///
/// Owns the working copy and the hosting API client for the duration of a
/// run. Runs are sequential; callers serialize runs on the same working copy
/// (see [`crate::lock::WorkspaceLock`]).
pub struct MergeOrchestrator<R, P> {
    settings: MergeSettings,
    repo: R,
    pulls: P,
    state: RunState,
    history: Vec<RunState>,
}

impl<R, P> MergeOrchestrator<R, P>
where
    R: RepositoryOperations,
    P: PullRequestCreator,
{
    pub fn new(settings: MergeSettings, repo: R, pulls: P) -> Self {
        Self {
            settings,
            repo,
            pulls,
            state: RunState::Start,
            history: vec![RunState::Start],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state this run has passed through, starting with `Start`
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub async fn run(&mut self) -> Result<RunOutcome, RelayError> {
        let span = create_run_span(
            &generate_correlation_id(),
            &self.settings.target_branch,
            &self.settings.source_tracking_ref(),
        );

        async {
            if self.settings.identity.is_none() {
                warn!("GIT_USER_NAME/GIT_USER_EMAIL not set; merge commits use the working copy's git identity");
            }

            let result = self.execute().await;
            match &result {
                Ok(outcome) => info!(%outcome, "run finished"),
                Err(e) => {
                    self.transition(RunState::Fatal);
                    error!(error = %e, "run failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    fn transition(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "unexpected state transition");
        }
        info!(from = %self.state, to = %next, "state transition");
        self.state = next;
        self.history.push(next);
    }

    async fn execute(&mut self) -> Result<RunOutcome, RelayError> {
        let target_branch = self.settings.target_branch.clone();
        let remote = self.settings.source_remote_name.clone();
        let source_ref = self.settings.source_tracking_ref();

        // Failures up to the merge attempt abort without cleanup; an existing
        // remote link is reused by the next run.
        let acquired = self
            .repo
            .clone_or_update(&self.settings.target_repo_url)
            .await
            .map_err(RelayError::access("acquire the target repository"))?;
        info!(
            kind = ?acquired,
            path = %self.settings.target_repo_path.display(),
            "target repository ready"
        );
        self.transition(RunState::Cloned);

        let added = self
            .repo
            .add_remote(&remote, &self.settings.source_repo_url)
            .map_err(RelayError::access("link the source repository"))?;
        if added {
            info!(remote = %remote, "added source repository as remote");
        } else {
            info!(remote = %remote, "source remote already present, reusing it");
        }
        self.repo
            .fetch(&remote)
            .await
            .map_err(RelayError::access("fetch the source repository"))?;
        self.transition(RunState::Linked);

        self.repo
            .checkout(&target_branch)
            .await
            .map_err(RelayError::access("check out the target branch"))?;
        self.transition(RunState::BranchChecked);

        let source_head = self
            .repo
            .resolve_ref(&source_ref)
            .map_err(RelayError::access("resolve the source branch"))?;
        let unseen = self
            .repo
            .list_commits_between(&target_branch, &source_ref)
            .map_err(RelayError::access("compare source and target history"))?;

        if unseen.is_empty() {
            info!(source_head = %source_head.short(), "source branch already merged, nothing to do");
            self.cleanup();
            self.transition(RunState::NoChanges);
            return Ok(RunOutcome::NoChanges { source_head });
        }
        info!(
            commits = unseen.len(),
            source_head = %source_head.short(),
            "source branch has commits the target has not seen"
        );

        let conflict_branch = conflict_branch_name(&source_head);
        let pending = self.unresolved_conflict_branches(&target_branch)?;
        if !pending.is_empty() {
            match self.settings.existing_conflict_policy {
                ExistingConflictPolicy::Abort => {
                    return Err(RelayError::ConflictBranchPending {
                        branches: pending.into_iter().collect(),
                    });
                }
                ExistingConflictPolicy::Ignore => {
                    warn!(?pending, "unresolved merge conflict branches exist, continuing anyway");
                }
            }
        }
        let already_escalated = pending.contains(&conflict_branch);

        let target_head = self
            .repo
            .resolve_ref("HEAD")
            .map_err(RelayError::access("resolve the target branch"))?;

        let outcome = match self.repo.merge(&source_ref, true).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.cleanup();
                return Err(RelayError::access("merge the source branch")(e));
            }
        };

        match outcome {
            MergeOutcome::Success { commit } => {
                info!(commit = %commit.short(), "merged source into target");
                self.transition(RunState::Merged);

                let pushed = self.push_target(&target_branch, &target_head).await;
                self.cleanup();
                pushed?;

                self.transition(RunState::Pushed);
                Ok(RunOutcome::Merged { commit })
            }
            MergeOutcome::Conflict {
                details,
                conflicted_paths,
            } => {
                warn!(?conflicted_paths, "merge stopped with conflicts");
                self.transition(RunState::Conflicted);

                let escalated = if already_escalated {
                    self.skip_repeat_escalation(&conflict_branch).await
                } else {
                    let report = ConflictReport {
                        source_ref: &source_ref,
                        source_url: &self.settings.source_repo_url,
                        source_head: &source_head,
                        target_branch: &target_branch,
                        target_head: &target_head,
                        details: &details,
                        conflicted_paths: &conflicted_paths,
                    };
                    self.escalate(&conflict_branch, &report)
                        .await
                        .map(|pull_request| RunOutcome::Escalated {
                            branch: conflict_branch.clone(),
                            pull_request,
                        })
                };
                self.cleanup();
                let escalated = escalated?;

                self.transition(RunState::Escalated);
                Ok(escalated)
            }
        }
    }

    /// Escalation branches not yet merged into the target branch
    fn unresolved_conflict_branches(
        &self,
        target_branch: &str,
    ) -> Result<BTreeSet<String>, RelayError> {
        let local = self
            .repo
            .list_branches(BranchKind::Local)
            .map_err(RelayError::access("list local branches"))?;
        let remote_tracking = self
            .repo
            .list_branches(BranchKind::Remote)
            .map_err(RelayError::access("list remote branches"))?;

        let mut unresolved = BTreeSet::new();
        for (branch, reference) in conflict_branch_refs(&local, &remote_tracking, ORIGIN) {
            let unmerged = self
                .repo
                .list_commits_between(target_branch, &reference)
                .map_err(RelayError::access("inspect an existing conflict branch"))?;
            if !unmerged.is_empty() {
                unresolved.insert(branch);
            }
        }
        Ok(unresolved)
    }

    async fn push_target(
        &self,
        target_branch: &str,
        previous_head: &CommitRef,
    ) -> Result<(), RelayError> {
        let refspec = format!("refs/heads/{target_branch}:refs/heads/{target_branch}");

        match self.repo.push(ORIGIN, &refspec).await {
            Ok(()) => {
                info!(branch = target_branch, "pushed merged target branch");
                Ok(())
            }
            Err(e) => {
                // Drop the unpublished merge so the next run's pull starts clean
                if let Err(reset) = self.repo.reset_to(previous_head).await {
                    warn!(error = %reset, "could not roll back the unpushed merge");
                }
                Err(RelayError::access("push the target branch")(e))
            }
        }
    }

    async fn escalate(
        &self,
        branch: &str,
        report: &ConflictReport<'_>,
    ) -> Result<CreatedPullRequest, RelayError> {
        let snapshot = self
            .repo
            .commit_conflict_snapshot(branch, report.source_head, &report.commit_message())
            .await;
        // The target branch never keeps conflict markers, whatever happened above
        let restored = self.repo.abort_merge().await;

        let snapshot = snapshot.map_err(RelayError::escalation("record the conflicted merge"))?;
        restored.map_err(RelayError::escalation("restore the target branch"))?;
        info!(branch, commit = %snapshot.short(), "recorded conflicted merge");

        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.repo
            .push(ORIGIN, &refspec)
            .await
            .map_err(RelayError::escalation("push the conflict branch"))?;
        info!(branch, "pushed conflict branch");

        // The remote-tracking ref now marks the escalation as pending
        if let Err(e) = self.repo.delete_branch(branch) {
            warn!(branch, error = %e, "could not delete local conflict branch");
        }

        let pull_request = self
            .pulls
            .create_pull_request(&self.settings.target_slug, &report.pull_request(branch))
            .await
            .map_err(RelayError::escalation("open the pull request"))?;

        Ok(pull_request)
    }

    async fn skip_repeat_escalation(&self, branch: &str) -> Result<RunOutcome, RelayError> {
        info!(branch, "conflict already escalated for this source head, not opening another pull request");
        self.repo
            .abort_merge()
            .await
            .map_err(RelayError::escalation("restore the target branch"))?;
        Ok(RunOutcome::AlreadyEscalated {
            branch: branch.to_string(),
        })
    }

    /// Remove the source remote. Never fails the run.
    fn cleanup(&self) {
        let remote = &self.settings.source_remote_name;
        match self.repo.remove_remote(remote) {
            Ok(()) => info!(remote = %remote, "removed source remote"),
            Err(e) => warn!(
                remote = %remote,
                error = %e,
                "failed to remove source remote; the next run will reuse it"
            ),
        }
    }
}
