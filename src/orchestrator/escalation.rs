//! Conflict escalation: branch naming and the pull request handed to a human

use std::collections::BTreeSet;

use crate::git::CommitRef;
use crate::github::PullRequestDescriptor;

pub const CONFLICT_BRANCH_PREFIX: &str = "merge-conflict-";

/// Deterministic escalation branch for a given source head
pub fn conflict_branch_name(source_head: &CommitRef) -> String {
    format!("{CONFLICT_BRANCH_PREFIX}{}", source_head.short())
}

/// Escalation branches that exist locally or on `remote`
///
/// Yields `(branch, reference)` pairs, where `reference` is the local branch
/// or the `remote/branch` tracking ref to compare against the target.
pub fn conflict_branch_refs(
    local: &BTreeSet<String>,
    remote_tracking: &BTreeSet<String>,
    remote: &str,
) -> Vec<(String, String)> {
    let remote_prefix = format!("{remote}/");

    let local_refs = local
        .iter()
        .filter(|name| name.starts_with(CONFLICT_BRANCH_PREFIX))
        .map(|name| (name.clone(), name.clone()));
    let remote_refs = remote_tracking.iter().filter_map(|tracking| {
        tracking
            .strip_prefix(&remote_prefix)
            .filter(|name| name.starts_with(CONFLICT_BRANCH_PREFIX))
            .map(|name| (name.to_string(), tracking.clone()))
    });

    let mut refs: Vec<(String, String)> = local_refs.chain(remote_refs).collect();
    refs.sort();
    refs
}

/// Facts about a failed merge, rendered for the pull request and the snapshot commit
#[derive(Debug, Clone)]
pub struct ConflictReport<'a> {
    pub source_ref: &'a str,
    pub source_url: &'a str,
    pub source_head: &'a CommitRef,
    pub target_branch: &'a str,
    pub target_head: &'a CommitRef,
    pub details: &'a str,
    pub conflicted_paths: &'a [String],
}

impl ConflictReport<'_> {
    pub fn title(&self) -> String {
        format!("Merge conflict: {} into {}", self.source_ref, self.target_branch)
    }

    pub fn commit_message(&self) -> String {
        format!(
            "Conflicted merge of {} ({}) into {}\n\nConflict markers are committed on this branch for manual resolution.",
            self.source_ref,
            self.source_head.short(),
            self.target_branch
        )
    }

    pub fn pull_request(&self, branch: &str) -> PullRequestDescriptor {
        PullRequestDescriptor {
            title: self.title(),
            head: branch.to_string(),
            base: self.target_branch.to_string(),
            body: self.body(branch),
        }
    }

    fn body(&self, branch: &str) -> String {
        let mut body = String::new();

        body.push_str("## Automatic merge failed\n\n");
        body.push_str(&format!(
            "Merging `{}` ({}) at `{}` into `{}` at `{}` stopped with conflicts.\n\n",
            self.source_ref, self.source_url, self.source_head, self.target_branch, self.target_head
        ));
        body.push_str(&format!(
            "Branch `{branch}` holds the attempted merge with the conflict markers committed. \
             Resolve them on this branch, then merge this pull request. \
             `{}` itself was left untouched.\n\n",
            self.target_branch
        ));

        if !self.conflicted_paths.is_empty() {
            body.push_str("### Conflicted files\n\n");
            for path in self.conflicted_paths {
                body.push_str(&format!("- `{path}`\n"));
            }
            body.push('\n');
        }

        body.push_str("### Merge output\n\n");
        let fence = code_fence_for(self.details);
        body.push_str(&format!("{fence}text\n{}\n{fence}\n", self.details));

        body
    }
}

/// A backtick fence longer than any backtick run inside `text`
fn code_fence_for(text: &str) -> String {
    let longest_run = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest_run.max(2) + 1)
}
