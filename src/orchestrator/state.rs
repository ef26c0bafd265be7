use std::fmt;

use crate::git::CommitRef;
use crate::github::CreatedPullRequest;

/// Where a run currently stands
///
/// ```text
/// Start → Cloned → Linked → BranchChecked → NoChanges
///                                         → Merged → Pushed
///                                         → Conflicted → Escalated
/// (any non-terminal state) → Fatal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    Cloned,
    Linked,
    BranchChecked,
    NoChanges,
    Merged,
    Pushed,
    Conflicted,
    Escalated,
    Fatal,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::NoChanges | RunState::Pushed | RunState::Escalated | RunState::Fatal
        )
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;

        match (self, next) {
            (Start, Cloned) | (Cloned, Linked) | (Linked, BranchChecked) => true,
            (BranchChecked, NoChanges | Merged | Conflicted) => true,
            (Merged, Pushed) | (Conflicted, Escalated) => true,
            // A failed push or escalation still ends the run
            (state, Fatal) => !state.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The source head was already part of the target branch
    NoChanges { source_head: CommitRef },
    /// The merge succeeded and the target branch was pushed
    Merged { commit: CommitRef },
    /// The merge conflicted; a branch was pushed and a pull request opened
    Escalated {
        branch: String,
        pull_request: CreatedPullRequest,
    },
    /// The merge conflicted again on a head that was already escalated
    AlreadyEscalated { branch: String },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::NoChanges { source_head } => {
                write!(f, "nothing to do: {} is already merged", source_head.short())
            }
            RunOutcome::Merged { commit } => write!(f, "merged and pushed {}", commit.short()),
            RunOutcome::Escalated {
                branch,
                pull_request,
            } => write!(
                f,
                "merge conflict escalated on {branch}: pull request #{} {}",
                pull_request.number, pull_request.html_url
            ),
            RunOutcome::AlreadyEscalated { branch } => {
                write!(f, "merge conflict already escalated on {branch}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RunState::*;
    use super::*;

    #[test]
    fn test_happy_paths_are_allowed() {
        let merged = [Start, Cloned, Linked, BranchChecked, Merged, Pushed];
        let escalated = [Start, Cloned, Linked, BranchChecked, Conflicted, Escalated];
        let no_op = [Start, Cloned, Linked, BranchChecked, NoChanges];

        for path in [&merged[..], &escalated[..], &no_op[..]] {
            for pair in path.windows(2) {
                assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
            }
            assert!(path.last().unwrap().is_terminal());
        }
    }

    #[test]
    fn test_skipping_steps_is_rejected() {
        assert!(!Start.can_transition_to(Linked));
        assert!(!Cloned.can_transition_to(BranchChecked));
        assert!(!Linked.can_transition_to(Merged));
        assert!(!Merged.can_transition_to(Escalated));
        assert!(!Conflicted.can_transition_to(Pushed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [NoChanges, Pushed, Escalated, Fatal] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Fatal));
            assert!(!terminal.can_transition_to(Start));
        }
    }

    #[test]
    fn test_any_live_state_can_fail() {
        for state in [Start, Cloned, Linked, BranchChecked, Merged, Conflicted] {
            assert!(state.can_transition_to(Fatal));
        }
    }

    #[test]
    fn test_outcome_display() {
        let outcome = RunOutcome::NoChanges {
            source_head: CommitRef::new("abcdef1234567890"),
        };
        assert_eq!(outcome.to_string(), "nothing to do: abcdef1 is already merged");

        let outcome = RunOutcome::Escalated {
            branch: "merge-conflict-abcdef1".to_string(),
            pull_request: CreatedPullRequest {
                number: 7,
                html_url: "https://github.com/acme/target/pull/7".to_string(),
            },
        };
        assert_eq!(
            outcome.to_string(),
            "merge conflict escalated on merge-conflict-abcdef1: pull request #7 https://github.com/acme/target/pull/7"
        );
    }
}
