use serde::{Deserialize, Serialize};
use std::fmt;

/// Full hash of a commit. Compared for equality, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in branch names and log lines
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(7) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<git2::Oid> for CommitRef {
    fn from(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }
}

/// Result of asking the merge tool to combine two histories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Success {
        commit: CommitRef,
    },
    Conflict {
        /// Diagnostic text from the merge tool, verbatim
        details: String,
        conflicted_paths: Vec<String>,
    },
}

/// Author/committer identity applied to commits this tool creates
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl fmt::Debug for GitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireKind {
    /// No working copy existed; a fresh clone was made
    Cloned,
    /// An existing working copy was pulled from its upstream
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Local,
    /// Remote-tracking branches, named `<remote>/<branch>`
    Remote,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash() {
        let commit = CommitRef::new("abcdef1234567890");
        assert_eq!(commit.short(), "abcdef1");
        assert_eq!(commit.to_string(), "abcdef1234567890");
    }

    #[test]
    fn test_short_hash_of_short_input() {
        assert_eq!(CommitRef::new("abc").short(), "abc");
        assert_eq!(CommitRef::new("").short(), "");
        assert_eq!(CommitRef::new("abcdef1").short(), "abcdef1");
    }

    #[test]
    fn test_from_oid() {
        let oid = git2::Oid::from_str("0123456789abcdef0123456789abcdef01234567").unwrap();
        let commit = CommitRef::from(oid);
        assert_eq!(commit.as_str(), "0123456789abcdef0123456789abcdef01234567");
        assert_eq!(commit.short(), "0123456");
    }
}
