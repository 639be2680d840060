//! Source-control adapters.
//!
//! The graph core never talks to an SCM itself; it consumes a
//! [`CommitFeed`] of already-resolved path operations and a
//! [`crate::diff::DiffProvider`] for content. The `git` module adapts a
//! local git repository to both seams.

pub mod git;

pub use git::{GitCommitFeed, GitDiffProvider, GitHistorySource};

use crate::history::CommitChange;

/// Per-commit feed of path operations, oldest to newest, items path-sorted
/// within each commit.
pub trait CommitFeed {
    /// The next commit, or `None` once the feed is exhausted.
    fn next_commit(&mut self) -> anyhow::Result<Option<CommitChange>>;
}

/// Feeds a fixed list of commits; handy for building graphs in memory.
pub struct VecFeed {
    commits: std::vec::IntoIter<CommitChange>,
}

impl VecFeed {
    pub fn new(commits: Vec<CommitChange>) -> Self {
        Self {
            commits: commits.into_iter(),
        }
    }
}

impl CommitFeed for VecFeed {
    fn next_commit(&mut self) -> anyhow::Result<Option<CommitChange>> {
        Ok(self.commits.next())
    }
}
