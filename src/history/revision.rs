//! Identity keys for versioned files.
//!
//! A [`RevisionedFile`] pins down "this path, at this revision, in this
//! repository". Revisions form a partial order: repository revisions are
//! totally ordered by id, the working-copy revision and the unknown revision
//! compare only to themselves.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Opaque repository key. Two graphs describe the same repository iff their
/// ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(String);

impl RepositoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepositoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RepositoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A point in a repository's revision sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Revision {
    /// A committed revision. Ids are totally ordered within one repository.
    Repository(u64),
    /// The uncommitted working copy. Always newest; equal only to itself.
    Working,
    /// Revision could not be determined. Equal only to itself.
    Unknown,
}

impl Revision {
    /// Sort key for forward ("at or after") lookups. Working-copy revisions
    /// sort as +inf; unknown revisions do not participate.
    pub(crate) fn forward_key(self) -> Option<u64> {
        match self {
            Revision::Repository(id) => Some(id),
            Revision::Working => Some(u64::MAX),
            Revision::Unknown => None,
        }
    }

    /// Sort key for backward ("strictly before") lookups. A working-copy
    /// node is never historical ancestor material, so only committed
    /// revisions participate.
    pub(crate) fn backward_key(self) -> Option<u64> {
        match self {
            Revision::Repository(id) => Some(id),
            Revision::Working | Revision::Unknown => None,
        }
    }

    pub fn is_working(self) -> bool {
        matches!(self, Revision::Working)
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Revision) -> Option<Ordering> {
        match (self, other) {
            (Revision::Repository(a), Revision::Repository(b)) => Some(a.cmp(b)),
            (Revision::Working, Revision::Working) => Some(Ordering::Equal),
            (Revision::Unknown, Revision::Unknown) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Repository(id) => write!(f, "r{id}"),
            Revision::Working => f.write_str("working"),
            Revision::Unknown => f.write_str("unknown"),
        }
    }
}

/// Immutable identity of one file version: (path, revision, repository).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionedFile {
    pub repository: RepositoryId,
    pub path: String,
    pub revision: Revision,
}

impl RevisionedFile {
    pub fn new(
        repository: impl Into<RepositoryId>,
        path: impl Into<String>,
        revision: Revision,
    ) -> Self {
        Self {
            repository: repository.into(),
            path: path.into(),
            revision,
        }
    }

    /// Partial order over file identities: comparable only within one
    /// repository, then by revision. Not a `PartialOrd` impl because two
    /// distinct paths at the same revision order as equal, which would
    /// contradict `Eq`.
    pub fn history_order(&self, other: &RevisionedFile) -> Option<Ordering> {
        if self.repository != other.repository {
            return None;
        }
        self.revision.partial_cmp(&other.revision)
    }
}

impl fmt::Display for RevisionedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.revision)
    }
}
