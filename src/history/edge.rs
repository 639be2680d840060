//! Typed relations between file-history nodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

use super::revision::RevisionedFile;
use crate::diff::{DiffProvider, FileDiff};

/// Kind of relation an edge records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Content edit at the same path.
    Normal,
    /// The descendant was copied from the ancestor.
    Copy,
    /// A copy edge one of whose endpoints was later deleted. Retained so
    /// tracing can still cross it.
    CopyDeleted,
}

impl EdgeKind {
    pub fn is_copy(self) -> bool {
        matches!(self, EdgeKind::Copy | EdgeKind::CopyDeleted)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Normal => "normal",
            EdgeKind::Copy => "copy",
            EdgeKind::CopyDeleted => "copy-deleted",
        };
        f.write_str(s)
    }
}

/// A directed relation between two nodes in the arena, carrying its diff as
/// a compute-once memo. The edge itself stays immutable after the diff is
/// first materialized; only the owning graph may retype `kind`.
#[derive(Debug, Clone)]
pub struct FileHistoryEdge {
    pub(crate) kind: EdgeKind,
    pub(crate) diff: OnceLock<FileDiff>,
}

impl FileHistoryEdge {
    pub(crate) fn new(kind: EdgeKind) -> Self {
        Self {
            kind,
            diff: OnceLock::new(),
        }
    }

    /// Restores an edge with an already-materialized diff (snapshot load).
    pub(crate) fn with_diff(kind: EdgeKind, diff: Option<FileDiff>) -> Self {
        let cell = OnceLock::new();
        if let Some(d) = diff {
            let _ = cell.set(d);
        }
        Self { kind, diff: cell }
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    /// The diff already computed for this edge, if any.
    pub fn materialized_diff(&self) -> Option<&FileDiff> {
        self.diff.get()
    }

    /// Computes the diff on first access and memoizes it. A provider failure
    /// degrades this edge to a binary diff rather than propagating: one bad
    /// diff must not fail a whole integration or trace.
    pub fn diff(
        &self,
        ancestor: &RevisionedFile,
        descendant: &RevisionedFile,
        provider: &dyn DiffProvider,
    ) -> &FileDiff {
        self.diff.get_or_init(|| match provider.diff(ancestor, descendant) {
            Ok(diff) => diff,
            Err(err) => {
                warn!(
                    ancestor = %ancestor,
                    descendant = %descendant,
                    error = %err,
                    "diff computation failed; treating edge as binary"
                );
                FileDiff::Binary
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Hunk;
    use crate::history::Revision;

    struct FixedDiff(FileDiff);

    impl DiffProvider for FixedDiff {
        fn diff(&self, _: &RevisionedFile, _: &RevisionedFile) -> anyhow::Result<FileDiff> {
            Ok(self.0.clone())
        }
    }

    struct FailingDiff;

    impl DiffProvider for FailingDiff {
        fn diff(&self, _: &RevisionedFile, _: &RevisionedFile) -> anyhow::Result<FileDiff> {
            anyhow::bail!("content unavailable")
        }
    }

    fn files() -> (RevisionedFile, RevisionedFile) {
        (
            RevisionedFile::new("repo", "/a.txt", Revision::Repository(1)),
            RevisionedFile::new("repo", "/a.txt", Revision::Repository(2)),
        )
    }

    #[test]
    fn diff_is_computed_once() {
        let (a, b) = files();
        let edge = FileHistoryEdge::new(EdgeKind::Normal);
        let text = FileDiff::Text {
            hunks: vec![Hunk {
                old_start: 1,
                old_lines: 1,
                new_start: 1,
                new_lines: 2,
            }],
        };
        assert_eq!(edge.diff(&a, &b, &FixedDiff(text.clone())), &text);
        // Second provider is never consulted; the memo wins.
        assert_eq!(edge.diff(&a, &b, &FailingDiff), &text);
    }

    #[test]
    fn provider_failure_degrades_to_binary() {
        let (a, b) = files();
        let edge = FileHistoryEdge::new(EdgeKind::Normal);
        assert_eq!(edge.diff(&a, &b, &FailingDiff), &FileDiff::Binary);
    }
}
