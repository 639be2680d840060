//! File-history nodes and their lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::revision::RevisionedFile;

/// Lifecycle state of a file-history node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Provisional node synthesized as a copy source or flow start that no
    /// commit has confirmed yet.
    Unconfirmed,
    /// First appearance of an identity chain at its path.
    Added,
    /// A confirmed content edit of an earlier node.
    Changed,
    /// The identity chain ended at this node's path.
    Deleted,
    /// An addition at a path whose previous occupant was deleted. Carries no
    /// content continuity with the deleted chain.
    Replaced,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Unconfirmed => "unconfirmed",
            NodeKind::Added => "added",
            NodeKind::Changed => "changed",
            NodeKind::Deleted => "deleted",
            NodeKind::Replaced => "replaced",
        };
        f.write_str(s)
    }
}

/// The closed transition table for node retyping. Anything not listed is a
/// contract violation in the commit feed or the integration algorithm.
pub fn is_legal_transition(from: NodeKind, to: NodeKind) -> bool {
    use NodeKind::*;
    matches!(
        (from, to),
        (Unconfirmed, Changed)
            | (Unconfirmed, Deleted)
            | (Added, Deleted)
            | (Changed, Deleted)
            | (Replaced, Deleted)
            | (Deleted, Replaced)
    )
}

/// A vertex in the file-history graph: one file identity plus its lifecycle
/// state. Incident edges live in the owning graph's arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHistoryNode {
    pub(crate) file: RevisionedFile,
    pub(crate) kind: NodeKind,
}

impl FileHistoryNode {
    pub(crate) fn new(file: RevisionedFile, kind: NodeKind) -> Self {
        Self { file, kind }
    }

    pub fn file(&self) -> &RevisionedFile {
        &self.file
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_deleted(&self) -> bool {
        self.kind == NodeKind::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NodeKind::*;

    #[test]
    fn confirmation_only_from_unconfirmed() {
        assert!(is_legal_transition(Unconfirmed, Changed));
        assert!(!is_legal_transition(Added, Changed));
        assert!(!is_legal_transition(Deleted, Changed));
        assert!(!is_legal_transition(Replaced, Changed));
    }

    #[test]
    fn replacement_only_from_deleted() {
        assert!(is_legal_transition(Deleted, Replaced));
        assert!(!is_legal_transition(Added, Replaced));
        assert!(!is_legal_transition(Changed, Replaced));
        assert!(!is_legal_transition(Unconfirmed, Replaced));
    }

    #[test]
    fn live_states_can_be_deleted_once() {
        for from in [Unconfirmed, Added, Changed, Replaced] {
            assert!(is_legal_transition(from, Deleted), "{from} -> deleted");
        }
        assert!(!is_legal_transition(Deleted, Deleted));
    }

    #[test]
    fn no_self_transitions() {
        for kind in [Unconfirmed, Added, Changed, Deleted, Replaced] {
            assert!(!is_legal_transition(kind, kind));
        }
    }
}
