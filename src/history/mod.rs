//! File-history graph: nodes, edges, commit integration and snapshots.
//!
//! The graph absorbs commit-level path operations (add/delete/change/copy)
//! into a persistent forest of file-identity nodes and answers
//! ancestor/descendant queries over it. See `overlay` for the remote+local
//! composition and `trace` for fragment projection.

pub mod edge;
pub mod graph;
pub mod integrate;
pub mod node;
pub mod revision;
pub mod snapshot;
pub mod view;

pub use edge::{EdgeKind, FileHistoryEdge};
pub use graph::FileHistoryGraph;
pub use integrate::{ChangeItem, CommitChange, CopySource};
pub use node::{is_legal_transition, FileHistoryNode, NodeKind};
pub use revision::{RepositoryId, Revision, RevisionedFile};
pub use snapshot::{GraphSnapshot, SNAPSHOT_VERSION};
pub use view::{EdgeView, HistoryView, NodeSummary};

use thiserror::Error;

/// Errors raised by graph construction and traversal.
///
/// Contract violations mean the commit feed and the graph have diverged;
/// they are fatal for the running build pass and must not be swallowed. A
/// lookup that finds nothing is *not* an error; those return `Option`.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("node already tracked for {path}@{revision}")]
    DuplicateIdentity { path: String, revision: Revision },

    #[error("no tracked node for {path} before {revision}")]
    UntrackedPath { path: String, revision: Revision },

    #[error("illegal node transition {from} -> {to} for {path}")]
    IllegalTransition {
        from: NodeKind,
        to: NodeKind,
        path: String,
    },

    #[error("copy deferral stalled at r{revision}: {remaining} entries cannot be attached")]
    DeferralStalled { revision: u64, remaining: usize },

    #[error("unsupported snapshot version {0}")]
    SnapshotVersion(u32),

    #[error("snapshot is corrupt: {0}")]
    SnapshotCorrupt(String),

    #[error("history operation canceled")]
    Canceled,
}

pub type HistoryResult<T> = Result<T, HistoryError>;
