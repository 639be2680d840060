//! Lineage - file-history tracking for code review
//!
//! Tracks the identity of versioned files (and the text fragments inside
//! them) across a repository's history of additions, deletions, renames and
//! copies, so a review tool can answer "what did this code look like
//! earlier" and "where did this code move to".
//!
//! The pieces, leaf first:
//!
//! - [`history`]: the file-history graph: identity keys, typed nodes and
//!   edges, commit integration with copy deferral, and a versioned
//!   snapshot for external persistence.
//! - [`overlay`]: the virtual merge layer composing a committed (remote)
//!   graph with a swappable uncommitted (local) graph.
//! - [`trace`]: the fragment tracer projecting line ranges forward along
//!   diff edges.
//! - [`diff`]: the hunk model and the injected diff-computation seam.
//! - [`registry`]: per-session repository registry and build discipline.
//! - [`scm`]: the commit-feed seam plus a git adapter.

pub mod cancel;
pub mod diff;
pub mod history;
pub mod overlay;
pub mod registry;
pub mod scm;
pub mod trace;

pub use cancel::CancelToken;
pub use diff::{DiffLimits, DiffProvider, FileDiff, Hunk};
pub use history::{
    ChangeItem, CommitChange, EdgeKind, FileHistoryGraph, GraphSnapshot, HistoryError,
    HistoryView, NodeKind, RepositoryId, Revision, RevisionedFile,
};
pub use overlay::VirtualFileHistoryGraph;
pub use registry::{BuildState, GraphRegistry};
pub use trace::{Fragment, FragmentTracer};
