//! Read-only access seam over a history graph.
//!
//! The tracer traverses plain and virtual graphs through one trait, working
//! at identity level so composed graphs can splice nodes from several
//! arenas behind it.

use std::collections::BTreeSet;

use super::edge::EdgeKind;
use super::graph::FileHistoryGraph;
use super::node::NodeKind;
use super::revision::RevisionedFile;
use crate::diff::{DiffProvider, FileDiff};

/// Identity-level description of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub file: RevisionedFile,
    pub kind: NodeKind,
}

/// Identity-level description of one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeView {
    pub kind: EdgeKind,
    pub ancestor: RevisionedFile,
    pub descendant: RevisionedFile,
}

/// Query-only graph access.
pub trait HistoryView {
    /// The node for an exact identity; `None` means "not tracked here".
    fn node(&self, file: &RevisionedFile) -> Option<NodeSummary>;

    /// Incoming edges of the node for `file`.
    fn ancestor_edges(&self, file: &RevisionedFile) -> Vec<EdgeView>;

    /// Outgoing edges of the node for `file`.
    fn descendant_edges(&self, file: &RevisionedFile) -> Vec<EdgeView>;

    /// Diff across one edge, memoized by the owning graph. Falls back to a
    /// binary diff when the edge cannot be resolved.
    fn edge_diff(&self, edge: &EdgeView, provider: &dyn DiffProvider) -> FileDiff;

    /// All paths known to this view.
    fn paths(&self) -> BTreeSet<String>;
}

impl HistoryView for FileHistoryGraph {
    fn node(&self, file: &RevisionedFile) -> Option<NodeSummary> {
        FileHistoryGraph::node(self, file).map(|node| NodeSummary {
            file: node.file().clone(),
            kind: node.kind(),
        })
    }

    fn ancestor_edges(&self, file: &RevisionedFile) -> Vec<EdgeView> {
        FileHistoryGraph::ancestor_edges(self, file)
    }

    fn descendant_edges(&self, file: &RevisionedFile) -> Vec<EdgeView> {
        FileHistoryGraph::descendant_edges(self, file)
    }

    fn edge_diff(&self, edge: &EdgeView, provider: &dyn DiffProvider) -> FileDiff {
        FileHistoryGraph::edge_diff(self, edge, provider).unwrap_or(FileDiff::Binary)
    }

    fn paths(&self) -> BTreeSet<String> {
        FileHistoryGraph::paths(self)
    }
}
