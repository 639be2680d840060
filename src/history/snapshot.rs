//! Versioned snapshot of a graph for external persistence.
//!
//! The crate does not define an on-disk format; callers serialize
//! [`GraphSnapshot`] with whatever serde format they use and hand it back on
//! load. The snapshot is a plain flattened value (node records in arena
//! order, edges as index pairs), so no graph internals leak into the
//! persistence boundary.

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::edge::{EdgeKind, FileHistoryEdge};
use super::graph::FileHistoryGraph;
use super::node::{FileHistoryNode, NodeKind};
use super::revision::{RepositoryId, Revision, RevisionedFile};
use super::{HistoryError, HistoryResult};
use crate::diff::FileDiff;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub path: String,
    pub revision: Revision,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Indices into [`GraphSnapshot::nodes`].
    pub ancestor: u32,
    pub descendant: u32,
    pub kind: EdgeKind,
    /// Diff, if it was ever materialized. Lazy diffs that were never
    /// computed stay lazy across a round-trip.
    pub diff: Option<FileDiff>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub version: u32,
    pub repository: RepositoryId,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphSnapshot {
    /// Flattens a graph. Node order is arena insertion order, which makes
    /// snapshots of structurally equal graphs compare equal.
    pub fn capture(graph: &FileHistoryGraph) -> Self {
        let nodes = graph
            .graph
            .node_indices()
            .map(|idx| {
                let node = &graph.graph[idx];
                NodeRecord {
                    path: node.file().path.clone(),
                    revision: node.file().revision,
                    kind: node.kind(),
                }
            })
            .collect();
        let edges = graph
            .graph
            .edge_references()
            .map(|edge| EdgeRecord {
                ancestor: edge.source().index() as u32,
                descendant: edge.target().index() as u32,
                kind: edge.weight().kind(),
                diff: edge.weight().materialized_diff().cloned(),
            })
            .collect();
        Self {
            version: SNAPSHOT_VERSION,
            repository: graph.repository.clone(),
            nodes,
            edges,
        }
    }

    /// Rebuilds the arena. Fails on an unsupported snapshot version or
    /// dangling edge indices.
    pub fn restore(&self) -> HistoryResult<FileHistoryGraph> {
        if self.version != SNAPSHOT_VERSION {
            return Err(HistoryError::SnapshotVersion(self.version));
        }
        let mut graph = FileHistoryGraph::new(self.repository.clone());
        let mut indices: Vec<NodeIndex> = Vec::with_capacity(self.nodes.len());
        for record in &self.nodes {
            let file = RevisionedFile::new(
                self.repository.clone(),
                record.path.clone(),
                record.revision,
            );
            let idx = graph.graph.add_node(FileHistoryNode::new(file, record.kind));
            graph.buckets.entry(record.path.clone()).or_default().push(idx);
            indices.push(idx);
        }
        for record in &self.edges {
            let resolve = |index: u32| {
                indices.get(index as usize).copied().ok_or_else(|| {
                    HistoryError::SnapshotCorrupt(format!(
                        "edge references node {index} of {}",
                        self.nodes.len()
                    ))
                })
            };
            let a = resolve(record.ancestor)?;
            let d = resolve(record.descendant)?;
            graph
                .graph
                .add_edge(a, d, FileHistoryEdge::with_diff(record.kind, record.diff.clone()));
        }
        Ok(graph)
    }
}
