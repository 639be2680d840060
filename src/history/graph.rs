//! The file-history graph arena for one repository.
//!
//! Nodes and edges live in a petgraph arena; a per-path bucket index keeps
//! every node ever created for a path in insertion order. Only this type has
//! mutation rights over nodes and edges, and history is append-only: nothing
//! is ever deleted, a graph is rebuilt from scratch when its commit feed is
//! replaced.

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use super::edge::{EdgeKind, FileHistoryEdge};
use super::node::{is_legal_transition, FileHistoryNode, NodeKind};
use super::revision::{RepositoryId, Revision, RevisionedFile};
use super::view::EdgeView;
use super::{HistoryError, HistoryResult};
use crate::diff::{DiffProvider, FileDiff};

#[derive(Debug, Clone)]
pub struct FileHistoryGraph {
    pub(crate) repository: RepositoryId,
    pub(crate) graph: DiGraph<FileHistoryNode, FileHistoryEdge>,
    /// Every node ever created for a path, in insertion order.
    pub(crate) buckets: HashMap<String, Vec<NodeIndex>>,
}

impl FileHistoryGraph {
    pub fn new(repository: impl Into<RepositoryId>) -> Self {
        Self {
            repository: repository.into(),
            graph: DiGraph::new(),
            buckets: HashMap::new(),
        }
    }

    pub fn repository(&self) -> &RepositoryId {
        &self.repository
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn file(&self, path: &str, revision: Revision) -> RevisionedFile {
        RevisionedFile::new(self.repository.clone(), path, revision)
    }

    /// All paths this graph has ever tracked.
    pub fn paths(&self) -> BTreeSet<String> {
        self.buckets.keys().cloned().collect()
    }

    /// Index of the node for an exact identity, if tracked.
    pub fn node_index(&self, file: &RevisionedFile) -> Option<NodeIndex> {
        if file.repository != self.repository {
            return None;
        }
        self.buckets.get(&file.path)?.iter().copied().find(|&idx| {
            self.graph[idx].file.revision == file.revision
        })
    }

    /// The node for an exact identity, if tracked. Absence is not an error:
    /// it means "file not tracked here".
    pub fn node(&self, file: &RevisionedFile) -> Option<&FileHistoryNode> {
        self.node_index(file).map(|idx| &self.graph[idx])
    }

    /// Every node ever created for `path`, in insertion order.
    pub fn nodes_for_path(&self, path: &str) -> Vec<&FileHistoryNode> {
        self.buckets
            .get(path)
            .map(|bucket| bucket.iter().map(|&idx| &self.graph[idx]).collect())
            .unwrap_or_default()
    }

    /// Nodes with no ancestor edges: the first known appearances of their
    /// identity chains.
    pub fn roots(&self) -> Vec<&FileHistoryNode> {
        self.graph
            .externals(Direction::Incoming)
            .map(|idx| &self.graph[idx])
            .collect()
    }

    /// Maximum-revision node for `path` strictly before `revision`.
    /// Working-copy nodes are never ancestor material; a working-copy query
    /// revision sorts as +inf and so sees every committed node.
    pub fn nearest_before(&self, path: &str, revision: Revision) -> Option<&FileHistoryNode> {
        self.nearest_before_index(path, revision)
            .map(|idx| &self.graph[idx])
    }

    pub(crate) fn nearest_before_index(&self, path: &str, revision: Revision) -> Option<NodeIndex> {
        let limit = revision.forward_key()?;
        self.latest_below(path, limit)
    }

    /// Maximum-revision committed node at or before a committed revision.
    /// Copy sources resolve through this: a copy taken "from r5" refers to
    /// whatever node carried the path's content at r5.
    pub(crate) fn at_or_before_index(&self, path: &str, revision: Revision) -> Option<NodeIndex> {
        let limit = revision.backward_key()?.checked_add(1)?;
        self.latest_below(path, limit)
    }

    fn latest_below(&self, path: &str, limit: u64) -> Option<NodeIndex> {
        self.buckets
            .get(path)?
            .iter()
            .filter_map(|&idx| {
                let key = self.graph[idx].file.revision.backward_key()?;
                (key < limit).then_some((key, idx))
            })
            .max_by_key(|&(key, _)| key)
            .map(|(_, idx)| idx)
    }

    /// Minimum-revision node for `path` at or after `revision`. Working-copy
    /// nodes sort as +inf.
    pub fn nearest_at_or_after(&self, path: &str, revision: Revision) -> Option<&FileHistoryNode> {
        let from = revision.forward_key()?;
        self.buckets
            .get(path)?
            .iter()
            .filter_map(|&idx| {
                let key = self.graph[idx].file.revision.forward_key()?;
                (key >= from).then_some((key, idx))
            })
            .min_by_key(|&(key, _)| key)
            .map(|(_, idx)| &self.graph[idx])
    }

    /// Finds the node for `(path, revision)` or synthesizes a provisional
    /// root for it. Flow starts mark identities whose earlier history is
    /// unknown: copy sources outside the integrated window, and the base
    /// revisions a local working-copy graph hangs off.
    pub fn ensure_flow_start(&mut self, path: &str, revision: Revision) -> NodeIndex {
        let file = self.file(path, revision);
        if let Some(idx) = self.node_index(&file) {
            return idx;
        }
        debug!(path, %revision, "synthesizing unconfirmed flow start");
        self.insert_node(file, NodeKind::Unconfirmed)
    }

    /// Records the first appearance of a file. The node is a root typed
    /// `Added`, or `Replaced` when the path's previous occupant was deleted.
    pub fn add_addition(&mut self, path: &str, revision: Revision) -> HistoryResult<NodeIndex> {
        let file = self.file(path, revision);
        if self.node_index(&file).is_some() {
            return Err(HistoryError::DuplicateIdentity {
                path: path.to_string(),
                revision,
            });
        }
        let kind = self.root_kind_at(path, revision);
        Ok(self.insert_node(file, kind))
    }

    /// Marks the latest node for `path` strictly before `revision` as
    /// deleted and retypes its incident copy edges to `CopyDeleted` so they
    /// stay traversable.
    pub fn add_deletion(&mut self, path: &str, revision: Revision) -> HistoryResult<NodeIndex> {
        let idx = self.nearest_before_index(path, revision).ok_or_else(|| {
            HistoryError::UntrackedPath {
                path: path.to_string(),
                revision,
            }
        })?;
        self.retype(idx, NodeKind::Deleted)?;
        self.retype_incident_copies(idx);
        Ok(idx)
    }

    /// Records a content edit: for each ancestor revision, links the
    /// ancestor node (synthesized as a flow start when missing) to the
    /// changed node via a `Normal` edge. Pre-existing unconfirmed nodes on
    /// either end are confirmed as `Changed`. With no ancestors the node
    /// becomes a root: a change to a file whose earlier history is unknown.
    pub fn add_change(
        &mut self,
        path: &str,
        revision: Revision,
        ancestors: &[Revision],
    ) -> HistoryResult<NodeIndex> {
        let file = self.file(path, revision);
        let descendant = match self.node_index(&file) {
            Some(idx) => {
                if self.graph[idx].kind == NodeKind::Unconfirmed {
                    self.retype(idx, NodeKind::Changed)?;
                } else if self.graph[idx].kind != NodeKind::Changed {
                    return Err(HistoryError::IllegalTransition {
                        from: self.graph[idx].kind,
                        to: NodeKind::Changed,
                        path: path.to_string(),
                    });
                }
                idx
            }
            None => self.insert_node(file, NodeKind::Changed),
        };
        for &ancestor_revision in ancestors {
            let existed = self
                .node_index(&self.file(path, ancestor_revision))
                .is_some();
            let ancestor = self.ensure_flow_start(path, ancestor_revision);
            if existed && self.graph[ancestor].kind == NodeKind::Unconfirmed {
                self.retype(ancestor, NodeKind::Changed)?;
            }
            self.link(ancestor, descendant, EdgeKind::Normal);
        }
        Ok(descendant)
    }

    /// Records a copy: finds or synthesizes the source node and links it to
    /// a freshly created target node. Copies out of an already-deleted
    /// source are linked as `CopyDeleted` straight away.
    pub fn add_copy(
        &mut self,
        from_path: &str,
        from_revision: Revision,
        to_path: &str,
        to_revision: Revision,
    ) -> HistoryResult<NodeIndex> {
        let target = self.file(to_path, to_revision);
        if self.node_index(&target).is_some() {
            return Err(HistoryError::DuplicateIdentity {
                path: to_path.to_string(),
                revision: to_revision,
            });
        }
        let source = self
            .at_or_before_index(from_path, from_revision)
            .unwrap_or_else(|| self.ensure_flow_start(from_path, from_revision));
        let kind = self.root_kind_at(to_path, to_revision);
        let destination = self.insert_node(target, kind);
        let edge_kind = if self.graph[source].is_deleted() {
            EdgeKind::CopyDeleted
        } else {
            EdgeKind::Copy
        };
        self.link(source, destination, edge_kind);
        Ok(destination)
    }

    /// Incoming edges of the node for `file`, as identity-level views.
    pub fn ancestor_edges(&self, file: &RevisionedFile) -> Vec<EdgeView> {
        self.edge_views(file, Direction::Incoming)
    }

    /// Outgoing edges of the node for `file`, as identity-level views.
    pub fn descendant_edges(&self, file: &RevisionedFile) -> Vec<EdgeView> {
        self.edge_views(file, Direction::Outgoing)
    }

    fn edge_views(&self, file: &RevisionedFile, direction: Direction) -> Vec<EdgeView> {
        let Some(idx) = self.node_index(file) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, direction)
            .map(|edge| EdgeView {
                kind: edge.weight().kind,
                ancestor: self.graph[edge.source()].file.clone(),
                descendant: self.graph[edge.target()].file.clone(),
            })
            .collect()
    }

    /// The stored edge between two identities, if both are tracked and
    /// linked.
    pub fn edge_between(
        &self,
        ancestor: &RevisionedFile,
        descendant: &RevisionedFile,
    ) -> Option<&FileHistoryEdge> {
        let a = self.node_index(ancestor)?;
        let d = self.node_index(descendant)?;
        let edge = self.graph.find_edge(a, d)?;
        Some(&self.graph[edge])
    }

    /// Diff across a stored edge, computed on first access and memoized on
    /// the edge.
    pub fn edge_diff(&self, edge: &EdgeView, provider: &dyn DiffProvider) -> Option<FileDiff> {
        let stored = self.edge_between(&edge.ancestor, &edge.descendant)?;
        Some(
            stored
                .diff(&edge.ancestor, &edge.descendant, provider)
                .clone(),
        )
    }

    fn insert_node(&mut self, file: RevisionedFile, kind: NodeKind) -> NodeIndex {
        let path = file.path.clone();
        let idx = self.graph.add_node(FileHistoryNode::new(file, kind));
        self.buckets.entry(path).or_default().push(idx);
        idx
    }

    /// Adds an edge unless the pair is already linked; duplicate feed
    /// entries must not produce parallel edges.
    fn link(&mut self, ancestor: NodeIndex, descendant: NodeIndex, kind: EdgeKind) -> EdgeIndex {
        match self.graph.find_edge(ancestor, descendant) {
            Some(existing) => existing,
            None => self
                .graph
                .add_edge(ancestor, descendant, FileHistoryEdge::new(kind)),
        }
    }

    fn retype(&mut self, idx: NodeIndex, to: NodeKind) -> HistoryResult<()> {
        let node = &self.graph[idx];
        if !is_legal_transition(node.kind, to) {
            return Err(HistoryError::IllegalTransition {
                from: node.kind,
                to,
                path: node.file.path.clone(),
            });
        }
        self.graph[idx].kind = to;
        Ok(())
    }

    /// A deletion ends the node's line: copy edges incident to it (in either
    /// direction) become `CopyDeleted` but remain traversable.
    fn retype_incident_copies(&mut self, idx: NodeIndex) {
        let incident: Vec<EdgeIndex> = [Direction::Incoming, Direction::Outgoing]
            .into_iter()
            .flat_map(|dir| self.graph.edges_directed(idx, dir))
            .filter(|edge| edge.weight().kind == EdgeKind::Copy)
            .map(|edge| edge.id())
            .collect();
        for edge in incident {
            self.graph[edge].kind = EdgeKind::CopyDeleted;
        }
    }

    fn root_kind_at(&self, path: &str, revision: Revision) -> NodeKind {
        match self.nearest_before(path, revision) {
            Some(previous) if previous.is_deleted() => NodeKind::Replaced,
            _ => NodeKind::Added,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> FileHistoryGraph {
        FileHistoryGraph::new("repo")
    }

    fn rev(id: u64) -> Revision {
        Revision::Repository(id)
    }

    #[test]
    fn addition_creates_a_root() {
        let mut g = graph();
        g.add_addition("/a.txt", rev(1)).unwrap();
        let file = RevisionedFile::new("repo", "/a.txt", rev(1));
        let node = g.node(&file).unwrap();
        assert_eq!(node.kind(), NodeKind::Added);
        assert!(g.ancestor_edges(&file).is_empty());
    }

    #[test]
    fn double_addition_is_a_contract_violation() {
        let mut g = graph();
        g.add_addition("/a.txt", rev(1)).unwrap();
        assert!(matches!(
            g.add_addition("/a.txt", rev(1)),
            Err(HistoryError::DuplicateIdentity { .. })
        ));
    }

    #[test]
    fn deletion_of_untracked_path_is_a_contract_violation() {
        let mut g = graph();
        assert!(matches!(
            g.add_deletion("/ghost.txt", rev(5)),
            Err(HistoryError::UntrackedPath { .. })
        ));
    }

    #[test]
    fn change_links_ancestor_to_descendant_both_ways() {
        let mut g = graph();
        g.add_addition("/a.txt", rev(1)).unwrap();
        g.add_change("/a.txt", rev(2), &[rev(1)]).unwrap();

        let old = RevisionedFile::new("repo", "/a.txt", rev(1));
        let new = RevisionedFile::new("repo", "/a.txt", rev(2));
        let down = g.descendant_edges(&old);
        let up = g.ancestor_edges(&new);
        assert_eq!(down.len(), 1);
        assert_eq!(up.len(), 1);
        assert_eq!(down[0].descendant, new);
        assert_eq!(up[0].ancestor, old);
        assert_eq!(down[0].kind, EdgeKind::Normal);
        assert_eq!(g.node(&new).unwrap().kind(), NodeKind::Changed);
    }

    #[test]
    fn change_without_ancestors_starts_an_incomplete_flow() {
        let mut g = graph();
        let idx = g.add_change("/late.txt", rev(9), &[]).unwrap();
        assert_eq!(g.graph[idx].kind(), NodeKind::Changed);
        assert!(g
            .ancestor_edges(&RevisionedFile::new("repo", "/late.txt", rev(9)))
            .is_empty());
    }

    #[test]
    fn copy_synthesizes_missing_source_as_unconfirmed() {
        let mut g = graph();
        g.add_copy("/src.txt", rev(3), "/dst.txt", rev(4)).unwrap();
        let source = RevisionedFile::new("repo", "/src.txt", rev(3));
        assert_eq!(g.node(&source).unwrap().kind(), NodeKind::Unconfirmed);
        let edges = g.descendant_edges(&source);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Copy);
    }

    #[test]
    fn change_confirms_unconfirmed_copy_source() {
        let mut g = graph();
        g.add_copy("/src.txt", rev(3), "/dst.txt", rev(4)).unwrap();
        g.add_change("/src.txt", rev(5), &[rev(3)]).unwrap();
        let source = RevisionedFile::new("repo", "/src.txt", rev(3));
        assert_eq!(g.node(&source).unwrap().kind(), NodeKind::Changed);
    }

    #[test]
    fn deletion_retypes_incoming_copy_edge() {
        let mut g = graph();
        g.add_addition("/a.txt", rev(1)).unwrap();
        g.add_copy("/a.txt", rev(1), "/b.txt", rev(2)).unwrap();
        // Delete the copy target.
        g.add_deletion("/b.txt", rev(3)).unwrap();

        let target = RevisionedFile::new("repo", "/b.txt", rev(2));
        let up = g.ancestor_edges(&target);
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].kind, EdgeKind::CopyDeleted);
        assert!(g.node(&target).unwrap().is_deleted());
    }

    #[test]
    fn deletion_retypes_outgoing_copy_edge() {
        let mut g = graph();
        g.add_addition("/a.txt", rev(1)).unwrap();
        g.add_copy("/a.txt", rev(1), "/b.txt", rev(2)).unwrap();
        // Delete the copy source; the edge must stay traversable.
        g.add_deletion("/a.txt", rev(3)).unwrap();

        let source = RevisionedFile::new("repo", "/a.txt", rev(1));
        let down = g.descendant_edges(&source);
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].kind, EdgeKind::CopyDeleted);
    }

    #[test]
    fn copy_from_deleted_source_links_as_copy_deleted() {
        let mut g = graph();
        g.add_addition("/a.txt", rev(1)).unwrap();
        g.add_deletion("/a.txt", rev(2)).unwrap();
        g.add_copy("/a.txt", rev(1), "/b.txt", rev(3)).unwrap();
        let source = RevisionedFile::new("repo", "/a.txt", rev(1));
        let down = g.descendant_edges(&source);
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].kind, EdgeKind::CopyDeleted);
    }

    #[test]
    fn add_after_delete_is_a_replacement() {
        let mut g = graph();
        g.add_addition("/a.txt", rev(1)).unwrap();
        g.add_deletion("/a.txt", rev(2)).unwrap();
        let idx = g.add_addition("/a.txt", rev(2)).unwrap();
        assert_eq!(g.graph[idx].kind(), NodeKind::Replaced);
        // The replacement can be deleted again.
        g.add_deletion("/a.txt", rev(3)).unwrap();
        assert!(g.graph[idx].is_deleted());
    }

    #[test]
    fn lookups_order_by_revision_not_insertion() {
        let mut g = graph();
        g.add_addition("/a.txt", rev(5)).unwrap();
        g.ensure_flow_start("/a.txt", rev(2));
        g.ensure_flow_start("/a.txt", rev(8));

        let before = g.nearest_before("/a.txt", rev(6)).unwrap();
        assert_eq!(before.file().revision, rev(5));
        let after = g.nearest_at_or_after("/a.txt", rev(6)).unwrap();
        assert_eq!(after.file().revision, rev(8));
    }

    #[test]
    fn working_nodes_sort_last_and_are_not_ancestors() {
        let mut g = graph();
        g.add_addition("/a.txt", rev(1)).unwrap();
        g.add_change("/a.txt", Revision::Working, &[rev(1)]).unwrap();

        // Forward query finds the working node.
        let newest = g.nearest_at_or_after("/a.txt", rev(2)).unwrap();
        assert_eq!(newest.file().revision, Revision::Working);
        // Backward query never yields it.
        let latest_committed = g.nearest_before("/a.txt", Revision::Working).unwrap();
        assert_eq!(latest_committed.file().revision, rev(1));
    }

    #[test]
    fn deleting_a_deleted_node_is_illegal() {
        let mut g = graph();
        g.add_addition("/a.txt", rev(1)).unwrap();
        g.add_deletion("/a.txt", rev(2)).unwrap();
        assert!(matches!(
            g.add_deletion("/a.txt", rev(3)),
            Err(HistoryError::IllegalTransition { .. })
        ));
    }
}
