//! Virtual composition of a committed (remote) and an uncommitted (local)
//! file-history graph.
//!
//! Neither underlying graph is ever mutated through this layer. The local
//! graph is replaced wholesale; every swap recomputes the synthesized
//! bridges that let traversals cross from committed history into
//! working-copy history. Readers always observe either the fully-old or the
//! fully-new local graph because the swap replaces a reference under one
//! lock.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::diff::{DiffProvider, FileDiff};
use crate::history::{
    EdgeKind, EdgeView, FileHistoryEdge, FileHistoryGraph, HistoryResult, HistoryView, NodeKind,
    NodeSummary, Revision, RevisionedFile,
};

/// A synthesized edge joining a remote ancestor to a local root whose exact
/// identity the remote graph does not contain.
struct Bridge {
    ancestor: RevisionedFile,
    descendant: RevisionedFile,
    edge: FileHistoryEdge,
}

struct OverlayState {
    local: Arc<FileHistoryGraph>,
    bridges: Vec<Bridge>,
    by_ancestor: HashMap<RevisionedFile, Vec<usize>>,
    by_descendant: HashMap<RevisionedFile, Vec<usize>>,
}

impl OverlayState {
    fn compute(remote: &FileHistoryGraph, local: Arc<FileHistoryGraph>) -> Self {
        let mut bridges = Vec::new();
        for root in local.roots() {
            let file = root.file();
            // Only committed revisions denote a position in the remote
            // graph; working-copy roots are genuinely new files.
            if !matches!(file.revision, Revision::Repository(_)) {
                continue;
            }
            if remote.node(file).is_some() {
                // Exact remote counterpart: the two nodes merge into one
                // virtual identity, no bridge needed.
                continue;
            }
            let Some(ancestor) = remote.nearest_before(&file.path, file.revision) else {
                continue;
            };
            debug!(local_root = %file, remote_ancestor = %ancestor.file(), "bridging local root");
            bridges.push(Bridge {
                ancestor: ancestor.file().clone(),
                descendant: file.clone(),
                edge: FileHistoryEdge::new(EdgeKind::Normal),
            });
        }

        let mut by_ancestor: HashMap<RevisionedFile, Vec<usize>> = HashMap::new();
        let mut by_descendant: HashMap<RevisionedFile, Vec<usize>> = HashMap::new();
        for (index, bridge) in bridges.iter().enumerate() {
            by_ancestor
                .entry(bridge.ancestor.clone())
                .or_default()
                .push(index);
            by_descendant
                .entry(bridge.descendant.clone())
                .or_default()
                .push(index);
        }
        Self {
            local,
            bridges,
            by_ancestor,
            by_descendant,
        }
    }
}

/// Read-only view over a remote graph with a swappable local overlay.
pub struct VirtualFileHistoryGraph {
    remote: Arc<FileHistoryGraph>,
    state: RwLock<OverlayState>,
}

impl VirtualFileHistoryGraph {
    pub fn new(remote: Arc<FileHistoryGraph>, local: Arc<FileHistoryGraph>) -> Self {
        let state = OverlayState::compute(&remote, local);
        Self {
            remote,
            state: RwLock::new(state),
        }
    }

    /// A remote-only view with an empty local overlay.
    pub fn without_local(remote: Arc<FileHistoryGraph>) -> Self {
        let local = Arc::new(FileHistoryGraph::new(remote.repository().clone()));
        Self::new(remote, local)
    }

    pub fn remote(&self) -> &Arc<FileHistoryGraph> {
        &self.remote
    }

    pub fn local(&self) -> Arc<FileHistoryGraph> {
        self.state.read().unwrap().local.clone()
    }

    /// Atomically replaces the local graph and recomputes the bridges.
    /// In-flight readers finish against the old overlay; new reads see the
    /// new one.
    pub fn set_local_graph(&self, local: Arc<FileHistoryGraph>) {
        let state = OverlayState::compute(&self.remote, local);
        *self.state.write().unwrap() = state;
    }

    /// Maximal (non-dominated) ancestor identities reachable from `file`
    /// through either graph. Several identities can be simultaneously
    /// nearest when branches of history are incomparable.
    pub fn find_ancestors_for(
        &self,
        file: &RevisionedFile,
        cancel: &CancelToken,
    ) -> HistoryResult<Vec<RevisionedFile>> {
        let mut seen: HashSet<RevisionedFile> = HashSet::new();
        let mut queue: VecDeque<RevisionedFile> = self
            .ancestor_edges(file)
            .into_iter()
            .map(|edge| edge.ancestor)
            .collect();
        while let Some(current) = queue.pop_front() {
            cancel.check()?;
            if !seen.insert(current.clone()) {
                continue;
            }
            for edge in self.ancestor_edges(&current) {
                queue.push_back(edge.ancestor);
            }
        }

        let mut maximal: Vec<RevisionedFile> = seen
            .iter()
            .filter(|candidate| {
                !seen.iter().any(|other| {
                    *other != **candidate
                        && candidate.history_order(other) == Some(std::cmp::Ordering::Less)
                })
            })
            .cloned()
            .collect();
        maximal.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then(a.revision.forward_key().cmp(&b.revision.forward_key()))
        });
        Ok(maximal)
    }

    fn merged_node(&self, state: &OverlayState, file: &RevisionedFile) -> Option<NodeSummary> {
        let remote = HistoryView::node(self.remote.as_ref(), file);
        let local = HistoryView::node(state.local.as_ref(), file);
        match (remote, local) {
            (Some(remote), Some(local)) => {
                // The local graph carries the newer truth unless its node is
                // merely provisional.
                let kind = if local.kind == NodeKind::Unconfirmed {
                    remote.kind
                } else {
                    local.kind
                };
                Some(NodeSummary {
                    file: file.clone(),
                    kind,
                })
            }
            (remote, local) => remote.or(local),
        }
    }
}

impl HistoryView for VirtualFileHistoryGraph {
    fn node(&self, file: &RevisionedFile) -> Option<NodeSummary> {
        let state = self.state.read().unwrap();
        self.merged_node(&state, file)
    }

    fn ancestor_edges(&self, file: &RevisionedFile) -> Vec<EdgeView> {
        let state = self.state.read().unwrap();
        let mut edges = self.remote.ancestor_edges(file);
        for edge in state.local.ancestor_edges(file) {
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        }
        if let Some(indices) = state.by_descendant.get(file) {
            for &index in indices {
                let bridge = &state.bridges[index];
                edges.push(EdgeView {
                    kind: bridge.edge.kind(),
                    ancestor: bridge.ancestor.clone(),
                    descendant: bridge.descendant.clone(),
                });
            }
        }
        edges
    }

    fn descendant_edges(&self, file: &RevisionedFile) -> Vec<EdgeView> {
        let state = self.state.read().unwrap();
        let mut edges = self.remote.descendant_edges(file);
        for edge in state.local.descendant_edges(file) {
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        }
        if let Some(indices) = state.by_ancestor.get(file) {
            for &index in indices {
                let bridge = &state.bridges[index];
                edges.push(EdgeView {
                    kind: bridge.edge.kind(),
                    ancestor: bridge.ancestor.clone(),
                    descendant: bridge.descendant.clone(),
                });
            }
        }
        edges
    }

    fn edge_diff(&self, edge: &EdgeView, provider: &dyn DiffProvider) -> FileDiff {
        let state = self.state.read().unwrap();
        if let Some(indices) = state.by_descendant.get(&edge.descendant) {
            for &index in indices {
                let bridge = &state.bridges[index];
                if bridge.ancestor == edge.ancestor {
                    return bridge
                        .edge
                        .diff(&bridge.ancestor, &bridge.descendant, provider)
                        .clone();
                }
            }
        }
        if let Some(diff) = self.remote.edge_diff(edge, provider) {
            return diff;
        }
        state
            .local
            .edge_diff(edge, provider)
            .unwrap_or(FileDiff::Binary)
    }

    fn paths(&self) -> BTreeSet<String> {
        let state = self.state.read().unwrap();
        let mut paths = self.remote.paths();
        paths.extend(state.local.paths());
        paths
    }
}
