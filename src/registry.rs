//! Per-session registry of repository histories.
//!
//! One registry value is created per review session and passed to whoever
//! needs graph access; there is no process-wide state. Each repository
//! carries a published graph, a build guard serializing builders, and a
//! build state a UI can surface ("history incomplete for repository X").

use anyhow::Context;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::history::{FileHistoryGraph, RepositoryId};
use crate::scm::CommitFeed;

/// Outcome of the most recent build pass for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    /// No build has run yet.
    Idle,
    /// A builder currently holds the repository.
    Building,
    /// The published graph covers the whole feed.
    Complete,
    /// The last build aborted; the previously published graph is still
    /// served but does not cover the full feed.
    Incomplete { reason: String },
}

/// History bookkeeping for one repository.
pub struct RepositoryHistory {
    id: RepositoryId,
    published: RwLock<Arc<FileHistoryGraph>>,
    state: RwLock<BuildState>,
    /// At most one builder per repository; readers keep using the
    /// previously published graph while a build is in flight.
    build_guard: Mutex<()>,
}

impl RepositoryHistory {
    fn new(id: RepositoryId) -> Self {
        let empty = Arc::new(FileHistoryGraph::new(id.clone()));
        Self {
            id,
            published: RwLock::new(empty),
            state: RwLock::new(BuildState::Idle),
            build_guard: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    /// The last good published graph. Always usable, even after an aborted
    /// build.
    pub fn graph(&self) -> Arc<FileHistoryGraph> {
        self.published.read().unwrap().clone()
    }

    pub fn state(&self) -> BuildState {
        self.state.read().unwrap().clone()
    }

    /// Absorbs every commit the feed yields into a clone of the published
    /// graph, publishing atomically on success. On any error (contract
    /// violation, feed failure, cancellation) the clone is discarded and
    /// the state records why the history is incomplete.
    pub fn absorb(&self, feed: &mut dyn CommitFeed, cancel: &CancelToken) -> anyhow::Result<()> {
        let _guard = self.build_guard.lock().unwrap();
        *self.state.write().unwrap() = BuildState::Building;

        match self.absorb_inner(feed, cancel) {
            Ok(graph) => {
                info!(
                    repository = %self.id,
                    nodes = graph.node_count(),
                    edges = graph.edge_count(),
                    "publishing rebuilt history graph"
                );
                *self.published.write().unwrap() = Arc::new(graph);
                *self.state.write().unwrap() = BuildState::Complete;
                Ok(())
            }
            Err(err) => {
                warn!(repository = %self.id, error = %err, "history build aborted");
                *self.state.write().unwrap() = BuildState::Incomplete {
                    reason: format!("{err:#}"),
                };
                Err(err)
            }
        }
    }

    fn absorb_inner(
        &self,
        feed: &mut dyn CommitFeed,
        cancel: &CancelToken,
    ) -> anyhow::Result<FileHistoryGraph> {
        let mut graph = (*self.graph()).clone();
        while let Some(commit) = feed.next_commit().context("commit feed failed")? {
            cancel.check()?;
            graph
                .integrate_commit(&commit, cancel)
                .with_context(|| format!("integrating r{}", commit.revision))?;
        }
        Ok(graph)
    }
}

/// Session-scoped registry mapping repositories to their histories.
#[derive(Default)]
pub struct GraphRegistry {
    repositories: DashMap<RepositoryId, Arc<RepositoryHistory>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The history entry for a repository, created on first access.
    pub fn repository(&self, id: &RepositoryId) -> Arc<RepositoryHistory> {
        self.repositories
            .entry(id.clone())
            .or_insert_with(|| Arc::new(RepositoryHistory::new(id.clone())))
            .clone()
    }

    /// The history entry for a repository, if one was ever created.
    pub fn get(&self, id: &RepositoryId) -> Option<Arc<RepositoryHistory>> {
        self.repositories.get(id).map(|entry| Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ChangeItem, CommitChange, Revision, RevisionedFile};
    use crate::scm::VecFeed;

    fn feed() -> VecFeed {
        VecFeed::new(vec![
            CommitChange::new(1, vec![ChangeItem::added("/a.txt")]),
            CommitChange::new(2, vec![ChangeItem::changed("/a.txt")]),
        ])
    }

    #[test]
    fn absorb_publishes_on_success() {
        let registry = GraphRegistry::new();
        let repo = registry.repository(&RepositoryId::new("repo"));
        repo.absorb(&mut feed(), &CancelToken::new()).unwrap();

        assert_eq!(repo.state(), BuildState::Complete);
        let graph = repo.graph();
        assert_eq!(graph.node_count(), 2);
        assert!(graph
            .node(&RevisionedFile::new("repo", "/a.txt", Revision::Repository(2)))
            .is_some());
    }

    #[test]
    fn aborted_build_keeps_last_good_graph() {
        let registry = GraphRegistry::new();
        let repo = registry.repository(&RepositoryId::new("repo"));
        repo.absorb(&mut feed(), &CancelToken::new()).unwrap();

        // A feed that deletes an untracked path violates the contract.
        let mut bad = VecFeed::new(vec![CommitChange::new(
            3,
            vec![ChangeItem::deleted("/ghost.txt")],
        )]);
        assert!(repo.absorb(&mut bad, &CancelToken::new()).is_err());

        assert!(matches!(repo.state(), BuildState::Incomplete { .. }));
        // The previously published graph still answers queries.
        assert_eq!(repo.graph().node_count(), 2);
    }

    #[test]
    fn canceled_build_reports_incomplete() {
        let registry = GraphRegistry::new();
        let repo = registry.repository(&RepositoryId::new("repo"));
        let token = CancelToken::new();
        token.cancel();
        assert!(repo.absorb(&mut feed(), &token).is_err());
        assert!(matches!(repo.state(), BuildState::Incomplete { .. }));
        assert!(repo.graph().is_empty());
    }

    #[test]
    fn registry_hands_out_one_entry_per_repository() {
        let registry = GraphRegistry::new();
        let a = registry.repository(&RepositoryId::new("repo"));
        let b = registry.repository(&RepositoryId::new("repo"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.get(&RepositoryId::new("other")).is_none());
    }
}
