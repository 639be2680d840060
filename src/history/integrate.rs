//! Commit integration: absorbing one commit's path operations into the
//! graph.
//!
//! A single commit can both copy a directory and touch files inside the
//! copied tree, and the feed may list a touched path before the copy that
//! logically created it. Integration therefore runs in deferral rounds: an
//! entry whose copy source sits under a not-yet-applied copy target waits,
//! as does every entry under a deferred target, and the same pass re-runs
//! over the deferred batch until it drains. A round that cannot shrink the
//! batch aborts with [`HistoryError::DeferralStalled`] instead of looping.
//!
//! Mutations only become visible at the end of a whole-commit pass when the
//! builder publishes its working clone (see `registry`); a cancellation or
//! contract violation mid-pass abandons the clone.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use super::graph::FileHistoryGraph;
use super::revision::Revision;
use super::{HistoryError, HistoryResult};
use crate::cancel::CancelToken;

/// Copy provenance reported for a path entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySource {
    pub path: String,
    pub revision: u64,
}

/// One path operation within a commit, as delivered by the SCM feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeItem {
    pub path: String,
    pub is_file: bool,
    pub added: bool,
    pub deleted: bool,
    pub changed: bool,
    pub copy_from: Option<CopySource>,
}

impl ChangeItem {
    fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_file: true,
            added: false,
            deleted: false,
            changed: false,
            copy_from: None,
        }
    }

    pub fn added(path: impl Into<String>) -> Self {
        Self {
            added: true,
            ..Self::new(path)
        }
    }

    pub fn changed(path: impl Into<String>) -> Self {
        Self {
            changed: true,
            ..Self::new(path)
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            deleted: true,
            ..Self::new(path)
        }
    }

    /// A path both deleted and re-added in one commit.
    pub fn replaced(path: impl Into<String>) -> Self {
        Self {
            added: true,
            deleted: true,
            ..Self::new(path)
        }
    }

    pub fn with_copy_from(mut self, path: impl Into<String>, revision: u64) -> Self {
        self.copy_from = Some(CopySource {
            path: path.into(),
            revision,
        });
        self
    }

    pub fn directory(mut self) -> Self {
        self.is_file = false;
        self
    }
}

/// One commit's worth of path operations, items sorted by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitChange {
    pub revision: u64,
    pub items: Vec<ChangeItem>,
}

impl CommitChange {
    pub fn new(revision: u64, mut items: Vec<ChangeItem>) -> Self {
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Self { revision, items }
    }
}

/// Per-commit integration state: which copies have been applied, and the
/// prefix rewrites directory copies contribute.
struct CommitScope {
    copy_targets: Vec<CopyTarget>,
    applied: HashSet<String>,
    rewrites: Vec<PrefixRewrite>,
}

struct CopyTarget {
    path: String,
}

struct PrefixRewrite {
    target: String,
    source: String,
    revision: u64,
}

impl CommitScope {
    fn new(items: &[ChangeItem]) -> Self {
        let copy_targets = items
            .iter()
            .filter(|item| item.copy_from.is_some())
            .map(|item| CopyTarget {
                path: item.path.clone(),
            })
            .collect();
        Self {
            copy_targets,
            applied: HashSet::new(),
            rewrites: Vec::new(),
        }
    }

    /// True when the entry must wait for another copy to be applied first:
    /// its own copy source lies under a pending copy target, or its path
    /// lies under a copy target deferred earlier in this round.
    fn must_defer(&self, item: &ChangeItem, deferred_targets: &[String]) -> bool {
        if let Some(copy) = &item.copy_from {
            let blocked = self.copy_targets.iter().any(|target| {
                target.path != item.path
                    && !self.applied.contains(&target.path)
                    && is_same_or_under(&copy.path, &target.path)
            });
            if blocked {
                return true;
            }
        }
        deferred_targets
            .iter()
            .any(|target| is_same_or_under(&item.path, target))
    }

    /// Re-bases a path through the longest matching directory-copy rewrite.
    fn rewrite_for(&self, path: &str) -> Option<CopySource> {
        self.rewrites
            .iter()
            .filter(|rw| is_same_or_under(path, &rw.target))
            .max_by_key(|rw| rw.target.len())
            .map(|rw| CopySource {
                path: format!("{}{}", rw.source, &path[rw.target.len()..]),
                revision: rw.revision,
            })
    }
}

fn is_same_or_under(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'/')
}

impl FileHistoryGraph {
    /// Absorbs one commit. Items are processed in path order with copy
    /// deferral; any contract violation aborts the pass and propagates.
    pub fn integrate_commit(
        &mut self,
        commit: &CommitChange,
        cancel: &CancelToken,
    ) -> HistoryResult<()> {
        let mut scope = CommitScope::new(&commit.items);
        let mut batch: Vec<&ChangeItem> = commit.items.iter().collect();
        batch.sort_by(|a, b| a.path.cmp(&b.path));

        while !batch.is_empty() {
            let before = batch.len();
            batch = self.integrate_round(commit.revision, batch, &mut scope, cancel)?;
            if batch.len() == before {
                return Err(HistoryError::DeferralStalled {
                    revision: commit.revision,
                    remaining: batch.len(),
                });
            }
            if !batch.is_empty() {
                debug!(
                    revision = commit.revision,
                    deferred = batch.len(),
                    "re-running integration over deferred entries"
                );
            }
        }
        Ok(())
    }

    fn integrate_round<'a>(
        &mut self,
        revision: u64,
        items: Vec<&'a ChangeItem>,
        scope: &mut CommitScope,
        cancel: &CancelToken,
    ) -> HistoryResult<Vec<&'a ChangeItem>> {
        let mut deferred: Vec<&ChangeItem> = Vec::new();
        let mut deferred_targets: Vec<String> = Vec::new();
        for item in items {
            cancel.check()?;
            if scope.must_defer(item, &deferred_targets) {
                if item.copy_from.is_some() {
                    deferred_targets.push(item.path.clone());
                }
                deferred.push(item);
                continue;
            }
            self.apply_item(revision, item, scope)?;
        }
        Ok(deferred)
    }

    fn apply_item(
        &mut self,
        revision: u64,
        item: &ChangeItem,
        scope: &mut CommitScope,
    ) -> HistoryResult<()> {
        let rev = Revision::Repository(revision);

        if !item.is_file {
            // Directories carry no nodes; deletions end every tracked file
            // underneath, copies contribute a prefix rewrite for the
            // commit's remaining entries.
            if item.deleted {
                self.delete_subtree(&item.path, rev)?;
            }
            if let Some(copy) = &item.copy_from {
                scope.rewrites.push(PrefixRewrite {
                    target: item.path.clone(),
                    source: copy.path.clone(),
                    revision: copy.revision,
                });
                scope.applied.insert(item.path.clone());
            }
            return Ok(());
        }

        if item.deleted && (item.added || item.copy_from.is_some()) {
            // Same-path replacement: delete+add, or delete+copy when a copy
            // path is present.
            self.add_deletion(&item.path, rev)?;
            if let Some(copy) = &item.copy_from {
                self.add_copy(&copy.path, Revision::Repository(copy.revision), &item.path, rev)?;
                scope.applied.insert(item.path.clone());
            } else {
                self.add_addition(&item.path, rev)?;
            }
            return Ok(());
        }
        if item.deleted {
            self.add_deletion(&item.path, rev)?;
            return Ok(());
        }

        // A file reported inside an applied directory copy attaches to the
        // rewritten source even without an explicit copy path.
        let copy = item
            .copy_from
            .clone()
            .or_else(|| scope.rewrite_for(&item.path));
        if let Some(copy) = copy {
            self.add_copy(&copy.path, Revision::Repository(copy.revision), &item.path, rev)?;
            if item.copy_from.is_some() {
                scope.applied.insert(item.path.clone());
            }
            return Ok(());
        }

        if item.added {
            self.add_addition(&item.path, rev)?;
            return Ok(());
        }
        if item.changed {
            let ancestors: Vec<Revision> = self
                .nearest_before(&item.path, rev)
                .map(|node| node.file().revision)
                .into_iter()
                .collect();
            self.add_change(&item.path, rev, &ancestors)?;
        }
        Ok(())
    }

    /// A directory deletion ends every live tracked file under the prefix.
    fn delete_subtree(&mut self, prefix: &str, revision: Revision) -> HistoryResult<()> {
        let mut paths: Vec<String> = self
            .buckets
            .keys()
            .filter(|path| is_same_or_under(path, prefix) && path.as_str() != prefix)
            .cloned()
            .collect();
        paths.sort();
        for path in paths {
            let live = self
                .nearest_before(&path, revision)
                .is_some_and(|node| !node.is_deleted());
            if live {
                self.add_deletion(&path, revision)?;
            }
        }
        Ok(())
    }
}
