//! Git adapter using libgit2.
//!
//! Adapts a local git repository to the graph's two external seams: the
//! per-commit change feed (with rename/copy detection mapped to
//! delete+copy items) and the content-and-diff provider. Git has no global
//! revision numbers, so commits are numbered 1..n in topological order and
//! the mapping back to object ids stays here.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use git2::{Delta, DiffFindOptions, DiffOptions, Oid, Patch, Repository, Sort};
use std::path::Path;
use tracing::debug;

use super::CommitFeed;
use crate::cancel::CancelToken;
use crate::diff::{looks_binary, DiffLimits, DiffProvider, FileDiff, Hunk};
use crate::history::{
    ChangeItem, CommitChange, FileHistoryGraph, RepositoryId, Revision, RevisionedFile,
};

/// Information about one commit, for display.
#[derive(Debug, Clone)]
pub struct CommitSummary {
    pub revision: u64,
    /// Short hash (12 characters)
    pub hash: String,
    pub author: String,
    /// Commit timestamp (ISO 8601)
    pub timestamp: String,
    /// Commit message (first line)
    pub message: String,
}

/// A local git repository exposed as revision-numbered history.
pub struct GitHistorySource {
    repo: Repository,
    id: RepositoryId,
    /// Commit ids in integration order; index i is revision i+1.
    commits: Vec<Oid>,
}

impl GitHistorySource {
    /// Open a git repository at `path` (or any subdirectory) and number its
    /// first-parent history oldest to newest.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .with_context(|| format!("Failed to open git repository at {:?}", path))?;
        debug!("Opened git repository at {:?}", repo.path());

        let id = RepositoryId::new(
            repo.workdir()
                .unwrap_or_else(|| repo.path())
                .to_string_lossy()
                .into_owned(),
        );

        let mut commits = Vec::new();
        if !repo.is_empty()? {
            let mut revwalk = repo.revwalk()?;
            revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
            revwalk.push_head()?;
            for oid in revwalk {
                commits.push(oid?);
            }
        }

        Ok(Self { repo, id, commits })
    }

    pub fn repository_id(&self) -> &RepositoryId {
        &self.id
    }

    /// Number of commits the feed will deliver.
    pub fn revision_count(&self) -> u64 {
        self.commits.len() as u64
    }

    /// The change feed, positioned at the oldest commit.
    pub fn feed(&self) -> GitCommitFeed<'_> {
        GitCommitFeed {
            source: self,
            next: 0,
        }
    }

    /// Diff provider backed by this repository's object store.
    pub fn diff_provider(&self, limits: DiffLimits) -> GitDiffProvider<'_> {
        GitDiffProvider {
            source: self,
            limits,
        }
    }

    /// Builds the committed-history graph by draining the feed.
    pub fn remote_graph(&self, cancel: &CancelToken) -> Result<FileHistoryGraph> {
        let mut graph = FileHistoryGraph::new(self.id.clone());
        let mut feed = self.feed();
        while let Some(commit) = feed.next_commit()? {
            cancel.check()?;
            graph
                .integrate_commit(&commit, cancel)
                .with_context(|| format!("integrating r{}", commit.revision))?;
        }
        Ok(graph)
    }

    /// Builds the working-copy graph: one base node per locally touched
    /// file, hanging off the head revision.
    pub fn local_graph(&self) -> Result<FileHistoryGraph> {
        let mut graph = FileHistoryGraph::new(self.id.clone());
        let base = Revision::Repository(self.revision_count());

        let head_tree = match self.commits.last() {
            Some(&oid) => Some(self.repo.find_commit(oid)?.tree()?),
            None => None,
        };
        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let diff = self
            .repo
            .diff_tree_to_workdir(head_tree.as_ref(), Some(&mut opts))?;

        for delta in diff.deltas() {
            match delta.status() {
                Delta::Added | Delta::Untracked => {
                    if let Some(path) = delta.new_file().path() {
                        graph.add_addition(&path.to_string_lossy(), Revision::Working)?;
                    }
                }
                Delta::Modified | Delta::Typechange => {
                    if let Some(path) = delta.new_file().path() {
                        graph.add_change(&path.to_string_lossy(), Revision::Working, &[base])?;
                    }
                }
                Delta::Deleted => {
                    if let Some(path) = delta.old_file().path() {
                        let path = path.to_string_lossy();
                        graph.ensure_flow_start(&path, base);
                        graph.add_deletion(&path, Revision::Working)?;
                    }
                }
                _ => {}
            }
        }
        Ok(graph)
    }

    pub fn commit_summary(&self, revision: u64) -> Result<CommitSummary> {
        let oid = self
            .oid_at(revision)
            .with_context(|| format!("no commit for r{revision}"))?;
        let commit = self.repo.find_commit(oid)?;
        let author = commit.author();
        Ok(CommitSummary {
            revision,
            hash: commit.id().to_string()[..12].to_string(),
            author: author.name().unwrap_or("Unknown").to_string(),
            timestamp: format_git_time(&commit.time()),
            message: commit
                .message()
                .unwrap_or("")
                .lines()
                .next()
                .unwrap_or("")
                .to_string(),
        })
    }

    fn oid_at(&self, revision: u64) -> Option<Oid> {
        if revision == 0 {
            return None;
        }
        self.commits.get(revision as usize - 1).copied()
    }

    /// Content of one file version: committed revisions read from the
    /// object store, the working revision from disk. `None` means the file
    /// does not exist there.
    pub fn content(&self, file: &RevisionedFile) -> Result<Option<Vec<u8>>> {
        match file.revision {
            Revision::Repository(revision) => {
                let Some(oid) = self.oid_at(revision) else {
                    return Ok(None);
                };
                let tree = self.repo.find_commit(oid)?.tree()?;
                let entry = match tree.get_path(Path::new(&file.path)) {
                    Ok(entry) => entry,
                    Err(err) if err.code() == git2::ErrorCode::NotFound => return Ok(None),
                    Err(err) => return Err(err.into()),
                };
                let blob = self.repo.find_blob(entry.id())?;
                Ok(Some(blob.content().to_vec()))
            }
            Revision::Working => {
                let workdir = self
                    .repo
                    .workdir()
                    .context("repository has no working directory (bare repo?)")?;
                match std::fs::read(workdir.join(&file.path)) {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(err) => Err(err.into()),
                }
            }
            Revision::Unknown => Ok(None),
        }
    }
}

/// Oldest-to-newest feed of [`CommitChange`]s for one repository.
pub struct GitCommitFeed<'a> {
    source: &'a GitHistorySource,
    next: usize,
}

impl CommitFeed for GitCommitFeed<'_> {
    fn next_commit(&mut self) -> Result<Option<CommitChange>> {
        let Some(&oid) = self.source.commits.get(self.next) else {
            return Ok(None);
        };
        let revision = self.next as u64 + 1;
        self.next += 1;

        let repo = &self.source.repo;
        let commit = repo.find_commit(oid)?;
        let parent = commit.parent(0).ok();
        let tree = commit.tree()?;
        let parent_tree = parent.as_ref().map(|p| p.tree()).transpose()?;

        let mut diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
        let mut find = DiffFindOptions::new();
        find.renames(true).copies(true).copies_from_unmodified(true);
        diff.find_similar(Some(&mut find))?;

        // Copy sources refer to the state before this commit.
        let parent_revision = revision - 1;
        let mut items = Vec::new();
        for delta in diff.deltas() {
            let old_path = delta
                .old_file()
                .path()
                .map(|p| p.to_string_lossy().into_owned());
            let new_path = delta
                .new_file()
                .path()
                .map(|p| p.to_string_lossy().into_owned());
            match (delta.status(), old_path, new_path) {
                (Delta::Added, _, Some(path)) => items.push(ChangeItem::added(path)),
                (Delta::Deleted, Some(path), _) => items.push(ChangeItem::deleted(path)),
                (Delta::Modified | Delta::Typechange, _, Some(path)) => {
                    items.push(ChangeItem::changed(path))
                }
                (Delta::Renamed, Some(old), Some(new)) => {
                    // A git rename is a delete of the old line plus a copy
                    // into the new one.
                    items.push(ChangeItem::deleted(old.clone()));
                    items.push(ChangeItem::added(new).with_copy_from(old, parent_revision));
                }
                (Delta::Copied, Some(old), Some(new)) => {
                    items.push(ChangeItem::added(new).with_copy_from(old, parent_revision));
                }
                _ => {}
            }
        }

        Ok(Some(CommitChange::new(revision, items)))
    }
}

/// [`DiffProvider`] over a repository's blobs and working tree.
pub struct GitDiffProvider<'a> {
    source: &'a GitHistorySource,
    limits: DiffLimits,
}

impl DiffProvider for GitDiffProvider<'_> {
    fn diff(&self, old: &RevisionedFile, new: &RevisionedFile) -> Result<FileDiff> {
        let old_bytes = self.source.content(old)?.unwrap_or_default();
        let new_bytes = self.source.content(new)?.unwrap_or_default();
        if looks_binary(&old_bytes, &self.limits) || looks_binary(&new_bytes, &self.limits) {
            return Ok(FileDiff::Binary);
        }

        // Zero context: hunks must cover exactly the changed spans for
        // range projection to stay line-accurate.
        let mut opts = DiffOptions::new();
        opts.context_lines(0);
        let mut patch = Patch::from_buffers(
            &old_bytes,
            Some(Path::new(&old.path)),
            &new_bytes,
            Some(Path::new(&new.path)),
            Some(&mut opts),
        )?;
        let mut hunks = Vec::with_capacity(patch.num_hunks());
        for index in 0..patch.num_hunks() {
            let (hunk, _lines) = patch.hunk(index)?;
            hunks.push(Hunk {
                old_start: hunk.old_start(),
                old_lines: hunk.old_lines(),
                new_start: hunk.new_start(),
                new_lines: hunk.new_lines(),
            });
        }
        Ok(FileDiff::Text { hunks })
    }
}

/// Format a git timestamp as ISO 8601.
fn format_git_time(time: &git2::Time) -> String {
    match Utc.timestamp_opt(time.seconds(), 0).single() {
        Some(dt) => dt.to_rfc3339(),
        None => "1970-01-01T00:00:00Z".to_string(),
    }
}
