//! Fragment tracing: projecting a line range anchored at one revision
//! forward to its newest incarnations.
//!
//! The tracer walks descendant edges from the anchor node and applies each
//! edge's diff to the range. A file can fan out into several present-day
//! locations when it was copied; a lineage that ends in a deletion
//! contributes nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::cancel::CancelToken;
use crate::diff::{project_range, DiffProvider, FileDiff};
use crate::history::{EdgeKind, HistoryResult, HistoryView, NodeKind, RevisionedFile};

/// A line range anchored at one file revision. Lines are 1-based and the
/// range is inclusive at both ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fragment {
    pub file: RevisionedFile,
    pub start_line: u32,
    pub end_line: u32,
}

impl Fragment {
    pub fn new(file: RevisionedFile, start_line: u32, end_line: u32) -> Self {
        debug_assert!(start_line >= 1 && start_line <= end_line);
        Self {
            file,
            start_line,
            end_line,
        }
    }
}

/// Walks a history view's diff edges to project fragments and files
/// forward.
pub struct FragmentTracer<'a> {
    provider: &'a dyn DiffProvider,
}

impl<'a> FragmentTracer<'a> {
    pub fn new(provider: &'a dyn DiffProvider) -> Self {
        Self { provider }
    }

    /// Projects `fragment` to every newest incarnation reachable from its
    /// anchor. An untracked anchor returns the input unchanged: freshly
    /// added files simply are their own newest version. With `include_self`
    /// the origin itself is reported alongside the projections.
    pub fn trace_fragment(
        &self,
        view: &dyn HistoryView,
        fragment: &Fragment,
        include_self: bool,
        cancel: &CancelToken,
    ) -> HistoryResult<Vec<Fragment>> {
        let Some(origin) = view.node(&fragment.file) else {
            return Ok(vec![fragment.clone()]);
        };

        let mut results: Vec<Fragment> = Vec::new();
        if include_self && origin.kind != NodeKind::Deleted {
            results.push(fragment.clone());
        }

        let mut visited: HashSet<Fragment> = HashSet::new();
        let mut stack: Vec<Fragment> = vec![fragment.clone()];
        while let Some(current) = stack.pop() {
            cancel.check()?;
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(node) = view.node(&current.file) else {
                continue;
            };
            let edges = view.descendant_edges(&current.file);

            let is_lineage_tip = !edges.iter().any(|edge| edge.kind == EdgeKind::Normal);
            if is_lineage_tip
                && node.kind != NodeKind::Deleted
                && current.file != fragment.file
            {
                results.push(current.clone());
            }

            for edge in edges {
                let projected = match view.edge_diff(&edge, self.provider) {
                    FileDiff::Text { hunks } => {
                        project_range(current.start_line, current.end_line, &hunks)
                    }
                    // No line tracking across binary content; carry the
                    // range through unchanged as a best effort.
                    FileDiff::Binary => Some((current.start_line, current.end_line)),
                };
                if let Some((start, end)) = projected {
                    stack.push(Fragment::new(edge.descendant.clone(), start, end));
                }
            }
        }

        dedupe(&mut results);
        Ok(results)
    }

    /// Same traversal without range projection: the newest file identities
    /// reachable from `file`.
    pub fn trace_file(
        &self,
        view: &dyn HistoryView,
        file: &RevisionedFile,
        include_self: bool,
        cancel: &CancelToken,
    ) -> HistoryResult<Vec<RevisionedFile>> {
        let Some(origin) = view.node(file) else {
            return Ok(vec![file.clone()]);
        };

        let mut results: Vec<RevisionedFile> = Vec::new();
        if include_self && origin.kind != NodeKind::Deleted {
            results.push(file.clone());
        }

        let mut visited: HashSet<RevisionedFile> = HashSet::new();
        let mut stack: Vec<RevisionedFile> = vec![file.clone()];
        while let Some(current) = stack.pop() {
            cancel.check()?;
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(node) = view.node(&current) else {
                continue;
            };
            let edges = view.descendant_edges(&current);

            let is_lineage_tip = !edges.iter().any(|edge| edge.kind == EdgeKind::Normal);
            if is_lineage_tip && node.kind != NodeKind::Deleted && current != *file {
                results.push(current.clone());
            }

            for edge in edges {
                stack.push(edge.descendant);
            }
        }

        dedupe(&mut results);
        Ok(results)
    }
}

fn dedupe<T: Clone + Eq + std::hash::Hash>(items: &mut Vec<T>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ChangeItem, CommitChange, FileHistoryGraph, Revision};

    /// Provider for in-memory graphs: hunks registered per edge, identity
    /// diff otherwise.
    #[derive(Default)]
    struct TableDiff {
        edges: Vec<(RevisionedFile, RevisionedFile, FileDiff)>,
    }

    impl TableDiff {
        fn with(
            mut self,
            old: RevisionedFile,
            new: RevisionedFile,
            diff: FileDiff,
        ) -> Self {
            self.edges.push((old, new, diff));
            self
        }
    }

    impl DiffProvider for TableDiff {
        fn diff(&self, old: &RevisionedFile, new: &RevisionedFile) -> anyhow::Result<FileDiff> {
            for (o, n, d) in &self.edges {
                if o == old && n == new {
                    return Ok(d.clone());
                }
            }
            Ok(FileDiff::Text { hunks: Vec::new() })
        }
    }

    fn rev(id: u64) -> Revision {
        Revision::Repository(id)
    }

    fn file(path: &str, id: u64) -> RevisionedFile {
        RevisionedFile::new("repo", path, rev(id))
    }

    fn hunk(old_start: u32, old_lines: u32, new_start: u32, new_lines: u32) -> crate::diff::Hunk {
        crate::diff::Hunk {
            old_start,
            old_lines,
            new_start,
            new_lines,
        }
    }

    fn build(feed: &[CommitChange]) -> FileHistoryGraph {
        let mut g = FileHistoryGraph::new("repo");
        for commit in feed {
            g.integrate_commit(commit, &CancelToken::new()).unwrap();
        }
        g
    }

    #[test]
    fn untracked_file_returns_input_unchanged() {
        let g = FileHistoryGraph::new("repo");
        let provider = TableDiff::default();
        let tracer = FragmentTracer::new(&provider);
        let fragment = Fragment::new(file("/nowhere.txt", 1), 1, 5);
        let traced = tracer
            .trace_fragment(&g, &fragment, false, &CancelToken::new())
            .unwrap();
        assert_eq!(traced, vec![fragment]);
    }

    #[test]
    fn copied_then_deleted_source_traces_only_into_the_copy() {
        // r1 adds /a.txt; r2 copies it to /b.txt; r3 deletes /a.txt;
        // r4 edits /b.txt lines 5-6 into 5-7.
        let g = build(&[
            CommitChange::new(1, vec![ChangeItem::added("/a.txt")]),
            CommitChange::new(
                2,
                vec![ChangeItem::added("/b.txt").with_copy_from("/a.txt", 1)],
            ),
            CommitChange::new(3, vec![ChangeItem::deleted("/a.txt")]),
            CommitChange::new(4, vec![ChangeItem::changed("/b.txt")]),
        ]);
        let provider = TableDiff::default().with(
            file("/b.txt", 2),
            file("/b.txt", 4),
            FileDiff::Text {
                hunks: vec![hunk(5, 2, 5, 3)],
            },
        );
        let tracer = FragmentTracer::new(&provider);
        let fragment = Fragment::new(file("/a.txt", 1), 1, 10);
        let traced = tracer
            .trace_fragment(&g, &fragment, false, &CancelToken::new())
            .unwrap();

        // Exactly one result: the copy, range stretched by the r4 edit.
        // The deleted /a.txt contributes nothing.
        assert_eq!(traced, vec![Fragment::new(file("/b.txt", 4), 1, 11)]);
    }

    #[test]
    fn surviving_copy_source_fans_out() {
        // /a.txt is copied but never deleted: both lineages are current.
        let g = build(&[
            CommitChange::new(1, vec![ChangeItem::added("/a.txt")]),
            CommitChange::new(
                2,
                vec![ChangeItem::added("/b.txt").with_copy_from("/a.txt", 1)],
            ),
        ]);
        let provider = TableDiff::default();
        let tracer = FragmentTracer::new(&provider);
        let traced = tracer
            .trace_file(&g, &file("/a.txt", 1), true, &CancelToken::new())
            .unwrap();
        assert_eq!(traced, vec![file("/a.txt", 1), file("/b.txt", 2)]);
    }

    #[test]
    fn fragment_dies_when_its_lines_are_removed() {
        let g = build(&[
            CommitChange::new(1, vec![ChangeItem::added("/a.txt")]),
            CommitChange::new(2, vec![ChangeItem::changed("/a.txt")]),
        ]);
        // The r2 edit deletes lines 3-4 entirely.
        let provider = TableDiff::default().with(
            file("/a.txt", 1),
            file("/a.txt", 2),
            FileDiff::Text {
                hunks: vec![hunk(3, 2, 2, 0)],
            },
        );
        let tracer = FragmentTracer::new(&provider);
        let fragment = Fragment::new(file("/a.txt", 1), 3, 4);
        let traced = tracer
            .trace_fragment(&g, &fragment, false, &CancelToken::new())
            .unwrap();
        assert!(traced.is_empty());
    }

    #[test]
    fn binary_edges_carry_the_range_through() {
        let g = build(&[
            CommitChange::new(1, vec![ChangeItem::added("/img.dat")]),
            CommitChange::new(2, vec![ChangeItem::changed("/img.dat")]),
        ]);
        let provider = TableDiff::default().with(
            file("/img.dat", 1),
            file("/img.dat", 2),
            FileDiff::Binary,
        );
        let tracer = FragmentTracer::new(&provider);
        let fragment = Fragment::new(file("/img.dat", 1), 2, 3);
        let traced = tracer
            .trace_fragment(&g, &fragment, false, &CancelToken::new())
            .unwrap();
        assert_eq!(traced, vec![Fragment::new(file("/img.dat", 2), 2, 3)]);
    }

    #[test]
    fn include_self_reports_the_origin_once() {
        let g = build(&[CommitChange::new(1, vec![ChangeItem::added("/a.txt")])]);
        let provider = TableDiff::default();
        let tracer = FragmentTracer::new(&provider);
        let fragment = Fragment::new(file("/a.txt", 1), 1, 2);

        let with_self = tracer
            .trace_fragment(&g, &fragment, true, &CancelToken::new())
            .unwrap();
        assert_eq!(with_self, vec![fragment.clone()]);

        // Without include_self an already-newest fragment yields nothing
        // strictly later.
        let without = tracer
            .trace_fragment(&g, &fragment, false, &CancelToken::new())
            .unwrap();
        assert!(without.is_empty());
    }

    #[test]
    fn cancellation_surfaces_as_canceled() {
        let g = build(&[CommitChange::new(1, vec![ChangeItem::added("/a.txt")])]);
        let provider = TableDiff::default();
        let tracer = FragmentTracer::new(&provider);
        let token = CancelToken::new();
        token.cancel();
        assert!(tracer
            .trace_file(&g, &file("/a.txt", 1), false, &token)
            .is_err());
    }
}
