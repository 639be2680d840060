//! Diff model and the injected diff-computation seam.
//!
//! Hunk computation itself is an external capability: the graph and tracer
//! consume a [`DiffProvider`] and never touch file contents directly. What
//! lives here is the hunk data model, the binary-content policy, and the
//! line-range projection used by fragment tracing.

use serde::{Deserialize, Serialize};

use crate::history::RevisionedFile;

/// One contiguous edit: `old_lines` starting at `old_start` became
/// `new_lines` starting at `new_start`. Line numbers are 1-based; a zero
/// line count marks a pure insertion or deletion, with the start pointing at
/// the line before the edit site (git convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
}

/// Computed difference between the two endpoints of a history edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileDiff {
    /// Line-based hunks, sorted by `old_start`.
    Text { hunks: Vec<Hunk> },
    /// Content was binary (or diffing failed); no line tracking possible.
    Binary,
}

impl FileDiff {
    pub fn is_binary(&self) -> bool {
        matches!(self, FileDiff::Binary)
    }
}

/// Computes the diff between two file versions. Implementations resolve
/// content themselves; the graph only hands them identities.
///
/// Errors are recovered locally by the caller: a failing edge degrades to
/// [`FileDiff::Binary`] instead of failing the surrounding operation.
pub trait DiffProvider {
    fn diff(&self, old: &RevisionedFile, new: &RevisionedFile) -> anyhow::Result<FileDiff>;
}

/// Content thresholds for the binary policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLimits {
    /// Content larger than this is treated as binary.
    pub max_text_bytes: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_text_bytes: 4 * 1024 * 1024,
        }
    }
}

/// How many leading bytes the control-byte sniff inspects.
const SNIFF_WINDOW: usize = 128;

/// Binary policy: content exceeding the size threshold, or containing
/// control bytes other than CR/LF/TAB within its first 128 bytes.
pub fn looks_binary(content: &[u8], limits: &DiffLimits) -> bool {
    if content.len() > limits.max_text_bytes {
        return true;
    }
    content
        .iter()
        .take(SNIFF_WINDOW)
        .any(|&b| b < 0x20 && b != b'\r' && b != b'\n' && b != b'\t')
}

/// Projects the 1-based inclusive line range `[start, end]` through `hunks`
/// (old coordinates -> new coordinates). Returns `None` when the range's
/// content is entirely removed.
///
/// Endpoints inside a modification hunk snap to the replacement span;
/// endpoints inside a pure deletion snap inward, so a fully deleted range
/// collapses (start crosses end) and vanishes.
pub fn project_range(start: u32, end: u32, hunks: &[Hunk]) -> Option<(u32, u32)> {
    debug_assert!(start >= 1 && start <= end);
    let mut sorted: Vec<Hunk> = hunks.to_vec();
    sorted.sort_by_key(|h| (h.old_start, h.old_lines));

    let new_start = map_line(start, &sorted, Bias::Start);
    let new_end = map_line(end, &sorted, Bias::End);
    if new_start > new_end || new_end < 1 {
        return None;
    }
    Some((new_start.max(1) as u32, new_end as u32))
}

#[derive(Clone, Copy)]
enum Bias {
    Start,
    End,
}

fn map_line(line: u32, hunks: &[Hunk], bias: Bias) -> i64 {
    let line = i64::from(line);
    let mut offset: i64 = 0;
    for h in hunks {
        let old_start = i64::from(h.old_start);
        let old_lines = i64::from(h.old_lines);
        let new_start = i64::from(h.new_start);
        let new_lines = i64::from(h.new_lines);

        if old_lines > 0 && old_start + old_lines - 1 < line {
            // Edit entirely before the line: shifts it.
            offset += new_lines - old_lines;
            continue;
        }
        if old_lines == 0 && old_start < line {
            // Insertion before the line.
            offset += new_lines;
            continue;
        }
        if old_lines > 0 && old_start <= line {
            // Line sits inside this hunk's old span.
            return if new_lines > 0 {
                match bias {
                    Bias::Start => new_start,
                    Bias::End => new_start + new_lines - 1,
                }
            } else {
                // Pure deletion: snap inward so collapsed ranges vanish.
                match bias {
                    Bias::Start => new_start + 1,
                    Bias::End => new_start,
                }
            };
        }
        // Hunks are sorted; the rest start after the line.
        break;
    }
    line + offset
}
