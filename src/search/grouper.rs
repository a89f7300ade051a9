//! Match grouping: line numbers, context windows, per-path results.
//!
//! A confirmed line plus the set of files containing it becomes one
//! [`MatchGroup`]. For each file, `try_match` locates the line inside the
//! file's segment list (yielding its 1-based line number), gathers up to
//! [`CONTEXT_LINES`] lines of context on both sides by walking segment
//! boundaries, and upserts the result per accepted path: the same
//! physical match may live under several refs, which accumulate on the
//! path's entry rather than producing duplicates. `finish_group` then
//! emits one [`MatchResult`] per path.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::CONTEXT_LINES;
use crate::corpus::{FileId, GitPath, SearchFile, Segment};

use super::SearchJob;

/// One file's occurrence of the matched line, with context.
#[derive(Debug, Clone, Serialize)]
pub struct MatchContext {
    pub file: FileId,
    /// 1-based line number within the file
    pub line_number: u32,
    /// Nearest-first preceding lines, at most `CONTEXT_LINES`
    pub context_before: Vec<String>,
    /// Nearest-first following lines, at most `CONTEXT_LINES`
    pub context_after: Vec<String>,
    /// Every accepted `(ref, path)` this occurrence appears under
    pub paths: Vec<GitPath>,
}

/// One emitted result: a matched line under one path.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub line: String,
    /// Codepoint offset of the match start within `line`
    pub match_left: usize,
    /// Codepoint offset of the match end within `line`
    pub match_right: usize,
    pub context: Vec<MatchContext>,
}

/// Accumulates per-path contexts for one matched line in one chunk.
pub(crate) struct MatchGroup {
    chunk_no: u32,
    line: String,
    line_start: u32,
    line_end: u32,
    match_left: usize,
    match_right: usize,
    matches: BTreeMap<String, Vec<MatchContext>>,
}

impl MatchGroup {
    pub(crate) fn new(
        chunk_no: u32,
        line: &str,
        match_span: (usize, usize),
        line_span: (usize, usize),
    ) -> Self {
        let (ms, me) = match_span;
        let (ls, le) = line_span;
        // Counted over bytes: a byte-class match may not fall on a
        // codepoint boundary, so str slicing is not an option.
        let match_left = codepoint_len(&line.as_bytes()[..ms - ls]);
        let match_right = match_left + codepoint_len(&line.as_bytes()[ms - ls..me - ls]);
        Self {
            chunk_no,
            line: line.to_string(),
            line_start: ls as u32,
            line_end: le as u32,
            match_left,
            match_right,
            matches: BTreeMap::new(),
        }
    }
}

impl SearchJob {
    /// Locate the matched line inside `file`'s segments and record one
    /// context per accepted path. Files whose segment list does not
    /// contain the line pointer (a different instance of the same bytes)
    /// are silently skipped.
    pub(crate) fn try_match(&self, group: &mut MatchGroup, file: FileId) {
        let sf = self.corpus.file(file);

        let mut line_number: u32 = 1;
        let mut containing = None;
        for (i, seg) in sf.content.iter().enumerate() {
            let data = self.corpus.chunks()[seg.chunk as usize].data();
            if seg.chunk == group.chunk_no
                && seg.start <= group.line_start
                && group.line_start <= seg.end
            {
                line_number += count_newlines(&data[seg.start as usize..group.line_start as usize]);
                containing = Some(i);
                break;
            }
            line_number += count_newlines(&data[seg.start as usize..seg.end as usize]) + 1;
        }
        let Some(seg_idx) = containing else {
            return;
        };

        let context_before = self.context_before(sf, seg_idx, group.line_start as usize);
        let context_after = self.context_after(sf, seg_idx, group.line_end as usize);

        let ctx = MatchContext {
            file,
            line_number,
            context_before,
            context_after,
            paths: Vec::new(),
        };

        for path in &sf.paths {
            if !self.accept_path(path) {
                continue;
            }
            match group.matches.entry(path.path.clone()) {
                Entry::Vacant(slot) => {
                    self.count_match();
                    let mut first = ctx.clone();
                    first.paths.push(path.clone());
                    slot.insert(vec![first]);
                }
                Entry::Occupied(mut slot) => {
                    let list = slot.get_mut();
                    if list.last().map(|c| c.file) != Some(sf.no) {
                        list.push(ctx.clone());
                    }
                    if let Some(last) = list.last_mut() {
                        last.paths.push(path.clone());
                    }
                }
            }
        }
    }

    /// Up to `CONTEXT_LINES` lines preceding the line starting at `off`
    /// (an offset into segment `seg_idx`'s chunk), nearest first.
    fn context_before(&self, sf: &SearchFile, seg_idx: usize, off: usize) -> Vec<String> {
        let mut out = Vec::new();
        let mut si = seg_idx;
        let mut seg: Segment = sf.content[si];
        let mut off = off;

        for _ in 0..CONTEXT_LINES {
            if off == seg.start as usize {
                if si == 0 {
                    break;
                }
                si -= 1;
                seg = sf.content[si];
                // pretend a line begins just past the segment's last
                // terminator so the step below lands on its last line
                off = seg.end as usize + 1;
            }
            let data = self.corpus.chunks()[seg.chunk as usize].data();
            let end = off - 1; // the previous line's terminator
            let start = match data[seg.start as usize..end].iter().rposition(|&b| b == b'\n') {
                Some(nl) => seg.start as usize + nl + 1,
                None => seg.start as usize,
            };
            out.push(String::from_utf8_lossy(&data[start..end]).into_owned());
            off = start;
        }
        out
    }

    /// Up to `CONTEXT_LINES` lines following the line ending at `pos`,
    /// nearest first.
    fn context_after(&self, sf: &SearchFile, seg_idx: usize, pos: usize) -> Vec<String> {
        let mut out = Vec::new();
        let mut si = seg_idx;
        let mut seg: Segment = sf.content[si];
        let mut pos = pos;

        for _ in 0..CONTEXT_LINES {
            let start;
            if pos == seg.end as usize {
                si += 1;
                if si >= sf.content.len() {
                    break;
                }
                seg = sf.content[si];
                start = seg.start as usize;
            } else {
                start = pos + 1;
            }
            let data = self.corpus.chunks()[seg.chunk as usize].data();
            let end = match data[start..seg.end as usize].iter().position(|&b| b == b'\n') {
                Some(nl) => start + nl,
                None => seg.end as usize,
            };
            out.push(String::from_utf8_lossy(&data[start..end]).into_owned());
            pos = end;
        }
        out
    }

    /// Emit one result per path in the group.
    pub(crate) fn finish_group(&self, group: MatchGroup) {
        for (_path, context) in group.matches {
            let result = MatchResult {
                line: group.line.clone(),
                match_left: group.match_left,
                match_right: group.match_right,
                context,
            };
            let _ = self.results.send(Some(result));
        }
    }
}

fn count_newlines(data: &[u8]) -> u32 {
    data.iter().filter(|&&b| b == b'\n').count() as u32
}

/// Number of codepoints in `bytes`: every byte that is not a UTF-8
/// continuation starts one.
fn codepoint_len(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| (b & 0xc0) != 0x80).count()
}
