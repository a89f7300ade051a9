//! Resolving a confirmed match back to the files that contain its line.
//!
//! With indexing enabled this walks the chunk-file tree in-order, pruning
//! subtrees via `right_limit`, so files come out in ascending interval
//! order; otherwise it scans the chunk's interval records linearly.

use crate::corpus::chunk::Chunk;

use super::grouper::MatchGroup;
use super::{SearchJob, Timer};

impl SearchJob {
    /// Enumerate every accepted file whose interval covers the matched
    /// line and group the per-file matches for emission.
    pub(crate) fn find_match(
        &self,
        chunk: &Chunk,
        line: &str,
        match_span: (usize, usize),
        line_span: (usize, usize),
    ) {
        if !self.config.index {
            self.find_match_brute(chunk, line, match_span, line_span);
            return;
        }

        let _t = self.timer(Timer::Vcs);
        let loff = line_span.0 as u32;
        let mut group = MatchGroup::new(chunk.no(), line, match_span, line_span);

        let nodes = chunk.nodes();
        let records = chunk.files();

        // In-order traversal with an explicit stack. A frame popped with
        // `visit` set is scanned; otherwise its position decides which
        // children (and possibly itself, re-pushed with `visit`) to walk.
        let mut stack: Vec<(u32, bool)> = match chunk.root() {
            Some(root) => vec![(root, false)],
            None => Vec::new(),
        };

        while let Some((n, visit)) = stack.pop() {
            if self.exit_requested() {
                break;
            }
            let node = &nodes[n as usize];
            let record = &records[node.record as usize];

            if visit {
                debug_assert!(record.left <= loff && loff <= record.right);
                for &file in &record.files {
                    if !self.accept_file_id(file) {
                        continue;
                    }
                    if self.exit_early() {
                        break;
                    }
                    self.try_match(&mut group, file);
                }
                continue;
            }

            if loff > node.right_limit {
                continue;
            }
            if loff >= record.left {
                if let Some(right) = node.right {
                    stack.push((right, false));
                }
                if loff <= record.right {
                    stack.push((n, true));
                }
            }
            if let Some(left) = node.left {
                stack.push((left, false));
            }
        }

        self.finish_group(group);
    }

    /// Linear fallback over the chunk's interval records.
    fn find_match_brute(
        &self,
        chunk: &Chunk,
        line: &str,
        match_span: (usize, usize),
        line_span: (usize, usize),
    ) {
        let _t = self.timer(Timer::Vcs);
        let loff = line_span.0 as u32;
        let mut group = MatchGroup::new(chunk.no(), line, match_span, line_span);

        for record in chunk.files() {
            if loff < record.left || loff > record.right {
                continue;
            }
            for &file in &record.files {
                if !self.accept_file_id(file) {
                    continue;
                }
                if self.exit_early() {
                    break;
                }
                self.try_match(&mut group, file);
            }
        }

        self.finish_group(group);
    }
}
