//! Line search: from candidate positions (or whole chunks) to confirmed
//! regex matches.
//!
//! Candidates from the index walk are radix-sorted and coalesced into
//! line-aligned ranges; each range is scanned with the real regex. When
//! the filter is not selective enough, or a file-path filter makes most
//! of a chunk irrelevant, the driver falls back to scanning the chunk
//! linearly, skipping over byte ranges whose files the path filter
//! rejects (the "finger" over the chunk's interval records).

use std::cell::RefCell;

use crate::config::{MAX_SCAN, MIN_FILTER_RATIO, MIN_SKIP};
use crate::corpus::chunk::Chunk;
use crate::utils::{find_line, line_end, line_start, lsd_radix_sort};

use super::walker::{filter_chunk, Filtered};
use super::{SearchJob, Timer};

thread_local! {
    /// Reusable per-thread candidate buffer; grows to one chunk budget.
    static CANDIDATES: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
    static SORT_SCRATCH: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
}

/// Monotonic cursor over a chunk's interval records, advanced by
/// `next_range` as the scan position moves forward.
pub(crate) struct Finger {
    idx: usize,
}

impl Finger {
    fn new() -> Self {
        Self { idx: 0 }
    }
}

impl SearchJob {
    /// Index-assisted search of one chunk.
    pub(crate) fn filtered_search(&self, chunk: &Chunk) {
        CANDIDATES.with(|buf| {
            let mut buf = buf.borrow_mut();
            let budget = chunk.capacity() / MIN_FILTER_RATIO;
            let filtered = {
                let _t = self.timer(Timer::Index);
                filter_chunk(chunk, &self.index_key, &mut buf, budget)
            };
            match filtered {
                Filtered::Candidates(count) => {
                    log::debug!("chunk filter: {}/{} candidates", count, chunk.size());
                    self.search_lines(&mut buf, chunk);
                }
                Filtered::OverBudget => {
                    log::debug!("chunk filter over budget, scanning");
                    self.full_chunk(chunk);
                }
            }
        });
    }

    /// Scan line ranges around sorted candidates with the real regex.
    fn search_lines(&self, candidates: &mut Vec<u32>, chunk: &Chunk) {
        if candidates.is_empty() {
            return;
        }

        // Not selective enough: scanning everything is cheaper.
        if candidates.len() * MIN_FILTER_RATIO > chunk.size() {
            self.full_chunk(chunk);
            return;
        }

        // With a path filter, sparse accepted files make the finger-driven
        // linear scan cheaper than visiting scattered candidates.
        if self.file_pattern.is_some()
            && (candidates.len() * 30) as f64 / chunk.size() as f64 > self.files_density()
        {
            self.full_chunk(chunk);
            return;
        }

        SORT_SCRATCH.with(|scratch| {
            let _t = self.timer(Timer::Sort);
            lsd_radix_sort(candidates, &mut scratch.borrow_mut());
        });

        let data = chunk.data();
        let mut finger = Finger::new();
        let count = candidates.len();

        let mut max = candidates[0] as usize;
        let mut min = line_start(data, max);
        for i in 0..=count {
            if self.exit_early() {
                break;
            }
            if i != count {
                let c = candidates[i] as usize;
                if c < max {
                    continue;
                }
                if c < max + MIN_SKIP {
                    max = c;
                    continue;
                }
            }

            let end = line_end(data, max);
            self.full_search(&mut finger, chunk, min, end);

            if i != count {
                max = candidates[i] as usize;
                min = line_start(data, max);
            }
        }
    }

    /// Scan an entire chunk.
    pub(crate) fn full_chunk(&self, chunk: &Chunk) {
        let mut finger = Finger::new();
        self.full_search(&mut finger, chunk, 0, chunk.size());
    }

    /// With a path filter and indexing enabled, advance `pos`/`end` to the
    /// next sub-range of `[pos, maxpos)` covered by interval records with
    /// accepted files, absorbing records separated by less than
    /// `MIN_SKIP`. Without a filter the whole range stands.
    fn next_range(&self, finger: &mut Finger, pos: &mut usize, end: &mut usize, maxpos: usize, chunk: &Chunk) {
        if self.file_pattern.is_none() || !self.config.index {
            return;
        }

        let records = chunk.files();
        let mut it = finger.idx;

        // First accepted record intersecting [pos, maxpos)
        while it < records.len()
            && (records[it].right < *pos as u32 || !self.accept_any(&records[it].files))
            && (records[it].left as usize) < maxpos
        {
            it += 1;
        }

        if it >= records.len() || records[it].left as usize >= maxpos {
            finger.idx = it;
            *pos = maxpos;
            *end = maxpos;
            return;
        }

        *pos = (*pos).max(records[it].left as usize);
        *end = records[it].right as usize;

        // Absorb nearby accepted records until a gap of MIN_SKIP or more,
        // or the range is proven to extend past maxpos.
        loop {
            if records[it].left as usize >= *end + MIN_SKIP {
                break;
            }
            if records[it].right as usize >= *end && self.accept_any(&records[it].files) {
                *end = (*end).max(records[it].right as usize);
                if *end >= maxpos {
                    break;
                }
            }
            it += 1;
            if it >= records.len() || records[it].left as usize >= maxpos {
                break;
            }
        }

        finger.idx = it;
        *end = (*end).min(maxpos);
    }

    /// Run the regex over `[minpos, maxpos)` of the chunk, confirming
    /// matches line by line. Scans are bounded by `MAX_SCAN` but always
    /// extended to a line boundary.
    pub(crate) fn full_search(
        &self,
        finger: &mut Finger,
        chunk: &Chunk,
        minpos: usize,
        maxpos: usize,
    ) {
        let data = chunk.data();
        let mut pos = minpos;
        let mut end = minpos;

        while pos < maxpos && !self.exit_early() {
            if pos >= end {
                end = maxpos;
                self.next_range(finger, &mut pos, &mut end, maxpos, chunk);
                debug_assert!(pos <= end);
            }
            if pos >= maxpos {
                break;
            }

            let mut limit = end;
            if limit - pos > MAX_SCAN {
                limit = line_end(data, pos + MAX_SCAN);
            }

            let found = {
                let _t = self.timer(Timer::Regex);
                self.pattern.find_at(&data[..limit], pos)
            };

            let Some(m) = found else {
                pos = limit + 1;
                continue;
            };

            // The decomposition never admits '\n' and '.' does not match
            // it, so a match stays within one line.
            debug_assert!(!data[m.start()..m.end()].contains(&b'\n'));
            let (ls, le) = find_line(data, m.start(), m.end());
            if let Ok(line) = std::str::from_utf8(&data[ls..le]) {
                self.find_match(chunk, line, (m.start(), m.end()), (ls, le));
            }
            pos = le + 1;
        }
    }
}
