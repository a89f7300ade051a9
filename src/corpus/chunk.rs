//! Chunk arenas and their auxiliary search structures.
//!
//! A chunk is a fixed-capacity byte buffer holding concatenated interned
//! lines, each followed by `'\n'`. Finalization equips every chunk with a
//! suffix array (newline acts as the string terminator and sorts below
//! every other byte) and a set of `ChunkFile` interval records mapping
//! byte ranges back to the deduplicated files that contain them, arranged
//! into a binary tree with subtree `right_limit` maxima for pruned walks.

use std::cmp::Ordering;

use rayon::prelude::*;

use super::alloc::ChunkStore;
use super::FileId;

/// An interned line's location: `len` includes the trailing `'\n'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub chunk: u32,
    pub start: u32,
    pub len: u32,
}

/// A byte interval `[left, right]` (inclusive) inside a chunk belonging to
/// the same set of files. After finalization the records of a chunk are
/// disjoint, sorted by `left`, and jointly cover every interned byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFile {
    pub left: u32,
    pub right: u32,
    pub files: Vec<FileId>,
}

/// Node of the chunk-file tree, keyed by `left`. `right_limit` is the
/// maximum `right` over the subtree rooted here.
#[derive(Debug, Clone)]
pub struct ChunkFileNode {
    pub record: u32,
    pub left: Option<u32>,
    pub right: Option<u32>,
    pub right_limit: u32,
}

pub struct Chunk {
    no: u32,
    store: Box<dyn ChunkStore>,
    size: u32,
    /// Closed interval records; flattened into an exact cover at finalize.
    files: Vec<ChunkFile>,
    /// Records opened by the blob currently being ingested.
    open: Vec<ChunkFile>,
    suffixes: Vec<u32>,
    nodes: Vec<ChunkFileNode>,
    root: Option<u32>,
}

impl Chunk {
    pub(crate) fn new(no: u32, store: Box<dyn ChunkStore>) -> Self {
        Self {
            no,
            store,
            size: 0,
            files: Vec::new(),
            open: Vec::new(),
            suffixes: Vec::new(),
            nodes: Vec::new(),
            root: None,
        }
    }

    #[inline]
    pub fn no(&self) -> u32 {
        self.no
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.store.bytes()[..self.size as usize]
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size as usize
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    #[inline]
    pub(crate) fn fits(&self, n: usize) -> bool {
        self.size as usize + n <= self.store.capacity()
    }

    pub fn suffixes(&self) -> &[u32] {
        &self.suffixes
    }

    pub fn files(&self) -> &[ChunkFile] {
        &self.files
    }

    pub fn nodes(&self) -> &[ChunkFileNode] {
        &self.nodes
    }

    pub fn root(&self) -> Option<u32> {
        self.root
    }

    /// Copy `bytes` (a line including its terminator) into the arena.
    /// The caller has already checked capacity via `fits`.
    pub(crate) fn alloc(&mut self, bytes: &[u8]) -> u32 {
        let start = self.size as usize;
        debug_assert!(start + bytes.len() <= self.store.capacity());
        self.store.bytes_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        self.size += bytes.len() as u32;
        start as u32
    }

    /// Record that file `sf` contains the interned line at
    /// `[start, start + len)`. Adjacent lines of the same file extend the
    /// most recently opened record instead of opening a new one.
    pub(crate) fn add_chunk_file(&mut self, sf: FileId, start: u32, len: u32) {
        debug_assert!(len > 0);
        let right = start + len - 1;
        if let Some(last) = self.open.last_mut() {
            if last.files == [sf] && last.right + 1 == start {
                last.right = right;
                return;
            }
        }
        self.open.push(ChunkFile {
            left: start,
            right,
            files: vec![sf],
        });
    }

    /// Close the records opened by the current blob.
    pub(crate) fn finish_file(&mut self) {
        self.files.append(&mut self.open);
    }

    /// Seal the chunk: flatten interval records into an exact cover, sort
    /// the suffix array, and build the chunk-file tree.
    pub(crate) fn finalize(&mut self) {
        assert!(self.suffixes.is_empty(), "chunk finalized twice");
        debug_assert!(self.open.is_empty(), "finalize with an unfinished file");

        self.flatten_files();
        self.build_tree();
        self.build_suffixes();
    }

    /// Rebuild `files` so that every interned byte is covered by exactly
    /// one record whose file set is the union of all files whose content
    /// includes that byte. Records opened for different blobs over shared
    /// interned lines may overlap arbitrarily; a boundary sweep splits
    /// them into disjoint runs and re-merges adjacent runs with equal
    /// file sets.
    fn flatten_files(&mut self) {
        let records = std::mem::take(&mut self.files);
        if records.is_empty() {
            return;
        }

        // (position, is_start, record index); ends sort before starts at
        // the same position because an end at p means p is not covered.
        let mut events: Vec<(u32, bool, u32)> = Vec::with_capacity(records.len() * 2);
        for (i, r) in records.iter().enumerate() {
            debug_assert!(r.left <= r.right);
            events.push((r.left, true, i as u32));
            events.push((r.right + 1, false, i as u32));
        }
        events.sort_unstable_by_key(|&(pos, is_start, _)| (pos, is_start));

        let mut flat: Vec<ChunkFile> = Vec::new();
        let mut active: Vec<u32> = Vec::new();
        let mut i = 0;
        while i < events.len() {
            let pos = events[i].0;
            while i < events.len() && events[i].0 == pos {
                let (_, is_start, rec) = events[i];
                if is_start {
                    active.push(rec);
                } else if let Some(at) = active.iter().position(|&r| r == rec) {
                    active.swap_remove(at);
                }
                i += 1;
            }
            if active.is_empty() {
                continue;
            }

            let next = events[i].0; // an end event for every active record remains
            let mut set: Vec<FileId> = active
                .iter()
                .flat_map(|&r| records[r as usize].files.iter().copied())
                .collect();
            set.sort_unstable();
            set.dedup();

            match flat.last_mut() {
                Some(prev) if prev.right + 1 == pos && prev.files == set => {
                    prev.right = next - 1;
                }
                _ => flat.push(ChunkFile {
                    left: pos,
                    right: next - 1,
                    files: set,
                }),
            }
        }

        self.files = flat;
    }

    /// Build a balanced tree over the (sorted, disjoint) records and
    /// compute `right_limit` bottom-up.
    fn build_tree(&mut self) {
        fn build(
            nodes: &mut Vec<ChunkFileNode>,
            records: &[ChunkFile],
            lo: usize,
            hi: usize,
        ) -> Option<u32> {
            if lo >= hi {
                return None;
            }
            let mid = lo + (hi - lo) / 2;
            let left = build(nodes, records, lo, mid);
            let right = build(nodes, records, mid + 1, hi);
            let mut right_limit = records[mid].right;
            if let Some(l) = left {
                right_limit = right_limit.max(nodes[l as usize].right_limit);
            }
            if let Some(r) = right {
                right_limit = right_limit.max(nodes[r as usize].right_limit);
            }
            nodes.push(ChunkFileNode {
                record: mid as u32,
                left,
                right,
                right_limit,
            });
            Some((nodes.len() - 1) as u32)
        }

        self.nodes.clear();
        self.root = build(&mut self.nodes, &self.files, 0, self.files.len());
    }

    fn build_suffixes(&mut self) {
        let size = self.size;
        let mut suffixes: Vec<u32> = (0..size).collect();
        let data = self.data();
        // Large sorts dominate finalize time.
        if size > 100_000 {
            suffixes.par_sort_unstable_by(|&a, &b| suffix_cmp(data, a, b));
        } else {
            suffixes.sort_unstable_by(|&a, &b| suffix_cmp(data, a, b));
        }
        self.suffixes = suffixes;
    }
}

/// Compare the suffixes at offsets `a` and `b`, treating `'\n'` as the
/// string terminator: comparison stops there and it sorts below every
/// real byte. Fully terminated ties fall back to offset order so the sort
/// is total.
pub(crate) fn suffix_cmp(data: &[u8], a: u32, b: u32) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let mut i = a as usize;
    let mut j = b as usize;
    loop {
        let ca = data[i];
        let cb = data[j];
        match (ca == b'\n', cb == b'\n') {
            (true, true) => return a.cmp(&b),
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => match ca.cmp(&cb) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                ord => return ord,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::alloc::{ChunkAllocator, HeapAllocator};
    use super::*;

    fn chunk_with(lines: &[&[u8]]) -> Chunk {
        let mut alloc = HeapAllocator::new(4096);
        let mut chunk = Chunk::new(0, alloc.new_store().unwrap());
        for line in lines {
            let mut buf = line.to_vec();
            buf.push(b'\n');
            chunk.alloc(&buf);
        }
        chunk
    }

    #[test]
    fn test_suffix_order_newline_is_terminator() {
        let mut chunk = chunk_with(&[b"b", b"a"]);
        chunk.finalize();
        // data = "b\na\n": newline suffixes first (offset order), then
        // "a\n", then "b\na\n"
        assert_eq!(chunk.suffixes(), &[1, 3, 2, 0]);
    }

    #[test]
    fn test_suffix_order_tab_sorts_above_newline() {
        // '\t' (9) is numerically below '\n' (10) but must sort above it
        let mut chunk = chunk_with(&[b"\ta", b"a"]);
        chunk.finalize();
        let data = chunk.data();
        let pos = |target: &[u8]| {
            chunk
                .suffixes()
                .iter()
                .position(|&s| data[s as usize..].starts_with(target))
                .unwrap()
        };
        assert!(pos(b"\n") < pos(b"\ta"), "newline suffixes sort first");
        assert!(pos(b"\ta") < pos(b"a\n"));
    }

    #[test]
    fn test_chunk_file_extension() {
        let mut chunk = chunk_with(&[b"one", b"two"]);
        // file 0 owns both lines, physically adjacent
        chunk.add_chunk_file(0, 0, 4);
        chunk.add_chunk_file(0, 4, 4);
        chunk.finish_file();
        chunk.finalize();
        assert_eq!(
            chunk.files(),
            &[ChunkFile {
                left: 0,
                right: 7,
                files: vec![0],
            }]
        );
    }

    #[test]
    fn test_flatten_splits_shared_prefix() {
        // file 0 has lines A and B; file 1 has only line A
        let mut chunk = chunk_with(&[b"A", b"B"]);
        chunk.add_chunk_file(0, 0, 2);
        chunk.add_chunk_file(0, 2, 2);
        chunk.finish_file();
        chunk.add_chunk_file(1, 0, 2);
        chunk.finish_file();
        chunk.finalize();
        assert_eq!(
            chunk.files(),
            &[
                ChunkFile {
                    left: 0,
                    right: 1,
                    files: vec![0, 1],
                },
                ChunkFile {
                    left: 2,
                    right: 3,
                    files: vec![0],
                },
            ]
        );
    }

    #[test]
    fn test_flatten_merges_equal_adjacent_sets() {
        // both files contain both lines; the cover collapses to one record
        let mut chunk = chunk_with(&[b"A", b"B"]);
        chunk.add_chunk_file(0, 0, 2);
        chunk.add_chunk_file(0, 2, 2);
        chunk.finish_file();
        chunk.add_chunk_file(1, 0, 2);
        chunk.add_chunk_file(1, 2, 2);
        chunk.finish_file();
        chunk.finalize();
        assert_eq!(
            chunk.files(),
            &[ChunkFile {
                left: 0,
                right: 3,
                files: vec![0, 1],
            }]
        );
    }

    #[test]
    fn test_tree_right_limits() {
        let mut chunk = chunk_with(&[b"A", b"B", b"C"]);
        chunk.add_chunk_file(0, 0, 2);
        chunk.finish_file();
        chunk.add_chunk_file(1, 2, 2);
        chunk.finish_file();
        chunk.add_chunk_file(2, 4, 2);
        chunk.finish_file();
        chunk.finalize();

        let root = chunk.root().unwrap() as usize;
        let node = &chunk.nodes()[root];
        assert_eq!(chunk.files()[node.record as usize].left, 2);
        assert_eq!(node.right_limit, 5);
    }

    #[test]
    #[should_panic(expected = "finalized twice")]
    fn test_duplicate_finalize_panics() {
        let mut chunk = chunk_with(&[b"x"]);
        chunk.finalize();
        chunk.finalize();
    }
}
