//! Corpus construction: blob ingestion, line interning, deduplication.
//!
//! The builder consumes a stream of `(ref, path, bytes)` blobs. Blob
//! content is deduplicated twice: identical blobs collapse into a single
//! [`SearchFile`] carrying every path they appear under, and identical
//! lines are interned once into a chunk arena regardless of how many
//! files contain them. Each file records its content as an ordered list
//! of [`Segment`]s pointing back into chunks, which is enough to
//! reconstruct the file and to resolve line numbers and context at
//! search time.
//!
//! [`CorpusBuilder::finalize`] seals every chunk (suffix array +
//! chunk-file tree) and yields an immutable [`Corpus`]; only a `Corpus`
//! can be searched, so searching an unfinalized corpus is a type error
//! rather than a runtime one.

pub mod alloc;
pub mod chunk;
pub mod walk;

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::config::Config;
use alloc::{ChunkAllocator, HeapAllocator};
use chunk::{Chunk, Span};

/// Dense index of a [`SearchFile`] in the corpus file table.
pub type FileId = u32;

/// 20-byte content identifier. For blobs that come out of a git tree this
/// is the blob's object id; for raw bytes it is computed the same way.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub [u8; 20]);

impl BlobId {
    pub fn for_bytes(data: &[u8]) -> Result<Self> {
        let oid = git2::Oid::hash_object(git2::ObjectType::Blob, data)
            .context("failed to hash blob content")?;
        Ok(Self::from_oid(oid))
    }

    pub fn from_oid(oid: git2::Oid) -> Self {
        let mut id = [0u8; 20];
        id.copy_from_slice(oid.as_bytes());
        Self(id)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// One location a blob appears at: a ref plus a slash-separated path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitPath {
    pub ref_name: Arc<str>,
    pub path: String,
}

/// A coalesced span of one file's content inside a single chunk.
/// `[start, end)` excludes the final line's terminator but includes
/// interior ones, so joining a file's segments with `'\n'` between
/// non-adjacent neighbors reconstructs the ingested content (minus the
/// trailing terminator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub chunk: u32,
    pub start: u32,
    pub end: u32,
}

/// A content-deduplicated file.
#[derive(Debug)]
pub struct SearchFile {
    pub no: FileId,
    pub id: BlobId,
    pub paths: Vec<GitPath>,
    pub content: Vec<Segment>,
}

/// Ingestion counters, before and after deduplication.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CorpusStats {
    pub bytes: u64,
    pub dedup_bytes: u64,
    pub lines: u64,
    pub dedup_lines: u64,
    pub files: u64,
    pub dedup_files: u64,
}

pub struct CorpusBuilder {
    alloc: Box<dyn ChunkAllocator>,
    chunks: Vec<Chunk>,
    files: Vec<SearchFile>,
    file_map: AHashMap<BlobId, FileId>,
    lines: AHashMap<Box<[u8]>, Span>,
    refs: Vec<Arc<str>>,
    stats: CorpusStats,
}

impl CorpusBuilder {
    pub fn new(config: &Config) -> Self {
        Self::with_allocator(Box::new(HeapAllocator::new(config.chunk_size)))
    }

    pub fn with_allocator(alloc: Box<dyn ChunkAllocator>) -> Self {
        Self {
            alloc,
            chunks: Vec::new(),
            files: Vec::new(),
            file_map: AHashMap::new(),
            lines: AHashMap::new(),
            refs: Vec::new(),
            stats: CorpusStats::default(),
        }
    }

    pub fn stats(&self) -> &CorpusStats {
        &self.stats
    }

    /// Ingest a blob, hashing its content to derive the dedup id.
    pub fn ingest(&mut self, ref_name: &str, path: &str, bytes: &[u8]) -> Result<()> {
        let id = BlobId::for_bytes(bytes)?;
        self.ingest_with_id(id, ref_name, path, bytes)
    }

    /// Ingest a blob whose content id is already known (e.g. a git oid).
    ///
    /// Blobs containing a NUL byte are skipped. A blob whose id is
    /// already present only gains a path. Otherwise the blob is walked
    /// line by line: each complete newline-terminated line is interned
    /// into a chunk (a trailing unterminated line is dropped), the
    /// owning chunk records the file↔interval association, and the
    /// file's segment list is extended.
    pub fn ingest_with_id(
        &mut self,
        id: BlobId,
        ref_name: &str,
        path: &str,
        bytes: &[u8],
    ) -> Result<()> {
        if bytes.contains(&0) {
            return Ok(());
        }

        self.stats.bytes += bytes.len() as u64;
        self.stats.files += 1;

        let git_path = GitPath {
            ref_name: self.intern_ref(ref_name),
            path: path.to_string(),
        };

        if let Some(&no) = self.file_map.get(&id) {
            self.files[no as usize].paths.push(git_path);
            return Ok(());
        }

        self.stats.dedup_files += 1;

        let no = self.files.len() as FileId;
        let mut sf = SearchFile {
            no,
            id,
            paths: vec![git_path],
            content: Vec::new(),
        };

        let mut p = 0;
        while let Some(nl) = bytes[p..].iter().position(|&b| b == b'\n') {
            let end = p + nl;
            let span = self.intern_line(&bytes[p..=end])?;
            self.chunks[span.chunk as usize].add_chunk_file(no, span.start, span.len);

            // Content span of the line, exclusive of its terminator.
            let cstart = span.start;
            let cend = span.start + span.len - 1;
            match sf.content.last_mut() {
                Some(seg) if seg.chunk == span.chunk && seg.end + 1 == cstart => {
                    seg.end = cend;
                }
                _ => sf.content.push(Segment {
                    chunk: span.chunk,
                    start: cstart,
                    end: cend,
                }),
            }

            self.stats.lines += 1;
            p = end + 1;
        }

        self.files.push(sf);
        self.file_map.insert(id, no);

        for chunk in &mut self.chunks {
            chunk.finish_file();
        }
        Ok(())
    }

    /// Seal the corpus: every chunk gets its suffix array and chunk-file
    /// tree. The builder is consumed; the result is immutable.
    pub fn finalize(mut self) -> Corpus {
        use rayon::prelude::*;
        self.chunks.par_iter_mut().for_each(|c| c.finalize());
        log::debug!(
            "finalized corpus: {} chunks, {} files ({} dedup), {} lines ({} dedup)",
            self.chunks.len(),
            self.stats.files,
            self.stats.dedup_files,
            self.stats.lines,
            self.stats.dedup_lines,
        );
        Corpus {
            chunks: self.chunks,
            files: self.files,
            stats: self.stats,
        }
    }

    fn intern_ref(&mut self, name: &str) -> Arc<str> {
        match self.refs.iter().find(|r| r.as_ref() == name) {
            Some(r) => r.clone(),
            None => {
                let r: Arc<str> = Arc::from(name);
                self.refs.push(r.clone());
                r
            }
        }
    }

    /// Look up or copy one `line + '\n'` into the current chunk.
    fn intern_line(&mut self, line_nl: &[u8]) -> Result<Span> {
        let key = &line_nl[..line_nl.len() - 1];
        if let Some(&span) = self.lines.get(key) {
            return Ok(span);
        }

        self.stats.dedup_lines += 1;
        self.stats.dedup_bytes += line_nl.len() as u64;

        if self.chunks.last().map_or(true, |c| !c.fits(line_nl.len())) {
            if line_nl.len() > self.alloc.chunk_size() {
                bail!(
                    "line of {} bytes exceeds chunk capacity {}",
                    line_nl.len(),
                    self.alloc.chunk_size()
                );
            }
            let store = self.alloc.new_store()?;
            self.chunks.push(Chunk::new(self.chunks.len() as u32, store));
        }

        let chunk_no = (self.chunks.len() - 1) as u32;
        let start = self.chunks[chunk_no as usize].alloc(line_nl);
        let span = Span {
            chunk: chunk_no,
            start,
            len: line_nl.len() as u32,
        };
        self.lines.insert(key.into(), span);
        Ok(span)
    }
}

/// The finalized, immutable corpus: shared read-only across query workers.
pub struct Corpus {
    chunks: Vec<Chunk>,
    files: Vec<SearchFile>,
    stats: CorpusStats,
}

impl Corpus {
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn files(&self) -> &[SearchFile] {
        &self.files
    }

    pub fn file(&self, no: FileId) -> &SearchFile {
        &self.files[no as usize]
    }

    pub fn stats(&self) -> &CorpusStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> CorpusBuilder {
        CorpusBuilder::new(&Config::default())
    }

    /// Reassemble a file's bytes from its segments (plus the trailing
    /// terminator every ingested line carries).
    fn reconstruct(corpus: &Corpus, sf: &SearchFile) -> Vec<u8> {
        let mut out = Vec::new();
        for seg in &sf.content {
            let data = corpus.chunks()[seg.chunk as usize].data();
            out.extend_from_slice(&data[seg.start as usize..seg.end as usize]);
            out.push(b'\n');
        }
        out
    }

    #[test]
    fn test_identical_blobs_dedup_into_one_file() {
        let mut b = builder();
        b.ingest("r1", "f", b"x\ny\n").unwrap();
        b.ingest("r2", "f", b"x\ny\n").unwrap();
        let corpus = b.finalize();

        assert_eq!(corpus.files().len(), 1);
        let sf = corpus.file(0);
        assert_eq!(sf.paths.len(), 2);
        assert_eq!(sf.paths[0].ref_name.as_ref(), "r1");
        assert_eq!(sf.paths[1].ref_name.as_ref(), "r2");
        assert_eq!(corpus.stats().files, 2);
        assert_eq!(corpus.stats().dedup_files, 1);
    }

    #[test]
    fn test_shared_lines_interned_once() {
        let mut b = builder();
        b.ingest("r", "a", b"common\nonly-a\n").unwrap();
        b.ingest("r", "b", b"common\nonly-b\n").unwrap();
        let corpus = b.finalize();

        assert_eq!(corpus.stats().lines, 4);
        assert_eq!(corpus.stats().dedup_lines, 3);
        // file b's first segment points at the same bytes as file a's
        let a0 = corpus.file(0).content[0];
        let b0 = corpus.file(1).content[0];
        assert_eq!(a0.chunk, b0.chunk);
        assert_eq!(a0.start, b0.start);
    }

    #[test]
    fn test_nul_blob_skipped() {
        let mut b = builder();
        b.ingest("r", "bin", b"ab\0cd\n").unwrap();
        let corpus = b.finalize();
        assert!(corpus.files().is_empty());
        assert_eq!(corpus.stats().files, 0);
    }

    #[test]
    fn test_unterminated_final_line_dropped() {
        let mut b = builder();
        b.ingest("r", "f", b"kept\ndropped").unwrap();
        let corpus = b.finalize();
        let sf = corpus.file(0);
        assert_eq!(reconstruct(&corpus, sf), b"kept\n");
        assert_eq!(corpus.stats().lines, 1);
    }

    #[test]
    fn test_segments_reconstruct_content() {
        let mut b = builder();
        // interleave shared and unique lines so segmentation fragments
        b.ingest("r", "a", b"one\ntwo\nthree\n").unwrap();
        b.ingest("r", "b", b"zero\ntwo\nfour\n").unwrap();
        let corpus = b.finalize();

        assert_eq!(reconstruct(&corpus, corpus.file(0)), b"one\ntwo\nthree\n");
        assert_eq!(reconstruct(&corpus, corpus.file(1)), b"zero\ntwo\nfour\n");
        // file a's lines are physically adjacent: one segment
        assert_eq!(corpus.file(0).content.len(), 1);
        // file b reuses "two" from the middle of a's run: three segments
        assert_eq!(corpus.file(1).content.len(), 3);
    }

    #[test]
    fn test_duplicate_line_within_one_blob() {
        let mut b = builder();
        b.ingest("r", "f", b"dup\nmid\ndup\n").unwrap();
        let corpus = b.finalize();
        assert_eq!(corpus.stats().dedup_lines, 2);
        assert_eq!(reconstruct(&corpus, corpus.file(0)), b"dup\nmid\ndup\n");
    }

    #[test]
    fn test_empty_lines() {
        let mut b = builder();
        b.ingest("r", "f", b"a\n\n\nb\n").unwrap();
        let corpus = b.finalize();
        assert_eq!(reconstruct(&corpus, corpus.file(0)), b"a\n\n\nb\n");
    }

    #[test]
    fn test_chunk_rollover() {
        let mut b = CorpusBuilder::with_allocator(Box::new(HeapAllocator::new(32)));
        let blob: Vec<u8> = (0..8)
            .flat_map(|i| format!("line-number-{}\n", i).into_bytes())
            .collect();
        b.ingest("r", "big", &blob).unwrap();
        let corpus = b.finalize();
        assert!(corpus.chunks().len() > 1);
        assert_eq!(reconstruct(&corpus, corpus.file(0)), blob);
    }

    #[test]
    fn test_oversized_line_is_fatal() {
        let mut b = CorpusBuilder::with_allocator(Box::new(HeapAllocator::new(8)));
        let blob = b"this line is much longer than the chunk\n".to_vec();
        assert!(b.ingest("r", "f", &blob).is_err());
    }
}
