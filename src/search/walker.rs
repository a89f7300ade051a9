//! Suffix-array index walk: turn an [`IndexKey`] into candidate positions.
//!
//! The walk descends the key depth-by-depth over a chunk's suffix array.
//! Every frame covers a slice of the array whose suffixes share a prefix
//! accepted by the key so far; binary searching on the next byte narrows
//! the slice per branch, and each matching range is split into its
//! concrete bytes so deeper key levels can keep pruning. Unconstrained,
//! branchless, or small slices are copied straight into the candidate
//! buffer.

use std::sync::Arc;

use crate::corpus::chunk::Chunk;

use super::index_key::IndexKey;

/// Slices at or below this length are copied out rather than partitioned
/// further; the binary searches would cost more than scanning the lines.
const SMALL_SLICE: usize = 100;

/// Outcome of filtering one chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum Filtered {
    /// `buf[..n]` holds every position that may start a match.
    Candidates(usize),
    /// The candidate set exceeded `budget`; the filter is useless here.
    OverBudget,
}

struct Frame<'k> {
    lo: usize,
    hi: usize,
    key: &'k IndexKey,
    depth: usize,
}

/// True when the suffix's `depth`-th byte sorts strictly below `b`
/// (`'\n'` sorts below every byte).
#[inline]
fn byte_lt(data: &[u8], suffix: u32, depth: usize, b: u8) -> bool {
    let c = data[suffix as usize + depth];
    c == b'\n' || c < b
}

/// True when the suffix's `depth`-th byte sorts at or below `b`.
#[inline]
fn byte_le(data: &[u8], suffix: u32, depth: usize, b: u8) -> bool {
    let c = data[suffix as usize + depth];
    c == b'\n' || c <= b
}

/// Walk `chunk`'s suffix array under `key`, appending candidate positions
/// to `buf` (cleared first) up to `budget` entries.
pub fn filter_chunk(
    chunk: &Chunk,
    key: &Arc<IndexKey>,
    buf: &mut Vec<u32>,
    budget: usize,
) -> Filtered {
    buf.clear();
    let data = chunk.data();
    let suffixes = chunk.suffixes();

    let mut stack = vec![Frame {
        lo: 0,
        hi: suffixes.len(),
        key: key.as_ref(),
        depth: 0,
    }];

    while let Some(frame) = stack.pop() {
        let Frame { lo, hi, key, depth } = frame;

        if key.is_empty() || key.branches().is_empty() || hi - lo <= SMALL_SLICE {
            if buf.len() + (hi - lo) > budget {
                return Filtered::OverBudget;
            }
            buf.extend_from_slice(&suffixes[lo..hi]);
            continue;
        }

        for (blo, bhi, child) in key.branches() {
            // Sub-slice whose `depth`-th byte lies in [blo, bhi].
            let l = lo + suffixes[lo..hi].partition_point(|&s| byte_lt(data, s, depth, *blo));
            let r = l + suffixes[l..hi].partition_point(|&s| byte_le(data, s, depth, *bhi));
            if l == r {
                continue;
            }

            // Split per concrete byte so the child key prunes further.
            let mut cl = l;
            for ch in *blo..=*bhi {
                let cr = cl + suffixes[cl..r].partition_point(|&s| byte_le(data, s, depth, ch));
                if cr != cl {
                    stack.push(Frame {
                        lo: cl,
                        hi: cr,
                        key: child.as_ref(),
                        depth: depth + 1,
                    });
                }
                cl = cr;
            }
        }
    }

    Filtered::Candidates(buf.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::corpus::CorpusBuilder;

    /// A corpus big enough that the root slice exceeds `SMALL_SLICE`.
    fn sample_corpus() -> crate::corpus::Corpus {
        let mut blob = String::new();
        for i in 0..40 {
            blob.push_str(&format!("some filler line number {:03}\n", i));
        }
        blob.push_str("the needle is here\n");
        blob.push_str("another needle too\n");
        let mut b = CorpusBuilder::new(&Config::default());
        b.ingest("r", "f", blob.as_bytes()).unwrap();
        b.finalize()
    }

    fn occurrences(data: &[u8], pat: &[u8]) -> Vec<u32> {
        (0..data.len())
            .filter(|&i| data[i..].starts_with(pat))
            .map(|i| i as u32)
            .collect()
    }

    #[test]
    fn test_candidates_cover_all_occurrences() {
        let corpus = sample_corpus();
        let chunk = &corpus.chunks()[0];
        let key = IndexKey::from_regex("needle").unwrap();

        let mut buf = Vec::new();
        let got = filter_chunk(chunk, &key, &mut buf, chunk.size());
        let expected = occurrences(chunk.data(), b"needle");

        assert_eq!(got, Filtered::Candidates(buf.len()));
        for want in &expected {
            assert!(buf.contains(want), "missing candidate {}", want);
        }
        // the walk pruned most of the chunk
        assert!(buf.len() < chunk.size() / 4);
    }

    #[test]
    fn test_class_key_keeps_both_branches() {
        let corpus = sample_corpus();
        let chunk = &corpus.chunks()[0];
        let key = IndexKey::from_regex("[nt]eedle|[nt]he").unwrap();

        let mut buf = Vec::new();
        filter_chunk(chunk, &key, &mut buf, chunk.size());
        for want in occurrences(chunk.data(), b"needle")
            .into_iter()
            .chain(occurrences(chunk.data(), b"the"))
        {
            assert!(buf.contains(&want), "missing candidate {}", want);
        }
    }

    #[test]
    fn test_over_budget() {
        let corpus = sample_corpus();
        let chunk = &corpus.chunks()[0];
        // 'e' is everywhere; with a tiny budget the walk must give up
        let key = IndexKey::from_regex("e").unwrap();

        let mut buf = Vec::new();
        assert_eq!(filter_chunk(chunk, &key, &mut buf, 2), Filtered::OverBudget);
    }
}
