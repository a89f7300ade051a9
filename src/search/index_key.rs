//! Conservative regex decomposition into a byte-range prefix tree.
//!
//! An [`IndexKey`] describes a set of acceptable byte prefixes for a
//! regex: an `empty` node accepts any suffix; otherwise the first byte
//! must fall into one of the node's disjoint ranges and the remaining
//! bytes must satisfy the corresponding child. The suffix-array walk uses
//! the tree to prune candidate positions, so the decomposition must be
//! conservative: every string the regex can match keeps at least one
//! accepted prefix. When the analyzer cannot guarantee that (wide
//! classes, non-ASCII, deep nesting) it degrades to an `empty` node.
//!
//! Newline never appears in a range: confirmed matches cannot contain a
//! line terminator, so pruning `'\n'` loses nothing.

use std::sync::Arc;

use anyhow::{Context, Result};
use regex_syntax::hir::{Class, Hir, HirKind};

/// Branch fan-out stops below this depth; deeper constraints rarely pay
/// for the extra suffix-array partitioning.
pub const MAX_DEPTH: usize = 8;

/// A node whose ranges cover more than this many distinct bytes is not
/// selective enough to be worth descending into.
const MAX_WIDTH: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    empty: bool,
    /// Disjoint inclusive byte ranges, sorted by `lo`, never containing
    /// `'\n'`.
    branches: Vec<(u8, u8, Arc<IndexKey>)>,
}

impl IndexKey {
    /// True when any suffix is acceptable (the key constrains nothing).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    #[inline]
    pub fn branches(&self) -> &[(u8, u8, Arc<IndexKey>)] {
        &self.branches
    }

    /// Decompose `pattern` into a prefix tree. Anchors are compiled with
    /// multi-line semantics to match the scanner's regex flags.
    pub fn from_regex(pattern: &str) -> Result<Arc<IndexKey>> {
        let hir = regex_syntax::ParserBuilder::new()
            .multi_line(true)
            .build()
            .parse(pattern)
            .context("invalid pattern")?;
        Ok(build_seq(&[&hir], 0))
    }

    /// Whether `bytes` starts with a prefix this key accepts. Used by
    /// tests to check conservativeness; the walker implements the same
    /// descent over suffix-array slices.
    pub fn accepts_prefix_of(&self, bytes: &[u8]) -> bool {
        if self.empty {
            return true;
        }
        if self.branches.is_empty() {
            // No range survived analysis for this node; treat as
            // unconstrained, mirroring the walker's copy-out behavior.
            return true;
        }
        let Some((&b, rest)) = bytes.split_first() else {
            return false;
        };
        self.branches
            .iter()
            .any(|&(lo, hi, ref child)| lo <= b && b <= hi && child.accepts_prefix_of(rest))
    }
}

fn any() -> Arc<IndexKey> {
    Arc::new(IndexKey {
        empty: true,
        branches: Vec::new(),
    })
}

fn node(branches: Vec<(u8, u8, Arc<IndexKey>)>) -> Arc<IndexKey> {
    Arc::new(IndexKey {
        empty: false,
        branches,
    })
}

/// Build the key for the HIR sequence `seq` starting at `depth`.
fn build_seq(seq: &[&Hir], depth: usize) -> Arc<IndexKey> {
    if depth >= MAX_DEPTH {
        return any();
    }
    let Some((&first, rest)) = seq.split_first() else {
        // End of pattern: the match is complete, any suffix follows.
        return any();
    };

    match first.kind() {
        HirKind::Empty | HirKind::Look(_) => build_seq(rest, depth),
        HirKind::Literal(lit) => build_literal(&lit.0, rest, depth),
        HirKind::Class(class) => match class_byte_ranges(class) {
            Some(ranges) if range_width(&ranges) <= MAX_WIDTH => {
                let child = build_seq(rest, depth + 1);
                node(
                    ranges
                        .into_iter()
                        .map(|(lo, hi)| (lo, hi, child.clone()))
                        .collect(),
                )
            }
            _ => any(),
        },
        HirKind::Concat(xs) => {
            let mut seq: Vec<&Hir> = xs.iter().collect();
            seq.extend_from_slice(rest);
            build_seq(&seq, depth)
        }
        HirKind::Alternation(xs) => {
            let mut acc: Option<Arc<IndexKey>> = None;
            for x in xs {
                let mut seq: Vec<&Hir> = vec![x];
                seq.extend_from_slice(rest);
                let key = build_seq(&seq, depth);
                acc = Some(match acc {
                    None => key,
                    Some(prev) => union(&prev, &key),
                });
                if acc.as_ref().is_some_and(|k| k.empty) {
                    break;
                }
            }
            acc.unwrap_or_else(any)
        }
        HirKind::Capture(cap) => {
            let mut seq: Vec<&Hir> = vec![cap.sub.as_ref()];
            seq.extend_from_slice(rest);
            build_seq(&seq, depth)
        }
        HirKind::Repetition(rep) => {
            // After one occurrence the continuation is only known when at
            // most one is allowed; otherwise the tail is unconstrained.
            let once: &[&Hir] = if rep.max == Some(1) { rest } else { &[] };
            let mut seq: Vec<&Hir> = vec![rep.sub.as_ref()];
            seq.extend_from_slice(once);
            let taken = build_seq(&seq, depth);
            if rep.min == 0 {
                let skipped = build_seq(rest, depth);
                union(&taken, &skipped)
            } else {
                taken
            }
        }
    }
}

fn build_literal(bytes: &[u8], rest: &[&Hir], depth: usize) -> Arc<IndexKey> {
    if depth >= MAX_DEPTH {
        return any();
    }
    let Some((&b, tail)) = bytes.split_first() else {
        return build_seq(rest, depth);
    };
    if b == b'\n' {
        // A literal newline can never sit inside a line match.
        return any();
    }
    node(vec![(b, b, build_literal(tail, rest, depth + 1))])
}

/// Convert a class into concrete byte ranges, or `None` when it cannot be
/// represented byte-wise (non-ASCII unicode ranges). `'\n'` is clipped.
fn class_byte_ranges(class: &Class) -> Option<Vec<(u8, u8)>> {
    let raw: Vec<(u8, u8)> = match class {
        Class::Bytes(cb) => cb.iter().map(|r| (r.start(), r.end())).collect(),
        Class::Unicode(cu) => {
            let mut out = Vec::new();
            for r in cu.iter() {
                if (r.end() as u32) > 0x7f {
                    return None;
                }
                out.push((r.start() as u8, r.end() as u8));
            }
            out
        }
    };

    let mut clipped = Vec::with_capacity(raw.len());
    for (lo, hi) in raw {
        if lo <= b'\n' && b'\n' <= hi {
            if lo < b'\n' {
                clipped.push((lo, b'\n' - 1));
            }
            if b'\n' < hi {
                clipped.push((b'\n' + 1, hi));
            }
        } else {
            clipped.push((lo, hi));
        }
    }
    Some(clipped)
}

fn range_width(ranges: &[(u8, u8)]) -> u32 {
    ranges.iter().map(|&(lo, hi)| (hi - lo) as u32 + 1).sum()
}

/// Union two keys: the result accepts every prefix either side accepts.
/// Overlapping ranges are split at boundaries and their children union'd
/// recursively.
fn union(a: &Arc<IndexKey>, b: &Arc<IndexKey>) -> Arc<IndexKey> {
    if a.empty || b.empty {
        return any();
    }

    fn push(out: &mut Vec<(u8, u8, Arc<IndexKey>)>, lo: u8, hi: u8, child: Arc<IndexKey>) {
        if let Some(last) = out.last_mut() {
            if last.1 < u8::MAX && last.1 + 1 == lo && Arc::ptr_eq(&last.2, &child) {
                last.1 = hi;
                return;
            }
        }
        out.push((lo, hi, child));
    }

    let mut out: Vec<(u8, u8, Arc<IndexKey>)> = Vec::new();
    let mut ai = a.branches.iter().cloned();
    let mut bi = b.branches.iter().cloned();
    let mut ha = ai.next();
    let mut hb = bi.next();

    loop {
        match (ha.take(), hb.take()) {
            (None, None) => break,
            (Some(x), None) => {
                push(&mut out, x.0, x.1, x.2);
                ha = ai.next();
            }
            (None, Some(y)) => {
                push(&mut out, y.0, y.1, y.2);
                hb = bi.next();
            }
            (Some(x), Some(y)) => {
                if x.1 < y.0 {
                    push(&mut out, x.0, x.1, x.2);
                    ha = ai.next();
                    hb = Some(y);
                } else if y.1 < x.0 {
                    push(&mut out, y.0, y.1, y.2);
                    hb = bi.next();
                    ha = Some(x);
                } else if x.0 < y.0 {
                    // leading non-overlapping part of x
                    push(&mut out, x.0, y.0 - 1, x.2.clone());
                    ha = Some((y.0, x.1, x.2));
                    hb = Some(y);
                } else if y.0 < x.0 {
                    push(&mut out, y.0, x.0 - 1, y.2.clone());
                    hb = Some((x.0, y.1, y.2));
                    ha = Some(x);
                } else {
                    // aligned starts: emit the overlap, keep remainders
                    let end = x.1.min(y.1);
                    push(&mut out, x.0, end, union(&x.2, &y.2));
                    ha = if x.1 > end {
                        Some((end + 1, x.1, x.2))
                    } else {
                        ai.next()
                    };
                    hb = if y.1 > end {
                        Some((end + 1, y.1, y.2))
                    } else {
                        bi.next()
                    };
                }
            }
        }
    }

    node(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pattern: &str) -> Arc<IndexKey> {
        IndexKey::from_regex(pattern).unwrap()
    }

    fn single_path(key: &IndexKey) -> Vec<u8> {
        let mut out = Vec::new();
        let mut cur = key;
        loop {
            if cur.is_empty() || cur.branches().len() != 1 {
                return out;
            }
            let (lo, hi, ref child) = cur.branches()[0];
            if lo != hi {
                return out;
            }
            out.push(lo);
            cur = child;
        }
    }

    #[test]
    fn test_literal_chain() {
        let k = key("needle");
        assert!(!k.is_empty());
        assert_eq!(single_path(&k), b"needle");
    }

    #[test]
    fn test_literal_followed_by_any_char() {
        let k = key("ba.");
        assert_eq!(single_path(&k), b"ba");
        // '.' is the full any-char class; too wide, so the tail is open
        let mut cur: &IndexKey = &k;
        for _ in 0..2 {
            cur = &cur.branches()[0].2;
        }
        assert!(cur.is_empty());
    }

    #[test]
    fn test_alternation_roots() {
        let k = key("foo|bar");
        let firsts: Vec<u8> = k.branches().iter().map(|&(lo, _, _)| lo).collect();
        assert_eq!(firsts, vec![b'b', b'f']);
    }

    #[test]
    fn test_alternation_shared_prefix_unions_children() {
        let k = key("ab|ac");
        assert_eq!(k.branches().len(), 1);
        let child = &k.branches()[0].2;
        let seconds: Vec<u8> = child.branches().iter().map(|&(lo, _, _)| lo).collect();
        assert_eq!(seconds, vec![b'b', b'c']);
    }

    #[test]
    fn test_optional_prefix_makes_key_open() {
        // "a|ab": after 'a' the match may already be complete
        let k = key("a|ab");
        assert_eq!(k.branches().len(), 1);
        assert!(k.branches()[0].2.is_empty());
    }

    #[test]
    fn test_wide_classes_degrade_to_empty() {
        assert!(key(r"\w+").is_empty());
        assert!(key(".*").is_empty());
        assert!(key("x*").is_empty());
    }

    #[test]
    fn test_small_class() {
        let k = key("[ab]c");
        let ranges: Vec<(u8, u8)> = k.branches().iter().map(|&(lo, hi, _)| (lo, hi)).collect();
        assert_eq!(ranges, vec![(b'a', b'b')]);
        assert_eq!(single_path(&k.branches()[0].2), b"c");
    }

    #[test]
    fn test_case_insensitive_literal() {
        let k = key("(?i)f");
        let firsts: Vec<u8> = k.branches().iter().map(|&(lo, _, _)| lo).collect();
        assert_eq!(firsts, vec![b'F', b'f']);
    }

    #[test]
    fn test_newline_clipped_from_classes() {
        let k = key("x[\ny]z");
        let child = &k.branches()[0].2;
        let ranges: Vec<(u8, u8)> = child
            .branches()
            .iter()
            .map(|&(lo, hi, _)| (lo, hi))
            .collect();
        assert_eq!(ranges, vec![(b'y', b'y')]);
    }

    #[test]
    fn test_anchors_are_skipped() {
        let k = key("^main$");
        assert_eq!(single_path(&k), b"main");
    }

    #[test]
    fn test_plus_requires_one_occurrence() {
        let k = key("ab+c");
        assert_eq!(single_path(&k), b"ab");
    }

    #[test]
    fn test_depth_cap() {
        let k = key("abcdefghijklmnop");
        assert_eq!(single_path(&k).len(), MAX_DEPTH);
    }

    #[test]
    fn test_conservative_on_sample_lines() {
        let lines: [&[u8]; 6] = [
            b"fn main() {",
            b"let x = compute(42);",
            b"bar baz foo",
            b"Needle in a haystack",
            b"x\ty z",
            b"",
        ];
        let patterns = [
            "foo",
            "ba.",
            "foo|bar|baz",
            "(?i)needle",
            "ma?in",
            r"comp\w+\(",
            "x[\t ]y",
            r"(let|const) x",
        ];
        for pat in patterns {
            let k = key(pat);
            let re = regex::bytes::RegexBuilder::new(pat)
                .multi_line(true)
                .build()
                .unwrap();
            for line in lines {
                for m in re.find_iter(line) {
                    assert!(
                        k.accepts_prefix_of(&line[m.start()..]),
                        "pattern {:?} match at {} in {:?} was pruned",
                        pat,
                        m.start(),
                        String::from_utf8_lossy(line)
                    );
                }
            }
        }
    }
}
