//! Small shared helpers: line boundary arithmetic over chunk bytes and
//! the radix sort used on candidate position arrays.

pub mod radix;

pub use radix::lsd_radix_sort;

/// Position just after the previous `'\n'` before `pos`, or 0.
#[inline]
pub fn line_start(data: &[u8], pos: usize) -> usize {
    match data[..pos].iter().rposition(|&b| b == b'\n') {
        Some(nl) => nl + 1,
        None => 0,
    }
}

/// Position of the next `'\n'` at or after `pos`, or `data.len()`.
#[inline]
pub fn line_end(data: &[u8], pos: usize) -> usize {
    match data[pos..].iter().position(|&b| b == b'\n') {
        Some(nl) => pos + nl,
        None => data.len(),
    }
}

/// Expand a match span `[start, end)` to its containing line `[ls, le)`.
/// The match must not contain a newline.
#[inline]
pub fn find_line(data: &[u8], start: usize, end: usize) -> (usize, usize) {
    debug_assert!(start <= end && end <= data.len());
    debug_assert!(!data[start..end].contains(&b'\n'));
    (line_start(data, start), line_end(data, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_bounds() {
        let data = b"foo\nbar\nbaz";
        assert_eq!(line_start(data, 0), 0);
        assert_eq!(line_start(data, 2), 0);
        assert_eq!(line_start(data, 4), 4);
        assert_eq!(line_start(data, 6), 4);
        assert_eq!(line_end(data, 0), 3);
        assert_eq!(line_end(data, 4), 7);
        // final line has no terminator
        assert_eq!(line_end(data, 8), 11);
    }

    #[test]
    fn test_line_start_at_newline() {
        let data = b"a\nb\n";
        // pos pointing at the newline itself belongs to the line before it
        assert_eq!(line_start(data, 1), 0);
        assert_eq!(line_end(data, 1), 1);
    }

    #[test]
    fn test_find_line() {
        let data = b"alpha\nbeta gamma\ndelta\n";
        // "gamma" inside the second line
        let (ls, le) = find_line(data, 11, 16);
        assert_eq!(&data[ls..le], b"beta gamma");
    }
}
