//! LSD radix sort for `u32` keys.
//!
//! Candidate position arrays coming out of the index walk are unsorted;
//! sorting them lets the line-search driver coalesce nearby positions into
//! single scan ranges. For tens of thousands of small integer keys a
//! byte-wise counting sort beats a comparison sort.

/// Sort `keys` ascending using four counting-sort passes over a scratch
/// buffer. Passes where every key shares the same byte are skipped.
pub fn lsd_radix_sort(keys: &mut [u32], scratch: &mut Vec<u32>) {
    if keys.len() <= 1 {
        return;
    }

    scratch.clear();
    scratch.resize(keys.len(), 0);

    let mut src: &mut [u32] = keys;
    let mut dst: &mut [u32] = &mut scratch[..];
    let mut in_place = true;

    for pass in 0..4 {
        let shift = pass * 8;

        let mut counts = [0usize; 256];
        for &k in src.iter() {
            counts[((k >> shift) & 0xff) as usize] += 1;
        }

        // All keys share this byte: nothing to move.
        if counts[((src[0] >> shift) & 0xff) as usize] == src.len() {
            continue;
        }

        let mut offsets = [0usize; 256];
        let mut total = 0;
        for (off, &c) in offsets.iter_mut().zip(counts.iter()) {
            *off = total;
            total += c;
        }

        for &k in src.iter() {
            let b = ((k >> shift) & 0xff) as usize;
            dst[offsets[b]] = k;
            offsets[b] += 1;
        }

        std::mem::swap(&mut src, &mut dst);
        in_place = !in_place;
    }

    // An odd number of productive passes leaves the result in the scratch
    // buffer; move it back into the caller's slice.
    if !in_place {
        dst.copy_from_slice(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(mut keys: Vec<u32>) {
        let mut expected = keys.clone();
        expected.sort_unstable();
        let mut scratch = Vec::new();
        lsd_radix_sort(&mut keys, &mut scratch);
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_sorts_like_std() {
        check(vec![]);
        check(vec![42]);
        check(vec![3, 1, 2]);
        check(vec![0, u32::MAX, 1 << 24, 1 << 16, 255, 256]);
        check((0..1000).rev().collect());
    }

    #[test]
    fn test_duplicates_and_shared_bytes() {
        check(vec![7, 7, 7, 7]);
        // all keys share the upper three bytes, exercising pass skipping
        check(vec![0x00ab_cd10, 0x00ab_cd02, 0x00ab_cdff, 0x00ab_cd00]);
    }

    #[test]
    fn test_pseudorandom() {
        let mut x = 0x1234_5678u32;
        let keys: Vec<u32> = (0..4096)
            .map(|_| {
                // xorshift, deterministic
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x
            })
            .collect();
        check(keys);
    }
}
