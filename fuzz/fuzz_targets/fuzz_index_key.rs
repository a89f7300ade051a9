//! Feed arbitrary pattern strings to the regex decomposition and check
//! the structural invariants of the resulting key: ranges disjoint,
//! sorted, and never containing a newline.

#![no_main]

use libfuzzer_sys::fuzz_target;
use refgrep::search::index_key::IndexKey;

fn check(key: &IndexKey) {
    let mut prev_hi: Option<u8> = None;
    for &(lo, hi, ref child) in key.branches() {
        assert!(lo <= hi);
        assert!(!(lo <= b'\n' && b'\n' <= hi), "newline inside a range");
        if let Some(p) = prev_hi {
            assert!(lo > p, "ranges out of order or overlapping");
        }
        prev_hi = Some(hi);
        check(child);
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(pattern) = std::str::from_utf8(data) else {
        return;
    };
    if pattern.len() > 128 {
        return;
    }
    if let Ok(key) = IndexKey::from_regex(pattern) {
        check(&key);

        // When the pattern also compiles as a scan regex, the key must be
        // conservative: any match inside a sample line keeps its prefix.
        if let Ok(re) = regex::bytes::RegexBuilder::new(pattern)
            .multi_line(true)
            .size_limit(1 << 20)
            .build()
        {
            let sample = b"fn main() { let x = 42; }";
            for m in re.find_iter(sample).take(8) {
                assert!(key.accepts_prefix_of(&sample[m.start()..]));
            }
        }
    }
});
