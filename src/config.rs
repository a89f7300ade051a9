use serde::{Deserialize, Serialize};

/// Number of context lines captured before and after each match.
pub const CONTEXT_LINES: usize = 3;

/// Candidate positions closer than this are coalesced into one scan range.
pub const MIN_SKIP: usize = 250;

/// The index walk may emit at most `chunk_size / MIN_FILTER_RATIO`
/// candidates before the filter is considered useless for a chunk.
pub const MIN_FILTER_RATIO: usize = 50;

/// Upper bound on a single regex scan; extended to the next newline so a
/// line is never cut mid-way.
pub const MAX_SCAN: usize = 1 << 20;

/// Process-wide engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Use the suffix-array index to prune candidate positions
    pub index: bool,
    /// Actually run queries; when false, build only
    pub search: bool,
    /// Per-query cap on emitted matches
    pub max_matches: usize,
    /// Per-query deadline in seconds; zero or negative disables it
    pub timeout_secs: i64,
    /// Worker pool size
    pub threads: usize,
    /// Whitespace-separated top-level directory names walked first
    pub order_root: String,
    /// Capacity of each chunk arena in bytes
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: true,
            search: true,
            max_matches: 50,
            timeout_secs: 1,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            order_root: String::new(),
            chunk_size: 1 << 21,
        }
    }
}
