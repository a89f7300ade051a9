//! Query execution: per-query state and the chunk search entry points.
//!
//! A [`SearchJob`] is created per query and shared read-only between the
//! pool workers. It owns the compiled pattern, the optional file-path
//! filter with its per-file accept cache, the regex decomposition that
//! drives index filtering, the match budget, the deadline, and the result
//! channel. Workers call [`SearchJob::search_chunk`]; everything else
//! hangs off that.

pub mod driver;
pub mod grouper;
pub mod index_key;
pub mod pool;
pub mod resolver;
pub mod walker;

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use rand::Rng;
use serde::Serialize;

use crate::config::Config;
use crate::corpus::{Corpus, FileId, GitPath, SearchFile};
use grouper::MatchResult;
use index_key::IndexKey;

pub use grouper::MatchContext;
pub use pool::SearchPool;

/// Why a query stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ExitReason {
    #[default]
    None,
    MatchLimit,
    Timeout,
}

const EXIT_NONE: u8 = 0;
const EXIT_MATCH_LIMIT: u8 = 1;
const EXIT_TIMEOUT: u8 = 2;

impl ExitReason {
    fn from_u8(v: u8) -> Self {
        match v {
            EXIT_MATCH_LIMIT => ExitReason::MatchLimit,
            EXIT_TIMEOUT => ExitReason::Timeout,
            _ => ExitReason::None,
        }
    }
}

/// Per-query timing breakdown and totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
    /// Time spent in the regex engine confirming candidates
    pub regex_time: Duration,
    /// Time spent resolving matches back to files
    pub vcs_time: Duration,
    /// Time spent walking suffix arrays
    pub index_time: Duration,
    /// Time spent sorting candidate arrays
    pub sort_time: Duration,
    /// Time spent decomposing the pattern
    pub analyze_time: Duration,
    pub matches: usize,
    pub exit_reason: ExitReason,
}

/// Nanosecond accumulators shared by the workers of one query.
#[derive(Default)]
struct Timers {
    regex: AtomicU64,
    vcs: AtomicU64,
    index: AtomicU64,
    sort: AtomicU64,
    analyze: AtomicU64,
}

/// Adds the guarded scope's wall time to an accumulator on drop.
struct TimerGuard<'a> {
    total: &'a AtomicU64,
    start: Instant,
}

impl<'a> TimerGuard<'a> {
    fn new(total: &'a AtomicU64) -> Self {
        Self {
            total,
            start: Instant::now(),
        }
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.total
            .fetch_add(self.start.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }
}

/// File-accept cache states; computation is idempotent, so racing relaxed
/// stores are harmless.
const ACCEPT_UNKNOWN: u8 = 0xff;

pub struct SearchJob {
    corpus: Arc<Corpus>,
    config: Config,
    pattern: regex::bytes::Regex,
    file_pattern: Option<regex::Regex>,
    index_key: Arc<IndexKey>,
    matches: AtomicUsize,
    exit: AtomicU8,
    deadline: Option<Instant>,
    /// Per-file accept decision under `file_pattern`
    files: Vec<AtomicU8>,
    /// Fraction of files accepted by `file_pattern`, sampled lazily
    density: Mutex<Option<f64>>,
    timers: Timers,
    results: Sender<Option<MatchResult>>,
}

impl SearchJob {
    pub(crate) fn new(
        corpus: Arc<Corpus>,
        config: Config,
        pattern: &str,
        file_pattern: Option<&str>,
        results: Sender<Option<MatchResult>>,
    ) -> Result<Arc<Self>> {
        let compiled = regex::bytes::RegexBuilder::new(pattern)
            .multi_line(true)
            .build()
            .with_context(|| format!("invalid pattern '{}'", pattern))?;
        let file_pattern = file_pattern
            .map(|p| {
                regex::Regex::new(p).with_context(|| format!("invalid file pattern '{}'", p))
            })
            .transpose()?;

        let timers = Timers::default();
        let analyze_start = Instant::now();
        let index_key = IndexKey::from_regex(pattern)?;
        timers
            .analyze
            .store(analyze_start.elapsed().as_nanos() as u64, Ordering::Relaxed);

        let deadline = (config.timeout_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(config.timeout_secs as u64));

        let files = (0..corpus.files().len())
            .map(|_| AtomicU8::new(ACCEPT_UNKNOWN))
            .collect();

        Ok(Arc::new(Self {
            corpus,
            config,
            pattern: compiled,
            file_pattern,
            index_key,
            matches: AtomicUsize::new(0),
            exit: AtomicU8::new(EXIT_NONE),
            deadline,
            files,
            density: Mutex::new(None),
            timers,
            results,
        }))
    }

    /// Search one chunk, pushing results to the query's channel. Called by
    /// pool workers; within a chunk, matches come out in ascending offset
    /// order.
    pub(crate) fn search_chunk(&self, chunk_idx: usize) {
        if self.exit.load(Ordering::Relaxed) != EXIT_NONE {
            return;
        }
        let chunk = &self.corpus.chunks()[chunk_idx];
        if self.config.index && !self.index_key.is_empty() {
            self.filtered_search(chunk);
        } else {
            self.full_chunk(chunk);
        }
    }

    pub(crate) fn send_done(&self) {
        let _ = self.results.send(None);
    }

    pub(crate) fn stats(&self, matches: usize) -> SearchStats {
        let ns = |t: &AtomicU64| Duration::from_nanos(t.load(Ordering::Relaxed));
        SearchStats {
            regex_time: ns(&self.timers.regex),
            vcs_time: ns(&self.timers.vcs),
            index_time: ns(&self.timers.index),
            sort_time: ns(&self.timers.sort),
            analyze_time: ns(&self.timers.analyze),
            matches,
            exit_reason: ExitReason::from_u8(self.exit.load(Ordering::Relaxed)),
        }
    }

    /// Check budgets, recording the exit reason on first violation. Hot
    /// path: called between candidate ranges, tree nodes, and matches.
    pub(crate) fn exit_early(&self) -> bool {
        if self.exit.load(Ordering::Relaxed) != EXIT_NONE {
            return true;
        }
        if self.matches.load(Ordering::Relaxed) >= self.config.max_matches {
            self.exit.store(EXIT_MATCH_LIMIT, Ordering::Relaxed);
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                self.exit.store(EXIT_TIMEOUT, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    #[inline]
    pub(crate) fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Relaxed) != EXIT_NONE
    }

    #[inline]
    pub(crate) fn accept_path(&self, path: &GitPath) -> bool {
        match &self.file_pattern {
            None => true,
            Some(pat) => pat.is_match(&path.path),
        }
    }

    /// Cached accept decision for one file.
    pub(crate) fn accept_file(&self, sf: &SearchFile) -> bool {
        let Some(pat) = &self.file_pattern else {
            return true;
        };
        let cached = self.files[sf.no as usize].load(Ordering::Relaxed);
        if cached != ACCEPT_UNKNOWN {
            return cached == 1;
        }
        let accepted = sf.paths.iter().any(|p| pat.is_match(&p.path));
        self.files[sf.no as usize].store(accepted as u8, Ordering::Relaxed);
        accepted
    }

    #[inline]
    pub(crate) fn accept_file_id(&self, no: FileId) -> bool {
        self.accept_file(self.corpus.file(no))
    }

    pub(crate) fn accept_any(&self, files: &[FileId]) -> bool {
        files.iter().any(|&no| self.accept_file_id(no))
    }

    /// Approximate fraction of files the path filter accepts, estimated
    /// once per query from a bounded random sample.
    pub(crate) fn files_density(&self) -> f64 {
        let mut guard = match self.density.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(d) = *guard {
            return d;
        }
        let files = self.corpus.files();
        if files.is_empty() {
            *guard = Some(1.0);
            return 1.0;
        }
        let sample = files.len().min(1000);
        let mut rng = rand::thread_rng();
        let mut hits = 0;
        for _ in 0..sample {
            let i = rng.gen_range(0..files.len());
            if self.accept_file(&files[i]) {
                hits += 1;
            }
        }
        let density = hits as f64 / sample as f64;
        *guard = Some(density);
        density
    }

    #[inline]
    pub(crate) fn count_match(&self) {
        self.matches.fetch_add(1, Ordering::Relaxed);
    }

    fn timer(&self, which: Timer) -> TimerGuard<'_> {
        TimerGuard::new(match which {
            Timer::Regex => &self.timers.regex,
            Timer::Vcs => &self.timers.vcs,
            Timer::Index => &self.timers.index,
            Timer::Sort => &self.timers.sort,
        })
    }
}

#[derive(Clone, Copy)]
enum Timer {
    Regex,
    Vcs,
    Index,
    Sort,
}
