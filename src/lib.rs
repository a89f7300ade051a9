//! # refgrep - parallel regex search over deduplicated source trees
//!
//! refgrep ingests blobs from one or more version-controlled snapshots,
//! deduplicates them down to distinct files and distinct lines, and
//! answers regex queries with matching lines, surrounding context, and
//! every `(ref, path)` location of each match — within a configurable
//! match-count and wall-clock budget.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`corpus`] - Ingestion, deduplication, chunk arenas, suffix arrays
//! - [`search`] - Regex decomposition, index walk, confirmation, grouping
//! - [`output`] - Result formatting (grep-style and JSON)
//! - [`config`] - Engine configuration and tuning constants
//! - [`utils`] - Line-boundary helpers and radix sort
//!
//! ## Quick Start
//!
//! ```ignore
//! use refgrep::config::Config;
//! use refgrep::corpus::CorpusBuilder;
//! use refgrep::search::SearchPool;
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let mut builder = CorpusBuilder::new(&config);
//! let repo = git2::Repository::open("/path/to/repo")?;
//! builder.walk_ref(&repo, "HEAD", &config.order_root)?;
//! let corpus = Arc::new(builder.finalize());
//!
//! let pool = SearchPool::new(corpus, &config);
//! let stats = pool.search("fn \\w+", Some("^src/"), |m| {
//!     println!("{}", m.line);
//! })?;
//! ```
//!
//! ## How a query runs
//!
//! The pattern is decomposed into a conservative byte-range prefix tree
//! that prunes each chunk's suffix array down to candidate positions.
//! Candidates are sorted, coalesced into line ranges, and re-scanned with
//! the full regex; confirmed lines are resolved through a per-chunk
//! interval tree to the deduplicated files (and so paths) containing
//! them. Chunks are searched by a fixed worker pool, and a per-query
//! match cap and deadline cut the whole pipeline short.

pub mod config;
pub mod corpus;
pub mod output;
pub mod search;
pub mod utils;

pub use config::Config;
pub use corpus::{Corpus, CorpusBuilder};
pub use search::{ExitReason, MatchContext, SearchPool, SearchStats};
pub use search::grouper::MatchResult;
