//! Fixed worker pool dispatching chunks to searchers.
//!
//! The pool outlives queries. Each query builds a [`SearchJob`] and
//! submits one task per chunk; workers push results — and a `None`
//! sentinel per finished chunk — into the query's bounded result channel.
//! Both channels are bounded, so the consumer interleaves task
//! submission with result draining: blocking on a full task queue while
//! workers block on a full result queue would deadlock. It drains until
//! it has seen one sentinel per submitted chunk, so a query observes
//! every worker's completion without joining threads. Dropping the pool
//! sends each worker a `None` task, its cue to exit.

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::config::Config;
use crate::corpus::Corpus;

use super::grouper::MatchResult;
use super::{SearchJob, SearchStats};

/// `None` shuts the receiving worker down.
type Task = Option<(Arc<SearchJob>, usize)>;

/// Matches queue up here while the consumer is busy; small enough to
/// bound memory, large enough that workers rarely block.
const RESULT_QUEUE_DEPTH: usize = 1024;

/// Queued tasks per worker; submission backpressure, not a work list.
const TASKS_PER_WORKER: usize = 2;

pub struct SearchPool {
    corpus: Arc<Corpus>,
    config: Config,
    tasks: Sender<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl SearchPool {
    pub fn new(corpus: Arc<Corpus>, config: &Config) -> Self {
        let threads = config.threads.max(1);
        let (tasks, task_rx) = bounded::<Task>(threads * TASKS_PER_WORKER);

        let workers = (0..threads)
            .map(|_| {
                let rx: Receiver<Task> = task_rx.clone();
                std::thread::spawn(move || {
                    while let Ok(Some((job, chunk_idx))) = rx.recv() {
                        job.search_chunk(chunk_idx);
                        job.send_done();
                    }
                })
            })
            .collect();

        Self {
            corpus,
            config: config.clone(),
            tasks,
            workers,
        }
    }

    /// Run one query, invoking `on_match` for every result as it arrives.
    /// Results within a chunk arrive in ascending offset order; no order
    /// holds across chunks.
    pub fn search(
        &self,
        pattern: &str,
        file_pattern: Option<&str>,
        mut on_match: impl FnMut(MatchResult),
    ) -> Result<SearchStats> {
        let (results, result_rx) = bounded::<Option<MatchResult>>(RESULT_QUEUE_DEPTH);
        let job = SearchJob::new(
            self.corpus.clone(),
            self.config.clone(),
            pattern,
            file_pattern,
            results,
        )?;

        if !self.config.search {
            return Ok(job.stats(0));
        }

        let tasks = &self.tasks;
        let total = self.corpus.chunks().len();
        let mut next_chunk = 0usize;
        let mut pending = 0usize;
        let mut matches = 0usize;

        // One sentinel arrives per submitted chunk; stop once every chunk
        // has been submitted and accounted for.
        while next_chunk < total || pending > 0 {
            if next_chunk < total {
                select! {
                    send(tasks, Some((job.clone(), next_chunk))) -> sent => {
                        sent.context("search pool is shut down")?;
                        next_chunk += 1;
                        pending += 1;
                    }
                    recv(result_rx) -> received => {
                        match received.context("search workers disconnected")? {
                            Some(result) => {
                                matches += 1;
                                on_match(result);
                            }
                            None => pending -= 1,
                        }
                    }
                }
            } else {
                match result_rx.recv().context("search workers disconnected")? {
                    Some(result) => {
                        matches += 1;
                        on_match(result);
                    }
                    None => pending -= 1,
                }
            }
        }

        Ok(job.stats(matches))
    }
}

impl Drop for SearchPool {
    fn drop(&mut self) {
        for _ in &self.workers {
            let _ = self.tasks.send(None);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::alloc::HeapAllocator;
    use crate::corpus::CorpusBuilder;

    fn small_corpus() -> Arc<Corpus> {
        let mut b = CorpusBuilder::new(&Config::default());
        b.ingest("main", "src/a.rs", b"foo\nbar\nbaz\n").unwrap();
        b.ingest("main", "test/b.rs", b"foo\nqux\n").unwrap();
        Arc::new(b.finalize())
    }

    #[test]
    fn test_basic_search() {
        let pool = SearchPool::new(small_corpus(), &Config::default());
        let mut lines = Vec::new();
        let stats = pool
            .search("ba.", None, |m| lines.push(m.line))
            .unwrap();
        lines.sort();
        assert_eq!(lines, vec!["bar", "baz"]);
        assert_eq!(stats.matches, 2);
        assert_eq!(stats.exit_reason, crate::search::ExitReason::None);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let pool = SearchPool::new(small_corpus(), &Config::default());
        assert!(pool.search("(unclosed", None, |_| {}).is_err());
    }

    #[test]
    fn test_search_disabled_returns_no_matches() {
        let config = Config {
            search: false,
            ..Config::default()
        };
        let pool = SearchPool::new(small_corpus(), &config);
        let stats = pool.search("foo", None, |_| panic!("no results expected")).unwrap();
        assert_eq!(stats.matches, 0);
    }

    #[test]
    fn test_pool_survives_multiple_queries() {
        let pool = SearchPool::new(small_corpus(), &Config::default());
        for _ in 0..3 {
            let stats = pool.search("foo", None, |_| {}).unwrap();
            assert_eq!(stats.matches, 2);
        }
    }

    #[test]
    fn test_many_chunks_exceeding_task_queue() {
        // Far more chunks than the task queue holds: submission must
        // interleave with draining or the query would wedge.
        let mut b = CorpusBuilder::with_allocator(Box::new(HeapAllocator::new(64)));
        for f in 0..40 {
            let mut content = String::new();
            for l in 0..8 {
                content.push_str(&format!("file {:02} payload line {}\n", f, l));
            }
            b.ingest("main", &format!("f{:02}", f), content.as_bytes())
                .unwrap();
        }
        let corpus = Arc::new(b.finalize());
        assert!(corpus.chunks().len() > 8);

        let config = Config {
            threads: 2,
            max_matches: 10_000,
            timeout_secs: 0,
            ..Config::default()
        };
        let pool = SearchPool::new(corpus, &config);
        let stats = pool.search("payload", None, |_| {}).unwrap();
        assert_eq!(stats.matches, 320);
        assert_eq!(stats.exit_reason, crate::search::ExitReason::None);
    }
}
