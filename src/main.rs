use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use termcolor::{ColorChoice, StandardStream};

use refgrep::config::Config;
use refgrep::corpus::CorpusBuilder;
use refgrep::output;
use refgrep::search::SearchPool;

#[derive(Parser)]
#[command(name = "refgrep")]
#[command(about = "Parallel regex search over deduplicated git trees")]
struct Cli {
    /// Search pattern; when omitted, queries are read from stdin
    pattern: Option<String>,

    /// Repository to index
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Ref to index (repeatable)
    #[arg(short = 'r', long = "ref", default_value = "HEAD")]
    refs: Vec<String>,

    /// Only report matches whose path matches this regex
    #[arg(short = 'f', long)]
    file: Option<String>,

    /// Maximum matches per query
    #[arg(long, default_value_t = 50)]
    max_matches: usize,

    /// Query deadline in seconds; 0 disables it
    #[arg(long, default_value_t = 1)]
    timeout: i64,

    /// Worker threads (defaults to the available cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Top-level directories to walk first, whitespace-separated
    #[arg(long, default_value = "")]
    order_root: String,

    /// Disable suffix-array filtering
    #[arg(long)]
    no_index: bool,

    /// Build the corpus, then exit without searching
    #[arg(long)]
    no_search: bool,

    /// Emit one JSON object per match instead of colored text
    #[arg(long)]
    json: bool,

    /// Print per-query timing breakdown to stderr
    #[arg(long)]
    stats: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let defaults = Config::default();
    let config = Config {
        index: !cli.no_index,
        search: !cli.no_search,
        max_matches: cli.max_matches,
        timeout_secs: cli.timeout,
        threads: cli.threads.unwrap_or(defaults.threads),
        order_root: cli.order_root.clone(),
        chunk_size: defaults.chunk_size,
    };

    let repo = git2::Repository::open(&cli.repo)
        .with_context(|| format!("cannot open repository {}", cli.repo.display()))?;

    let mut builder = CorpusBuilder::new(&config);
    for ref_name in &cli.refs {
        println!("Indexing {}...", ref_name);
        builder
            .walk_ref(&repo, ref_name, &config.order_root)
            .with_context(|| format!("failed to walk {}", ref_name))?;
    }

    let stats = *builder.stats();
    println!("Bytes: {} (dedup: {})", stats.bytes, stats.dedup_bytes);
    println!("Lines: {} (dedup: {})", stats.lines, stats.dedup_lines);
    println!("Files: {} (dedup: {})", stats.files, stats.dedup_files);

    let corpus = Arc::new(builder.finalize());
    if !config.search {
        return Ok(());
    }
    let pool = SearchPool::new(corpus, &config);

    match &cli.pattern {
        Some(pattern) => run_query(&pool, pattern, &cli),
        None => {
            // one query per stdin line
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = line?;
                let pattern = line.trim();
                if pattern.is_empty() {
                    continue;
                }
                if let Err(err) = run_query(&pool, pattern, &cli) {
                    eprintln!("error: {:#}", err);
                }
            }
            Ok(())
        }
    }
}

fn run_query(pool: &SearchPool, pattern: &str, cli: &Cli) -> Result<()> {
    let choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let mut stdout = StandardStream::stdout(choice);
    let mut raw = io::stdout();
    let json = cli.json;

    let stats = pool.search(pattern, cli.file.as_deref(), |m| {
        // tolerate broken pipes; the query still runs to its budget
        let _ = if json {
            output::print_json(&mut raw, &m)
        } else {
            output::print_match(&mut stdout, &m)
        };
    })?;

    let _ = stdout.flush();
    if cli.stats {
        eprintln!(
            "{} matches, exit {:?}; regex {:?}, vcs {:?}, index {:?}, sort {:?}, analyze {:?}",
            stats.matches,
            stats.exit_reason,
            stats.regex_time,
            stats.vcs_time,
            stats.index_time,
            stats.sort_time,
            stats.analyze_time,
        );
    }
    Ok(())
}
