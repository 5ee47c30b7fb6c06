//! killmail-fetching: zKillboard killmail and item price crawler.
//!
//! Single-binary Tokio application that:
//! 1. Builds a grid of spiders, one per region and month
//! 2. Crawls every killmail page of each spider's month
//! 3. Prices every victim item on the day of the kill
//! 4. Writes one CSV per spider, plus a JSONL crawl journal

mod config;
mod journal;

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use common::config::{CrawlMode, CrawlerConfig};
use common::YearMonth;
use journal::{CrawlEvent, CrawlJournal};
use spider::{region_batches, spider_grid, CrawlRunner, SpiderSettings, SpiderSpec};
use zkb_client::{DownloadDelay, KillboardApi, ZkbClient};

/// zKillboard killmail and item price crawler
#[derive(Parser)]
#[command(name = "killmail-fetching", about = "zKillboard killmail and item price crawler")]
struct Cli {
    /// TOML config file (default: ./config.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skip the confirmation prompt before each batch.
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Comma separated region IDs.
    #[arg(long, global = true, value_delimiter = ',')]
    regions: Vec<String>,

    /// First month to crawl (YYYY-MM).
    #[arg(long, global = true)]
    start: Option<YearMonth>,

    /// Last month to crawl (YYYY-MM).
    #[arg(long, global = true)]
    end: Option<YearMonth>,

    /// Directory for CSV output and the crawl journal.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Seconds between consecutive requests of one spider.
    #[arg(long, global = true)]
    delay: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Crawl every region and month at once.
    Crawl,
    /// Crawl one region at a time, all of its months at once.
    CrawlSeq,
    /// Print the spider grid and exit.
    Plan {
        /// Show the sequential (per-region) batches.
        #[arg(long)]
        sequential: bool,
    },
}

impl Cli {
    fn apply_overrides(&self, cfg: &mut CrawlerConfig) {
        if !self.regions.is_empty() {
            cfg.crawl.regions = self.regions.clone();
        }
        if let Some(start) = self.start {
            cfg.crawl.start_month = start;
        }
        if let Some(end) = self.end {
            cfg.crawl.end_month = end;
        }
        if let Some(ref dir) = self.output_dir {
            cfg.crawl.output_dir = dir.clone();
        }
        if let Some(delay) = self.delay {
            cfg.crawl.download_delay_secs = Some(delay);
        }
    }
}

fn batches_for(cfg: &CrawlerConfig, mode: CrawlMode) -> Vec<Vec<SpiderSpec>> {
    let crawl = &cfg.crawl;
    match mode {
        CrawlMode::Concurrent => vec![spider_grid(&crawl.regions, crawl.start_month, crawl.end_month)],
        CrawlMode::Sequential => region_batches(&crawl.regions, crawl.start_month, crawl.end_month),
    }
}

/// Exit status after Ctrl-C, as a shell reports SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Ask until the answer is `y` or `n`. End of input counts as `n`.
fn confirm<R: BufRead, W: Write>(prompt: &str, input: R, output: &mut W) -> io::Result<bool> {
    let mut lines = input.lines();
    loop {
        write!(output, "{} (y/n) >", prompt)?;
        output.flush()?;
        match lines.next() {
            Some(line) => match line?.trim() {
                "y" => return Ok(true),
                "n" => return Ok(false),
                _ => continue,
            },
            None => return Ok(false),
        }
    }
}

fn print_plan(cfg: &CrawlerConfig, sequential: bool) {
    let mode = if sequential {
        CrawlMode::Sequential
    } else {
        CrawlMode::Concurrent
    };
    let batches = batches_for(cfg, mode);
    let base = cfg.http.base_url.trim_end_matches('/');

    for (n, batch) in batches.iter().enumerate() {
        println!("# batch {} ({} spiders)", n + 1, batch.len());
        for spec in batch {
            println!(
                "{}\t{}\t{}",
                spec.name,
                spec.start.url(base),
                spec.output_file(&cfg.crawl.output_dir).display()
            );
        }
    }
    println!(
        "# download delay: {:.2}s{}",
        cfg.crawl.download_delay_for(mode),
        if cfg.crawl.randomize_download_delay {
            " (randomized 0.5x-1.5x)"
        } else {
            ""
        }
    );
}

async fn run_crawl(cfg: CrawlerConfig, mode: CrawlMode, assume_yes: bool) -> Result<(), common::Error> {
    let client = Arc::new(ZkbClient::new(&cfg.http)?);
    let delay_secs = cfg.crawl.download_delay_for(mode);
    let settings = SpiderSettings {
        download_delay: DownloadDelay::new(delay_secs, cfg.crawl.randomize_download_delay),
        max_empty_page_attempts: cfg.crawl.max_empty_page_attempts,
    };
    let runner = CrawlRunner::new(
        Arc::clone(&client),
        spider::PriceDb::new(),
        settings,
        cfg.crawl.output_dir.clone(),
        cfg.crawl.max_concurrent_spiders,
    );

    let mut journal = CrawlJournal::open(&cfg.crawl.output_dir)?;
    info!("Crawl journal path: {}", journal.path().display());
    journal.write_event(&CrawlEvent::CrawlStart {
        mode,
        regions: cfg.crawl.regions.clone(),
        start_month: cfg.crawl.start_month,
        end_month: cfg.crawl.end_month,
        download_delay_secs: delay_secs,
        max_empty_page_attempts: cfg.crawl.max_empty_page_attempts,
    });

    let mut totals = (0u64, 0u32, 0u32);
    for (n, batch) in batches_for(&cfg, mode).into_iter().enumerate() {
        // Review spiders before beginning the batch.
        for spec in &batch {
            info!(
                "{} will start crawling from {} and write data to {}",
                spec.name,
                client.kills_url(&spec.start),
                spec.output_file(runner.output_dir()).display()
            );
        }

        if !assume_yes {
            let go = tokio::task::spawn_blocking(|| {
                confirm("All Spiders set! Begin crawling?", io::stdin().lock(), &mut io::stdout())
            })
            .await
            .map_err(|e| common::Error::Other(e.to_string()))??;
            if !go {
                println!("Goodbye! Shutting down...");
                journal.write_event(&CrawlEvent::CrawlDeclined { batch: n + 1 });
                return Ok(());
            }
        }

        journal.write_event(&CrawlEvent::BatchStart {
            batch: n + 1,
            spiders: batch.iter().map(|s| s.name.clone()).collect(),
        });

        runner
            .run_batch(batch, |outcome| match &outcome.result {
                Ok(stats) => {
                    info!(
                        "{} closed: {} pages, {} killmails, {} error rows, {} price requests -> {}",
                        outcome.name,
                        stats.pages,
                        stats.killmails,
                        stats.error_records,
                        stats.price_requests,
                        outcome.output.display()
                    );
                    totals.0 += stats.killmails;
                    totals.1 += stats.pages;
                    totals.2 += stats.error_records;
                    journal.write_event(&CrawlEvent::SpiderDone {
                        spider: outcome.name.clone(),
                        output: outcome.output.display().to_string(),
                        stats: stats.clone(),
                    });
                }
                Err(e) => {
                    error!("{} failed: {}", outcome.name, e);
                    journal.write_event(&CrawlEvent::SpiderError {
                        spider: outcome.name.clone(),
                        error: e.to_string(),
                    });
                }
            })
            .await;
    }

    info!(
        "Crawl finished: {} killmails over {} pages, {} error rows, {} cached prices",
        totals.0,
        totals.1,
        totals.2,
        runner.prices().len()
    );
    journal.write_event(&CrawlEvent::CrawlDone {
        killmails: totals.0,
        pages: totals.1,
        error_records: totals.2,
        cached_prices: runner.prices().len(),
    });
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "killmail_fetching=info,spider=info,zkb_client=info,export=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let mut cfg = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply_overrides(&mut cfg);
    if let Err(e) = config::validate_config(&cfg) {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let mode = match cli.command {
        Command::Plan { sequential } => {
            print_plan(&cfg, sequential);
            return;
        }
        Command::Crawl => CrawlMode::Concurrent,
        Command::CrawlSeq => CrawlMode::Sequential,
    };

    info!(
        "Regions: {:?}, months {}..={}, mode {:?}",
        cfg.crawl.regions, cfg.crawl.start_month, cfg.crawl.end_month, mode
    );

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match until_interrupted(run_crawl(cfg, mode, cli.yes), interrupt).await {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            error!("Crawl failed: {}", e);
            std::process::exit(1);
        }
        None => {
            // A confirmation prompt may still hold a blocking stdin read,
            // which would keep the runtime from shutting down.
            warn!("Ctrl-C received, stopping crawl");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    }
}

/// Drive `work` to completion unless `interrupt` resolves first.
async fn until_interrupted<F, I>(work: F, interrupt: I) -> Option<F::Output>
where
    F: Future,
    I: Future<Output = ()>,
{
    tokio::select! {
        out = work => Some(out),
        _ = interrupt => None,
    }
}
