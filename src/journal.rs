//! Crawl journal: one JSON line per crawl event, one file per day.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use common::config::CrawlMode;
use common::YearMonth;
use spider::SpiderStats;

/// Events written by `run_crawl`, tagged by `kind`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrawlEvent {
    CrawlStart {
        mode: CrawlMode,
        regions: Vec<String>,
        start_month: YearMonth,
        end_month: YearMonth,
        download_delay_secs: f64,
        max_empty_page_attempts: u32,
    },
    CrawlDeclined {
        batch: usize,
    },
    BatchStart {
        batch: usize,
        spiders: Vec<String>,
    },
    SpiderDone {
        spider: String,
        output: String,
        stats: SpiderStats,
    },
    SpiderError {
        spider: String,
        error: String,
    },
    CrawlDone {
        killmails: u64,
        pages: u32,
        error_records: u32,
        cached_prices: usize,
    },
}

#[derive(Serialize)]
struct Entry<'a, E> {
    ts: String,
    #[serde(flatten)]
    event: &'a E,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn day_key() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn journal_file(dir: &Path, day: &str) -> PathBuf {
    dir.join(format!("crawl-journal-{}.jsonl", day))
}

pub struct CrawlJournal {
    dir: PathBuf,
    day: String,
    file: File,
}

impl CrawlJournal {
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        create_dir_all(dir)?;
        let day = day_key();
        let file = Self::append_to(&journal_file(dir, &day))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            day,
            file,
        })
    }

    fn append_to(path: &Path) -> std::io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// Record `event` with a timestamp. Failures only log a warning so a
    /// full disk never stops a crawl.
    pub fn write_event<E: Serialize>(&mut self, event: &E) {
        if let Err(e) = self.append(event) {
            warn!("Crawl journal write failed: {}", e);
        }
    }

    fn append<E: Serialize>(&mut self, event: &E) -> std::io::Result<()> {
        let today = day_key();
        if today != self.day {
            self.file = Self::append_to(&journal_file(&self.dir, &today))?;
            self.day = today;
        }
        let line = serde_json::to_string(&Entry { ts: now_iso(), event })?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()
    }

    pub fn path(&self) -> PathBuf {
        journal_file(&self.dir, &self.day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_events_appended_as_tagged_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut journal = CrawlJournal::open(dir.path()).expect("journal");

        journal.write_event(&CrawlEvent::BatchStart {
            batch: 1,
            spiders: vec!["10000002201505".into()],
        });
        journal.write_event(&CrawlEvent::SpiderDone {
            spider: "10000002201505".into(),
            output: "data/10000002201505.csv".into(),
            stats: SpiderStats {
                killmails: 3,
                ..SpiderStats::default()
            },
        });

        let contents = std::fs::read_to_string(journal.path()).expect("read");
        let events: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["kind"], "batch_start");
        assert_eq!(events[0]["spiders"][0], "10000002201505");
        assert_eq!(events[1]["kind"], "spider_done");
        assert_eq!(events[1]["stats"]["killmails"], 3);
        assert!(events[1]["ts"].as_str().is_some_and(|ts| ts.ends_with('Z')));
    }
}
