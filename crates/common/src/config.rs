//! Crawler configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::YearMonth;

/// Top-level crawler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// What to crawl and how hard.
    #[serde(default)]
    pub crawl: CrawlConfig,
}

/// HTTP client settings shared by every spider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// API root, without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Process-wide ceiling on requests per second, across all spiders.
    #[serde(default = "default_max_requests_per_sec")]
    pub max_requests_per_sec: u32,
}

/// Crawl grid and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Region IDs, crawled in this order in sequential mode.
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,

    /// First month crawled (inclusive).
    #[serde(default = "default_start_month")]
    pub start_month: YearMonth,

    /// Last month crawled (inclusive).
    #[serde(default = "default_end_month")]
    pub end_month: YearMonth,

    /// Directory receiving one CSV per spider plus the crawl journal.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Delay between consecutive requests of one spider. Unset means the
    /// mode default (see [`CrawlMode::default_download_delay_secs`]).
    #[serde(default)]
    pub download_delay_secs: Option<f64>,

    /// Spread each delay uniformly over 0.5x..1.5x.
    #[serde(default = "default_true")]
    pub randomize_download_delay: bool,

    /// Requests of an empty kills page before the spider closes.
    #[serde(default = "default_max_empty_page_attempts")]
    pub max_empty_page_attempts: u32,

    /// Upper bound on spiders crawling at the same time.
    #[serde(default = "default_max_concurrent_spiders")]
    pub max_concurrent_spiders: usize,
}

/// How the spider grid is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// Every region and month at once.
    Concurrent,
    /// One region at a time, all of its months at once.
    Sequential,
}

impl CrawlMode {
    /// Per-spider delay tuned so the whole grid stays under ~50 pages/s.
    pub fn default_download_delay_secs(self) -> f64 {
        match self {
            CrawlMode::Concurrent => 5.0,
            CrawlMode::Sequential => 0.7,
        }
    }
}

impl CrawlConfig {
    pub fn download_delay_for(&self, mode: CrawlMode) -> f64 {
        self.download_delay_secs
            .unwrap_or_else(|| mode.default_download_delay_secs())
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://zkillboard.com".into()
}
fn default_user_agent() -> String {
    "killmail-fetching/0.1 (research crawler)".into()
}
fn default_request_timeout() -> u64 {
    30
}
/// zKillboard's observed sustainable rate, ~50 pages/s.
fn default_max_requests_per_sec() -> u32 {
    50
}

fn default_regions() -> Vec<String> {
    vec![
        "10000002".into(),
        "10000016".into(),
        "10000033".into(),
        "10000069".into(),
    ]
}
fn default_start_month() -> YearMonth {
    YearMonth { year: 2015, month: 5 }
}
fn default_end_month() -> YearMonth {
    YearMonth { year: 2018, month: 5 }
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("zkbspider_tmpdata")
}
fn default_max_empty_page_attempts() -> u32 {
    10
}
fn default_max_concurrent_spiders() -> usize {
    148
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            max_requests_per_sec: default_max_requests_per_sec(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            start_month: default_start_month(),
            end_month: default_end_month(),
            output_dir: default_output_dir(),
            download_delay_secs: None,
            randomize_download_delay: default_true(),
            max_empty_page_attempts: default_max_empty_page_attempts(),
            max_concurrent_spiders: default_max_concurrent_spiders(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            crawl: CrawlConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"{"crawl": {"regions": ["10000043"], "end_month": "2015-07"}}"#;
        let cfg: CrawlerConfig = serde_json::from_str(raw).expect("config");

        assert_eq!(cfg.crawl.regions, vec!["10000043".to_string()]);
        assert_eq!(cfg.crawl.start_month.to_string(), "2015-05");
        assert_eq!(cfg.crawl.end_month.to_string(), "2015-07");
        assert_eq!(cfg.crawl.max_empty_page_attempts, 10);
        assert_eq!(cfg.http.base_url, "https://zkillboard.com");
    }

    #[test]
    fn test_mode_delay_defaults() {
        let mut crawl = CrawlConfig::default();
        assert_eq!(crawl.download_delay_for(CrawlMode::Concurrent), 5.0);
        assert_eq!(crawl.download_delay_for(CrawlMode::Sequential), 0.7);

        crawl.download_delay_secs = Some(1.25);
        assert_eq!(crawl.download_delay_for(CrawlMode::Concurrent), 1.25);
    }
}
