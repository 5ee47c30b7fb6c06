//! The killmail spider.
//!
//! One spider crawls one `regionID/{r}/year/{y}/month/{m}/` path:
//!
//! 1. Fetch a kills page and decode it.
//! 2. Price each item from the shared [`PriceDb`]; collect the misses.
//! 3. Fetch the price history of each missed item once, fill every miss.
//! 4. Emit the page's killmails, move to the next page.
//! 5. On an empty page, refetch the same URL until the attempt limit is
//!    reached; data on a retry resumes the crawl, otherwise the spider closes.

use std::sync::Arc;

use common::{CrawlRecord, Error, Killmail};
use export::RecordSink;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use zkb_client::{DownloadDelay, KillboardApi, KillsPage, PriceHistory};

use crate::cache::PriceDb;
use crate::lookup::{self, PendingItem};

/// Per-spider crawl settings.
#[derive(Debug, Clone)]
pub struct SpiderSettings {
    pub download_delay: DownloadDelay,
    /// Requests of an empty page (the first included) before closing.
    pub max_empty_page_attempts: u32,
}

impl Default for SpiderSettings {
    fn default() -> Self {
        Self {
            download_delay: DownloadDelay::none(),
            max_empty_page_attempts: 10,
        }
    }
}

/// What a spider did, reported when it closes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpiderStats {
    /// Kills pages that yielded killmails.
    pub pages: u32,
    pub killmails: u64,
    /// Pages replaced by a single error record.
    pub error_records: u32,
    pub kill_requests: u32,
    pub price_requests: u32,
    /// Refetches of an empty or failed page.
    pub empty_retries: u32,
}

/// How a fetched kills page turned out.
enum PageOutcome {
    Killmails(Vec<Killmail>),
    Empty,
    Unreadable { url: String, status: u16, reason: String },
}

pub struct Spider<A: KillboardApi> {
    name: String,
    api: Arc<A>,
    prices: PriceDb,
    settings: SpiderSettings,
    stats: SpiderStats,
}

impl<A: KillboardApi> Spider<A> {
    pub fn new(name: impl Into<String>, api: Arc<A>, prices: PriceDb, settings: SpiderSettings) -> Self {
        Self {
            name: name.into(),
            api,
            prices,
            settings,
            stats: SpiderStats::default(),
        }
    }

    /// Crawl from `start` until the month is exhausted, writing every record
    /// to `sink`. The sink is closed before returning.
    pub async fn crawl<S: RecordSink>(mut self, start: KillsPage, sink: &mut S) -> Result<SpiderStats, Error> {
        let max_attempts = self.settings.max_empty_page_attempts.max(1);
        let mut page = start;
        let mut empty_attempts = 0u32;
        let mut unreadable_streak = 0u32;

        loop {
            match self.fetch_page(&page).await {
                PageOutcome::Killmails(mut killmails) => {
                    empty_attempts = 0;
                    unreadable_streak = 0;

                    let pending = lookup::price_from_db(&mut killmails, &self.prices);
                    if !pending.is_empty() {
                        debug!("{}: {} items need a price lookup", self.name, pending.len());
                        for item in pending.into_items() {
                            self.lookup_item(&mut killmails, item).await;
                        }
                    }

                    for km in killmails {
                        debug!("{}: yielded killmail #{}", self.name, km.killmail_id);
                        sink.write_record(&CrawlRecord::Killmail(km))?;
                        self.stats.killmails += 1;
                    }
                    self.stats.pages += 1;

                    page = page.next_page();
                    info!("{}: next page -> {} | {}", self.name, page.page, self.api.kills_url(&page));
                }
                PageOutcome::Unreadable { url, status, reason } => {
                    empty_attempts = 0;
                    warn!("{}: {}", self.name, reason);
                    warn!("{}: unable to parse JSON data located at: {}", self.name, url);
                    warn!("{}: received status code: {}", self.name, status);

                    sink.write_record(&CrawlRecord::Unreadable { url, status })?;
                    self.stats.error_records += 1;

                    unreadable_streak += 1;
                    if unreadable_streak >= max_attempts {
                        warn!(
                            "{}: {} unreadable pages in a row, closing spider",
                            self.name, unreadable_streak
                        );
                        break;
                    }
                    page = page.next_page();
                }
                PageOutcome::Empty => {
                    empty_attempts += 1;
                    info!("{}: no killmails found at {}", self.name, self.api.kills_url(&page));
                    info!(
                        "{}: attempting retry... attempted retries so far: {}",
                        self.name, empty_attempts
                    );

                    if empty_attempts < max_attempts {
                        self.stats.empty_retries += 1;
                        continue;
                    }

                    info!(
                        "{}: all pages scraped for {}! Closing spider...",
                        self.name,
                        self.api.month_url(&page)
                    );
                    break;
                }
            }
        }

        sink.close()?;
        Ok(self.stats)
    }

    async fn fetch_page(&mut self, page: &KillsPage) -> PageOutcome {
        self.settings.download_delay.wait().await;
        self.stats.kill_requests += 1;

        let resp = match self.api.fetch_kills(page).await {
            Ok(resp) => resp,
            Err(e) => {
                // The page may just have loaded slowly: retry it like an empty one.
                warn!("{}: kills request failed: {}", self.name, e);
                return PageOutcome::Empty;
            }
        };

        decode_page(&resp.url, resp.status, &resp.body)
    }

    /// Price one pending item: fetch its history unless every date was
    /// filled by another spider meanwhile, then fill all its locations.
    async fn lookup_item(&mut self, killmails: &mut [Killmail], item: PendingItem) {
        let item_id = item.item_id;
        let price_url = self.api.prices_url(item_id);

        let all_cached = item
            .dates
            .iter()
            .all(|d| self.prices.contains(item_id, &d.date));

        let (history, cacheable) = if all_cached {
            (None, false)
        } else {
            debug!("{}: looking up item ID {}...", self.name, item_id);
            self.fetch_history(item_id).await
        };

        for pending in &item.dates {
            let price = match self.prices.get(item_id, &pending.date) {
                Some(price) => price,
                None => {
                    let price = lookup::resolve_price(item_id, &pending.date, history.as_ref(), &price_url);
                    if cacheable {
                        self.prices.insert(item_id, &pending.date, price.clone());
                    }
                    price
                }
            };
            lookup::apply_price(killmails, &pending.locations, &price);
        }
    }

    /// Returns the history, and whether results derived from it may be cached.
    async fn fetch_history(&mut self, item_id: u64) -> (Option<PriceHistory>, bool) {
        self.settings.download_delay.wait().await;
        self.stats.price_requests += 1;

        match self.api.fetch_prices(item_id).await {
            Ok(resp) => match PriceHistory::from_json(&resp.body) {
                Ok(history) => (Some(history), true),
                Err(e) => {
                    warn!("{}: unreadable price data at {}: {}", self.name, resp.url, e);
                    (None, false)
                }
            },
            Err(e) => {
                warn!("{}: price request for item {} failed: {}", self.name, item_id, e);
                (None, false)
            }
        }
    }
}

fn decode_page(url: &str, status: u16, body: &str) -> PageOutcome {
    let unreadable = |reason: String| PageOutcome::Unreadable {
        url: url.to_string(),
        status,
        reason,
    };

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return unreadable(e.to_string()),
    };

    match value {
        Value::Array(ref entries) if entries.is_empty() => PageOutcome::Empty,
        Value::Array(_) => match serde_json::from_value::<Vec<Killmail>>(value) {
            Ok(killmails) => PageOutcome::Killmails(killmails),
            Err(e) => unreadable(e.to_string()),
        },
        _ => unreadable("kills page is not a JSON array".into()),
    }
}
