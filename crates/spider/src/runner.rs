//! Runs batches of spiders as tokio tasks.
//!
//! All spiders of a runner share one API client and one price database.
//! A semaphore bounds how many of them crawl at the same time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::Error;
use export::CsvExporter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};
use zkb_client::{KillboardApi, KillsPage};

use crate::cache::PriceDb;
use crate::plan::SpiderSpec;
use crate::spider::{Spider, SpiderSettings, SpiderStats};

/// How one spider of a batch ended.
#[derive(Debug)]
pub struct SpiderOutcome {
    pub name: String,
    pub output: PathBuf,
    pub result: Result<SpiderStats, Error>,
}

pub struct CrawlRunner<A: KillboardApi + 'static> {
    api: Arc<A>,
    prices: PriceDb,
    settings: SpiderSettings,
    output_dir: PathBuf,
    permits: Arc<Semaphore>,
}

impl<A: KillboardApi + 'static> CrawlRunner<A> {
    pub fn new(
        api: Arc<A>,
        prices: PriceDb,
        settings: SpiderSettings,
        output_dir: PathBuf,
        max_concurrent_spiders: usize,
    ) -> Self {
        Self {
            api,
            prices,
            settings,
            output_dir,
            permits: Arc::new(Semaphore::new(max_concurrent_spiders.max(1))),
        }
    }

    pub fn prices(&self) -> &PriceDb {
        &self.prices
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Crawl every spider of the batch concurrently and wait for all of them.
    /// `on_finish` sees each outcome as soon as its spider closes.
    pub async fn run_batch<F>(&self, specs: Vec<SpiderSpec>, mut on_finish: F) -> Vec<SpiderOutcome>
    where
        F: FnMut(&SpiderOutcome),
    {
        let mut tasks = JoinSet::new();

        for spec in specs {
            let api = Arc::clone(&self.api);
            let prices = self.prices.clone();
            let settings = self.settings.clone();
            let permits = Arc::clone(&self.permits);
            let output = spec.output_file(&self.output_dir);

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                info!(
                    "{} crawling from {} -> {}",
                    spec.name,
                    api.kills_url(&spec.start),
                    output.display()
                );
                let result = run_spider(&spec.name, spec.start, api, prices, settings, &output).await;
                SpiderOutcome {
                    name: spec.name,
                    output,
                    result,
                }
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    on_finish(&outcome);
                    outcomes.push(outcome);
                }
                Err(e) => error!("Spider task panicked or was cancelled: {}", e),
            }
        }
        outcomes
    }
}

async fn run_spider<A: KillboardApi>(
    name: &str,
    start: KillsPage,
    api: Arc<A>,
    prices: PriceDb,
    settings: SpiderSettings,
    output: &Path,
) -> Result<SpiderStats, Error> {
    let mut exporter = CsvExporter::create(output, name)?;
    Spider::new(name, api, prices, settings)
        .crawl(start, &mut exporter)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::YearMonth;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zkb_client::ApiResponse;

    /// A board where every month has a single killmail on page 1.
    #[derive(Default)]
    struct OneKillBoard {
        requests: AtomicUsize,
    }

    #[async_trait]
    impl KillboardApi for OneKillBoard {
        fn kills_url(&self, page: &KillsPage) -> String {
            page.url("https://zkillboard.test")
        }

        fn month_url(&self, page: &KillsPage) -> String {
            page.month_path("https://zkillboard.test")
        }

        fn prices_url(&self, item_id: u64) -> String {
            format!("https://zkillboard.test/api/prices/{}/", item_id)
        }

        async fn fetch_kills(&self, page: &KillsPage) -> Result<ApiResponse, Error> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let body = if page.page == 1 {
                r#"[{"killmail_id": 1, "killmail_time": "2015-05-01T00:00:00Z", "victim": {}, "zkb": {}}]"#
            } else {
                "[]"
            };
            Ok(ApiResponse {
                url: self.kills_url(page),
                status: 200,
                body: body.into(),
            })
        }

        async fn fetch_prices(&self, item_id: u64) -> Result<ApiResponse, Error> {
            Err(Error::Other(format!("unexpected price request for {}", item_id)))
        }
    }

    #[tokio::test]
    async fn test_run_batch_writes_one_csv_per_spider() {
        let dir = tempfile::tempdir().expect("tempdir");
        let board = Arc::new(OneKillBoard::default());
        let runner = CrawlRunner::new(
            board.clone(),
            PriceDb::new(),
            SpiderSettings {
                max_empty_page_attempts: 2,
                ..SpiderSettings::default()
            },
            dir.path().to_path_buf(),
            1,
        );
        let specs = vec![
            SpiderSpec::new("10000002", YearMonth::new(2015, 5).expect("month")),
            SpiderSpec::new("10000002", YearMonth::new(2015, 6).expect("month")),
        ];

        let mut finished = Vec::new();
        let outcomes = runner
            .run_batch(specs, |o| finished.push(o.name.clone()))
            .await;

        assert_eq!(outcomes.len(), 2);
        finished.sort();
        assert_eq!(finished, vec!["10000002201505", "10000002201506"]);
        for outcome in &outcomes {
            let stats = outcome.result.as_ref().expect("spider ok");
            assert_eq!(stats.killmails, 1);
            let csv = std::fs::read_to_string(&outcome.output).expect("csv");
            assert_eq!(csv.lines().count(), 2);
        }
        // page 1 once, page 2 twice, for each spider
        assert_eq!(board.requests.load(Ordering::SeqCst), 6);
    }

    /// Every page is empty; tracks how many spiders are inside a request.
    #[derive(Default)]
    struct InFlightBoard {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl KillboardApi for InFlightBoard {
        fn kills_url(&self, page: &KillsPage) -> String {
            page.url("https://zkillboard.test")
        }

        fn month_url(&self, page: &KillsPage) -> String {
            page.month_path("https://zkillboard.test")
        }

        fn prices_url(&self, item_id: u64) -> String {
            format!("https://zkillboard.test/api/prices/{}/", item_id)
        }

        async fn fetch_kills(&self, page: &KillsPage) -> Result<ApiResponse, Error> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ApiResponse {
                url: self.kills_url(page),
                status: 200,
                body: "[]".into(),
            })
        }

        async fn fetch_prices(&self, item_id: u64) -> Result<ApiResponse, Error> {
            Err(Error::Other(format!("unexpected price request for {}", item_id)))
        }
    }

    #[tokio::test]
    async fn test_permits_bound_running_spiders() {
        let dir = tempfile::tempdir().expect("tempdir");
        let board = Arc::new(InFlightBoard::default());
        let runner = CrawlRunner::new(
            board.clone(),
            PriceDb::new(),
            SpiderSettings {
                max_empty_page_attempts: 3,
                ..SpiderSettings::default()
            },
            dir.path().to_path_buf(),
            2,
        );
        let specs = (1..=6)
            .map(|m| SpiderSpec::new("10000016", YearMonth::new(2016, m).expect("month")))
            .collect();

        let outcomes = runner.run_batch(specs, |_| {}).await;

        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        let peak = board.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak of {} concurrent spiders", peak);
    }
}
