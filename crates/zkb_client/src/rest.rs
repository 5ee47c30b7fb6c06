//! REST client for the zKillboard API.
//!
//! Covers: killmail pages by region/month, item price histories.
//! Responses are returned as raw bodies; decoding is up to the caller so a
//! malformed page can still be reported with its URL and status.

use std::time::Duration;

use async_trait::async_trait;
use common::config::HttpConfig;
use common::Error;
use tracing::debug;

use crate::paths::{prices_url, KillsPage};
use crate::rate_limit::RateLimiter;

/// A successful (2xx) response body with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// The two endpoints a spider needs. Implemented over HTTP by
/// [`ZkbClient`]; tests substitute an in-memory board.
#[async_trait]
pub trait KillboardApi: Send + Sync {
    fn kills_url(&self, page: &KillsPage) -> String;

    /// The page's region and month without the page modifier.
    fn month_url(&self, page: &KillsPage) -> String;

    fn prices_url(&self, item_id: u64) -> String;

    /// GET one killmail page. Non-2xx statuses are errors.
    async fn fetch_kills(&self, page: &KillsPage) -> Result<ApiResponse, Error>;

    /// GET the price history of one item. Non-2xx statuses are errors.
    async fn fetch_prices(&self, item_id: u64) -> Result<ApiResponse, Error>;
}

/// Async HTTP client for zKillboard.
#[derive(Debug, Clone)]
pub struct ZkbClient {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl ZkbClient {
    pub fn new(cfg: &HttpConfig) -> Result<Self, Error> {
        Self::with_limiter(cfg, RateLimiter::per_second(cfg.max_requests_per_sec))
    }

    /// Build a client that shares an existing rate limiter.
    pub fn with_limiter(cfg: &HttpConfig, limiter: RateLimiter) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .pool_max_idle_per_host(16)
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    async fn get(&self, url: String) -> Result<ApiResponse, Error> {
        self.limiter.wait().await;
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Http(format!("{}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Http(format!("{}: {}", url, e)))?;

        if !(200..300).contains(&status) {
            return Err(Error::ZkbApi {
                status,
                message: format!("{}: {}", url, &body[..floor_char_boundary(&body, 500)]),
            });
        }

        Ok(ApiResponse { url, status, body })
    }
}

#[async_trait]
impl KillboardApi for ZkbClient {
    fn kills_url(&self, page: &KillsPage) -> String {
        page.url(&self.base_url)
    }

    fn month_url(&self, page: &KillsPage) -> String {
        page.month_path(&self.base_url)
    }

    fn prices_url(&self, item_id: u64) -> String {
        prices_url(&self.base_url, item_id)
    }

    async fn fetch_kills(&self, page: &KillsPage) -> Result<ApiResponse, Error> {
        self.get(self.kills_url(page)).await
    }

    async fn fetch_prices(&self, item_id: u64) -> Result<ApiResponse, Error> {
        self.get(self.prices_url(item_id)).await
    }
}

/// Largest index `<= max` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::YearMonth;

    #[test]
    fn test_client_urls_use_configured_base() {
        let cfg = HttpConfig {
            base_url: "http://localhost:9000/".into(),
            ..HttpConfig::default()
        };
        let client = ZkbClient::new(&cfg).expect("client");
        let page = KillsPage::first("10000033", YearMonth::new(2016, 2).expect("month"));

        assert_eq!(
            client.month_url(&page.next_page()),
            "http://localhost:9000/api/kills/regionID/10000033/year/2016/month/02/"
        );
        assert_eq!(
            client.kills_url(&page),
            "http://localhost:9000/api/kills/regionID/10000033/year/2016/month/02/page/1/"
        );
        assert_eq!(client.prices_url(587), "http://localhost:9000/api/prices/587/");
    }

    #[test]
    fn test_floor_char_boundary() {
        assert_eq!(floor_char_boundary("abc", 500), 3);
        assert_eq!(floor_char_boundary("aé", 2), 1);
    }
}
