//! Request pacing for the zKillboard API.
//!
//! Two layers: a process-wide [`RateLimiter`] shared by every spider, and a
//! per-spider [`DownloadDelay`] between consecutive requests.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter as GovLimiter};
use rand::Rng;
use tokio::time::{sleep, Instant};

type DirectLimiter = GovLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Shared request budget for the whole process.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// A zero rate is treated as one request per second.
    pub fn per_second(requests_per_sec: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_sec).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(GovLimiter::direct(quota)),
        }
    }

    /// Wait until a request slot is available.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to take a slot without waiting. Returns true if acquired.
    #[cfg(test)]
    fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Minimum spacing between two requests made by the same spider.
#[derive(Debug, Clone)]
pub struct DownloadDelay {
    base: Duration,
    randomize: bool,
    last_request: Option<Instant>,
}

impl DownloadDelay {
    pub fn new(delay_secs: f64, randomize: bool) -> Self {
        Self {
            base: Duration::try_from_secs_f64(delay_secs.max(0.0)).unwrap_or(Duration::MAX),
            randomize,
            last_request: None,
        }
    }

    /// No spacing at all.
    pub fn none() -> Self {
        Self::new(0.0, false)
    }

    /// The delay to apply before the next request: the base delay, or a
    /// uniform draw from 0.5x..1.5x of it when randomized.
    pub fn next_delay(&self) -> Duration {
        if !self.randomize || self.base.is_zero() {
            return self.base;
        }
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        Duration::try_from_secs_f64(self.base.as_secs_f64() * factor).unwrap_or(self.base)
    }

    /// Sleep until the next request may go out, then mark it as sent.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let delay = self.next_delay();
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}
