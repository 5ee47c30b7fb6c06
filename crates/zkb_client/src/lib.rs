//! zKillboard API client library.
//!
//! Fetches killmail pages and item price histories, paced by a shared
//! rate limiter and per-spider download delays.

pub mod paths;
pub mod prices;
pub mod rate_limit;
pub mod rest;

pub use paths::KillsPage;
pub use prices::PriceHistory;
pub use rate_limit::{DownloadDelay, RateLimiter};
pub use rest::{ApiResponse, KillboardApi, ZkbClient};
