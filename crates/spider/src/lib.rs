//! Killmail spider crate.
//!
//! Crawls one region/month of killmails page by page, prices every item
//! against a shared price database, and hands the records to an exporter.

pub mod cache;
pub mod lookup;
pub mod plan;
pub mod runner;
pub mod spider;

pub use cache::PriceDb;
pub use lookup::{ItemLocation, PendingLookups};
pub use plan::{region_batches, spider_grid, SpiderSpec};
pub use runner::{CrawlRunner, SpiderOutcome};
pub use spider::{Spider, SpiderSettings, SpiderStats};
