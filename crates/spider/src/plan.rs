//! The region x month grid of spiders.

use std::path::{Path, PathBuf};

use common::YearMonth;
use zkb_client::KillsPage;

/// One spider: a region's month, crawled from page 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiderSpec {
    /// `{region}{yyyy}{mm}`, unique within a run.
    pub name: String,
    pub start: KillsPage,
}

impl SpiderSpec {
    pub fn new(region_id: &str, month: YearMonth) -> Self {
        Self {
            name: format!("{}{:04}{:02}", region_id, month.year, month.month),
            start: KillsPage::first(region_id, month),
        }
    }

    /// `{output_dir}/{name}.csv`
    pub fn output_file(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.csv", self.name))
    }
}

/// Every region's every month, region-major.
pub fn spider_grid(regions: &[String], start: YearMonth, end: YearMonth) -> Vec<SpiderSpec> {
    region_batches(regions, start, end)
        .into_iter()
        .flatten()
        .collect()
}

/// One batch per region, in region order.
pub fn region_batches(
    regions: &[String],
    start: YearMonth,
    end: YearMonth,
) -> Vec<Vec<SpiderSpec>> {
    let months = start.through(end);
    regions
        .iter()
        .map(|region| {
            months
                .iter()
                .map(|month| SpiderSpec::new(region, *month))
                .collect()
        })
        .collect()
}
