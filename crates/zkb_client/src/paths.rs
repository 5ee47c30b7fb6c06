//! URL construction for the killmail and price endpoints.

use common::YearMonth;

/// One page of `/api/kills/regionID/{r}/year/{y}/month/{m}/page/{p}/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KillsPage {
    pub region_id: String,
    pub month: YearMonth,
    pub page: u32,
}

impl KillsPage {
    /// Page 1 of a region's month.
    pub fn first(region_id: impl Into<String>, month: YearMonth) -> Self {
        Self {
            region_id: region_id.into(),
            month,
            page: 1,
        }
    }

    /// The following page of the same region and month.
    pub fn next_page(&self) -> Self {
        Self {
            page: self.page + 1,
            ..self.clone()
        }
    }

    /// Path without the page modifier, e.g. for "all pages scraped" logs.
    pub fn month_path(&self, base_url: &str) -> String {
        format!(
            "{}/api/kills/regionID/{}/year/{:04}/month/{:02}/",
            base_url.trim_end_matches('/'),
            self.region_id,
            self.month.year,
            self.month.month
        )
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}page/{}/", self.month_path(base_url), self.page)
    }
}

/// `/api/prices/{item_id}/`.
pub fn prices_url(base_url: &str, item_id: u64) -> String {
    format!("{}/api/prices/{}/", base_url.trim_end_matches('/'), item_id)
}
