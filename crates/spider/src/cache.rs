//! Process-wide item price database.
//!
//! Every spider of a run shares one `PriceDb`, so a price fetched by one
//! spider is reused by all others. Backed by `DashMap` since spiders read
//! it far more often than they write it.

use std::collections::HashMap;
use std::sync::Arc;

use common::PriceValue;
use dashmap::DashMap;

/// Thread-safe price cache: item_id → date (`YYYY-MM-DD`) → price.
#[derive(Debug, Clone, Default)]
pub struct PriceDb {
    inner: Arc<DashMap<u64, HashMap<String, PriceValue>>>,
}

impl PriceDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item_id: u64, date: &str) -> Option<PriceValue> {
        self.inner
            .get(&item_id)
            .and_then(|dates| dates.get(date).cloned())
    }

    pub fn contains(&self, item_id: u64, date: &str) -> bool {
        self.inner
            .get(&item_id)
            .is_some_and(|dates| dates.contains_key(date))
    }

    pub fn insert(&self, item_id: u64, date: &str, price: PriceValue) {
        self.inner
            .entry(item_id)
            .or_default()
            .insert(date.to_string(), price);
    }

    /// Number of (item, date) prices held.
    pub fn len(&self) -> usize {
        self.inner.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
