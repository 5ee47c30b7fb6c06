//! Opportunistic item pricing for one page of killmails.
//!
//! Items whose price is already in the [`PriceDb`] are priced on the spot;
//! the rest are recorded in a [`PendingLookups`] table so the spider can
//! fetch each item's price history once and fill every location at once.

use std::collections::HashMap;

use common::{Killmail, PriceValue};
use tracing::debug;
use zkb_client::prices::parse_date_key;
use zkb_client::PriceHistory;

use crate::cache::PriceDb;

/// Position of an unpriced item within a page of killmails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemLocation {
    /// Index into the page's killmails.
    pub killmail: usize,
    /// Index into that killmail's `victim.items`.
    pub item: usize,
    pub quantity: i64,
}

/// Every location still waiting for the price of one item on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDate {
    pub date: String,
    pub locations: Vec<ItemLocation>,
}

/// All pending dates of one item.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingItem {
    pub item_id: u64,
    pub dates: Vec<PendingDate>,
}

/// Lookup table: item_id → date → locations, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct PendingLookups {
    items: Vec<PendingItem>,
    index: HashMap<u64, usize>,
}

impl PendingLookups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item_id: u64, date: &str, location: ItemLocation) {
        let slot = *self.index.entry(item_id).or_insert_with(|| {
            self.items.push(PendingItem {
                item_id,
                dates: Vec::new(),
            });
            self.items.len() - 1
        });
        let pending = &mut self.items[slot];

        match pending.dates.iter_mut().find(|d| d.date == date) {
            Some(existing) => existing.locations.push(location),
            None => pending.dates.push(PendingDate {
                date: date.to_string(),
                locations: vec![location],
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct items to look up.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    fn items(&self) -> &[PendingItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<PendingItem> {
        self.items
    }
}

/// Price every item of the page from `db`; return what is left to look up.
pub fn price_from_db(killmails: &mut [Killmail], db: &PriceDb) -> PendingLookups {
    let mut pending = PendingLookups::new();

    for (i, km) in killmails.iter_mut().enumerate() {
        let date = km.date_key().to_string();

        for (j, item) in km.victim.items.iter_mut().enumerate() {
            let quantity = item.quantity();
            match db.get(item.item_type_id, &date) {
                Some(price) => {
                    debug!("Updated: Killmail #{}, Item #{}, Price: {:?}", i, j, price);
                    item.total_price = Some(price.total(quantity));
                }
                None => pending.push(
                    item.item_type_id,
                    &date,
                    ItemLocation {
                        killmail: i,
                        item: j,
                        quantity,
                    },
                ),
            }
        }
    }

    pending
}

/// Price of `item_id` on `date` according to a fetched history.
///
/// Exact date first, then the nearest listed date. Falls back to the
/// placeholder when the history is missing or empty, or when `date` is not
/// a valid `YYYY-MM-DD` key.
pub fn resolve_price(
    item_id: u64,
    date: &str,
    history: Option<&PriceHistory>,
    price_url: &str,
) -> PriceValue {
    let found = history
        .filter(|h| !h.is_empty())
        .zip(parse_date_key(date))
        .and_then(|(h, day)| h.price_on(day));

    match found {
        Some(price) => PriceValue::Isk(price),
        None => PriceValue::missing(item_id, date, price_url),
    }
}

/// Write `price` (times each stack's quantity) into every location.
pub fn apply_price(killmails: &mut [Killmail], locations: &[ItemLocation], price: &PriceValue) {
    for loc in locations {
        let Some(item) = killmails
            .get_mut(loc.killmail)
            .and_then(|km| km.victim.items.get_mut(loc.item))
        else {
            continue;
        };
        item.total_price = Some(price.total(loc.quantity));
        debug!(
            "Updated: Killmail #{}, Item #{}, Price: {:?}",
            loc.killmail, loc.item, price
        );
    }
}
