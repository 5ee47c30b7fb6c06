//! Domain types shared across the crawler.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

// ── Killmail Types ────────────────────────────────────────────────────

/// A killmail as returned by `/api/kills/...`.
///
/// Keys outside the known set are collected in `extra` so the exporter can
/// report and drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Killmail {
    pub killmail_id: u64,
    pub killmail_time: String,
    pub victim: Victim,
    #[serde(default)]
    pub attackers: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solar_system_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moon_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub war_id: Option<u64>,
    #[serde(default)]
    pub zkb: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Killmail {
    /// Date part of `killmail_time` (`YYYY-MM-DD`), used to key prices.
    pub fn date_key(&self) -> &str {
        self.killmail_time
            .split('T')
            .next()
            .unwrap_or(&self.killmail_time)
    }
}

/// The destroyed ship and its fitted/cargo items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Victim {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One item stack in the victim's ship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_type_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_destroyed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_dropped: Option<i64>,
    /// Filled in by the spider: unit price on the kill date times quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<PriceValue>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    /// An item is either destroyed or dropped; zero if neither is reported.
    pub fn quantity(&self) -> i64 {
        self.quantity_destroyed
            .or(self.quantity_dropped)
            .unwrap_or(0)
    }
}

/// A price lookup result: ISK amount, or a note describing the failed lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceValue {
    Isk(f64),
    Missing(String),
}

impl PriceValue {
    /// Placeholder stored when no price could be found for `item_id` on `date`.
    pub fn missing(item_id: u64, date: &str, url: &str) -> Self {
        PriceValue::Missing(format!(
            "Item ID: {}, Date: {}, URL: {}",
            item_id, date, url
        ))
    }

    /// Total for a stack of `quantity` items. Placeholders pass through.
    pub fn total(&self, quantity: i64) -> PriceValue {
        match self {
            PriceValue::Isk(unit) => PriceValue::Isk(unit * quantity as f64),
            PriceValue::Missing(note) => PriceValue::Missing(note.clone()),
        }
    }
}

/// Everything a spider hands to the export pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlRecord {
    Killmail(Killmail),
    /// A kills page that could not be decoded; replaces the whole page.
    Unreadable { url: String, status: u16 },
}

// ── Calendar ──────────────────────────────────────────────────────────

/// Years a month may fall in. Killmails start with EVE's 2003 launch.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2003..=9999;

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, Error> {
        if !(1..=12).contains(&month) {
            return Err(Error::Config(format!("month {} out of range 1-12", month)));
        }
        if !YEAR_RANGE.contains(&year) {
            return Err(Error::Config(format!(
                "year {} out of range {}-{}",
                year,
                YEAR_RANGE.start(),
                YEAR_RANGE.end()
            )));
        }
        Ok(Self { year, month })
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// Every month from `self` to `end`, both included. Empty if `end < self`.
    pub fn through(self, end: YearMonth) -> Vec<YearMonth> {
        let mut months = Vec::new();
        let mut cursor = self;
        while cursor <= end {
            months.push(cursor);
            cursor = cursor.next();
        }
        months
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| Error::Config(format!("'{}' is not YYYY-MM", s)))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| Error::Config(format!("'{}' is not YYYY-MM", s)))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| Error::Config(format!("'{}' is not YYYY-MM", s)))?;
        YearMonth::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}
