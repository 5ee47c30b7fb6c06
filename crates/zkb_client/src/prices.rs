//! Item price history as served by `/api/prices/{item_id}/`.
//!
//! The endpoint returns one JSON object: `YYYY-MM-DD` keys map to the
//! average price on that day, next to bookkeeping keys such as
//! `currentPrice` and `typeID` which are ignored here.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::Error;
use serde_json::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Daily prices of one item, ordered by date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceHistory {
    daily: BTreeMap<NaiveDate, f64>,
}

impl PriceHistory {
    /// Parse a prices response body. Keys that are not dates, and values
    /// that are not numbers, are skipped.
    pub fn from_json(body: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(body)?;
        let object = match value {
            Value::Object(map) => map,
            // An empty history comes back as `[]`.
            Value::Array(arr) if arr.is_empty() => return Ok(Self::default()),
            other => {
                return Err(Error::Other(format!(
                    "expected price object, got {}",
                    type_name(&other)
                )))
            }
        };

        let daily = object
            .iter()
            .filter_map(|(key, value)| {
                let date = NaiveDate::parse_from_str(key, DATE_FORMAT).ok()?;
                let price = value
                    .as_f64()
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()))?;
                Some((date, price))
            })
            .collect();

        Ok(Self { daily })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self {
            daily: entries.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.daily.is_empty()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.daily.len()
    }

    /// Price listed for exactly `date`.
    pub fn exact(&self, date: NaiveDate) -> Option<f64> {
        self.daily.get(&date).copied()
    }

    /// Price of the listed date closest to `date`. Ties go to the earlier day.
    pub fn nearest(&self, date: NaiveDate) -> Option<(NaiveDate, f64)> {
        let before = self.daily.range(..=date).next_back();
        let after = self.daily.range(date..).next();

        match (before, after) {
            (Some((b, bp)), Some((a, ap))) => {
                if (*a - date) < (date - *b) {
                    Some((*a, *ap))
                } else {
                    Some((*b, *bp))
                }
            }
            (Some((d, p)), None) | (None, Some((d, p))) => Some((*d, *p)),
            (None, None) => None,
        }
    }

    /// Exact price if listed, else the nearest one.
    pub fn price_on(&self, date: NaiveDate) -> Option<f64> {
        self.exact(date)
            .or_else(|| self.nearest(date).map(|(_, price)| price))
    }
}

/// Parse a `YYYY-MM-DD` killmail date key.
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DATE_FORMAT).ok()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        parse_date_key(s).expect("valid date")
    }

    #[test]
    fn test_from_json_skips_bookkeeping_keys() {
        let body = r#"{
            "currentPrice": 5.11,
            "typeID": 34,
            "2015-05-01": 5.5,
            "2015-05-03": 6,
            "not-a-date": 1.0
        }"#;
        let history = PriceHistory::from_json(body).expect("history");

        assert_eq!(history.len(), 2);
        assert_eq!(history.exact(day("2015-05-01")), Some(5.5));
        assert_eq!(history.exact(day("2015-05-03")), Some(6.0));
    }

    #[test]
    fn test_empty_array_is_empty_history() {
        let history = PriceHistory::from_json("[]").expect("history");
        assert!(history.is_empty());
        assert_eq!(history.price_on(day("2016-01-01")), None);
    }

    #[test]
    fn test_non_object_is_error() {
        assert!(PriceHistory::from_json("42").is_err());
        assert!(PriceHistory::from_json("<html>").is_err());
    }

    #[test]
    fn test_nearest_picks_closest_date() {
        let history = PriceHistory::from_entries([
            (day("2015-05-01"), 1.0),
            (day("2015-05-10"), 2.0),
            (day("2015-05-20"), 3.0),
        ]);

        assert_eq!(history.nearest(day("2015-05-08")), Some((day("2015-05-10"), 2.0)));
        assert_eq!(history.nearest(day("2015-05-04")), Some((day("2015-05-01"), 1.0)));
        assert_eq!(history.nearest(day("2014-01-01")), Some((day("2015-05-01"), 1.0)));
        assert_eq!(history.nearest(day("2019-01-01")), Some((day("2015-05-20"), 3.0)));
    }

    #[test]
    fn test_nearest_tie_goes_earlier() {
        let history = PriceHistory::from_entries([
            (day("2015-05-10"), 2.0),
            (day("2015-05-20"), 3.0),
        ]);
        assert_eq!(history.nearest(day("2015-05-15")), Some((day("2015-05-10"), 2.0)));
    }

    #[test]
    fn test_price_on_prefers_exact() {
        let history = PriceHistory::from_entries([
            (day("2015-05-10"), 2.0),
            (day("2015-05-11"), 9.0),
        ]);
        assert_eq!(history.price_on(day("2015-05-11")), Some(9.0));
    }
}
