//! CSV export pipeline.
//!
//! Every spider owns one exporter and therefore one CSV file. Rows follow a
//! fixed header; nested killmail parts are written as compact JSON and
//! top-level keys outside the header are dropped with a warning.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use common::{CrawlRecord, Error, Killmail};
use tracing::{debug, warn};

/// CSV header, in column order.
pub const FIELDS: [&str; 8] = [
    "killmail_id",
    "killmail_time",
    "victim",
    "attackers",
    "solar_system_id",
    "moon_id",
    "war_id",
    "zkb",
];

/// Cell value used for every column an unreadable page cannot fill.
const ERR_CELL: &str = "ERR";

/// Where a spider sends its records.
pub trait RecordSink {
    fn write_record(&mut self, record: &CrawlRecord) -> Result<(), Error>;

    /// Flush everything; called once when the spider closes.
    fn close(&mut self) -> Result<(), Error>;
}

/// Collects records in memory.
impl RecordSink for Vec<CrawlRecord> {
    fn write_record(&mut self, record: &CrawlRecord) -> Result<(), Error> {
        self.push(record.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Writes one spider's records as CSV.
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<W>,
    spider: String,
    rows: u64,
}

impl CsvExporter<File> {
    /// Create (or truncate) `path`, creating parent directories as needed.
    pub fn create(path: &Path, spider: &str) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        debug!("{}: exporting to {}", spider, path.display());
        Self::new(file, spider)
    }
}

impl<W: Write> CsvExporter<W> {
    /// Wrap `out` and write the header line.
    pub fn new(out: W, spider: &str) -> Result<Self, Error> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
        writer.write_record(FIELDS)?;
        Ok(Self {
            writer,
            spider: spider.to_string(),
            rows: 0,
        })
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W, Error> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(std::io::Error::new(e.error().kind(), e.to_string())))
    }
}

impl<W: Write> RecordSink for CsvExporter<W> {
    fn write_record(&mut self, record: &CrawlRecord) -> Result<(), Error> {
        let row = match record {
            CrawlRecord::Killmail(km) => killmail_row(km)?,
            CrawlRecord::Unreadable { url, status } => unreadable_row(url, *status),
        };
        self.writer.write_record(&row)?;
        self.rows += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.writer.flush()?;
        debug!("{}: closed exporter after {} rows", self.spider, self.rows);
        Ok(())
    }
}

/// CSV cells for one killmail, in [`FIELDS`] order.
pub fn killmail_row(km: &Killmail) -> Result<[String; 8], Error> {
    for field in km.extra.keys() {
        warn!(
            "Unexpected field ({}) in killmail {}_{}; removing field",
            field, km.killmail_id, km.killmail_time
        );
    }

    Ok([
        km.killmail_id.to_string(),
        km.killmail_time.clone(),
        serde_json::to_string(&km.victim)?,
        serde_json::to_string(&km.attackers)?,
        optional_cell(km.solar_system_id),
        optional_cell(km.moon_id),
        optional_cell(km.war_id),
        serde_json::to_string(&km.zkb)?,
    ])
}

/// The single row standing in for a kills page that could not be decoded.
pub fn unreadable_row(url: &str, status: u16) -> [String; 8] {
    [
        format!("Unable to retrieve JSON data located at {}", url),
        format!("Received status code: {}", status),
        ERR_CELL.into(),
        ERR_CELL.into(),
        ERR_CELL.into(),
        ERR_CELL.into(),
        ERR_CELL.into(),
        ERR_CELL.into(),
    ]
}

fn optional_cell(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PriceValue;

    fn killmail(raw: &str) -> Killmail {
        serde_json::from_str(raw).expect("killmail")
    }

    fn exported(records: &[CrawlRecord]) -> String {
        let mut exporter = CsvExporter::new(Vec::new(), "test").expect("exporter");
        for record in records {
            exporter.write_record(record).expect("write");
        }
        exporter.close().expect("close");
        String::from_utf8(exporter.into_inner().expect("inner")).expect("utf8")
    }

    #[test]
    fn test_header_only_for_empty_spider() {
        assert_eq!(
            exported(&[]),
            "killmail_id,killmail_time,victim,attackers,solar_system_id,moon_id,war_id,zkb\n"
        );
    }

    #[test]
    fn test_killmail_row_writes_nested_json() {
        let mut km = killmail(
            r#"{"killmail_id": 7, "killmail_time": "2015-05-02T10:00:00Z",
                "victim": {"ship_type_id": 587, "items": [{"item_type_id": 34, "quantity_dropped": 2}]},
                "attackers": [], "solar_system_id": 30000142, "zkb": {"npc": false}}"#,
        );
        km.victim.items[0].total_price = Some(PriceValue::Isk(10.0));

        let row = killmail_row(&km).expect("row");
        assert_eq!(row[0], "7");
        assert_eq!(row[1], "2015-05-02T10:00:00Z");
        let victim: serde_json::Value = serde_json::from_str(&row[2]).expect("victim json");
        assert_eq!(victim["items"][0]["total_price"], 10.0);
        assert_eq!(victim["ship_type_id"], 587);
        assert_eq!(row[3], "[]");
        assert_eq!(row[4], "30000142");
        assert_eq!(row[5], "");
        assert_eq!(row[6], "");
        assert_eq!(row[7], r#"{"npc":false}"#);
    }

    #[test]
    fn test_unexpected_fields_are_dropped() {
        let km = killmail(
            r#"{"killmail_id": 8, "killmail_time": "2015-05-02T10:00:00Z",
                "victim": {}, "killmail_hash": "deadbeef", "zkb": {}}"#,
        );
        let csv = exported(&[CrawlRecord::Killmail(km)]);

        assert!(!csv.contains("deadbeef"));
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn test_unreadable_page_row() {
        let csv = exported(&[CrawlRecord::Unreadable {
            url: "https://zkillboard.com/api/kills/regionID/1/year/2015/month/05/page/3/".into(),
            status: 200,
        }]);
        let row = csv.lines().nth(1).expect("row");
        assert_eq!(
            row,
            "Unable to retrieve JSON data located at \
             https://zkillboard.com/api/kills/regionID/1/year/2015/month/05/page/3/,\
             Received status code: 200,ERR,ERR,ERR,ERR,ERR,ERR"
        );
    }

    #[test]
    fn test_create_makes_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tmpdata").join("10000002201505.csv");

        let mut exporter = CsvExporter::create(&path, "10000002201505").expect("create");
        exporter
            .write_record(&CrawlRecord::Unreadable { url: "u".into(), status: 500 })
            .expect("write");
        exporter.close().expect("close");
        assert_eq!(exporter.rows(), 1);

        let contents = std::fs::read_to_string(&path).expect("read");
        assert!(contents.starts_with("killmail_id,"));
        assert!(contents.contains("Received status code: 500"));
    }
}
