use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Canonical timestamp format used across the store and the read API.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One listed property/auction, normalized and ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionRecord {
    /// Globally unique listing identifier, primary key for upsert.
    pub auction_id: i64,
    pub address: String,
    /// Current/minimum bid amount.
    pub bid: Option<f64>,
    /// Outstanding debt amount.
    pub debt: Option<f64>,
    pub bid_open_date: Option<NaiveDateTime>,
    pub bid_closing_date: Option<NaiveDateTime>,
    pub county: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub remark: Option<String>,
    /// Timestamp of the crawl pass that produced this record.
    pub crawl_date: NaiveDateTime,
    /// Set on first sighting, preserved on every later upsert.
    pub created_at: NaiveDateTime,
    /// Populated out-of-band by the valuation enrichment job.
    pub zestimate: Option<f64>,
    /// Value-over-debt ratio, populated together with `zestimate`.
    pub v_o: Option<f64>,
}

/// A flat record as extracted from a page, before normalization.
///
/// Field order follows the source's column order.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn push(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.push((field.into(), value.into()));
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Result of one per-source ingestion pass.
#[derive(Debug, Serialize)]
pub struct IngestOutcome {
    pub source_id: String,
    pub run_id: String,
    /// Rows seen during pagination, including the one that triggered the
    /// known-id stop.
    pub rows_scanned: usize,
    pub new_records: usize,
    pub upserted: usize,
    pub errors: Vec<String>,
}
