//! Ingestion pipeline: drive each listing source, collect new records, and
//! hand them to the upsert sink.

pub mod controller;
pub mod detail;
pub mod pager;

pub use controller::{collect_new_records, PageScan};
pub use detail::{DetailEnricher, DetailValues, ProxyDetailEnricher};
pub use pager::{BrowserPager, ListingPager};

use crate::config::Config;
use crate::error::Result;
use crate::extract::extract_spreadsheet;
use crate::fetch::ProxyClient;
use crate::normalize::{clean_monetary, extract_city_state, normalize_date, validate_date_order};
use crate::retry::RetryPolicy;
use crate::sources::{SourceKind, SourceSpec, EXPORT_SKIP_ROWS};
use crate::storage::Storage;
use crate::types::{AuctionRecord, IngestOutcome, RawRecord};
use chrono::{Local, NaiveDateTime};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct Ingester {
    storage: Arc<dyn Storage>,
    config: Config,
}

impl Ingester {
    pub fn new(storage: Arc<dyn Storage>, config: Config) -> Self {
        Self { storage, config }
    }

    /// Runs one full ingestion pass for a source: fetch, paginate, extract,
    /// normalize, upsert.
    #[instrument(skip(self), fields(source = %source.id))]
    pub async fn run_source(&self, source: &SourceSpec) -> Result<IngestOutcome> {
        let run_id = Uuid::new_v4();
        info!("Starting ingestion run {} for {}", run_id, source.id);
        counter!("auction_ingest_runs_total", "source" => source.id).increment(1);
        let started = std::time::Instant::now();

        // Known ids are re-read fresh for every source run.
        let known_ids = self.storage.existing_auction_ids().await?;
        let crawl_date = Local::now().naive_local();

        let scan = match source.kind {
            SourceKind::BrowserTable => {
                let mut pager = BrowserPager::open(&self.config.fetch, source.base_url)?;
                let proxy = ProxyClient::new(&self.config.fetch)?;
                let enricher = ProxyDetailEnricher::new(proxy, source);
                let detail_retry = RetryPolicy::new(
                    self.config.retry.detail_max_attempts,
                    Duration::from_secs(self.config.retry.detail_delay_seconds),
                );
                collect_new_records(
                    &mut pager,
                    source,
                    &known_ids,
                    &enricher,
                    detail_retry,
                    crawl_date,
                )
                .await?
                // Browser session is dropped here, releasing the process on
                // every exit path.
            }
            SourceKind::SpreadsheetExport => {
                let proxy = ProxyClient::new(&self.config.fetch)?;
                self.scan_spreadsheet(&proxy, source, crawl_date).await?
            }
        };

        info!(
            "Scanned {} rows, {} new records for {}",
            scan.rows_scanned,
            scan.records.len(),
            source.id
        );
        histogram!("auction_rows_scanned", "source" => source.id)
            .record(scan.rows_scanned as f64);

        let summary = self.storage.upsert_batch(&scan.records).await?;
        counter!("auction_records_upserted_total", "source" => source.id)
            .increment(summary.upserted as u64);
        counter!("auction_record_errors_total", "source" => source.id)
            .increment((scan.errors.len() + summary.failed) as u64);
        histogram!("auction_ingest_duration_seconds", "source" => source.id)
            .record(started.elapsed().as_secs_f64());

        Ok(IngestOutcome {
            source_id: source.id.to_string(),
            run_id: run_id.to_string(),
            rows_scanned: scan.rows_scanned,
            new_records: scan.records.len(),
            upserted: summary.upserted,
            errors: scan.errors,
        })
    }

    /// Spreadsheet sources have no pagination: the export is fetched in one
    /// request and every row is mapped. The upsert sink keeps re-seen rows
    /// idempotent.
    async fn scan_spreadsheet(
        &self,
        proxy: &ProxyClient,
        source: &SourceSpec,
        crawl_date: NaiveDateTime,
    ) -> Result<PageScan> {
        let body = proxy.get(&source.export_url()).await?;
        let raw_records = extract_spreadsheet(&body, source.columns, EXPORT_SKIP_ROWS)?;

        let mut scan = PageScan::default();
        for raw in &raw_records {
            scan.rows_scanned += 1;
            match normalize_export_row(raw, source, crawl_date) {
                Some(record) => scan.records.push(record),
                None => {
                    warn!("Skipping export row with unusable id from {}", source.id);
                    scan.errors
                        .push(format!("{}: export row with unusable id", source.id));
                }
            }
        }
        Ok(scan)
    }
}

/// Normalizes one spreadsheet-export row. `None` when the row carries no
/// parsable identifier.
fn normalize_export_row(
    raw: &RawRecord,
    source: &SourceSpec,
    crawl_date: NaiveDateTime,
) -> Option<AuctionRecord> {
    let auction_id: i64 = raw.get("id")?.trim().parse().ok()?;
    let address = raw.get("address").unwrap_or_default().to_string();

    let open = raw
        .get("bid_open_date")
        .and_then(|d| normalize_date(d, source.date_format));
    let closing = raw
        .get("bid_closing_date")
        .and_then(|d| normalize_date(d, source.date_format));
    let (bid_open_date, bid_closing_date) = validate_date_order(open, closing);

    // Exports carry no usable city column; fall back to the county label
    // the way the feed's own site does when the address has no trailing
    // city/state.
    let (city, state) = match extract_city_state(&address) {
        Some((city, state)) => (Some(city), Some(state)),
        None => (Some(source.county.to_string()), Some("PA".to_string())),
    };

    Some(AuctionRecord {
        auction_id,
        address,
        bid: raw.get("bid").and_then(clean_monetary),
        debt: raw.get("debt").and_then(clean_monetary),
        bid_open_date,
        bid_closing_date,
        county: Some(source.county.to_string()),
        city,
        state,
        remark: Some(source.remark.to_string()),
        crawl_date,
        created_at: crawl_date,
        zestimate: None,
        v_o: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::find_source;

    #[test]
    fn test_normalize_export_row() {
        let source = find_source("chester").unwrap();
        let crawl_date = Local::now().naive_local();

        let mut raw = RawRecord::new();
        raw.push("id", "2001");
        raw.push("bid", "$1,200.00");
        raw.push("bid_open_date", "06/01/2024 09:00:00 AM");
        raw.push("bid_closing_date", "06/15/2024 05:00:00 PM");
        raw.push("debt", "$80,500.25");
        raw.push("address", "12 Elm St, West Chester PA 19380");

        let record = normalize_export_row(&raw, source, crawl_date).unwrap();
        assert_eq!(record.auction_id, 2001);
        assert_eq!(record.bid, Some(1200.0));
        assert_eq!(record.debt, Some(80500.25));
        assert_eq!(record.city.as_deref(), Some("West Chester"));
        assert_eq!(record.state.as_deref(), Some("PA"));
        assert_eq!(record.county.as_deref(), Some("Chester"));
        assert!(record.bid_open_date.unwrap() < record.bid_closing_date.unwrap());
    }

    #[test]
    fn test_normalize_export_row_without_id() {
        let source = find_source("chester").unwrap();
        let mut raw = RawRecord::new();
        raw.push("address", "12 Elm St, West Chester PA 19380");
        assert!(normalize_export_row(&raw, source, Local::now().naive_local()).is_none());
    }

    #[test]
    fn test_normalize_export_row_malformed_values_go_null() {
        let source = find_source("chester").unwrap();
        let mut raw = RawRecord::new();
        raw.push("id", "2002");
        raw.push("bid", "n/a");
        raw.push("bid_open_date", "TBD");
        raw.push("address", "no city here");

        let record = normalize_export_row(&raw, source, Local::now().naive_local()).unwrap();
        assert_eq!(record.bid, None);
        assert_eq!(record.bid_open_date, None);
        // Fallback labels when the address has no trailing city/state.
        assert_eq!(record.city.as_deref(), Some("Chester"));
        assert_eq!(record.state.as_deref(), Some("PA"));
    }
}
