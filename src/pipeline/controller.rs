//! Dedup & pagination controller.
//!
//! Drives a paged listing view, extracting rows until an already-known
//! identifier is seen. Listings are ordered newest-first, so the first
//! known id is a safe stopping point; the id that triggered the stop and
//! the scan count are logged so an out-of-order source is visible in logs.

use crate::error::Result;
use crate::extract::{extract_row, resolve_columns};
use crate::normalize::{clean_monetary, extract_city_state};
use crate::pipeline::detail::DetailEnricher;
use crate::pipeline::pager::ListingPager;
use crate::retry::{with_retry, RetryPolicy};
use crate::sources::SourceSpec;
use crate::types::{AuctionRecord, RawRecord};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use tracing::{info, warn};

/// Scan states. `Done` is terminal.
enum ScanState {
    Loading,
    RowScan,
    NextPage,
    Done,
}

/// Ordered batch produced by one pagination run, plus scan bookkeeping.
#[derive(Debug, Default)]
pub struct PageScan {
    pub records: Vec<AuctionRecord>,
    pub rows_scanned: usize,
    pub errors: Vec<String>,
}

/// Walks the paged listing until a known id or the last page, collecting
/// normalized records for everything new.
pub async fn collect_new_records(
    pager: &mut dyn ListingPager,
    source: &SourceSpec,
    known_ids: &HashSet<i64>,
    enricher: &dyn DetailEnricher,
    detail_retry: RetryPolicy,
    crawl_date: NaiveDateTime,
) -> Result<PageScan> {
    let mut scan = PageScan::default();
    let mut columns = None;
    let mut state = ScanState::Loading;

    loop {
        match state {
            ScanState::Loading => {
                let headers = pager.headers().await?;
                columns = Some(resolve_columns(&headers, source.columns)?);
                state = ScanState::RowScan;
            }
            ScanState::RowScan => {
                let column_positions = columns.as_ref().expect("columns resolved in Loading");
                let rows = pager.rows().await?;
                let mut stopped = false;

                for cells in &rows {
                    scan.rows_scanned += 1;
                    let raw = extract_row(cells, column_positions);

                    let auction_id = match raw.get("id").and_then(|id| id.trim().parse::<i64>().ok())
                    {
                        Some(id) => id,
                        None => {
                            warn!("Row without a parsable auction id, skipping");
                            scan.errors
                                .push(format!("{}: row without parsable id", source.id));
                            continue;
                        }
                    };

                    if known_ids.contains(&auction_id) {
                        info!(
                            "Auction id {} already stored; stopping scan after {} rows",
                            auction_id, scan.rows_scanned
                        );
                        stopped = true;
                        break;
                    }

                    let detail = with_retry(detail_retry, "fetch_other_values", || {
                        enricher.fetch_other_values(auction_id)
                    })
                    .await;

                    match detail {
                        Ok(detail) => {
                            scan.records
                                .push(build_record(auction_id, &raw, detail, source, crawl_date));
                        }
                        Err(exhausted) => {
                            // Enrichment exhaustion fails the whole row, not
                            // individual fields.
                            warn!("Row {} dropped: {}", auction_id, exhausted);
                            scan.errors.push(exhausted.to_string());
                        }
                    }
                }

                state = if stopped {
                    ScanState::Done
                } else {
                    ScanState::NextPage
                };
            }
            ScanState::NextPage => {
                state = match pager.next_page().await {
                    Ok(true) => ScanState::RowScan,
                    Ok(false) => ScanState::Done,
                    Err(e) => {
                        warn!("Next-page navigation failed, ending scan: {}", e);
                        ScanState::Done
                    }
                };
            }
            ScanState::Done => break,
        }
    }

    Ok(scan)
}

fn build_record(
    auction_id: i64,
    raw: &RawRecord,
    detail: crate::pipeline::detail::DetailValues,
    source: &SourceSpec,
    crawl_date: NaiveDateTime,
) -> AuctionRecord {
    let address = raw.get("address").unwrap_or_default().to_string();
    let (city, state) = match extract_city_state(&address) {
        Some((city, state)) => (Some(city), Some(state)),
        None => (None, None),
    };

    AuctionRecord {
        auction_id,
        address,
        bid: raw.get("bid").and_then(clean_monetary),
        debt: detail.debt.as_deref().and_then(clean_monetary),
        bid_open_date: None,
        bid_closing_date: None,
        county: detail.county.or_else(|| Some(source.county.to_string())),
        city,
        state,
        remark: Some(source.remark.to_string()),
        crawl_date,
        created_at: crawl_date,
        zestimate: None,
        v_o: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScraperError;
    use crate::pipeline::detail::DetailValues;
    use crate::sources::find_source;
    use async_trait::async_trait;
    use chrono::Local;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Pager over a fixed sequence of pages, tracking how many page
    /// transitions were requested.
    struct FakePager {
        pages: Vec<Vec<Vec<String>>>,
        current: usize,
        page_requests: AtomicUsize,
    }

    impl FakePager {
        fn new(pages: Vec<Vec<Vec<String>>>) -> Self {
            Self {
                pages,
                current: 0,
                page_requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ListingPager for FakePager {
        async fn headers(&mut self) -> Result<Vec<String>> {
            Ok(vec![
                "ID".to_string(),
                "Address".to_string(),
                "Current Bid".to_string(),
            ])
        }

        async fn rows(&mut self) -> Result<Vec<Vec<String>>> {
            Ok(self.pages[self.current].clone())
        }

        async fn next_page(&mut self) -> Result<bool> {
            self.page_requests.fetch_add(1, Ordering::SeqCst);
            if self.current + 1 < self.pages.len() {
                self.current += 1;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    struct FakeEnricher;

    #[async_trait]
    impl DetailEnricher for FakeEnricher {
        async fn fetch_other_values(&self, _auction_id: i64) -> Result<DetailValues> {
            Ok(DetailValues {
                debt: Some("$10,000.00".to_string()),
                county: Some("Philadelphia".to_string()),
            })
        }
    }

    struct FailingEnricher;

    #[async_trait]
    impl DetailEnricher for FailingEnricher {
        async fn fetch_other_values(&self, _auction_id: i64) -> Result<DetailValues> {
            Err(ScraperError::Fetch("detail page unavailable".to_string()))
        }
    }

    fn row(id: i64) -> Vec<String> {
        vec![
            id.to_string(),
            format!("{id} Main St, Springfield PA 19019"),
            "$45,000.00".to_string(),
        ]
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_stops_at_first_known_id() {
        let mut pager = FakePager::new(vec![
            vec![row(10), row(9), row(1)],
            vec![row(3), row(2)], // must never be requested
        ]);
        let known: HashSet<i64> = HashSet::from([1, 2, 3]);
        let source = find_source("phila_foreclosures").unwrap();

        let scan = collect_new_records(
            &mut pager,
            source,
            &known,
            &FakeEnricher,
            retry(),
            Local::now().naive_local(),
        )
        .await
        .unwrap();

        let ids: Vec<i64> = scan.records.iter().map(|r| r.auction_id).collect();
        assert_eq!(ids, vec![10, 9]);
        assert_eq!(scan.rows_scanned, 3);
        assert_eq!(pager.page_requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_walks_all_pages_when_nothing_known() {
        let mut pager = FakePager::new(vec![vec![row(10), row(9)], vec![row(8)]]);
        let source = find_source("phila_foreclosures").unwrap();

        let scan = collect_new_records(
            &mut pager,
            source,
            &HashSet::new(),
            &FakeEnricher,
            retry(),
            Local::now().naive_local(),
        )
        .await
        .unwrap();

        let ids: Vec<i64> = scan.records.iter().map(|r| r.auction_id).collect();
        assert_eq!(ids, vec![10, 9, 8]);
        assert_eq!(scan.rows_scanned, 3);
    }

    #[tokio::test]
    async fn test_row_normalization_from_table_cells() {
        let mut pager = FakePager::new(vec![vec![row(42)]]);
        let source = find_source("phila_foreclosures").unwrap();

        let scan = collect_new_records(
            &mut pager,
            source,
            &HashSet::new(),
            &FakeEnricher,
            retry(),
            Local::now().naive_local(),
        )
        .await
        .unwrap();

        let record = &scan.records[0];
        assert_eq!(record.bid, Some(45_000.0));
        assert_eq!(record.debt, Some(10_000.0));
        assert_eq!(record.city.as_deref(), Some("Springfield"));
        assert_eq!(record.state.as_deref(), Some("PA"));
        assert_eq!(record.county.as_deref(), Some("Philadelphia"));
    }

    #[tokio::test]
    async fn test_enrichment_exhaustion_drops_row_only() {
        let mut pager = FakePager::new(vec![vec![row(10), row(9)]]);
        let source = find_source("phila_foreclosures").unwrap();

        let scan = collect_new_records(
            &mut pager,
            source,
            &HashSet::new(),
            &FailingEnricher,
            retry(),
            Local::now().naive_local(),
        )
        .await
        .unwrap();

        assert!(scan.records.is_empty());
        assert_eq!(scan.rows_scanned, 2);
        assert_eq!(scan.errors.len(), 2);
    }
}
