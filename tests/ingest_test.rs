use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use std::collections::HashSet;
use std::time::Duration;

use auction_scraper::error::Result as ScraperResult;
use auction_scraper::extract::extract_spreadsheet;
use auction_scraper::pipeline::{collect_new_records, DetailEnricher, DetailValues, ListingPager};
use auction_scraper::retry::RetryPolicy;
use auction_scraper::sources::{SourceKind, SourceSpec};
use auction_scraper::storage::{SqliteStorage, Storage};

const TEST_COLUMNS: &[(&str, &str)] = &[
    ("Auction ID", "id"),
    ("Minimum Bid", "bid"),
    ("Address", "address"),
];

fn test_source() -> SourceSpec {
    SourceSpec {
        id: "test_listing",
        base_url: "https://example.com/listings",
        county: "Philadelphia",
        remark: "",
        kind: SourceKind::BrowserTable,
        columns: TEST_COLUMNS,
        date_format: "%m/%d/%Y %I:%M:%S %p",
    }
}

struct SinglePagePager {
    rows: Vec<Vec<String>>,
}

#[async_trait]
impl ListingPager for SinglePagePager {
    async fn headers(&mut self) -> ScraperResult<Vec<String>> {
        Ok(vec![
            "Auction ID".to_string(),
            "Minimum Bid".to_string(),
            "Address".to_string(),
        ])
    }

    async fn rows(&mut self) -> ScraperResult<Vec<Vec<String>>> {
        Ok(self.rows.clone())
    }

    async fn next_page(&mut self) -> ScraperResult<bool> {
        Ok(false)
    }
}

struct StaticEnricher;

#[async_trait]
impl DetailEnricher for StaticEnricher {
    async fn fetch_other_values(&self, _auction_id: i64) -> ScraperResult<DetailValues> {
        Ok(DetailValues {
            debt: Some("$20,000.00".to_string()),
            county: Some("Philadelphia".to_string()),
        })
    }
}

#[tokio::test]
async fn test_two_row_page_lands_in_empty_store() -> Result<()> {
    let mut pager = SinglePagePager {
        rows: vec![
            vec![
                "101".to_string(),
                "$45,000.00".to_string(),
                "123 Main St, Springfield PA 19019".to_string(),
            ],
            vec![
                "102".to_string(),
                "$12,500.00".to_string(),
                "9 Pine Rd, Chester PA 19013".to_string(),
            ],
        ],
    };
    let source = test_source();

    let scan = collect_new_records(
        &mut pager,
        &source,
        &HashSet::new(),
        &StaticEnricher,
        RetryPolicy::new(2, Duration::ZERO),
        Local::now().naive_local(),
    )
    .await?;

    assert_eq!(scan.records.len(), 2);
    assert_eq!(scan.records[0].bid, Some(45_000.0));
    assert_eq!(scan.records[0].city.as_deref(), Some("Springfield"));
    assert_eq!(scan.records[0].state.as_deref(), Some("PA"));
    assert_eq!(scan.records[1].city.as_deref(), Some("Chester"));

    let dir = tempfile::tempdir()?;
    let storage = SqliteStorage::new(dir.path().join("ingest.db"))?;
    let summary = storage.upsert_batch(&scan.records).await?;
    assert_eq!(summary.upserted, 2);
    assert_eq!(summary.failed, 0);

    let first = storage.get_auction(101).await?.unwrap();
    let second = storage.get_auction(102).await?.unwrap();
    assert_eq!(first.created_at, second.created_at);
    assert_eq!(first.debt, Some(20_000.0));

    // The next run's known-id set now covers both listings.
    let known = storage.existing_auction_ids().await?;
    assert_eq!(known, HashSet::from([101, 102]));
    Ok(())
}

#[tokio::test]
async fn test_spreadsheet_export_to_store() -> Result<()> {
    let export = "\
Property List,,,,,\n\
Exported 06/20/2024,,,,,\n\
Auction ID,Minimum Bid,Bidding Open Date/Time,Bidding Closing Date/Time,Debt Amount,Address\n\
3001,\"$2,000.00\",06/01/2024 09:00:00 AM,06/15/2024 05:00:00 PM,\"$55,000.00\",\"44 Market St, West Chester PA 19380\"\n\
3002,$750,06/01/2024 09:00:00 AM,06/15/2024 05:00:00 PM,n/a,\"8 High St, Pottstown PA 19464\"\n";

    let mapping = &[
        ("Auction ID", "id"),
        ("Minimum Bid", "bid"),
        ("Bidding Open Date/Time", "bid_open_date"),
        ("Bidding Closing Date/Time", "bid_closing_date"),
        ("Debt Amount", "debt"),
        ("Address", "address"),
    ];

    let records = extract_spreadsheet(export, mapping, 2)?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("id"), Some("3001"));
    assert_eq!(records[0].get("debt"), Some("$55,000.00"));
    assert_eq!(records[1].get("bid"), Some("$750"));
    Ok(())
}
