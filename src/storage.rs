use crate::error::{Result, ScraperError};
use crate::types::{AuctionRecord, TIMESTAMP_FORMAT};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Sortable columns exposed by the read API. Caller input is resolved to
/// one of these; raw field names are never interpolated into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    AuctionId,
    Address,
    Bid,
    Debt,
    BidOpenDate,
    BidClosingDate,
    County,
    City,
    State,
    CrawlDate,
    CreatedAt,
    Zestimate,
    ValueOverDebt,
}

impl SortField {
    pub fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "auction_id" => Some(Self::AuctionId),
            "address" => Some(Self::Address),
            "bid" => Some(Self::Bid),
            "debt" => Some(Self::Debt),
            "bid_open_date" => Some(Self::BidOpenDate),
            "bid_closing_date" => Some(Self::BidClosingDate),
            "county" => Some(Self::County),
            "city" => Some(Self::City),
            "state" => Some(Self::State),
            "crawl_date" => Some(Self::CrawlDate),
            "created_at" => Some(Self::CreatedAt),
            "zestimate" => Some(Self::Zestimate),
            "v_o" => Some(Self::ValueOverDebt),
            _ => None,
        }
    }

    fn as_column(self) -> &'static str {
        match self {
            Self::AuctionId => "auction_id",
            Self::Address => "address",
            Self::Bid => "bid",
            Self::Debt => "debt",
            Self::BidOpenDate => "bid_open_date",
            Self::BidClosingDate => "bid_closing_date",
            Self::County => "county",
            Self::City => "city",
            Self::State => "state",
            Self::CrawlDate => "crawl_date",
            Self::CreatedAt => "created_at",
            Self::Zestimate => "zestimate",
            Self::ValueOverDebt => "v_o",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_api_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ASC" => Some(Self::Asc),
            "DESC" => Some(Self::Desc),
            _ => None,
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Read-API query: pagination, sorting, and an optional substring search
/// OR-ed across a fixed column whitelist.
#[derive(Debug, Clone)]
pub struct AuctionQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub search: Option<String>,
    /// Only records with `crawl_date` at or after this cutoff are returned.
    pub crawled_since: NaiveDateTime,
}

#[derive(Debug, Default)]
pub struct UpsertSummary {
    pub upserted: usize,
    pub failed: usize,
}

/// Persistence boundary for auction records.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Identifiers already persisted, used by the pagination controller's
    /// early stop.
    async fn existing_auction_ids(&self) -> Result<HashSet<i64>>;

    /// Insert-or-update each record keyed by `auction_id`. Mutable columns
    /// are overwritten; `created_at`, `zestimate` and `v_o` are preserved
    /// on update. A per-record failure is logged and skipped, never
    /// aborting the batch.
    async fn upsert_batch(&self, records: &[AuctionRecord]) -> Result<UpsertSummary>;

    async fn get_auction(&self, auction_id: i64) -> Result<Option<AuctionRecord>>;

    /// Records with no valuation yet, created at or after `cutoff`.
    async fn unvalued_since(&self, cutoff: NaiveDateTime) -> Result<Vec<AuctionRecord>>;

    /// Writes valuation fields only where they are currently null.
    async fn set_valuation_if_null(
        &self,
        auction_id: i64,
        zestimate: Option<f64>,
        v_o: Option<f64>,
    ) -> Result<()>;

    async fn query_auctions(&self, query: &AuctionQuery) -> Result<Vec<AuctionRecord>>;

    async fn count_auctions(
        &self,
        search: Option<&str>,
        crawled_since: NaiveDateTime,
    ) -> Result<u64>;
}

const RECORD_COLUMNS: &str = "auction_id, address, bid, debt, bid_open_date, bid_closing_date, \
     county, city, state, remark, crawl_date, created_at, zestimate, v_o";

const SEARCH_CLAUSE: &str = "(CAST(auction_id AS TEXT) LIKE ?2 OR address LIKE ?2 \
     OR city LIKE ?2 OR state LIKE ?2 OR county LIKE ?2 OR remark LIKE ?2)";

/// SQLite-backed storage. A fresh connection is opened per logical unit of
/// work; there is no pooling or reuse across batches.
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self {
            db_path: db_path.into(),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path).map_err(|e| ScraperError::Database {
            message: format!("failed to open database {}: {e}", self.db_path.display()),
        })
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS auction_data (
                auction_id       INTEGER PRIMARY KEY,
                address          TEXT NOT NULL,
                bid              REAL,
                debt             REAL,
                bid_open_date    TEXT,
                bid_closing_date TEXT,
                county           TEXT,
                city             TEXT,
                state            TEXT,
                remark           TEXT,
                crawl_date       TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                zestimate        REAL,
                v_o              REAL
            );
            "#,
        )?;
        debug!("Database schema ready at {}", self.db_path.display());
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuctionRecord> {
        let parse_required = |index: usize, text: String| {
            NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    index,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        };
        let parse_optional = |text: Option<String>| {
            text.and_then(|t| NaiveDateTime::parse_from_str(&t, TIMESTAMP_FORMAT).ok())
        };

        Ok(AuctionRecord {
            auction_id: row.get(0)?,
            address: row.get(1)?,
            bid: row.get(2)?,
            debt: row.get(3)?,
            bid_open_date: parse_optional(row.get(4)?),
            bid_closing_date: parse_optional(row.get(5)?),
            county: row.get(6)?,
            city: row.get(7)?,
            state: row.get(8)?,
            remark: row.get(9)?,
            crawl_date: parse_required(10, row.get(10)?)?,
            created_at: parse_required(11, row.get(11)?)?,
            zestimate: row.get(12)?,
            v_o: row.get(13)?,
        })
    }
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn format_optional(ts: Option<NaiveDateTime>) -> Option<String> {
    ts.map(format_timestamp)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn existing_auction_ids(&self) -> Result<HashSet<i64>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT auction_id FROM auction_data")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<HashSet<i64>>>()?;
        info!("Fetched {} existing auction ids", ids.len());
        Ok(ids)
    }

    async fn upsert_batch(&self, records: &[AuctionRecord]) -> Result<UpsertSummary> {
        let conn = self.open()?;
        let mut summary = UpsertSummary::default();

        for record in records {
            let result = conn.execute(
                "INSERT INTO auction_data (auction_id, address, bid, debt, bid_open_date, \
                     bid_closing_date, county, city, state, remark, crawl_date, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                 ON CONFLICT(auction_id) DO UPDATE SET \
                     address=excluded.address, bid=excluded.bid, debt=excluded.debt, \
                     bid_open_date=excluded.bid_open_date, \
                     bid_closing_date=excluded.bid_closing_date, \
                     county=excluded.county, city=excluded.city, state=excluded.state, \
                     remark=excluded.remark, crawl_date=excluded.crawl_date, \
                     created_at=COALESCE(auction_data.created_at, excluded.created_at)",
                params![
                    record.auction_id,
                    record.address,
                    record.bid,
                    record.debt,
                    format_optional(record.bid_open_date),
                    format_optional(record.bid_closing_date),
                    record.county,
                    record.city,
                    record.state,
                    record.remark,
                    format_timestamp(record.crawl_date),
                    format_timestamp(record.created_at),
                ],
            );

            match result {
                Ok(_) => summary.upserted += 1,
                Err(e) => {
                    error!("Error upserting auction {}: {}", record.auction_id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Upsert batch complete: {} upserted, {} failed",
            summary.upserted, summary.failed
        );
        Ok(summary)
    }

    async fn get_auction(&self, auction_id: i64) -> Result<Option<AuctionRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM auction_data WHERE auction_id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![auction_id], Self::row_to_record)?;
        match rows.next() {
            Some(record) => Ok(Some(record?)),
            None => Ok(None),
        }
    }

    async fn unvalued_since(&self, cutoff: NaiveDateTime) -> Result<Vec<AuctionRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM auction_data \
             WHERE zestimate IS NULL AND created_at >= ?1"
        ))?;
        let records = stmt
            .query_map(params![format_timestamp(cutoff)], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn set_valuation_if_null(
        &self,
        auction_id: i64,
        zestimate: Option<f64>,
        v_o: Option<f64>,
    ) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE auction_data \
             SET zestimate = COALESCE(zestimate, ?1), v_o = COALESCE(v_o, ?2) \
             WHERE auction_id = ?3",
            params![zestimate, v_o, auction_id],
        )?;
        Ok(())
    }

    async fn query_auctions(&self, query: &AuctionQuery) -> Result<Vec<AuctionRecord>> {
        let conn = self.open()?;
        let offset = (query.page.saturating_sub(1) as i64) * query.page_size as i64;
        let cutoff = format_timestamp(query.crawled_since);

        // Sort column and direction come from allow-listed enums, never
        // from caller strings.
        let order_by = format!(
            "ORDER BY {} {}",
            query.sort_field.as_column(),
            query.sort_order.as_sql()
        );

        let records = if let Some(search) = &query.search {
            let pattern = format!("%{search}%");
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM auction_data \
                 WHERE crawl_date >= ?1 AND {SEARCH_CLAUSE} {order_by} LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![cutoff, pattern, query.page_size as i64, offset],
                    Self::row_to_record,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        } else {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM auction_data \
                 WHERE crawl_date >= ?1 {order_by} LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![cutoff, query.page_size as i64, offset],
                    Self::row_to_record,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        Ok(records)
    }

    async fn count_auctions(
        &self,
        search: Option<&str>,
        crawled_since: NaiveDateTime,
    ) -> Result<u64> {
        let conn = self.open()?;
        let cutoff = format_timestamp(crawled_since);

        let count: i64 = if let Some(search) = search {
            let pattern = format!("%{search}%");
            conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM auction_data \
                     WHERE crawl_date >= ?1 AND {SEARCH_CLAUSE}"
                ),
                params![cutoff, pattern],
                |row| row.get(0),
            )?
        } else {
            conn.query_row(
                "SELECT COUNT(*) FROM auction_data WHERE crawl_date >= ?1",
                params![cutoff],
                |row| row.get(0),
            )?
        };

        Ok(count as u64)
    }
}

/// In-memory storage implementation for development/testing.
pub struct InMemoryStorage {
    rows: Arc<Mutex<HashMap<i64, AuctionRecord>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn matches_search(record: &AuctionRecord, search: &str) -> bool {
        let needle = search.to_lowercase();
        let haystacks = [
            Some(record.auction_id.to_string()),
            Some(record.address.clone()),
            record.city.clone(),
            record.state.clone(),
            record.county.clone(),
            record.remark.clone(),
        ];
        haystacks
            .iter()
            .flatten()
            .any(|value| value.to_lowercase().contains(&needle))
    }

    fn compare(a: &AuctionRecord, b: &AuctionRecord, field: SortField) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match field {
            SortField::AuctionId => a.auction_id.cmp(&b.auction_id),
            SortField::Address => a.address.cmp(&b.address),
            SortField::Bid => a.bid.partial_cmp(&b.bid).unwrap_or(Ordering::Equal),
            SortField::Debt => a.debt.partial_cmp(&b.debt).unwrap_or(Ordering::Equal),
            SortField::BidOpenDate => a.bid_open_date.cmp(&b.bid_open_date),
            SortField::BidClosingDate => a.bid_closing_date.cmp(&b.bid_closing_date),
            SortField::County => a.county.cmp(&b.county),
            SortField::City => a.city.cmp(&b.city),
            SortField::State => a.state.cmp(&b.state),
            SortField::CrawlDate => a.crawl_date.cmp(&b.crawl_date),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Zestimate => a
                .zestimate
                .partial_cmp(&b.zestimate)
                .unwrap_or(Ordering::Equal),
            SortField::ValueOverDebt => a.v_o.partial_cmp(&b.v_o).unwrap_or(Ordering::Equal),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn existing_auction_ids(&self) -> Result<HashSet<i64>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.keys().copied().collect())
    }

    async fn upsert_batch(&self, records: &[AuctionRecord]) -> Result<UpsertSummary> {
        let mut rows = self.rows.lock().unwrap();
        let mut summary = UpsertSummary::default();

        for record in records {
            match rows.get_mut(&record.auction_id) {
                Some(existing) => {
                    let created_at = existing.created_at;
                    let zestimate = existing.zestimate;
                    let v_o = existing.v_o;
                    *existing = record.clone();
                    existing.created_at = created_at;
                    existing.zestimate = zestimate;
                    existing.v_o = v_o;
                }
                None => {
                    rows.insert(record.auction_id, record.clone());
                }
            }
            summary.upserted += 1;
        }

        Ok(summary)
    }

    async fn get_auction(&self, auction_id: i64) -> Result<Option<AuctionRecord>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.get(&auction_id).cloned())
    }

    async fn unvalued_since(&self, cutoff: NaiveDateTime) -> Result<Vec<AuctionRecord>> {
        let rows = self.rows.lock().unwrap();
        let mut records: Vec<AuctionRecord> = rows
            .values()
            .filter(|r| r.zestimate.is_none() && r.created_at >= cutoff)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.auction_id);
        Ok(records)
    }

    async fn set_valuation_if_null(
        &self,
        auction_id: i64,
        zestimate: Option<f64>,
        v_o: Option<f64>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(record) = rows.get_mut(&auction_id) {
            if record.zestimate.is_none() {
                record.zestimate = zestimate;
            }
            if record.v_o.is_none() {
                record.v_o = v_o;
            }
        }
        Ok(())
    }

    async fn query_auctions(&self, query: &AuctionQuery) -> Result<Vec<AuctionRecord>> {
        let rows = self.rows.lock().unwrap();
        let mut records: Vec<AuctionRecord> = rows
            .values()
            .filter(|r| r.crawl_date >= query.crawled_since)
            .filter(|r| {
                query
                    .search
                    .as_deref()
                    .map_or(true, |s| Self::matches_search(r, s))
            })
            .cloned()
            .collect();

        records.sort_by(|a, b| Self::compare(a, b, query.sort_field));
        if query.sort_order == SortOrder::Desc {
            records.reverse();
        }

        let offset = (query.page.saturating_sub(1) as usize) * query.page_size as usize;
        Ok(records
            .into_iter()
            .skip(offset)
            .take(query.page_size as usize)
            .collect())
    }

    async fn count_auctions(
        &self,
        search: Option<&str>,
        crawled_since: NaiveDateTime,
    ) -> Result<u64> {
        let rows = self.rows.lock().unwrap();
        let count = rows
            .values()
            .filter(|r| r.crawl_date >= crawled_since)
            .filter(|r| search.map_or(true, |s| Self::matches_search(r, s)))
            .count();
        Ok(count as u64)
    }
}
