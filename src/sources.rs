//! Static registry of listing sources.
//!
//! Each source declares where its listings live, how its columns map onto
//! canonical record fields, and which county/remark labels its records are
//! assigned. Sources are looked up by identifier, never by raw URL.

/// How a source's listings are retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A live, paginated listing table rendered in a browser session.
    /// Rows are enriched with debt/county from a per-item detail page.
    BrowserTable,
    /// A tabular export retrieved over plain HTTP, with a fixed number of
    /// header rows to skip.
    SpreadsheetExport,
}

#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub id: &'static str,
    pub base_url: &'static str,
    pub county: &'static str,
    pub remark: &'static str,
    pub kind: SourceKind,
    /// Source-native column header text to canonical field name.
    /// Unmapped source columns are dropped.
    pub columns: &'static [(&'static str, &'static str)],
    /// Date format used by this source's date columns.
    pub date_format: &'static str,
}

/// Column mapping shared by the rendered listing tables.
const LISTING_TABLE_COLUMNS: &[(&str, &str)] =
    &[("id", "id"), ("address", "address"), ("current bid", "bid")];

/// Column mapping shared by the sheriff-sale spreadsheet exports.
const SHERIFF_EXPORT_COLUMNS: &[(&str, &str)] = &[
    ("Auction ID", "id"),
    ("Minimum Bid", "bid"),
    ("Bidding Open Date/Time", "bid_open_date"),
    ("Bidding Closing Date/Time", "bid_closing_date"),
    ("Debt Amount", "debt"),
    ("Address", "address"),
];

/// Tax-sale exports close with a differently-labelled column and carry no
/// debt amount.
const TAX_EXPORT_COLUMNS: &[(&str, &str)] = &[
    ("Auction ID", "id"),
    ("Minimum Bid", "bid"),
    ("Bidding Open Date/Time", "bid_open_date"),
    ("Bidding Close Date/Time", "bid_closing_date"),
    ("Address", "address"),
];

const EXPORT_DATE_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// Header rows to skip at the top of every spreadsheet export.
pub const EXPORT_SKIP_ROWS: usize = 2;

pub const SOURCES: &[SourceSpec] = &[
    SourceSpec {
        id: "phila_foreclosures",
        base_url: "https://www.bid4assets.com/philaforeclosures",
        county: "Philadelphia",
        remark: "Phila foreclosure",
        kind: SourceKind::BrowserTable,
        columns: LISTING_TABLE_COLUMNS,
        date_format: EXPORT_DATE_FORMAT,
    },
    SourceSpec {
        id: "schuylkill",
        base_url: "https://www.bid4assets.com/SchuylkillSheriffSales",
        county: "Schuylkill",
        remark: "",
        kind: SourceKind::BrowserTable,
        columns: LISTING_TABLE_COLUMNS,
        date_format: EXPORT_DATE_FORMAT,
    },
    SourceSpec {
        id: "montco",
        base_url: "https://www.bid4assets.com/MontcoPASheriff",
        county: "Montgomery",
        remark: "",
        kind: SourceKind::BrowserTable,
        columns: LISTING_TABLE_COLUMNS,
        date_format: EXPORT_DATE_FORMAT,
    },
    SourceSpec {
        id: "chester",
        base_url: "https://www.bid4assets.com/chestercopasheriffsales",
        county: "Chester",
        remark: "",
        kind: SourceKind::SpreadsheetExport,
        columns: SHERIFF_EXPORT_COLUMNS,
        date_format: EXPORT_DATE_FORMAT,
    },
    SourceSpec {
        id: "berks",
        base_url: "https://www.bid4assets.com/berkscountysheriffsales",
        county: "Berks",
        remark: "",
        kind: SourceKind::SpreadsheetExport,
        columns: SHERIFF_EXPORT_COLUMNS,
        date_format: EXPORT_DATE_FORMAT,
    },
    SourceSpec {
        id: "phila_tax",
        base_url: "https://www.bid4assets.com/philataxsales",
        county: "Philadelphia",
        remark: "Phila tax",
        kind: SourceKind::SpreadsheetExport,
        columns: TAX_EXPORT_COLUMNS,
        date_format: EXPORT_DATE_FORMAT,
    },
];

pub fn find_source(id: &str) -> Option<&'static SourceSpec> {
    SOURCES.iter().find(|s| s.id == id)
}

impl SourceSpec {
    /// URL of the spreadsheet export for this source.
    pub fn export_url(&self) -> String {
        format!("{}/propertylistdownload", self.base_url)
    }

    /// Detail page for a single listing, used for per-row enrichment.
    pub fn detail_url(&self, auction_id: i64) -> String {
        format!("https://www.bid4assets.com/auction/index/{auction_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_source() {
        let source = find_source("chester").expect("chester should be registered");
        assert_eq!(source.county, "Chester");
        assert_eq!(source.kind, SourceKind::SpreadsheetExport);
        assert!(find_source("nonexistent").is_none());
    }

    #[test]
    fn test_listing_sources_share_required_columns() {
        for source in SOURCES {
            if source.kind == SourceKind::BrowserTable {
                let fields: Vec<&str> = source.columns.iter().map(|(_, f)| *f).collect();
                assert!(fields.contains(&"id"));
                assert!(fields.contains(&"address"));
                assert!(fields.contains(&"bid"));
            }
        }
    }
}
