//! Field extraction: resolving source columns to canonical fields and
//! flattening table/spreadsheet rows into [`RawRecord`]s.

use crate::error::{Result, ScraperError};
use crate::types::RawRecord;

/// Cell positions resolved for one page load, mapping each position to its
/// canonical field name.
#[derive(Debug, Clone)]
pub struct ColumnPositions {
    positions: Vec<(usize, String)>,
}

/// Resolves every mapped column against the observed header texts,
/// case-insensitively. Every mapped column is required; a missing header is
/// a schema error.
pub fn resolve_columns(
    headers: &[String],
    mapping: &[(&str, &str)],
) -> Result<ColumnPositions> {
    let mut positions = Vec::with_capacity(mapping.len());
    for (source_column, field) in mapping {
        let position = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(source_column))
            .ok_or_else(|| {
                ScraperError::Schema(format!(
                    "column header '{source_column}' not found in table headers"
                ))
            })?;
        positions.push((position, field.to_string()));
    }
    Ok(ColumnPositions { positions })
}

/// Extracts one row's mapped cells into a [`RawRecord`]. Cells outside the
/// mapping are dropped; a short row simply omits the missing fields.
pub fn extract_row(cells: &[String], columns: &ColumnPositions) -> RawRecord {
    let mut record = RawRecord::new();
    for (position, field) in &columns.positions {
        if let Some(cell) = cells.get(*position) {
            record.push(field.clone(), cell.trim());
        }
    }
    record
}

/// Applies the column mapping to a CSV export. The first `skip_rows`
/// records are preamble; the next record is the header row.
pub fn extract_spreadsheet(
    data: &str,
    mapping: &[(&str, &str)],
    skip_rows: usize,
) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data.as_bytes());

    let mut records = reader.records();
    for _ in 0..skip_rows {
        match records.next() {
            Some(row) => {
                row?;
            }
            None => {
                return Err(ScraperError::Schema(
                    "spreadsheet ended before the header row".to_string(),
                ))
            }
        }
    }

    let header_row = records
        .next()
        .ok_or_else(|| ScraperError::Schema("spreadsheet has no header row".to_string()))??;
    let headers: Vec<String> = header_row.iter().map(|h| h.to_string()).collect();
    let columns = resolve_columns(&headers, mapping)?;

    let mut out = Vec::new();
    for row in records {
        let row = row?;
        let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        let record = extract_row(&cells, &columns);
        if !record.is_empty() {
            out.push(record);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_resolve_columns_case_insensitive() {
        let mapping = &[("id", "id"), ("address", "address"), ("current bid", "bid")];
        let observed = headers(&["ID", "Sale Date", "Address", "Current Bid"]);
        let columns = resolve_columns(&observed, mapping).unwrap();

        let cells = headers(&["1042", "06/15/2024", "123 Main St", "$45,000.00"]);
        let record = extract_row(&cells, &columns);
        assert_eq!(record.get("id"), Some("1042"));
        assert_eq!(record.get("address"), Some("123 Main St"));
        assert_eq!(record.get("bid"), Some("$45,000.00"));
        // Unmapped column is dropped
        assert_eq!(record.get("Sale Date"), None);
    }

    #[test]
    fn test_resolve_columns_missing_header() {
        let mapping = &[("id", "id"), ("address", "address"), ("current bid", "bid")];
        let observed = headers(&["ID", "Address"]);
        let err = resolve_columns(&observed, mapping).unwrap_err();
        assert!(matches!(err, ScraperError::Schema(_)));
    }

    #[test]
    fn test_extract_spreadsheet() {
        let mapping = &[
            ("Auction ID", "id"),
            ("Minimum Bid", "bid"),
            ("Address", "address"),
        ];
        let data = "\
Sheriff Sale Export,,\n\
Generated 06/15/2024,,\n\
Auction ID,Minimum Bid,Address\n\
1042,\"$45,000.00\",\"123 Main St, Springfield PA 19019\"\n\
1043,$900,\"456 Oak Ave, Chester PA 19013\"\n";

        let records = extract_spreadsheet(data, mapping, 2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("id"), Some("1042"));
        assert_eq!(records[0].get("bid"), Some("$45,000.00"));
        assert_eq!(records[1].get("address"), Some("456 Oak Ave, Chester PA 19013"));
    }

    #[test]
    fn test_extract_spreadsheet_missing_header_row() {
        let err = extract_spreadsheet("only,one,row\n", &[("Auction ID", "id")], 2).unwrap_err();
        assert!(matches!(err, ScraperError::Schema(_)));
    }
}
