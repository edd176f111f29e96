use crate::error::{Result, ScraperError};
use crate::fetch::ProxyClient;
use crate::sources::SourceSpec;
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

/// Values pulled from a per-item detail page, still raw.
#[derive(Debug, Clone, Default)]
pub struct DetailValues {
    pub debt: Option<String>,
    pub county: Option<String>,
}

/// Per-row enrichment seam: fetch debt/county for one listing.
#[async_trait]
pub trait DetailEnricher: Send + Sync {
    async fn fetch_other_values(&self, auction_id: i64) -> Result<DetailValues>;
}

/// Enricher backed by the proxied HTTP client, reading the listing's
/// item-specifics table.
pub struct ProxyDetailEnricher<'a> {
    proxy: ProxyClient,
    source: &'a SourceSpec,
}

impl<'a> ProxyDetailEnricher<'a> {
    pub fn new(proxy: ProxyClient, source: &'a SourceSpec) -> Self {
        Self { proxy, source }
    }
}

#[async_trait]
impl DetailEnricher for ProxyDetailEnricher<'_> {
    async fn fetch_other_values(&self, auction_id: i64) -> Result<DetailValues> {
        let url = self.source.detail_url(auction_id);
        debug!("Fetching detail values from {}", url);
        let body = self.proxy.get(&url).await?;
        parse_item_specifics(&body)
    }
}

/// Reads the key/value rows of the item-specifics table on a detail page.
pub fn parse_item_specifics(html: &str) -> Result<DetailValues> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("div.item-specifics-table table.pull-right tr").unwrap();
    let cell_selector = Selector::parse("td").unwrap();

    let mut found_table = false;
    let mut values = DetailValues::default();
    for row in document.select(&row_selector) {
        found_table = true;
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect();
        if cells.len() > 1 {
            match cells[0].to_lowercase().as_str() {
                "debt amount" => values.debt = Some(cells[1].clone()),
                "county" => values.county = Some(cells[1].clone()),
                _ => {}
            }
        }
    }

    if !found_table {
        return Err(ScraperError::Fetch(
            "item-specifics table not found on detail page".to_string(),
        ));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_PAGE: &str = r#"
        <html><body>
        <div class="item-specifics-table">
          <table class="pull-left"><tr><td>Sale Type</td><td>Sheriff</td></tr></table>
          <table class="pull-right">
            <tr><td>Debt Amount</td><td>$12,345.67</td></tr>
            <tr><td>County</td><td>Montgomery</td></tr>
            <tr><td>Parcel</td><td>42-00-1234</td></tr>
          </table>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_item_specifics() {
        let values = parse_item_specifics(DETAIL_PAGE).unwrap();
        assert_eq!(values.debt.as_deref(), Some("$12,345.67"));
        assert_eq!(values.county.as_deref(), Some("Montgomery"));
    }

    #[test]
    fn test_parse_item_specifics_missing_table() {
        let err = parse_item_specifics("<html><body>nothing here</body></html>").unwrap_err();
        assert!(matches!(err, ScraperError::Fetch(_)));
    }
}
