//! Out-of-band valuation enrichment.
//!
//! Looks up an automated valuation estimate for recently created records
//! that have none yet, and computes the value-over-debt ratio. Valuation
//! fields are written only while currently null.

use crate::error::{Result, ScraperError};
use crate::fetch::ProxyClient;
use crate::normalize::clean_monetary;
use crate::retry::{with_retry, RetryPolicy};
use crate::storage::Storage;
use chrono::{Duration as ChronoDuration, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// How far around an estimate marker to look for a price amount.
const MARKER_WINDOW: usize = 400;

static PRICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\d[\d,]*").unwrap());

#[derive(Debug, Default, Serialize)]
pub struct EnrichOutcome {
    pub examined: usize,
    pub updated: usize,
    pub skipped: usize,
}

pub struct ValuationJob {
    storage: Arc<dyn Storage>,
    proxy: ProxyClient,
    retry: RetryPolicy,
}

impl ValuationJob {
    pub fn new(storage: Arc<dyn Storage>, proxy: ProxyClient, retry: RetryPolicy) -> Self {
        Self {
            storage,
            proxy,
            retry,
        }
    }

    /// Enriches every record created in the last 24 hours that has no
    /// valuation yet. A failed lookup skips that record; the job carries on.
    pub async fn run(&self) -> Result<EnrichOutcome> {
        let cutoff = Local::now().naive_local() - ChronoDuration::days(1);
        let records = self.storage.unvalued_since(cutoff).await?;
        info!("Found {} records awaiting valuation", records.len());

        let mut outcome = EnrichOutcome::default();
        for record in records {
            outcome.examined += 1;

            let lookup = with_retry(self.retry, "get_valuation", || {
                self.get_valuation(&record.address)
            })
            .await;

            let zestimate = match lookup {
                Ok(value) => value,
                Err(exhausted) => {
                    warn!(
                        "No valuation for auction {}: {}",
                        record.auction_id, exhausted
                    );
                    outcome.skipped += 1;
                    continue;
                }
            };

            let v_o = match (zestimate, record.debt) {
                (Some(z), Some(d)) if d != 0.0 => Some(z / d),
                _ => None,
            };

            if let Err(e) = self
                .storage
                .set_valuation_if_null(record.auction_id, zestimate, v_o)
                .await
            {
                warn!("Error updating auction {}: {}", record.auction_id, e);
                outcome.skipped += 1;
                continue;
            }
            outcome.updated += 1;
        }

        info!(
            "Valuation pass complete: {} examined, {} updated, {} skipped",
            outcome.examined, outcome.updated, outcome.skipped
        );
        Ok(outcome)
    }

    /// Fetches the valuation page for an address and extracts the estimate.
    /// `Ok(None)` means the page resolved to a rental estimate; an absent
    /// estimate is an error so the retry policy gets another attempt.
    async fn get_valuation(&self, address: &str) -> Result<Option<f64>> {
        let slug = address.replace(' ', "-").replace('/', "-");
        let url = format!("https://www.zillow.com/homes/{slug}_rb");
        info!("Fetching valuation for {}", address);

        let body = self.proxy.get(&url).await?;
        extract_estimate(&body)
    }
}

/// Pulls the estimate amount out of a valuation page.
///
/// Prefers the dedicated price element; falls back to the first `$` amount
/// near an estimate marker ("Zestimate" or "Est. ").
pub fn extract_estimate(html: &str) -> Result<Option<f64>> {
    let document = Html::parse_document(html);
    let price_selector = Selector::parse("span[data-testid=\"price\"]").unwrap();
    if let Some(element) = document.select(&price_selector).next() {
        let text = element.text().collect::<String>();
        if let Some(price) = clean_monetary(&text) {
            return Ok(Some(price));
        }
    }

    let mut saw_marker = false;
    for marker in ["Zestimate", "Est. "] {
        for (index, _) in html.match_indices(marker) {
            saw_marker = true;
            let start = floor_boundary(html, index.saturating_sub(100));
            let end = ceil_boundary(html, index + MARKER_WINDOW);
            let window = &html[start..end];
            if window.to_lowercase().contains("rent") {
                // Rental estimate, not a sale valuation.
                return Ok(None);
            }
            if let Some(m) = PRICE_RE.find(window) {
                return Ok(clean_monetary(m.as_str()));
            }
        }
    }

    if saw_marker {
        Err(ScraperError::Fetch(
            "estimate marker present but no amount found".to_string(),
        ))
    } else {
        Err(ScraperError::Fetch(
            "no estimate found in page".to_string(),
        ))
    }
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_estimate_from_price_element() {
        let html = r#"<html><body>
            <span data-testid="price">$250,000</span>
        </body></html>"#;
        assert_eq!(extract_estimate(html).unwrap(), Some(250_000.0));
    }

    #[test]
    fn test_extract_estimate_from_marker_window() {
        let html = r#"<html><body>
            <div><h5>Zestimate</h5><span class="value">$198,400</span></div>
        </body></html>"#;
        assert_eq!(extract_estimate(html).unwrap(), Some(198_400.0));
    }

    #[test]
    fn test_extract_estimate_rejects_rentals() {
        let html = r#"<html><body>
            <div>Rent Zestimate <span>$1,850/mo</span></div>
        </body></html>"#;
        assert_eq!(extract_estimate(html).unwrap(), None);
    }

    #[test]
    fn test_extract_estimate_missing_is_error() {
        assert!(extract_estimate("<html><body>nothing</body></html>").is_err());
    }
}
