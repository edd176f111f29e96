//! Pure value normalizers.
//!
//! Every function here is total on malformed input: an unparsable value
//! maps to `None`, never to an error. Normalization never fabricates a
//! value.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static MONETARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([\d,]+\.?\d*)").unwrap());

/// City and state at the end of an address: "<street>, <City> <ST> <zip>".
static CITY_STATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^,]+),?\s+([A-Za-z\s]+)\s+([A-Z]{2})\s+\d{5}$").unwrap());

/// Extracts the first `$`-prefixed amount from `text` and parses it,
/// stripping thousands separators. `None` when no amount is present.
pub fn clean_monetary(text: &str) -> Option<f64> {
    let captures = MONETARY_RE.captures(text)?;
    let cleaned = captures.get(1)?.as_str().replace(',', "");
    cleaned.parse::<f64>().ok()
}

/// Parses the trailing `City, ST ZIP` portion of a free-text address.
/// The city is title-cased; `None` when the address does not end in a
/// two-letter state and five-digit zip.
pub fn extract_city_state(address: &str) -> Option<(String, String)> {
    let captures = CITY_STATE_RE.captures(address.trim())?;
    let city = title_case(captures.get(2)?.as_str().trim());
    let state = captures.get(3)?.as_str().to_string();
    Some((city, state))
}

/// Parses a date string using the source's known format. `None` on failure.
pub fn normalize_date(text: &str, source_format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), source_format).ok()
}

/// Enforces `bid_open_date <= bid_closing_date`. Sources do not guarantee
/// the ordering; a violating pair is dropped rather than swapped.
pub fn validate_date_order(
    open: Option<NaiveDateTime>,
    closing: Option<NaiveDateTime>,
) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    if let (Some(o), Some(c)) = (open, closing) {
        if o > c {
            warn!("Bid open date {} is after closing date {}, dropping both", o, c);
            return (None, None);
        }
    }
    (open, closing)
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
