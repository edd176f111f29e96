use crate::config::FetchConfig;
use crate::error::{Result, ScraperError};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A headless browser session scoped to one source pass.
///
/// The browser process is released when the session is dropped, on every
/// exit path.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
    element_timeout: Duration,
}

impl BrowserSession {
    pub fn open(config: &FetchConfig) -> Result<Self> {
        let browser = Browser::new(LaunchOptions {
            headless: true,
            window_size: Some((1920, 1080)),
            ..Default::default()
        })
        .map_err(|e| ScraperError::Fetch(format!("failed to launch browser: {e}")))?;

        let tab = browser
            .new_tab()
            .map_err(|e| ScraperError::Fetch(format!("failed to open tab: {e}")))?;

        Ok(Self {
            _browser: browser,
            tab,
            element_timeout: Duration::from_secs(config.element_timeout_seconds),
        })
    }

    pub fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.tab
            .navigate_to(url)
            .map_err(|e| ScraperError::Fetch(format!("navigation to {url} failed: {e}")))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| ScraperError::Fetch(format!("navigation to {url} timed out: {e}")))?;
        Ok(())
    }

    /// Waits up to the configured element timeout for `selector` to appear.
    pub fn wait_for(&self, selector: &str) -> Result<()> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, self.element_timeout)
            .map_err(|e| {
                ScraperError::Fetch(format!("expected element '{selector}' not found: {e}"))
            })?;
        Ok(())
    }

    /// Returns the text of each cell in the first element matching
    /// `row_selector`, in document order.
    pub fn cell_texts(&self, row_selector: &str, cell_selector: &str) -> Result<Vec<String>> {
        let row = self.tab.find_element(row_selector).map_err(|e| {
            ScraperError::Fetch(format!("row '{row_selector}' not found: {e}"))
        })?;
        let cells = row.find_elements(cell_selector).map_err(|e| {
            ScraperError::Fetch(format!("cells '{cell_selector}' not found: {e}"))
        })?;

        let mut texts = Vec::with_capacity(cells.len());
        for cell in cells {
            let text = cell
                .get_inner_text()
                .map_err(|e| ScraperError::Fetch(format!("failed to read cell text: {e}")))?;
            texts.push(text.trim().to_string());
        }
        Ok(texts)
    }

    /// Returns the currently visible rows matching `rows_selector`, each as
    /// its cells' text in document order.
    pub fn visible_rows(&self, rows_selector: &str) -> Result<Vec<Vec<String>>> {
        let rows = self.tab.find_elements(rows_selector).map_err(|e| {
            ScraperError::Fetch(format!("rows '{rows_selector}' not found: {e}"))
        })?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let cells = row
                .find_elements("td")
                .map_err(|e| ScraperError::Fetch(format!("failed to read row cells: {e}")))?;
            let mut texts = Vec::with_capacity(cells.len());
            for cell in cells {
                let text = cell
                    .get_inner_text()
                    .map_err(|e| ScraperError::Fetch(format!("failed to read cell text: {e}")))?;
                texts.push(text.trim().to_string());
            }
            out.push(texts);
        }
        Ok(out)
    }

    /// Activates the pagination control matching `selector`.
    ///
    /// Returns `Ok(false)` when the control is absent, disabled, or the
    /// click fails, which callers treat as "last page reached".
    pub fn click_next(&self, selector: &str) -> Result<bool> {
        // Bring the control into view first; off-screen buttons swallow clicks.
        let _ = self
            .tab
            .evaluate("window.scrollTo(0, document.body.scrollHeight);", false);

        let button = match self.tab.find_element(selector) {
            Ok(el) => el,
            Err(_) => {
                debug!("Next-page control '{}' not found", selector);
                return Ok(false);
            }
        };

        match button.get_attribute_value("aria-disabled") {
            Ok(Some(value)) if value == "true" => {
                debug!("Reached the last page of the table");
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to inspect next-page control: {}", e);
                return Ok(false);
            }
        }

        if let Err(e) = button.click() {
            warn!("Next-page click failed: {}", e);
            return Ok(false);
        }
        Ok(true)
    }
}
