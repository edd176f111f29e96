use crate::config::FetchConfig;
use crate::error::Result;
use crate::fetch::BrowserSession;
use async_trait::async_trait;
use std::time::Duration;

/// Seam between the pagination controller and a concrete paged listing
/// view, so the controller can be driven by a browser session or a test
/// double.
#[async_trait]
pub trait ListingPager: Send {
    /// Header texts of the listing table, resolved once per page load.
    async fn headers(&mut self) -> Result<Vec<String>>;

    /// The currently visible rows, each as its cells' text.
    async fn rows(&mut self) -> Result<Vec<Vec<String>>>;

    /// Advances to the next page. `false` when the last page has been
    /// reached.
    async fn next_page(&mut self) -> Result<bool>;
}

const HEADER_ROW_SELECTOR: &str = "thead.k-table-thead tr";
const BODY_ROWS_SELECTOR: &str = "tbody.k-table-tbody tr";
const NEXT_BUTTON_SELECTOR: &str = "button[title=\"Go to the next page\"]";

/// Pager over a browser-rendered listing table.
pub struct BrowserPager {
    session: BrowserSession,
    settle: Duration,
}

impl BrowserPager {
    /// Opens a browser session and navigates to the listing page.
    pub fn open(config: &FetchConfig, url: &str) -> Result<Self> {
        let session = BrowserSession::open(config)?;
        session.navigate(url)?;
        Ok(Self {
            session,
            settle: Duration::from_millis(config.settle_ms),
        })
    }
}

#[async_trait]
impl ListingPager for BrowserPager {
    async fn headers(&mut self) -> Result<Vec<String>> {
        self.session.wait_for(HEADER_ROW_SELECTOR)?;
        // Give the grid a moment to finish rendering after the header
        // appears.
        tokio::time::sleep(self.settle).await;
        self.session.cell_texts(HEADER_ROW_SELECTOR, "th")
    }

    async fn rows(&mut self) -> Result<Vec<Vec<String>>> {
        self.session.visible_rows(BODY_ROWS_SELECTOR)
    }

    async fn next_page(&mut self) -> Result<bool> {
        if !self.session.click_next(NEXT_BUTTON_SELECTOR)? {
            return Ok(false);
        }
        tokio::time::sleep(self.settle).await;
        Ok(true)
    }
}
