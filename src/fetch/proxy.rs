use crate::config::FetchConfig;
use crate::error::{Result, ScraperError};
use std::env;
use std::time::Duration;
use tracing::debug;

/// Stateless HTTP fetcher that routes requests through a proxying service.
///
/// The proxy API key comes from the `SCRAPEOPS_API_KEY` environment
/// variable (loaded via dotenv in the binaries).
pub struct ProxyClient {
    client: reqwest::Client,
    proxy_url: String,
    api_key: String,
}

impl ProxyClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let api_key = env::var("SCRAPEOPS_API_KEY")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            proxy_url: config.proxy_url.clone(),
            api_key,
        })
    }

    /// Fetches `url` through the proxy and returns the body text.
    /// A non-200 response is a fetch failure, not a result.
    pub async fn get(&self, url: &str) -> Result<String> {
        self.request(url, false).await
    }

    /// Same as [`get`](Self::get), with JavaScript rendering enabled on the
    /// proxy side.
    pub async fn get_rendered(&self, url: &str) -> Result<String> {
        self.request(url, true).await
    }

    async fn request(&self, url: &str, render_js: bool) -> Result<String> {
        debug!("Proxied fetch of {}", url);
        let response = self
            .client
            .get(&self.proxy_url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("url", url),
                ("country", "us"),
                ("render_js", if render_js { "true" } else { "false" }),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::Fetch(format!(
                "{url} returned status {status}"
            )));
        }

        Ok(response.text().await?)
    }
}
