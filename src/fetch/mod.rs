//! Page retrieval: a stateful headless-browser session for rendered listing
//! tables, and a stateless proxied HTTP client for everything else.

pub mod browser;
pub mod proxy;

pub use browser::BrowserSession;
pub use proxy::ProxyClient;
