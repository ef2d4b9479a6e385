//! Price fetchers for ASX-listed banks.
//!
//! Each client wraps one upstream HTTP API and implements
//! [`analysis_core::PriceProvider`]. Requests go through a shared retry loop
//! ([`retry::send_with_retry`]); quotes can be cached with [`QuoteCache`]
//! and several providers chained with [`FallbackProvider`].

pub mod alpha_vantage;
pub mod cache;
pub mod fallback;
pub mod ig_markets;
pub mod retry;
pub mod yahoo_finance;

pub use alpha_vantage::AlphaVantageClient;
pub use cache::{CachedProvider, QuoteCache};
pub use fallback::FallbackProvider;
pub use ig_markets::{IgCredentials, IgMarketsClient};
pub use retry::RetryPolicy;
pub use yahoo_finance::YahooFinanceClient;

use std::time::Duration;

pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the reqwest client every provider uses.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
