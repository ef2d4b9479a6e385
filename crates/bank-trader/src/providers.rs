use analysis_core::{AnalysisError, AsxSymbol, Bar, PriceProvider};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use market_data::{
    AlphaVantageClient, CachedProvider, FallbackProvider, IgCredentials, IgMarketsClient, QuoteCache, RetryPolicy,
    YahooFinanceClient,
};
use prediction_store::PriceLookup;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;

const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
/// Extra days fetched before the requested date to cover weekends and holidays
const LOOKBACK_SLACK_DAYS: i64 = 7;
const MAX_LOOKBACK_DAYS: i64 = 730;

/// Providers in `PRICE_PROVIDERS` order, each behind the shared quote cache.
pub fn build_price_provider(config: &AppConfig) -> Result<Arc<dyn PriceProvider>> {
    let retry = RetryPolicy::new(config.http_max_retries, RETRY_BASE_DELAY);
    let cache = Arc::new(QuoteCache::new(config.quote_cache_ttl_secs));
    let mut providers: Vec<Arc<dyn PriceProvider>> = Vec::new();

    for name in &config.price_providers {
        let provider: Arc<dyn PriceProvider> = match name.as_str() {
            "yahoo" => Arc::new(YahooFinanceClient::new().with_retry(retry)),
            "alpha_vantage" => match &config.alpha_vantage_api_key {
                Some(key) => Arc::new(AlphaVantageClient::new(key.clone()).with_retry(retry)),
                None => {
                    tracing::warn!("ALPHA_VANTAGE_API_KEY not set, skipping Alpha Vantage");
                    continue;
                }
            },
            "ig" => match &config.ig {
                Some(ig) => {
                    let credentials = IgCredentials {
                        api_key: ig.api_key.clone(),
                        username: ig.username.clone(),
                        password: ig.password.clone(),
                    };
                    let client = ig
                        .epics
                        .iter()
                        .fold(IgMarketsClient::new(ig.base_url.clone(), credentials), |client, (code, epic)| {
                            client.with_epic(code, epic)
                        });
                    Arc::new(client.with_retry(retry))
                }
                None => {
                    tracing::warn!("IG credentials not set, skipping IG Markets");
                    continue;
                }
            },
            other => bail!("Unknown price provider '{}'", other),
        };
        providers.push(Arc::new(CachedProvider::new(provider, cache.clone())));
    }

    if providers.is_empty() {
        bail!("No usable price provider; check PRICE_PROVIDERS and API credentials");
    }

    let fallback = FallbackProvider::new(providers);
    tracing::info!("Price providers: {:?}", fallback.provider_names());
    Ok(Arc::new(fallback))
}

/// Historical closes from a [`PriceProvider`], with bars cached per symbol.
pub struct ProviderPriceLookup {
    provider: Arc<dyn PriceProvider>,
    bars: DashMap<String, Arc<Vec<Bar>>>,
}

impl ProviderPriceLookup {
    pub fn new(provider: Arc<dyn PriceProvider>) -> Self {
        Self {
            provider,
            bars: DashMap::new(),
        }
    }

    async fn bars_covering(&self, symbol: &AsxSymbol, at: DateTime<Utc>) -> Result<Arc<Vec<Bar>>, AnalysisError> {
        if let Some(cached) = self.bars.get(symbol.as_str()) {
            if cached.first().is_some_and(|b| b.timestamp.date_naive() <= at.date_naive()) {
                return Ok(cached.clone());
            }
        }

        let days = ((Utc::now() - at).num_days() + LOOKBACK_SLACK_DAYS).clamp(LOOKBACK_SLACK_DAYS, MAX_LOOKBACK_DAYS);
        let bars = Arc::new(self.provider.daily_bars(symbol, days as u32).await?);
        self.bars.insert(symbol.as_str().to_string(), bars.clone());
        Ok(bars)
    }
}

#[async_trait]
impl PriceLookup for ProviderPriceLookup {
    /// Close of the last daily bar on or before `at`.
    async fn close_on(&self, symbol: &str, at: DateTime<Utc>) -> Result<Option<f64>, AnalysisError> {
        let symbol = AsxSymbol::parse(symbol)?;
        let bars = self.bars_covering(&symbol, at).await?;
        Ok(bars
            .iter()
            .rev()
            .find(|b| b.timestamp.date_naive() <= at.date_naive())
            .map(|b| b.close))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::AppConfig;
    use analysis_core::PriceQuote;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Daily bars ending today with close = 100 + day index, plus a fixed quote.
    pub struct FakeProvider {
        pub days: usize,
        pub volume: f64,
        pub calls: AtomicUsize,
    }

    impl FakeProvider {
        pub fn new(days: usize) -> Self {
            Self {
                days,
                volume: 1_000_000.0,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PriceProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn latest_quote(&self, symbol: &AsxSymbol) -> Result<PriceQuote, AnalysisError> {
            Ok(PriceQuote {
                symbol: symbol.clone(),
                price: 100.0 + self.days as f64,
                volume: Some(self.volume * 1.6),
                timestamp: Utc::now(),
                source: "fake".to_string(),
            })
        }

        async fn daily_bars(&self, _symbol: &AsxSymbol, days: u32) -> Result<Vec<Bar>, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let today = Utc::now().date_naive().and_hms_opt(0, 0, 0).map(|d| d.and_utc()).unwrap_or_else(Utc::now);
            let n = self.days.min(days as usize);
            Ok((0..n)
                .map(|i| {
                    let close = 100.0 + (self.days - n + i + 1) as f64;
                    Bar {
                        timestamp: today - ChronoDuration::days((n - 1 - i) as i64),
                        open: close - 0.5,
                        high: close + 1.0,
                        low: close - 1.0,
                        close,
                        volume: self.volume,
                    }
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_close_on_picks_bar_on_or_before() {
        let provider = Arc::new(FakeProvider::new(30));
        let lookup = ProviderPriceLookup::new(provider.clone());

        // Today's bar closes at 130, yesterday's at 129
        let yesterday = Utc::now() - ChronoDuration::days(1);
        assert_eq!(lookup.close_on("CBA", yesterday).await.unwrap(), Some(129.0));
        assert_eq!(lookup.close_on("CBA.AX", Utc::now()).await.unwrap(), Some(130.0));
        // Second call served from the per-symbol cache
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let long_ago = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(lookup.close_on("CBA", long_ago).await.unwrap(), None);
        assert!(lookup.close_on("??", Utc::now()).await.is_err());
    }

    #[test]
    fn test_missing_credentials_skip_providers() {
        let vars: HashMap<&str, &str> = [("PRICE_PROVIDERS", "alpha_vantage,ig")].into_iter().collect();
        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert!(build_price_provider(&config).is_err());

        let vars: HashMap<&str, &str> = [("PRICE_PROVIDERS", "ig,yahoo")].into_iter().collect();
        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert!(build_price_provider(&config).is_ok());
    }
}
