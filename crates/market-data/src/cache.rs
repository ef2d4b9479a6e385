use analysis_core::{AnalysisError, AsxSymbol, Bar, PriceProvider, PriceQuote};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Internal cache entry with timestamp
struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

/// TTL cache for quotes, keyed by provider and symbol.
pub struct QuoteCache {
    entries: DashMap<String, CacheEntry<PriceQuote>>,
    ttl: Duration,
}

impl QuoteCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs.max(0)),
        }
    }

    fn key(provider: &str, symbol: &AsxSymbol) -> String {
        format!("{}:{}", provider, symbol)
    }

    pub fn get(&self, provider: &str, symbol: &AsxSymbol) -> Option<PriceQuote> {
        self.get_at(provider, symbol, Utc::now())
    }

    fn get_at(&self, provider: &str, symbol: &AsxSymbol, now: DateTime<Utc>) -> Option<PriceQuote> {
        let key = Self::key(provider, symbol);
        let fresh = self
            .entries
            .get(&key)
            .filter(|entry| now - entry.cached_at < self.ttl)
            .map(|entry| entry.data.clone());

        if fresh.is_none() {
            self.entries.remove(&key);
        }
        fresh
    }

    pub fn insert(&self, provider: &str, quote: PriceQuote) {
        self.insert_at(provider, quote, Utc::now());
    }

    fn insert_at(&self, provider: &str, quote: PriceQuote, cached_at: DateTime<Utc>) {
        self.entries.insert(
            Self::key(provider, &quote.symbol),
            CacheEntry {
                data: quote,
                cached_at,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Wraps a provider so repeated quote lookups within the TTL skip the network.
pub struct CachedProvider {
    inner: Arc<dyn PriceProvider>,
    cache: Arc<QuoteCache>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn PriceProvider>, cache: Arc<QuoteCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl PriceProvider for CachedProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn latest_quote(&self, symbol: &AsxSymbol) -> Result<PriceQuote, AnalysisError> {
        if let Some(quote) = self.cache.get(self.inner.name(), symbol) {
            tracing::debug!("{} quote for {} served from cache", self.inner.name(), symbol);
            return Ok(quote);
        }

        let quote = self.inner.latest_quote(symbol).await?;
        self.cache.insert(self.inner.name(), quote.clone());
        Ok(quote)
    }

    async fn daily_bars(&self, symbol: &AsxSymbol, days: u32) -> Result<Vec<Bar>, AnalysisError> {
        self.inner.daily_bars(symbol, days).await
    }
}
