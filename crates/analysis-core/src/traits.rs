use async_trait::async_trait;
use crate::{AnalysisError, AsxSymbol, Bar, NewsArticle, PriceQuote, SentimentReading};

/// A source of ASX prices (Alpha Vantage, Yahoo Finance, IG Markets, ...).
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Short provider name used in logs and cache keys.
    fn name(&self) -> &'static str;

    async fn latest_quote(&self, symbol: &AsxSymbol) -> Result<PriceQuote, AnalysisError>;

    /// Daily bars, oldest first.
    async fn daily_bars(&self, symbol: &AsxSymbol, days: u32) -> Result<Vec<Bar>, AnalysisError>;
}

/// Trait for sentiment analysis engines
#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(&self, symbol: &AsxSymbol, news: &[NewsArticle]) -> Result<SentimentReading, AnalysisError>;
}
