use analysis_core::{AnalysisError, AsxSymbol, Bar, PriceProvider, PriceQuote};
use async_trait::async_trait;
use std::sync::Arc;

/// Tries providers in order; the first success wins.
pub struct FallbackProvider {
    providers: Vec<Arc<dyn PriceProvider>>,
}

impl FallbackProvider {
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    fn exhausted(failures: Vec<String>) -> AnalysisError {
        if failures.is_empty() {
            AnalysisError::ProvidersExhausted("no price providers configured".to_string())
        } else {
            AnalysisError::ProvidersExhausted(failures.join("; "))
        }
    }
}

#[async_trait]
impl PriceProvider for FallbackProvider {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn latest_quote(&self, symbol: &AsxSymbol) -> Result<PriceQuote, AnalysisError> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.latest_quote(symbol).await {
                Ok(quote) => return Ok(quote),
                Err(e) => {
                    tracing::warn!("{} quote for {} failed: {}", provider.name(), symbol, e);
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }
        Err(Self::exhausted(failures))
    }

    async fn daily_bars(&self, symbol: &AsxSymbol, days: u32) -> Result<Vec<Bar>, AnalysisError> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.daily_bars(symbol, days).await {
                Ok(bars) if !bars.is_empty() => return Ok(bars),
                Ok(_) => failures.push(format!("{}: no bars", provider.name())),
                Err(e) => {
                    tracing::warn!("{} bars for {} failed: {}", provider.name(), symbol, e);
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }
        Err(Self::exhausted(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Failing;
    struct Fixed(f64);

    #[async_trait]
    impl PriceProvider for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn latest_quote(&self, _: &AsxSymbol) -> Result<PriceQuote, AnalysisError> {
            Err(AnalysisError::ApiError("boom".into()))
        }
        async fn daily_bars(&self, _: &AsxSymbol, _: u32) -> Result<Vec<Bar>, AnalysisError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl PriceProvider for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn latest_quote(&self, symbol: &AsxSymbol) -> Result<PriceQuote, AnalysisError> {
            Ok(PriceQuote {
                symbol: symbol.clone(),
                price: self.0,
                volume: None,
                timestamp: Utc::now(),
                source: "fixed".into(),
            })
        }
        async fn daily_bars(&self, _: &AsxSymbol, _: u32) -> Result<Vec<Bar>, AnalysisError> {
            Ok(vec![Bar {
                timestamp: Utc::now(),
                open: self.0,
                high: self.0,
                low: self.0,
                close: self.0,
                volume: 1.0,
            }])
        }
    }

    #[tokio::test]
    async fn test_falls_through_to_working_provider() {
        let chain = FallbackProvider::new(vec![Arc::new(Failing), Arc::new(Fixed(42.0))]);
        let symbol = AsxSymbol::parse("NAB").unwrap();

        assert_eq!(chain.latest_quote(&symbol).await.unwrap().price, 42.0);
        assert_eq!(chain.daily_bars(&symbol, 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_failures_reported() {
        let chain = FallbackProvider::new(vec![Arc::new(Failing), Arc::new(Failing)]);
        let symbol = AsxSymbol::parse("NAB").unwrap();

        match chain.latest_quote(&symbol).await {
            Err(AnalysisError::ProvidersExhausted(msg)) => assert_eq!(msg.matches("boom").count(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
