use analysis_core::{AnalysisError, AsxSymbol, Bar, PriceProvider, PriceQuote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::retry::{ensure_success, send_with_retry, RetryPolicy};

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const PROVIDER: &str = "yahoo";

#[derive(Clone)]
pub struct YahooFinanceClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

/// Parsed `v8/finance/chart` payload.
#[derive(Debug, Clone)]
pub struct ChartData {
    pub regular_market_price: Option<f64>,
    pub regular_market_time: Option<DateTime<Utc>>,
    pub regular_market_volume: Option<f64>,
    pub bars: Vec<Bar>,
}

impl YahooFinanceClient {
    pub fn new() -> Self {
        Self {
            client: crate::http_client(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the chart endpoint for `range` (e.g. "5d", "3mo") at `interval` ("1d", "1h").
    pub async fn get_chart(&self, symbol: &AsxSymbol, range: &str, interval: &str) -> Result<ChartData, AnalysisError> {
        let url = format!("{}/{}", CHART_URL, symbol.as_str());

        let response = send_with_retry(
            &self.client,
            self.client.get(&url).query(&[("range", range), ("interval", interval)]),
            &self.retry,
            PROVIDER,
        )
        .await?;
        let response = ensure_success(response, PROVIDER).await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        parse_chart(&json)
    }

    /// Get quote data for a symbol
    pub async fn get_quote(&self, symbol: &AsxSymbol) -> Result<PriceQuote, AnalysisError> {
        let chart = self.get_chart(symbol, "5d", "1d").await?;

        let price = chart
            .regular_market_price
            .or_else(|| chart.bars.last().map(|b| b.close))
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| AnalysisError::InsufficientData(format!("No Yahoo price for {}", symbol)))?;

        Ok(PriceQuote {
            symbol: symbol.clone(),
            price,
            volume: chart
                .regular_market_volume
                .or_else(|| chart.bars.last().map(|b| b.volume)),
            timestamp: chart.regular_market_time.unwrap_or_else(Utc::now),
            source: PROVIDER.to_string(),
        })
    }

    /// Get historical daily bars, oldest first
    pub async fn get_historical_data(&self, symbol: &AsxSymbol, days: u32) -> Result<Vec<Bar>, AnalysisError> {
        let range = match days {
            0..=5 => "5d",
            6..=30 => "1mo",
            31..=90 => "3mo",
            91..=180 => "6mo",
            181..=365 => "1y",
            _ => "2y",
        };

        let mut bars = self.get_chart(symbol, range, "1d").await?.bars;
        if bars.len() > days as usize {
            bars.drain(..bars.len() - days as usize);
        }
        Ok(bars)
    }
}

impl Default for YahooFinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn parse_chart(json: &serde_json::Value) -> Result<ChartData, AnalysisError> {
    if let Some(error) = json.get("chart").and_then(|c| c.get("error")).filter(|e| !e.is_null()) {
        return Err(AnalysisError::ApiError(format!("Yahoo chart error: {}", error)));
    }

    let chart = json
        .get("chart")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| AnalysisError::InsufficientData("No chart data found".to_string()))?;

    let meta = chart.get("meta");
    let regular_market_price = meta
        .and_then(|m| m.get("regularMarketPrice"))
        .and_then(|v| v.as_f64());
    let regular_market_time = meta
        .and_then(|m| m.get("regularMarketTime"))
        .and_then(|v| v.as_i64())
        .and_then(|ts| DateTime::from_timestamp(ts, 0));
    let regular_market_volume = meta
        .and_then(|m| m.get("regularMarketVolume"))
        .and_then(|v| v.as_f64());

    let empty = Vec::new();
    let timestamps = chart
        .get("timestamp")
        .and_then(|v| v.as_array())
        .unwrap_or(&empty);

    let quotes = chart
        .get("indicators")
        .and_then(|v| v.get("quote"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first());

    let series = |name: &str| -> Vec<serde_json::Value> {
        quotes
            .and_then(|q| q.get(name))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
    };
    let opens = series("open");
    let highs = series("high");
    let lows = series("low");
    let closes = series("close");
    let volumes = series("volume");

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        // Yahoo pads halted sessions with nulls
        if let (Some(ts), Some(o), Some(h), Some(l), Some(c)) = (
            ts.as_i64(),
            opens.get(i).and_then(|v| v.as_f64()),
            highs.get(i).and_then(|v| v.as_f64()),
            lows.get(i).and_then(|v| v.as_f64()),
            closes.get(i).and_then(|v| v.as_f64()),
        ) {
            let Some(timestamp) = DateTime::from_timestamp(ts, 0) else {
                continue;
            };
            bars.push(Bar {
                timestamp,
                open: o,
                high: h,
                low: l,
                close: c,
                volume: volumes.get(i).and_then(|v| v.as_f64()).unwrap_or(0.0),
            });
        }
    }

    Ok(ChartData {
        regular_market_price,
        regular_market_time,
        regular_market_volume,
        bars,
    })
}

#[async_trait]
impl PriceProvider for YahooFinanceClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn latest_quote(&self, symbol: &AsxSymbol) -> Result<PriceQuote, AnalysisError> {
        self.get_quote(symbol).await
    }

    async fn daily_bars(&self, symbol: &AsxSymbol, days: u32) -> Result<Vec<Bar>, AnalysisError> {
        self.get_historical_data(symbol, days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_chart() -> serde_json::Value {
        json!({
            "chart": {
                "result": [{
                    "meta": {
                        "symbol": "WBC.AX",
                        "regularMarketPrice": 27.41,
                        "regularMarketTime": 1709874000,
                        "regularMarketVolume": 4100000
                    },
                    "timestamp": [1709614800, 1709701200, 1709787600],
                    "indicators": {
                        "quote": [{
                            "open": [27.0, null, 27.3],
                            "high": [27.5, null, 27.6],
                            "low": [26.9, null, 27.1],
                            "close": [27.2, null, 27.41],
                            "volume": [3900000, null, 4100000]
                        }]
                    }
                }],
                "error": null
            }
        })
    }

    #[test]
    fn test_parse_chart_skips_null_sessions() {
        let chart = parse_chart(&sample_chart()).unwrap();
        assert_eq!(chart.bars.len(), 2);
        assert_eq!(chart.regular_market_price, Some(27.41));
        assert_eq!(chart.bars[1].volume, 4_100_000.0);
    }

    #[test]
    fn test_parse_chart_error() {
        let payload = json!({"chart": {"result": null, "error": {"code": "Not Found"}}});
        assert!(matches!(parse_chart(&payload), Err(AnalysisError::ApiError(_))));
    }
}
