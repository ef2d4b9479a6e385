use analysis_core::{AnalysisError, AsxSymbol, Bar, PriceProvider, PriceQuote};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use crate::retry::{ensure_success, send_with_retry, RetryPolicy};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "alpha_vantage";

#[derive(Clone)]
pub struct AlphaVantageClient {
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl AlphaVantageClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: crate::http_client(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<serde_json::Value, AnalysisError> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("apikey", self.api_key.as_str()));

        let response = send_with_retry(
            &self.client,
            self.client.get(BASE_URL).query(&query),
            &self.retry,
            PROVIDER,
        )
        .await?;
        let response = ensure_success(response, PROVIDER).await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        check_api_message(&json)?;
        Ok(json)
    }

    /// Latest quote via `GLOBAL_QUOTE`
    pub async fn get_quote(&self, symbol: &AsxSymbol) -> Result<PriceQuote, AnalysisError> {
        let json = self
            .query(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol.as_str())])
            .await?;
        parse_global_quote(symbol, &json)
    }

    /// Daily bars via `TIME_SERIES_DAILY`, oldest first
    pub async fn get_daily(&self, symbol: &AsxSymbol, days: u32) -> Result<Vec<Bar>, AnalysisError> {
        let outputsize = if days > 100 { "full" } else { "compact" };
        let json = self
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol.as_str()),
                ("outputsize", outputsize),
            ])
            .await?;

        let mut bars = parse_daily_series(&json)?;
        if bars.len() > days as usize {
            bars.drain(..bars.len() - days as usize);
        }
        Ok(bars)
    }
}

/// Alpha Vantage reports errors and throttling with HTTP 200 and a message field.
fn check_api_message(json: &serde_json::Value) -> Result<(), AnalysisError> {
    if let Some(error) = json.get("Error Message") {
        return Err(AnalysisError::ApiError(format!("Alpha Vantage error: {}", error)));
    }

    for key in ["Note", "Information"] {
        if let Some(note) = json.get(key) {
            return Err(AnalysisError::RateLimited {
                provider: PROVIDER.to_string(),
                message: note.as_str().unwrap_or_default().to_string(),
            });
        }
    }

    Ok(())
}

fn parse_number(value: Option<&serde_json::Value>) -> Option<f64> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

pub(crate) fn parse_global_quote(symbol: &AsxSymbol, json: &serde_json::Value) -> Result<PriceQuote, AnalysisError> {
    let quote = json
        .get("Global Quote")
        .and_then(|v| v.as_object())
        .filter(|obj| !obj.is_empty())
        .ok_or_else(|| AnalysisError::InsufficientData(format!("No Alpha Vantage quote for {}", symbol)))?;

    let price = parse_number(quote.get("05. price"))
        .filter(|p| *p > 0.0)
        .ok_or_else(|| AnalysisError::InvalidData(format!("Alpha Vantage returned no price for {}", symbol)))?;

    let timestamp = quote
        .get("07. latest trading day")
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(6, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(Utc::now);

    Ok(PriceQuote {
        symbol: symbol.clone(),
        price,
        volume: parse_number(quote.get("06. volume")),
        timestamp,
        source: PROVIDER.to_string(),
    })
}

pub(crate) fn parse_daily_series(json: &serde_json::Value) -> Result<Vec<Bar>, AnalysisError> {
    let series = json
        .get("Time Series (Daily)")
        .and_then(|v| v.as_object())
        .ok_or_else(|| AnalysisError::InsufficientData("No daily series found".to_string()))?;

    let mut bars = Vec::with_capacity(series.len());
    for (date, values) in series {
        let Some(day) = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(6, 0, 0))
        else {
            continue;
        };

        if let (Some(open), Some(high), Some(low), Some(close)) = (
            parse_number(values.get("1. open")),
            parse_number(values.get("2. high")),
            parse_number(values.get("3. low")),
            parse_number(values.get("4. close")),
        ) {
            bars.push(Bar {
                timestamp: Utc.from_utc_datetime(&day),
                open,
                high,
                low,
                close,
                volume: parse_number(values.get("5. volume")).unwrap_or(0.0),
            });
        }
    }

    bars.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(bars)
}

#[async_trait]
impl PriceProvider for AlphaVantageClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn latest_quote(&self, symbol: &AsxSymbol) -> Result<PriceQuote, AnalysisError> {
        self.get_quote(symbol).await
    }

    async fn daily_bars(&self, symbol: &AsxSymbol, days: u32) -> Result<Vec<Bar>, AnalysisError> {
        self.get_daily(symbol, days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_global_quote() {
        let symbol = AsxSymbol::parse("CBA").unwrap();
        let payload = json!({
            "Global Quote": {
                "01. symbol": "CBA.AX",
                "05. price": "112.4500",
                "06. volume": "1834000",
                "07. latest trading day": "2024-03-08"
            }
        });

        let quote = parse_global_quote(&symbol, &payload).unwrap();
        assert!((quote.price - 112.45).abs() < 1e-9);
        assert_eq!(quote.volume, Some(1_834_000.0));
        assert_eq!(quote.source, "alpha_vantage");
    }

    #[test]
    fn test_empty_quote_is_insufficient_data() {
        let symbol = AsxSymbol::parse("CBA").unwrap();
        let err = parse_global_quote(&symbol, &json!({"Global Quote": {}})).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData(_)));
    }

    #[test]
    fn test_rate_limit_note_detected() {
        let err = check_api_message(&json!({"Note": "Thank you for using Alpha Vantage!"})).unwrap_err();
        assert!(matches!(err, AnalysisError::RateLimited { .. }));
        assert!(check_api_message(&json!({"Information": "premium endpoint"})).is_err());
        assert!(check_api_message(&json!({"Global Quote": {}})).is_ok());
    }

    #[test]
    fn test_daily_series_sorted_oldest_first() {
        let payload = json!({
            "Time Series (Daily)": {
                "2024-03-08": {"1. open": "111", "2. high": "113", "3. low": "110", "4. close": "112", "5. volume": "100"},
                "2024-03-06": {"1. open": "109", "2. high": "110", "3. low": "108", "4. close": "109.5", "5. volume": "90"},
                "2024-03-07": {"1. open": "bad", "2. high": "111", "3. low": "109", "4. close": "110", "5. volume": "95"}
            }
        });

        let bars = parse_daily_series(&payload).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[1].close, 112.0);
    }
}
