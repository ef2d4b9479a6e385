//! IG Markets REST client.
//!
//! IG requires a session: `POST /session` returns `CST` and
//! `X-SECURITY-TOKEN` headers that must accompany every later call. Tokens
//! expire, so a 401 triggers one re-login before giving up.

use analysis_core::{AnalysisError, AsxSymbol, Bar, PriceProvider, PriceQuote};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::retry::{ensure_success, send_with_retry, RetryPolicy};

pub const DEMO_URL: &str = "https://demo-api.ig.com/gateway/deal";
const PROVIDER: &str = "ig_markets";

#[derive(Debug, Clone)]
pub struct IgCredentials {
    pub api_key: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
struct IgSession {
    cst: String,
    security_token: String,
}

pub struct IgMarketsClient {
    base_url: String,
    credentials: IgCredentials,
    client: reqwest::Client,
    retry: RetryPolicy,
    session: Mutex<Option<IgSession>>,
    epic_overrides: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketResponse {
    snapshot: MarketSnapshot,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketSnapshot {
    bid: Option<f64>,
    offer: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PricesResponse {
    prices: Vec<IgPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IgPrice {
    #[serde(rename = "snapshotTimeUTC")]
    snapshot_time_utc: Option<String>,
    open_price: BidAsk,
    high_price: BidAsk,
    low_price: BidAsk,
    close_price: BidAsk,
    last_traded_volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BidAsk {
    bid: Option<f64>,
    ask: Option<f64>,
}

impl BidAsk {
    fn mid(&self) -> Option<f64> {
        mid_price(self.bid, self.ask)
    }
}

fn mid_price(bid: Option<f64>, ask: Option<f64>) -> Option<f64> {
    match (bid, ask) {
        (Some(b), Some(a)) => Some((b + a) / 2.0),
        (Some(p), None) | (None, Some(p)) => Some(p),
        (None, None) => None,
    }
    .filter(|p| p.is_finite() && *p > 0.0)
}

impl IgMarketsClient {
    pub fn new(base_url: impl Into<String>, credentials: IgCredentials) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client: crate::http_client(),
            retry: RetryPolicy::default(),
            session: Mutex::new(None),
            epic_overrides: HashMap::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Map an ASX code to a specific IG epic instead of the default pattern.
    pub fn with_epic(mut self, code: &str, epic: &str) -> Self {
        self.epic_overrides.insert(code.to_ascii_uppercase(), epic.to_string());
        self
    }

    /// IG epic for an ASX share CFD, e.g. `AA.D.CBA.CASH.IP`.
    pub fn epic_for(&self, symbol: &AsxSymbol) -> String {
        self.epic_overrides
            .get(symbol.code())
            .cloned()
            .unwrap_or_else(|| format!("AA.D.{}.CASH.IP", symbol.code()))
    }

    async fn login(&self) -> Result<IgSession, AnalysisError> {
        let url = format!("{}/session", self.base_url);
        let body = serde_json::json!({
            "identifier": self.credentials.username,
            "password": self.credentials.password,
        });

        let response = send_with_retry(
            &self.client,
            self.client
                .post(&url)
                .header("X-IG-API-KEY", &self.credentials.api_key)
                .header("Version", "2")
                .json(&body),
            &self.retry,
            PROVIDER,
        )
        .await?;

        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(AnalysisError::AuthError(format!(
                "IG login rejected: {}",
                response.text().await.unwrap_or_default()
            )));
        }
        let response = ensure_success(response, PROVIDER).await?;

        let session = session_from_headers(response.headers())?;
        tracing::info!("IG Markets session established");
        Ok(session)
    }

    async fn session(&self, force_refresh: bool) -> Result<IgSession, AnalysisError> {
        let mut guard = self.session.lock().await;
        if !force_refresh {
            if let Some(session) = guard.as_ref() {
                return Ok(session.clone());
            }
        }
        let session = self.login().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Authenticated GET, re-logging in once if the session has expired.
    async fn get_json(&self, path: &str, version: &str, query: &[(&str, String)]) -> Result<serde_json::Value, AnalysisError> {
        let url = format!("{}{}", self.base_url, path);

        for refresh in [false, true] {
            let session = self.session(refresh).await?;
            let response = send_with_retry(
                &self.client,
                self.client
                    .get(&url)
                    .query(query)
                    .header("X-IG-API-KEY", &self.credentials.api_key)
                    .header("CST", &session.cst)
                    .header("X-SECURITY-TOKEN", &session.security_token)
                    .header("Version", version),
                &self.retry,
                PROVIDER,
            )
            .await?;

            if response.status() == StatusCode::UNAUTHORIZED && !refresh {
                tracing::warn!("IG session expired, logging in again");
                continue;
            }

            let response = ensure_success(response, PROVIDER).await?;
            return response
                .json()
                .await
                .map_err(|e| AnalysisError::ApiError(e.to_string()));
        }

        Err(AnalysisError::AuthError("IG session could not be refreshed".to_string()))
    }

    pub async fn get_quote(&self, symbol: &AsxSymbol) -> Result<PriceQuote, AnalysisError> {
        let epic = self.epic_for(symbol);
        let json = self.get_json(&format!("/markets/{}", epic), "3", &[]).await?;
        parse_market(symbol, json)
    }

    pub async fn get_daily(&self, symbol: &AsxSymbol, days: u32) -> Result<Vec<Bar>, AnalysisError> {
        let epic = self.epic_for(symbol);
        let query = [
            ("resolution", "DAY".to_string()),
            ("max", days.max(1).to_string()),
            ("pageSize", "0".to_string()),
        ];
        let json = self.get_json(&format!("/prices/{}", epic), "3", &query).await?;
        parse_prices(json)
    }
}

fn session_from_headers(headers: &HeaderMap) -> Result<IgSession, AnalysisError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| AnalysisError::AuthError(format!("IG login response missing {} header", name)))
    };

    Ok(IgSession {
        cst: header("CST")?,
        security_token: header("X-SECURITY-TOKEN")?,
    })
}

fn parse_ig_time(raw: &str) -> Option<DateTime<Utc>> {
    ["%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| Utc.from_utc_datetime(&dt))
}

fn parse_market(symbol: &AsxSymbol, json: serde_json::Value) -> Result<PriceQuote, AnalysisError> {
    let market: MarketResponse =
        serde_json::from_value(json).map_err(|e| AnalysisError::InvalidData(e.to_string()))?;

    let price = mid_price(market.snapshot.bid, market.snapshot.offer)
        .ok_or_else(|| AnalysisError::InsufficientData(format!("IG snapshot for {} has no price", symbol)))?;

    // The snapshot only carries a time of day, so stamp with now
    Ok(PriceQuote {
        symbol: symbol.clone(),
        price,
        volume: None,
        timestamp: Utc::now(),
        source: PROVIDER.to_string(),
    })
}

fn parse_prices(json: serde_json::Value) -> Result<Vec<Bar>, AnalysisError> {
    let response: PricesResponse =
        serde_json::from_value(json).map_err(|e| AnalysisError::InvalidData(e.to_string()))?;

    let mut bars: Vec<Bar> = response
        .prices
        .into_iter()
        .filter_map(|p| {
            Some(Bar {
                timestamp: p.snapshot_time_utc.as_deref().and_then(parse_ig_time)?,
                open: p.open_price.mid()?,
                high: p.high_price.mid()?,
                low: p.low_price.mid()?,
                close: p.close_price.mid()?,
                volume: p.last_traded_volume.unwrap_or(0.0),
            })
        })
        .collect();

    bars.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(bars)
}

#[async_trait]
impl PriceProvider for IgMarketsClient {
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
