use analysis_core::AsxSymbol;
use anyhow::{bail, Context, Result};
use confidence_engine::{ConfidenceScorer, ConfidenceWeights, DecisionThresholds};
use market_data::ig_markets::DEMO_URL;
use std::collections::HashMap;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::pipeline::MAX_EVALUATION_HORIZON_HOURS;

const KNOWN_PROVIDERS: [&str; 3] = ["yahoo", "alpha_vantage", "ig"];

#[derive(Debug, Clone)]
pub struct IgSettings {
    pub api_key: String,
    pub username: String,
    pub password: String,
    pub base_url: String,
    /// ASX code -> epic overrides
    pub epics: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,

    // Price providers
    pub alpha_vantage_api_key: Option<String>,
    pub ig: Option<IgSettings>,
    pub price_providers: Vec<String>,
    pub quote_cache_ttl_secs: i64,
    pub http_max_retries: u32,

    pub watchlist: Vec<AsxSymbol>,

    // Evaluation
    pub evaluation_horizon_hours: i64,
    pub hold_band_pct: f64,

    pub model_version: String,
    pub dashboard_addr: SocketAddr,

    // Confidence formula
    pub weights: ConfidenceWeights,
    pub thresholds: DecisionThresholds,
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppConfig {
    /// Read configuration from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let ig = match (get("IG_API_KEY"), get("IG_USERNAME"), get("IG_PASSWORD")) {
            (Some(api_key), Some(username), Some(password)) => Some(IgSettings {
                api_key,
                username,
                password,
                base_url: get("IG_BASE_URL").unwrap_or_else(|| DEMO_URL.to_string()),
                epics: get("IG_EPICS")
                    .map(|raw| {
                        list(&raw)
                            .into_iter()
                            .filter_map(|pair| {
                                pair.split_once('=')
                                    .map(|(code, epic)| (code.trim().to_ascii_uppercase(), epic.trim().to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            }),
            _ => None,
        };

        let watchlist = match get("WATCHLIST") {
            Some(raw) => list(&raw)
                .iter()
                .map(|s| AsxSymbol::parse(s).with_context(|| format!("WATCHLIST entry '{}'", s)))
                .collect::<Result<Vec<_>>>()?,
            None => AsxSymbol::default_watchlist(),
        };

        let config = Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite:data/trading_unified.db".to_string()),
            alpha_vantage_api_key: get("ALPHA_VANTAGE_API_KEY").filter(|k| !k.trim().is_empty()),
            ig,
            price_providers: list(&get("PRICE_PROVIDERS").unwrap_or_else(|| "yahoo,alpha_vantage".to_string()))
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            quote_cache_ttl_secs: parse_or(&get, "QUOTE_CACHE_TTL_SECS", 300)?,
            http_max_retries: parse_or(&get, "HTTP_MAX_RETRIES", 3)?,
            watchlist,
            evaluation_horizon_hours: parse_or(&get, "EVALUATION_HORIZON_HOURS", 24)?,
            hold_band_pct: parse_or(&get, "HOLD_BAND_PCT", 0.5)?,
            model_version: get("MODEL_VERSION").unwrap_or_else(|| "bank-trader-1".to_string()),
            dashboard_addr: parse_or(&get, "DASHBOARD_ADDR", SocketAddr::from(([127, 0, 0, 1], 8501)))?,
            weights: ConfidenceWeights {
                sentiment: parse_or(&get, "WEIGHT_SENTIMENT", 0.30)?,
                technical: parse_or(&get, "WEIGHT_TECHNICAL", 0.30)?,
                volume: parse_or(&get, "WEIGHT_VOLUME", 0.15)?,
                risk: parse_or(&get, "WEIGHT_RISK", 0.15)?,
                ml: parse_or(&get, "WEIGHT_ML", 0.10)?,
            },
            thresholds: DecisionThresholds {
                buy_threshold: parse_or(&get, "BUY_THRESHOLD", 0.15)?,
                sell_threshold: parse_or(&get, "SELL_THRESHOLD", -0.15)?,
                min_action_confidence: parse_or(&get, "MIN_ACTION_CONFIDENCE", 0.55)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scorer()?;

        if self.price_providers.is_empty() {
            bail!("PRICE_PROVIDERS must name at least one provider");
        }
        if let Some(unknown) = self
            .price_providers
            .iter()
            .find(|p| !KNOWN_PROVIDERS.contains(&p.as_str()))
        {
            bail!("Unknown price provider '{}' (expected one of {:?})", unknown, KNOWN_PROVIDERS);
        }
        if self.watchlist.is_empty() {
            bail!("WATCHLIST is empty");
        }
        if !(1..=MAX_EVALUATION_HORIZON_HOURS).contains(&self.evaluation_horizon_hours) {
            bail!(
                "EVALUATION_HORIZON_HOURS must be between 1 and {}, got {}",
                MAX_EVALUATION_HORIZON_HOURS,
                self.evaluation_horizon_hours
            );
        }
        if !(self.hold_band_pct.is_finite() && self.hold_band_pct >= 0.0) {
            bail!("HOLD_BAND_PCT must be a non-negative number, got {}", self.hold_band_pct);
        }
        if self.quote_cache_ttl_secs < 0 {
            bail!("QUOTE_CACHE_TTL_SECS must not be negative");
        }
        if self.model_version.trim().is_empty() {
            bail!("MODEL_VERSION must not be empty");
        }
        Ok(())
    }

    /// Scorer built from the configured weights and thresholds.
    pub fn scorer(&self) -> Result<ConfidenceScorer> {
        ConfidenceScorer::new(self.weights, self.thresholds).context("Invalid confidence weights or thresholds")
    }
}
