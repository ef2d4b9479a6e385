use analysis_core::{AsxSymbol, TradeAction};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{validation, ValidationError};

/// Timestamps are stored as second-precision RFC 3339 UTC so they sort as text.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Prediction {
    pub prediction_id: String,
    pub symbol: String,
    pub prediction_timestamp: String,
    pub predicted_action: String,
    pub action_confidence: f64,
    pub predicted_direction: i64,
    pub predicted_magnitude: f64,
    pub model_version: String,
    pub entry_price: f64,
    pub sentiment_score: Option<f64>,
    pub technical_score: Option<f64>,
    pub volume_grade: Option<String>,
    pub created_at: Option<String>,
}

impl Prediction {
    pub fn action(&self) -> Option<TradeAction> {
        self.predicted_action.parse().ok()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.prediction_timestamp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrediction {
    /// Generated when absent
    pub prediction_id: Option<String>,
    pub symbol: String,
    pub prediction_timestamp: DateTime<Utc>,
    pub predicted_action: TradeAction,
    pub action_confidence: f64,
    pub predicted_direction: i64,
    pub predicted_magnitude: f64,
    pub model_version: String,
    pub entry_price: f64,
    pub sentiment_score: Option<f64>,
    pub technical_score: Option<f64>,
    pub volume_grade: Option<String>,
}

impl NewPrediction {
    /// Checks every column rule and returns the normalised symbol.
    pub fn validate(&self) -> Result<AsxSymbol, ValidationError> {
        let symbol = validation::symbol(&self.symbol)?;
        validation::unit_interval("action_confidence", self.action_confidence)?;
        validation::direction_matches(self.predicted_action, self.predicted_direction)?;
        validation::finite("predicted_magnitude", self.predicted_magnitude)?;
        validation::non_empty("model_version", &self.model_version)?;
        validation::price("entry_price", self.entry_price)?;
        if let Some(s) = self.sentiment_score {
            validation::signed_unit("sentiment_score", s)?;
        }
        if let Some(t) = self.technical_score {
            validation::signed_unit("technical_score", t)?;
        }
        if let Some(id) = &self.prediction_id {
            validation::non_empty("prediction_id", id)?;
        }
        Ok(symbol)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Outcome {
    pub outcome_id: i64,
    pub prediction_id: String,
    pub actual_return: Option<f64>,
    pub actual_direction: Option<i64>,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub evaluation_timestamp: String,
    pub prediction_correct: bool,
}

/// Outcome joined with the prediction it evaluates.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EvaluatedPrediction {
    pub prediction_id: String,
    pub symbol: String,
    pub prediction_timestamp: String,
    pub predicted_action: String,
    pub action_confidence: f64,
    pub model_version: String,
    pub volume_grade: Option<String>,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub actual_return: Option<f64>,
    pub actual_direction: Option<i64>,
    pub prediction_correct: bool,
    pub evaluation_timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnhancedFeatures {
    pub id: i64,
    pub symbol: String,
    pub timestamp: String,
    pub current_price: f64,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub volatility: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub sentiment_score: Option<f64>,
    pub news_count: i64,
    pub technical_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFeatures {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub volatility: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub sentiment_score: Option<f64>,
    pub news_count: i64,
    pub technical_score: Option<f64>,
}

impl NewFeatures {
    pub fn validate(&self) -> Result<AsxSymbol, ValidationError> {
        let symbol = validation::symbol(&self.symbol)?;
        validation::price("current_price", self.current_price)?;
        if let Some(rsi) = validation::optional("rsi", self.rsi)? {
            if !(0.0..=100.0).contains(&rsi) {
                return Err(ValidationError::OutOfRange { field: "rsi", value: rsi });
            }
        }
        validation::optional("macd", self.macd)?;
        validation::optional("macd_signal", self.macd_signal)?;
        validation::optional("macd_histogram", self.macd_histogram)?;
        validation::optional("sma_20", self.sma_20)?;
        validation::optional("sma_50", self.sma_50)?;
        if let Some(vol) = validation::optional("volatility", self.volatility)? {
            if vol < 0.0 {
                return Err(ValidationError::OutOfRange { field: "volatility", value: vol });
            }
        }
        validation::optional("volume_ratio", self.volume_ratio)?;
        if let Some(s) = self.sentiment_score {
            validation::signed_unit("sentiment_score", s)?;
        }
        if let Some(t) = self.technical_score {
            validation::signed_unit("technical_score", t)?;
        }
        if self.news_count < 0 {
            return Err(ValidationError::OutOfRange {
                field: "news_count",
                value: self.news_count as f64,
            });
        }
        Ok(symbol)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnhancedOutcome {
    pub id: i64,
    pub feature_id: i64,
    pub symbol: String,
    pub prediction_timestamp: String,
    pub entry_price: f64,
    pub exit_price_1h: Option<f64>,
    pub exit_price_4h: Option<f64>,
    pub exit_price_1d: Option<f64>,
    pub return_pct_1h: Option<f64>,
    pub return_pct_4h: Option<f64>,
    pub return_pct_1d: Option<f64>,
    pub direction_1h: Option<i64>,
    pub direction_4h: Option<i64>,
    pub direction_1d: Option<i64>,
    pub optimal_action: Option<String>,
    pub confidence_score: Option<f64>,
    pub is_synthetic: bool,
}

/// Exit prices for a feature row; returns and directions are derived on insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEnhancedOutcome {
    pub feature_id: i64,
    pub exit_price_1h: Option<f64>,
    pub exit_price_4h: Option<f64>,
    pub exit_price_1d: Option<f64>,
    pub confidence_score: Option<f64>,
    pub is_synthetic: bool,
}
