use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{AnalysisError, AsxSymbol};

/// OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Latest traded price for a symbol as reported by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: AsxSymbol,
    pub price: f64,
    pub volume: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// Where a piece of text came from. Reddit chatter is trusted less than news.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    #[default]
    News,
    Reddit,
}

impl ContentSource {
    pub fn weight(&self) -> f64 {
        match self {
            ContentSource::News => 1.0,
            ContentSource::Reddit => 0.6,
        }
    }
}

/// News article or social post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub published_utc: DateTime<Utc>,
    pub url: Option<String>,
    /// Tickers the article is tagged with (bare codes or `.AX` form)
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub source: ContentSource,
}

/// Aggregated sentiment for one symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    /// -1.0 (very negative) to 1.0 (very positive)
    pub score: f64,
    /// 0.0 to 0.95
    pub confidence: f64,
    pub article_count: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

/// Recommendation stored with every prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub const ALL: [TradeAction; 3] = [TradeAction::Buy, TradeAction::Sell, TradeAction::Hold];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
            TradeAction::Hold => "HOLD",
        }
    }

    /// Direction the action bets on.
    pub fn direction(&self) -> Direction {
        match self {
            TradeAction::Buy => Direction::Up,
            TradeAction::Sell => Direction::Down,
            TradeAction::Hold => Direction::Flat,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            "HOLD" => Ok(TradeAction::Hold),
            other => Err(AnalysisError::InvalidData(format!("unknown action '{}'", other))),
        }
    }
}

/// Price direction, stored as -1 / 0 / 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn as_i64(&self) -> i64 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
            Direction::Flat => 0,
        }
    }

    /// Classify a percentage return; moves within `flat_band_pct` count as flat.
    pub fn from_return(return_pct: f64, flat_band_pct: f64) -> Self {
        if return_pct > flat_band_pct {
            Direction::Up
        } else if return_pct < -flat_band_pct {
            Direction::Down
        } else {
            Direction::Flat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip_and_direction() {
        assert_eq!("buy".parse::<TradeAction>().unwrap(), TradeAction::Buy);
        assert_eq!(" Hold ".parse::<TradeAction>().unwrap(), TradeAction::Hold);
        assert!("STRONG_BUY".parse::<TradeAction>().is_err());
        assert_eq!(TradeAction::Sell.direction().as_i64(), -1);
    }

    #[test]
    fn test_direction_from_return_band() {
        assert_eq!(Direction::from_return(0.3, 0.5), Direction::Flat);
        assert_eq!(Direction::from_return(0.6, 0.5), Direction::Up);
        assert_eq!(Direction::from_return(-0.6, 0.5), Direction::Down);
        assert_eq!(Direction::from_return(0.0001, 0.0), Direction::Up);
    }
}
