use analysis_core::{adaptive, AnalysisError, Bar};
use serde::{Deserialize, Serialize};

use crate::indicators::{annualized_volatility, macd, rsi, sma, volume_ratio};

const RSI_PERIOD: usize = 14;
const VOLUME_LOOKBACK: usize = 20;
/// SMA gap that maps to a full ±1 trend reading.
const TREND_FULL_SCALE: f64 = 0.02;
/// MACD histogram, as a fraction of price, that maps to ±1.
const MACD_FULL_SCALE: f64 = 0.005;

const TREND_WEIGHT: f64 = 0.4;
const MACD_WEIGHT: f64 = 0.35;
const RSI_WEIGHT: f64 = 0.25;

/// Technical feature vector for one symbol at the latest bar.
///
/// Indicators without enough history are `None` rather than a sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub current_price: f64,
    pub price_change_pct: f64,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    /// Annualised volatility as a fraction (0.20 = 20 %)
    pub volatility: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub current_volume: Option<f64>,
}

impl TechnicalSnapshot {
    /// Build from daily bars, oldest first.
    pub fn from_bars(bars: &[Bar]) -> Result<Self, AnalysisError> {
        if bars.len() < 2 {
            return Err(AnalysisError::InsufficientData(format!(
                "need at least 2 bars, got {}",
                bars.len()
            )));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        if closes.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(AnalysisError::InvalidData("non-positive or non-finite close".to_string()));
        }

        let current_price = closes[closes.len() - 1];
        let previous = closes[closes.len() - 2];
        let macd = macd(&closes, 12, 26, 9);
        let last_volume = bars[bars.len() - 1].volume;

        Ok(Self {
            current_price,
            price_change_pct: (current_price - previous) / previous * 100.0,
            rsi: rsi(&closes, RSI_PERIOD).last().copied(),
            macd: macd.macd_line.last().copied(),
            macd_signal: macd.signal_line.last().copied(),
            macd_histogram: macd.histogram.last().copied(),
            sma_20: sma(&closes, 20).last().copied(),
            sma_50: sma(&closes, 50).last().copied(),
            volatility: annualized_volatility(&closes),
            volume_ratio: volume_ratio(bars, VOLUME_LOOKBACK),
            current_volume: (last_volume > 0.0).then_some(last_volume),
        })
    }

    /// Directional technical score in [-1, 1].
    ///
    /// Blends trend, MACD momentum and RSI mean reversion, renormalised over
    /// whichever parts are available. 0 when none are.
    pub fn technical_score(&self) -> f64 {
        let mut parts: Vec<(f64, f64)> = Vec::with_capacity(3);

        if let (Some(fast), Some(slow)) = (self.sma_20, self.sma_50) {
            if slow > 0.0 {
                let gap = (fast - slow) / slow;
                parts.push((TREND_WEIGHT, adaptive::clamp_signed_unit(gap / TREND_FULL_SCALE)));
            }
        }

        if let Some(hist) = self.macd_histogram {
            let scale = self.current_price * MACD_FULL_SCALE;
            if scale > 0.0 {
                parts.push((MACD_WEIGHT, adaptive::clamp_signed_unit(hist / scale)));
            }
        }

        if let Some(rsi) = self.rsi {
            parts.push((RSI_WEIGHT, adaptive::clamp_signed_unit((50.0 - rsi) / 30.0)));
        }

        let total: f64 = parts.iter().map(|(w, _)| w).sum();
        if total <= 0.0 {
            return 0.0;
        }
        adaptive::clamp_signed_unit(parts.iter().map(|(w, v)| w * v).sum::<f64>() / total)
    }
}
