//! One prediction per symbol, and evaluation of predictions past their horizon.

use analysis_core::{adaptive, AsxSymbol, NewsArticle, PriceProvider, SentimentAnalyzer, SentimentReading};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use confidence_engine::{assess_volume, ConfidenceInputs, ConfidenceScorer, Decision, VolumeQuality};
use prediction_store::{
    parse_timestamp, FeatureRepository, NewEnhancedOutcome, NewFeatures, NewPrediction, OutcomeRepository,
    PredictionRepository, PriceLookup, TradingDb,
};
use serde::Serialize;
use std::sync::Arc;
use technical_analysis::TechnicalSnapshot;

/// Daily bars requested per prediction; enough for SMA50 and MACD.
const HISTORY_DAYS: u32 = 120;
const VOLUME_LOOKBACK: usize = 20;
const FEATURE_HORIZON_HOURS: i64 = 24;
/// Longest evaluation horizon accepted: one year.
pub const MAX_EVALUATION_HORIZON_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Serialize)]
pub struct PredictionSummary {
    pub prediction_id: String,
    pub symbol: AsxSymbol,
    pub entry_price: f64,
    pub technical_score: f64,
    pub sentiment: SentimentReading,
    pub volume: VolumeQuality,
    pub decision: Decision,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
    pub pending: usize,
    pub evaluated: usize,
    /// No price available yet for the horizon
    pub waiting: usize,
    pub failures: Vec<String>,
    pub features_evaluated: usize,
}

pub struct PredictionPipeline {
    provider: Arc<dyn PriceProvider>,
    sentiment: Arc<dyn SentimentAnalyzer>,
    scorer: ConfidenceScorer,
    db: TradingDb,
    model_version: String,
}

impl PredictionPipeline {
    pub fn new(
        provider: Arc<dyn PriceProvider>,
        sentiment: Arc<dyn SentimentAnalyzer>,
        scorer: ConfidenceScorer,
        db: TradingDb,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            sentiment,
            scorer,
            db,
            model_version: model_version.into(),
        }
    }

    /// Score `symbol` now and store the prediction with its feature row.
    pub async fn predict(&self, symbol: &AsxSymbol, news: &[NewsArticle], now: DateTime<Utc>) -> Result<PredictionSummary> {
        let bars = self
            .provider
            .daily_bars(symbol, HISTORY_DAYS)
            .await
            .with_context(|| format!("Failed to fetch daily bars for {}", symbol))?;
        let snapshot = TechnicalSnapshot::from_bars(&bars).with_context(|| format!("Not enough history for {}", symbol))?;

        let (entry_price, current_volume) = match self.provider.latest_quote(symbol).await {
            Ok(quote) => (quote.price, quote.volume.or(snapshot.current_volume)),
            Err(e) => {
                tracing::warn!("No live quote for {} ({}), using last close", symbol, e);
                (snapshot.current_price, snapshot.current_volume)
            }
        };

        // Volume history excludes the bar being graded
        let history: Vec<f64> = bars[..bars.len() - 1]
            .iter()
            .rev()
            .take(VOLUME_LOOKBACK)
            .map(|b| b.volume)
            .collect();
        let volume = assess_volume(current_volume, &history);
        if volume.missing_data {
            tracing::info!("{}: volume data missing, grading as Unknown", symbol);
        }

        let sentiment = self.sentiment.analyze(symbol, news).await?;
        let technical_score = snapshot.technical_score();

        let decision = self.scorer.score(&ConfidenceInputs {
            sentiment_score: sentiment.score,
            sentiment_confidence: sentiment.confidence,
            technical_score,
            volume,
            volatility: snapshot.volatility,
            ml_probability_up: None,
        })?;

        let prediction = NewPrediction {
            prediction_id: None,
            symbol: symbol.to_string(),
            prediction_timestamp: now,
            predicted_action: decision.action,
            action_confidence: decision.confidence,
            predicted_direction: decision.action.direction().as_i64(),
            predicted_magnitude: decision.predicted_magnitude_pct,
            model_version: self.model_version.clone(),
            entry_price,
            sentiment_score: Some(adaptive::clamp_signed_unit(sentiment.score)),
            technical_score: Some(technical_score),
            volume_grade: Some(volume.grade.to_string()),
        };
        let features = NewFeatures {
            symbol: symbol.to_string(),
            timestamp: now,
            current_price: entry_price,
            rsi: snapshot.rsi,
            macd: snapshot.macd,
            macd_signal: snapshot.macd_signal,
            macd_histogram: snapshot.macd_histogram,
            sma_20: snapshot.sma_20,
            sma_50: snapshot.sma_50,
            volatility: snapshot.volatility,
            volume_ratio: volume.ratio,
            sentiment_score: Some(adaptive::clamp_signed_unit(sentiment.score)),
            news_count: sentiment.article_count as i64,
            technical_score: Some(technical_score),
        };
        let (prediction_id, _) = PredictionRepository::new(self.db.clone())
            .insert_with_features(&prediction, &features)
            .await?;

        tracing::info!(
            "{} {} at {:.2} (confidence {:.2}, d={:+.3}{})",
            symbol,
            decision.action,
            entry_price,
            decision.confidence,
            decision.directional_score,
            if decision.downgraded { ", downgraded" } else { "" }
        );

        Ok(PredictionSummary {
            prediction_id,
            symbol: symbol.clone(),
            entry_price,
            technical_score,
            sentiment,
            volume,
            decision,
        })
    }

    /// Record outcomes for predictions older than `horizon_hours`, using the
    /// close at prediction time + horizon. Feature rows older than a day get
    /// their 1d exit price the same way.
    pub async fn evaluate(
        &self,
        lookup: &dyn PriceLookup,
        horizon_hours: i64,
        hold_band_pct: f64,
        now: DateTime<Utc>,
    ) -> Result<EvaluationReport> {
        if !(1..=MAX_EVALUATION_HORIZON_HOURS).contains(&horizon_hours) {
            bail!(
                "Evaluation horizon must be between 1 and {} hours, got {}",
                MAX_EVALUATION_HORIZON_HOURS,
                horizon_hours
            );
        }
        let horizon = Duration::try_hours(horizon_hours).context("Evaluation horizon out of range")?;
        let cutoff = now
            .checked_sub_signed(horizon)
            .context("Evaluation cutoff out of range")?;
        let pending = PredictionRepository::new(self.db.clone()).pending(cutoff).await?;
        let outcomes = OutcomeRepository::new(self.db.clone());
        let mut report = EvaluationReport {
            pending: pending.len(),
            ..Default::default()
        };

        for prediction in pending {
            let Some(made_at) = prediction.timestamp() else {
                report.failures.push(format!(
                    "{}: unparseable timestamp '{}'",
                    prediction.prediction_id, prediction.prediction_timestamp
                ));
                continue;
            };

            let Some(exit_at) = made_at.checked_add_signed(horizon) else {
                report.failures.push(format!(
                    "{}: timestamp '{}' out of range",
                    prediction.prediction_id, prediction.prediction_timestamp
                ));
                continue;
            };

            match lookup.close_on(&prediction.symbol, exit_at).await {
                Ok(Some(exit_price)) => {
                    match outcomes
                        .record(&prediction.prediction_id, exit_price, now, hold_band_pct)
                        .await
                    {
                        Ok(_) => report.evaluated += 1,
                        Err(e) => {
                            tracing::warn!("Could not evaluate {}: {}", prediction.prediction_id, e);
                            report.failures.push(format!("{}: {}", prediction.prediction_id, e));
                        }
                    }
                }
                Ok(None) => report.waiting += 1,
                Err(e) if e.is_transient() => {
                    tracing::warn!("Price lookup for {} will be retried: {}", prediction.symbol, e);
                    report.waiting += 1;
                }
                Err(e) => {
                    tracing::warn!("Price lookup failed for {}: {}", prediction.symbol, e);
                    report.failures.push(format!("{}: {}", prediction.prediction_id, e));
                }
            }
        }

        report.features_evaluated = self.evaluate_features(lookup, now, &mut report.failures).await?;

        tracing::info!(
            "Evaluated {} of {} pending predictions ({} waiting, {} failed)",
            report.evaluated,
            report.pending,
            report.waiting,
            report.failures.len()
        );
        Ok(report)
    }

    async fn evaluate_features(
        &self,
        lookup: &dyn PriceLookup,
        now: DateTime<Utc>,
        failures: &mut Vec<String>,
    ) -> Result<usize> {
        let features = FeatureRepository::new(self.db.clone());
        let horizon = Duration::try_hours(FEATURE_HORIZON_HOURS).context("Feature horizon out of range")?;
        let mut evaluated = 0;

        for row in features.features_without_outcomes(i64::MAX).await? {
            let Some(exit_at) = parse_timestamp(&row.timestamp).and_then(|at| at.checked_add_signed(horizon)) else {
                continue;
            };
            if exit_at > now {
                continue;
            }
            let exit = match lookup.close_on(&row.symbol, exit_at).await {
                Ok(Some(exit)) => exit,
                Ok(None) => continue,
                Err(e) if e.is_transient() => continue,
                Err(e) => {
                    failures.push(format!("feature row {}: {}", row.id, e));
                    continue;
                }
            };
            let outcome = NewEnhancedOutcome {
                feature_id: row.id,
                exit_price_1d: Some(exit),
                ..Default::default()
            };
            match features.insert_outcome(&outcome).await {
                Ok(_) => evaluated += 1,
                Err(e) => failures.push(format!("feature row {}: {}", row.id, e)),
            }
        }
        Ok(evaluated)
    }
}
