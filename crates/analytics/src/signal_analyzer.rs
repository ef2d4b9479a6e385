use analysis_core::TradeAction;
use anyhow::Result;
use confidence_engine::{calibrate, CalibrationMetrics};
use prediction_store::{PredictionRepository, TradingDb};

use crate::models::{ActionDistribution, VolumeGradeRow};

/// HOLD share of recent predictions that flags a stuck model
pub const ALL_HOLD_RATIO: f64 = 0.9;

pub struct SignalAnalyzer {
    db: TradingDb,
}

impl SignalAnalyzer {
    pub fn new(db: TradingDb) -> Self {
        Self { db }
    }

    /// Action counts over the `window` most recent predictions.
    pub async fn action_distribution(&self, window: i64) -> Result<ActionDistribution> {
        let counts = PredictionRepository::new(self.db.clone())
            .count_by_action(window)
            .await?;
        let count = |a: TradeAction| counts.get(&a).copied().unwrap_or(0);

        let (buy, sell, hold) = (count(TradeAction::Buy), count(TradeAction::Sell), count(TradeAction::Hold));
        let total = buy + sell + hold;
        let hold_ratio = if total > 0 { hold as f64 / total as f64 } else { 0.0 };
        let all_hold_warning = total > 0 && hold_ratio >= ALL_HOLD_RATIO;

        if all_hold_warning {
            tracing::warn!(
                "{:.0}% of the last {} predictions are HOLD; check thresholds and inputs",
                hold_ratio * 100.0,
                total
            );
        }

        Ok(ActionDistribution {
            window,
            total,
            buy,
            sell,
            hold,
            hold_ratio,
            all_hold_warning,
        })
    }

    /// Calibration of stated confidence against evaluated outcomes.
    pub async fn confidence_buckets(&self) -> Result<CalibrationMetrics> {
        let samples: Vec<(f64, bool)> = sqlx::query_as(
            r#"
            SELECT p.action_confidence, o.prediction_correct
            FROM outcomes o
            JOIN predictions p ON p.prediction_id = o.prediction_id
            WHERE typeof(p.action_confidence) IN ('real', 'integer')
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(calibrate(&samples))
    }

    pub async fn volume_grade_distribution(&self) -> Result<Vec<VolumeGradeRow>> {
        let rows: Vec<VolumeGradeRow> = sqlx::query_as(
            r#"
            SELECT COALESCE(p.volume_grade, 'Unknown') AS grade,
                   COUNT(*) AS predictions,
                   COUNT(o.outcome_id) AS evaluated,
                   COALESCE(SUM(o.prediction_correct), 0) AS correct
            FROM predictions p
            LEFT JOIN outcomes o ON o.prediction_id = p.prediction_id
            GROUP BY grade
            ORDER BY grade
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }
}
