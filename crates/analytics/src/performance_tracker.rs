use analysis_core::adaptive;
use anyhow::Result;
use prediction_store::{PredictionRepository, TradingDb};

use crate::models::{AccuracyRow, PerformanceOverview};

/// Symbols need this many evaluations to rank as best or worst
const DEFAULT_MIN_SAMPLES: i64 = 5;

/// `actual_return`, or NULL where a legacy row stored text.
const NUMERIC_RETURN: &str = "CASE WHEN typeof(o.actual_return) IN ('real', 'integer') THEN o.actual_return END";

pub struct PerformanceTracker {
    db: TradingDb,
    min_samples: i64,
}

impl PerformanceTracker {
    pub fn new(db: TradingDb) -> Self {
        Self {
            db,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }

    pub fn with_min_samples(mut self, min_samples: i64) -> Self {
        self.min_samples = min_samples;
        self
    }

    async fn accuracy_grouped_by(&self, column: &str) -> Result<Vec<AccuracyRow>> {
        let rows: Vec<AccuracyRow> = sqlx::query_as(&format!(
            r#"
            SELECT {column} AS key,
                   COUNT(*) AS evaluated,
                   COALESCE(SUM(o.prediction_correct), 0) AS correct,
                   CAST(COALESCE(SUM(o.prediction_correct), 0) AS REAL) / COUNT(*) AS accuracy,
                   COALESCE(AVG({NUMERIC_RETURN}), 0.0) AS mean_return
            FROM outcomes o
            JOIN predictions p ON p.prediction_id = o.prediction_id
            GROUP BY {column}
            ORDER BY accuracy DESC, evaluated DESC
            "#
        ))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    /// Accuracy per symbol, best first
    pub async fn accuracy_by_symbol(&self) -> Result<Vec<AccuracyRow>> {
        self.accuracy_grouped_by("p.symbol").await
    }

    pub async fn accuracy_by_action(&self) -> Result<Vec<AccuracyRow>> {
        self.accuracy_grouped_by("p.predicted_action").await
    }

    pub async fn performance_overview(&self) -> Result<PerformanceOverview> {
        let total_predictions = PredictionRepository::new(self.db.clone()).count().await?;

        let evaluated: Vec<(Option<f64>, bool)> = sqlx::query_as(&format!(
            r#"
            SELECT {NUMERIC_RETURN}, o.prediction_correct
            FROM outcomes o
            JOIN predictions p ON p.prediction_id = o.prediction_id
            "#
        ))
        .fetch_all(self.db.pool())
        .await?;

        let total_evaluated = evaluated.len() as i64;
        if total_evaluated == 0 {
            return Ok(PerformanceOverview {
                total_predictions,
                ..Default::default()
            });
        }

        let wins = evaluated.iter().filter(|(_, correct)| *correct).count();
        let returns: Vec<f64> = evaluated
            .iter()
            .filter_map(|(r, _)| *r)
            .filter(|r| r.is_finite())
            .collect();

        let ranked: Vec<AccuracyRow> = self
            .accuracy_by_symbol()
            .await?
            .into_iter()
            .filter(|row| row.evaluated >= self.min_samples)
            .collect();
        // Rows arrive sorted by accuracy, best first
        let best_symbol = ranked.first().cloned();
        let worst_symbol = if ranked.len() > 1 { ranked.last().cloned() } else { None };

        Ok(PerformanceOverview {
            total_predictions,
            total_evaluated,
            win_rate: wins as f64 / total_evaluated as f64,
            mean_return: adaptive::mean(&returns),
            median_return: adaptive::median(&returns),
            best_symbol,
            worst_symbol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{evaluated, memory_db};
    use analysis_core::TradeAction;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn test_empty_database() {
        let tracker = PerformanceTracker::new(memory_db().await);
        let overview = tracker.performance_overview().await.unwrap();
        assert_eq!(overview.total_evaluated, 0);
        assert_eq!(overview.win_rate, 0.0);
        assert!(overview.best_symbol.is_none());
        assert!(tracker.accuracy_by_symbol().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accuracy_and_overview() {
        let db = memory_db().await;
        // CBA: 2 of 2 right. WBC: 1 of 3 right. Entry price is 110.
        evaluated(&db, "CBA", 1, TradeAction::Buy, 121.0).await;
        evaluated(&db, "CBA", 2, TradeAction::Sell, 99.0).await;
        evaluated(&db, "WBC", 3, TradeAction::Buy, 99.0).await;
        evaluated(&db, "WBC", 4, TradeAction::Buy, 104.5).await;
        evaluated(&db, "WBC", 5, TradeAction::Hold, 110.0).await;

        let tracker = PerformanceTracker::new(db).with_min_samples(2);

        let by_symbol = tracker.accuracy_by_symbol().await.unwrap();
        assert_eq!(by_symbol[0].key, "CBA.AX");
        assert_eq!(by_symbol[0].correct, 2);
        assert_relative_eq!(by_symbol[1].accuracy, 1.0 / 3.0, epsilon = 1e-9);

        let by_action = tracker.accuracy_by_action().await.unwrap();
        let buy = by_action.iter().find(|r| r.key == "BUY").unwrap();
        assert_eq!(buy.evaluated, 3);
        assert_eq!(buy.correct, 1);

        let overview = tracker.performance_overview().await.unwrap();
        assert_eq!(overview.total_predictions, 5);
        assert_eq!(overview.total_evaluated, 5);
        assert_relative_eq!(overview.win_rate, 0.6, epsilon = 1e-9);
        // Returns: +10, -10, -10, -5, 0
        assert_relative_eq!(overview.mean_return, -3.0, epsilon = 1e-9);
        assert_relative_eq!(overview.median_return, -5.0, epsilon = 1e-9);
        assert_eq!(overview.best_symbol.unwrap().key, "CBA.AX");
        assert_eq!(overview.worst_symbol.unwrap().key, "WBC.AX");
    }

    #[tokio::test]
    async fn test_text_returns_left_out_of_averages() {
        let db = memory_db().await;
        evaluated(&db, "CBA", 1, TradeAction::Buy, 121.0).await;
        let legacy = evaluated(&db, "CBA", 2, TradeAction::Buy, 99.0).await;
        sqlx::query("UPDATE outcomes SET actual_return = 'n/a' WHERE prediction_id = ?")
            .bind(&legacy)
            .execute(db.pool())
            .await
            .unwrap();

        let tracker = PerformanceTracker::new(db).with_min_samples(1);
        let by_symbol = tracker.accuracy_by_symbol().await.unwrap();
        assert_eq!(by_symbol[0].evaluated, 2);
        assert_relative_eq!(by_symbol[0].mean_return, 10.0, epsilon = 1e-9);

        let overview = tracker.performance_overview().await.unwrap();
        assert_eq!(overview.total_evaluated, 2);
        assert_relative_eq!(overview.mean_return, 10.0, epsilon = 1e-9);
    }
}
