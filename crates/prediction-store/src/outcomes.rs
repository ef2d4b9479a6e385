use analysis_core::TradeAction;
use chrono::{DateTime, Utc};

use crate::models::{format_timestamp, EvaluatedPrediction, Outcome};
use crate::{returns, validation, PredictionRepository, StoreError, StoreResult, TradingDb};

#[derive(Clone)]
pub struct OutcomeRepository {
    db: TradingDb,
}

impl OutcomeRepository {
    pub fn new(db: TradingDb) -> Self {
        Self { db }
    }

    /// Evaluate a prediction against `exit_price`.
    ///
    /// Return, direction and correctness are derived here; a prediction can
    /// only be evaluated once.
    pub async fn record(
        &self,
        prediction_id: &str,
        exit_price: f64,
        evaluated_at: DateTime<Utc>,
        hold_band_pct: f64,
    ) -> StoreResult<Outcome> {
        let prediction = PredictionRepository::new(self.db.clone())
            .get(prediction_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("prediction {}", prediction_id)))?;

        let action: TradeAction = prediction.predicted_action.parse().map_err(|_| {
            StoreError::Corrupt(format!(
                "prediction {} has action '{}'",
                prediction_id, prediction.predicted_action
            ))
        })?;

        let exit_price = validation::price("exit_price", exit_price)?;
        let actual_return = returns::return_pct(prediction.entry_price, exit_price)?;
        let actual_direction = returns::direction(actual_return, hold_band_pct).as_i64();
        let correct = returns::is_correct(action, actual_return, hold_band_pct);
        let evaluation_timestamp = format_timestamp(evaluated_at);

        let result = sqlx::query(
            r#"
            INSERT INTO outcomes (
                prediction_id, actual_return, actual_direction, entry_price,
                exit_price, evaluation_timestamp, prediction_correct
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(prediction_id)
        .bind(actual_return)
        .bind(actual_direction)
        .bind(prediction.entry_price)
        .bind(exit_price)
        .bind(&evaluation_timestamp)
        .bind(correct)
        .execute(self.db.pool())
        .await;

        let outcome_id = match result {
            Ok(r) => r.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StoreError::Duplicate(format!("outcome for prediction {}", prediction_id)));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            "{} {} evaluated: {:+.2}% ({})",
            prediction.symbol,
            action,
            actual_return,
            if correct { "correct" } else { "wrong" }
        );

        Ok(Outcome {
            outcome_id,
            prediction_id: prediction_id.to_string(),
            actual_return: Some(actual_return),
            actual_direction: Some(actual_direction),
            entry_price: Some(prediction.entry_price),
            exit_price: Some(exit_price),
            evaluation_timestamp,
            prediction_correct: correct,
        })
    }

    pub async fn get_for_prediction(&self, prediction_id: &str) -> StoreResult<Option<Outcome>> {
        let outcome = sqlx::query_as::<_, Outcome>(
            r#"
            SELECT outcome_id, prediction_id, actual_return, actual_direction,
                   entry_price, exit_price, evaluation_timestamp, prediction_correct
            FROM outcomes WHERE prediction_id = ?
            "#,
        )
        .bind(prediction_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(outcome)
    }

    /// Evaluated predictions, most recently evaluated first.
    pub async fn list_with_predictions(&self, limit: i64) -> StoreResult<Vec<EvaluatedPrediction>> {
        let rows = sqlx::query_as::<_, EvaluatedPrediction>(
            r#"
            SELECT p.prediction_id, p.symbol, p.prediction_timestamp, p.predicted_action,
                   p.action_confidence, p.model_version, p.volume_grade,
                   o.entry_price, o.exit_price, o.actual_return, o.actual_direction,
                   o.prediction_correct, o.evaluation_timestamp
            FROM outcomes o
            JOIN predictions p ON p.prediction_id = o.prediction_id
            ORDER BY o.evaluation_timestamp DESC, o.outcome_id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    pub async fn count(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM outcomes")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}
