use analysis_core::TradeAction;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::collections::HashMap;

use crate::features::insert_features_on;
use crate::models::{format_timestamp, NewFeatures, NewPrediction, Prediction};
use crate::{StoreError, StoreResult, TradingDb};

const SELECT_PREDICTION: &str = r#"
    SELECT prediction_id, symbol, prediction_timestamp, predicted_action,
           action_confidence, predicted_direction, predicted_magnitude,
           model_version, entry_price, sentiment_score, technical_score,
           volume_grade, created_at
    FROM predictions
"#;

#[derive(Clone)]
pub struct PredictionRepository {
    db: TradingDb,
}

impl PredictionRepository {
    pub fn new(db: TradingDb) -> Self {
        Self { db }
    }

    /// Validate and insert; returns the prediction id.
    pub async fn insert(&self, prediction: &NewPrediction) -> StoreResult<String> {
        let mut conn = self.db.pool().acquire().await?;
        insert_prediction_on(&mut conn, prediction).await
    }

    /// Insert a prediction and its feature row together; neither is stored
    /// if either is rejected.
    pub async fn insert_with_features(
        &self,
        prediction: &NewPrediction,
        features: &NewFeatures,
    ) -> StoreResult<(String, i64)> {
        let mut tx = self.db.pool().begin().await?;
        let prediction_id = insert_prediction_on(&mut tx, prediction).await?;
        let feature_id = insert_features_on(&mut tx, features).await?;
        tx.commit().await?;
        Ok((prediction_id, feature_id))
    }

    pub async fn get(&self, prediction_id: &str) -> StoreResult<Option<Prediction>> {
        let prediction = sqlx::query_as::<_, Prediction>(&format!("{} WHERE prediction_id = ?", SELECT_PREDICTION))
            .bind(prediction_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(prediction)
    }

    /// Newest first
    pub async fn list_recent(&self, limit: i64) -> StoreResult<Vec<Prediction>> {
        let predictions = sqlx::query_as::<_, Prediction>(&format!(
            "{} ORDER BY prediction_timestamp DESC, created_at DESC LIMIT ?",
            SELECT_PREDICTION
        ))
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(predictions)
    }

    pub async fn list_for_symbol(&self, symbol: &str, limit: i64) -> StoreResult<Vec<Prediction>> {
        let symbol = crate::validation::symbol(symbol)?;
        let predictions = sqlx::query_as::<_, Prediction>(&format!(
            "{} WHERE symbol = ? ORDER BY prediction_timestamp DESC LIMIT ?",
            SELECT_PREDICTION
        ))
        .bind(symbol.as_str())
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(predictions)
    }

    /// Predictions made before `before` that have no outcome yet, oldest first.
    pub async fn pending(&self, before: DateTime<Utc>) -> StoreResult<Vec<Prediction>> {
        let predictions = sqlx::query_as::<_, Prediction>(
            r#"
            SELECT p.prediction_id, p.symbol, p.prediction_timestamp, p.predicted_action,
                   p.action_confidence, p.predicted_direction, p.predicted_magnitude,
                   p.model_version, p.entry_price, p.sentiment_score, p.technical_score,
                   p.volume_grade, p.created_at
            FROM predictions p
            LEFT JOIN outcomes o ON o.prediction_id = p.prediction_id
            WHERE o.outcome_id IS NULL AND p.prediction_timestamp <= ?
            ORDER BY p.prediction_timestamp ASC
            "#,
        )
        .bind(format_timestamp(before))
        .fetch_all(self.db.pool())
        .await?;

        Ok(predictions)
    }

    /// Counts per action over the `limit` most recent predictions.
    pub async fn count_by_action(&self, limit: i64) -> StoreResult<HashMap<TradeAction, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT predicted_action, COUNT(*)
            FROM (
                SELECT predicted_action FROM predictions
                ORDER BY prediction_timestamp DESC
                LIMIT ?
            )
            GROUP BY predicted_action
            "#,
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        let mut counts: HashMap<TradeAction, i64> = TradeAction::ALL.iter().map(|a| (*a, 0)).collect();
        for (action, count) in rows {
            match action.parse::<TradeAction>() {
                Ok(action) => *counts.entry(action).or_insert(0) += count,
                Err(_) => tracing::warn!("Ignoring {} predictions with unknown action '{}'", count, action),
            }
        }
        Ok(counts)
    }

    pub async fn count(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM predictions")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}

/// Validate and insert on `conn`, so callers can share a transaction.
pub(crate) async fn insert_prediction_on(conn: &mut SqliteConnection, prediction: &NewPrediction) -> StoreResult<String> {
    let symbol = prediction.validate().map_err(|e| {
        tracing::warn!("Rejected prediction for {}: {}", prediction.symbol, e);
        e
    })?;

    let prediction_id = prediction
        .prediction_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let timestamp = format_timestamp(prediction.prediction_timestamp);

    let result = sqlx::query(
        r#"
        INSERT INTO predictions (
            prediction_id, symbol, prediction_timestamp, predicted_action,
            action_confidence, predicted_direction, predicted_magnitude,
            model_version, entry_price, sentiment_score, technical_score, volume_grade
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&prediction_id)
    .bind(symbol.as_str())
    .bind(&timestamp)
    .bind(prediction.predicted_action.as_str())
    .bind(prediction.action_confidence)
    .bind(prediction.predicted_direction)
    .bind(prediction.predicted_magnitude)
    .bind(prediction.model_version.trim())
    .bind(prediction.entry_price)
    .bind(prediction.sentiment_score)
    .bind(prediction.technical_score)
    .bind(&prediction.volume_grade)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(prediction_id),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Duplicate(format!(
            "prediction for {} at {}",
            symbol, timestamp
        ))),
        Err(e) => Err(e.into()),
    }
}
