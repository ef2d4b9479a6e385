use sqlx::SqliteConnection;

use crate::models::{format_timestamp, EnhancedFeatures, EnhancedOutcome, NewEnhancedOutcome, NewFeatures};
use crate::{returns, validation, StoreError, StoreResult, TradingDb};

/// Band used to label the hindsight-optimal action of a 1d return.
pub const OPTIMAL_ACTION_BAND_PCT: f64 = 0.5;

const SELECT_FEATURES: &str = r#"
    SELECT f.id, f.symbol, f.timestamp, f.current_price, f.rsi, f.macd, f.macd_signal,
           f.macd_histogram, f.sma_20, f.sma_50, f.volatility, f.volume_ratio,
           f.sentiment_score, f.news_count, f.technical_score
    FROM enhanced_features f
"#;

#[derive(Clone)]
pub struct FeatureRepository {
    db: TradingDb,
}

/// Return and direction for one horizon, both `None` without an exit price.
fn horizon(entry: f64, exit: Option<f64>) -> StoreResult<(Option<f64>, Option<i64>)> {
    match exit {
        Some(exit) => {
            let pct = returns::return_pct(entry, exit)?;
            Ok((Some(pct), Some(returns::direction(pct, 0.0).as_i64())))
        }
        None => Ok((None, None)),
    }
}

impl FeatureRepository {
    pub fn new(db: TradingDb) -> Self {
        Self { db }
    }

    pub async fn insert_features(&self, features: &NewFeatures) -> StoreResult<i64> {
        let mut conn = self.db.pool().acquire().await?;
        insert_features_on(&mut conn, features).await
    }

    pub async fn get_features(&self, id: i64) -> StoreResult<Option<EnhancedFeatures>> {
        let features = sqlx::query_as::<_, EnhancedFeatures>(&format!("{} WHERE f.id = ?", SELECT_FEATURES))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(features)
    }

    /// Record exit prices for a feature row; entry is the feature's price.
    pub async fn insert_outcome(&self, outcome: &NewEnhancedOutcome) -> StoreResult<i64> {
        let features = self
            .get_features(outcome.feature_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("feature row {}", outcome.feature_id)))?;

        if let Some(c) = outcome.confidence_score {
            validation::unit_interval("confidence_score", c)?;
        }

        let entry = features.current_price;
        let (return_1h, direction_1h) = horizon(entry, outcome.exit_price_1h)?;
        let (return_4h, direction_4h) = horizon(entry, outcome.exit_price_4h)?;
        let (return_1d, direction_1d) = horizon(entry, outcome.exit_price_1d)?;
        let optimal_action = return_1d.map(|r| returns::optimal_action(r, OPTIMAL_ACTION_BAND_PCT).as_str());

        let result = sqlx::query(
            r#"
            INSERT INTO enhanced_outcomes (
                feature_id, symbol, prediction_timestamp, entry_price,
                exit_price_1h, exit_price_4h, exit_price_1d,
                return_pct_1h, return_pct_4h, return_pct_1d,
                direction_1h, direction_4h, direction_1d,
                optimal_action, confidence_score, is_synthetic
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(features.id)
        .bind(&features.symbol)
        .bind(&features.timestamp)
        .bind(entry)
        .bind(outcome.exit_price_1h)
        .bind(outcome.exit_price_4h)
        .bind(outcome.exit_price_1d)
        .bind(return_1h)
        .bind(return_4h)
        .bind(return_1d)
        .bind(direction_1h)
        .bind(direction_4h)
        .bind(direction_1d)
        .bind(optimal_action)
        .bind(outcome.confidence_score)
        .bind(outcome.is_synthetic)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(r) => Ok(r.last_insert_rowid()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Duplicate(format!(
                "outcome for feature row {}",
                outcome.feature_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Feature rows that have no enhanced outcome yet, oldest first.
    pub async fn features_without_outcomes(&self, limit: i64) -> StoreResult<Vec<EnhancedFeatures>> {
        let rows = sqlx::query_as::<_, EnhancedFeatures>(&format!(
            r#"{}
            LEFT JOIN enhanced_outcomes o ON o.feature_id = f.id
            WHERE o.id IS NULL
            ORDER BY f.timestamp ASC
            LIMIT ?"#,
            SELECT_FEATURES
        ))
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    pub async fn list_outcomes(&self, limit: i64, include_synthetic: bool) -> StoreResult<Vec<EnhancedOutcome>> {
        let rows = sqlx::query_as::<_, EnhancedOutcome>(
            r#"
            SELECT id, feature_id, symbol, prediction_timestamp, entry_price,
                   exit_price_1h, exit_price_4h, exit_price_1d,
                   return_pct_1h, return_pct_4h, return_pct_1d,
                   direction_1h, direction_4h, direction_1d,
                   optimal_action, confidence_score, is_synthetic
            FROM enhanced_outcomes
            WHERE is_synthetic = 0 OR ?
            ORDER BY prediction_timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(include_synthetic)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }
}

pub(crate) async fn insert_features_on(conn: &mut SqliteConnection, features: &NewFeatures) -> StoreResult<i64> {
    let symbol = features.validate().map_err(|e| {
        tracing::warn!("Rejected features for {}: {}", features.symbol, e);
        e
    })?;

    let result = sqlx::query(
        r#"
        INSERT INTO enhanced_features (
            symbol, timestamp, current_price, rsi, macd, macd_signal, macd_histogram,
            sma_20, sma_50, volatility, volume_ratio, sentiment_score, news_count,
            technical_score
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(symbol.as_str())
    .bind(format_timestamp(features.timestamp))
    .bind(features.current_price)
    .bind(features.rsi)
    .bind(features.macd)
    .bind(features.macd_signal)
    .bind(features.macd_histogram)
    .bind(features.sma_20)
    .bind(features.sma_50)
    .bind(features.volatility)
    .bind(features.volume_ratio)
    .bind(features.sentiment_score)
    .bind(features.news_count)
    .bind(features.technical_score)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use crate::ValidationError;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn features(symbol: &str, price: f64) -> NewFeatures {
        NewFeatures {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            current_price: price,
            rsi: Some(48.0),
            sentiment_score: Some(0.1),
            technical_score: Some(-0.2),
            news_count: 3,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_features_normalises_symbol() {
        let repo = FeatureRepository::new(memory_db().await);
        let id = repo.insert_features(&features("bOq", 6.2)).await.unwrap();

        let stored = repo.get_features(id).await.unwrap().unwrap();
        assert_eq!(stored.symbol, "BOQ.AX");
        assert_eq!(stored.macd, None);
        assert_eq!(stored.news_count, 3);
    }

    #[tokio::test]
    async fn test_sentinel_features_rejected() {
        let repo = FeatureRepository::new(memory_db().await);
        let bad = NewFeatures {
            volatility: Some(-999.0),
            ..features("BEN", 12.0)
        };
        assert!(matches!(
            repo.insert_features(&bad).await,
            Err(StoreError::Validation(ValidationError::Sentinel { field: "volatility", .. }))
        ));
    }

    #[tokio::test]
    async fn test_outcome_returns_derived_from_feature_price() {
        let repo = FeatureRepository::new(memory_db().await);
        let id = repo.insert_features(&features("BEN", 12.0)).await.unwrap();

        repo.insert_outcome(&NewEnhancedOutcome {
            feature_id: id,
            exit_price_1h: Some(12.06),
            exit_price_4h: None,
            exit_price_1d: Some(11.7),
            confidence_score: Some(0.6),
            is_synthetic: false,
        })
        .await
        .unwrap();

        let outcomes = repo.list_outcomes(10, true).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        let o = &outcomes[0];
        assert_relative_eq!(o.return_pct_1h.unwrap(), 0.5, epsilon = 1e-9);
        assert_eq!(o.return_pct_4h, None);
        assert_relative_eq!(o.return_pct_1d.unwrap(), -2.5, epsilon = 1e-9);
        assert_eq!(o.direction_1d, Some(-1));
        assert_eq!(o.optimal_action.as_deref(), Some("SELL"));
        assert!(!o.is_synthetic);

        assert!(repo.features_without_outcomes(10).await.unwrap().is_empty());
        assert!(matches!(
            repo.insert_outcome(&NewEnhancedOutcome {
                feature_id: id,
                ..Default::default()
            })
            .await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_synthetic_filter_and_pending_features() {
        let repo = FeatureRepository::new(memory_db().await);
        let a = repo.insert_features(&features("NAB", 30.0)).await.unwrap();
        repo.insert_features(&features("NAB", 31.0)).await.unwrap();

        repo.insert_outcome(&NewEnhancedOutcome {
            feature_id: a,
            exit_price_1d: Some(30.3),
            is_synthetic: true,
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(repo.list_outcomes(10, false).await.unwrap().len(), 0);
        assert_eq!(repo.list_outcomes(10, true).await.unwrap().len(), 1);
        assert_eq!(repo.features_without_outcomes(10).await.unwrap().len(), 1);
    }
}
