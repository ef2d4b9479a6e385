//! Read-only invariant checks over the whole database.

use analysis_core::{AsxSymbol, TradeAction};
use serde::Serialize;

use crate::repair::{sentinel_list, NUMERIC_COLUMNS};
use crate::{returns, StoreResult, TradingDb};

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub predictions: i64,
    pub outcomes: i64,
    pub enhanced_features: i64,
    pub enhanced_outcomes: i64,
    pub invalid_symbols: i64,
    pub unknown_actions: i64,
    pub direction_mismatches: i64,
    pub confidence_out_of_range: i64,
    pub bad_entry_prices: i64,
    pub numeric_text_values: i64,
    pub sentinel_values: i64,
    pub inconsistent_returns: i64,
    pub orphan_outcomes: i64,
}

impl AuditReport {
    pub fn violations(&self) -> i64 {
        self.invalid_symbols
            + self.unknown_actions
            + self.direction_mismatches
            + self.confidence_out_of_range
            + self.bad_entry_prices
            + self.numeric_text_values
            + self.sentinel_values
            + self.inconsistent_returns
            + self.orphan_outcomes
    }

    pub fn is_clean(&self) -> bool {
        self.violations() == 0
    }
}

async fn scalar(db: &TradingDb, sql: &str) -> StoreResult<i64> {
    let (value,): (i64,) = sqlx::query_as(sql).fetch_one(db.pool()).await?;
    Ok(value)
}

pub async fn audit(db: &TradingDb) -> StoreResult<AuditReport> {
    let sentinels = sentinel_list();
    let mut report = AuditReport {
        predictions: scalar(db, "SELECT COUNT(*) FROM predictions").await?,
        outcomes: scalar(db, "SELECT COUNT(*) FROM outcomes").await?,
        enhanced_features: scalar(db, "SELECT COUNT(*) FROM enhanced_features").await?,
        enhanced_outcomes: scalar(db, "SELECT COUNT(*) FROM enhanced_outcomes").await?,
        ..Default::default()
    };

    let symbols: Vec<(String, i64)> = sqlx::query_as(
        "SELECT symbol, COUNT(*) FROM predictions GROUP BY symbol \
         UNION ALL SELECT symbol, COUNT(*) FROM enhanced_features GROUP BY symbol",
    )
    .fetch_all(db.pool())
    .await?;
    report.invalid_symbols = symbols
        .iter()
        .filter(|(s, _)| AsxSymbol::parse(s).map(|p| p.as_str() != s).unwrap_or(true))
        .map(|(_, n)| n)
        .sum();

    let actions: Vec<(String, i64, i64)> = sqlx::query_as(
        "SELECT predicted_action, CAST(predicted_direction AS INTEGER), COUNT(*) \
         FROM predictions GROUP BY predicted_action, predicted_direction",
    )
    .fetch_all(db.pool())
    .await?;
    for (action, direction, n) in actions {
        match action.parse::<TradeAction>() {
            Ok(a) if a.as_str() == action => {
                if a.direction().as_i64() != direction {
                    report.direction_mismatches += n;
                }
            }
            _ => report.unknown_actions += n,
        }
    }

    report.confidence_out_of_range = scalar(
        db,
        "SELECT COUNT(*) FROM predictions WHERE typeof(action_confidence) IN ('real', 'integer') \
         AND (action_confidence < 0 OR action_confidence > 1)",
    )
    .await?;

    report.bad_entry_prices = scalar(
        db,
        &format!(
            "SELECT COUNT(*) FROM predictions WHERE typeof(entry_price) NOT IN ('real', 'integer') \
             OR entry_price <= 0 OR entry_price IN ({sentinels})"
        ),
    )
    .await?;

    for &(table, column, _, _) in NUMERIC_COLUMNS {
        report.numeric_text_values += scalar(
            db,
            &format!("SELECT COUNT(*) FROM {table} WHERE typeof({column}) = 'text'"),
        )
        .await?;
        report.sentinel_values += scalar(
            db,
            &format!("SELECT COUNT(*) FROM {table} WHERE {column} IN ({sentinels})"),
        )
        .await?;
    }
    // Sentinel entry prices are already counted as bad prices
    report.sentinel_values -= scalar(
        db,
        &format!("SELECT COUNT(*) FROM predictions WHERE entry_price IN ({sentinels})"),
    )
    .await?;

    let returns_rows: Vec<(Option<f64>, Option<f64>, Option<f64>)> = sqlx::query_as(
        "SELECT o.entry_price, o.exit_price, o.actual_return FROM outcomes o \
         WHERE typeof(o.entry_price) IN ('real', 'integer', 'null') \
           AND typeof(o.exit_price) IN ('real', 'integer', 'null') \
           AND typeof(o.actual_return) IN ('real', 'integer', 'null')",
    )
    .fetch_all(db.pool())
    .await?;
    report.inconsistent_returns = returns_rows
        .iter()
        .filter(|(entry, exit, stored)| match (entry, exit, stored) {
            (Some(entry), Some(exit), Some(stored)) => !returns::is_consistent(*entry, *exit, *stored),
            (Some(_), Some(_), None) => true,
            _ => false,
        })
        .count() as i64;

    report.orphan_outcomes = scalar(
        db,
        "SELECT COUNT(*) FROM outcomes o LEFT JOIN predictions p ON p.prediction_id = o.prediction_id \
         WHERE p.prediction_id IS NULL",
    )
    .await?;

    if report.is_clean() {
        tracing::info!("Audit clean: {} predictions, {} outcomes", report.predictions, report.outcomes);
    } else {
        tracing::warn!("Audit found {} violations", report.violations());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, sample_prediction};
    use crate::{OutcomeRepository, PredictionRepository, Repairer};
    use chrono::Utc;

    #[tokio::test]
    async fn test_clean_database() {
        let db = memory_db().await;
        let id = PredictionRepository::new(db.clone())
            .insert(&sample_prediction())
            .await
            .unwrap();
        OutcomeRepository::new(db.clone())
            .record(&id, 112.0, Utc::now(), 0.5)
            .await
            .unwrap();

        let report = audit(&db).await.unwrap();
        assert_eq!(report.predictions, 1);
        assert_eq!(report.outcomes, 1);
        assert!(report.is_clean(), "{:?}", report);
    }

    #[tokio::test]
    async fn test_legacy_corruption_counted_then_repaired() {
        let db = memory_db().await;
        sqlx::query(
            "INSERT INTO predictions (prediction_id, symbol, prediction_timestamp, predicted_action, \
             action_confidence, predicted_direction, predicted_magnitude, model_version, entry_price, sentiment_score) \
             VALUES ('a', 'CBA', '2024-01-01T00:00:00Z', 'BUY', 1.4, -1, 0, 'legacy', 0, -9999), \
                    ('b', 'WBC.AX', '2024-01-01T00:00:00Z', 'STRONG_BUY', 0.5, 1, 0, 'legacy', '1,027.50', NULL)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO outcomes (prediction_id, actual_return, entry_price, exit_price, evaluation_timestamp) \
             VALUES ('b', 0.02, 1027.5, 1048.05, '2024-01-02T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let report = audit(&db).await.unwrap();
        assert_eq!(report.invalid_symbols, 1); // 'CBA' lacks .AX
        assert_eq!(report.unknown_actions, 1);
        assert_eq!(report.direction_mismatches, 1);
        assert_eq!(report.confidence_out_of_range, 1);
        assert_eq!(report.bad_entry_prices, 2); // zero and text
        assert_eq!(report.numeric_text_values, 1);
        assert_eq!(report.sentinel_values, 1);
        assert_eq!(report.inconsistent_returns, 1);

        Repairer::new(db.clone(), 0.5).run().await.unwrap();
        let after = audit(&db).await.unwrap();
        assert_eq!(after.numeric_text_values, 0);
        assert_eq!(after.sentinel_values, 0);
        assert_eq!(after.inconsistent_returns, 0);
        assert_eq!(after.bad_entry_prices, 1); // zero price needs a lookup
    }
}
