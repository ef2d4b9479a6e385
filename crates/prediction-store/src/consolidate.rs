//! Merging divergent copies of the trading database.

use serde::Serialize;
use sqlx::{Connection, SqliteConnection};
use std::path::Path;

use crate::db::file_path;
use crate::{StoreError, StoreResult, TradingDb};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub predictions: i64,
    pub outcomes: i64,
    pub enhanced_features: i64,
    pub enhanced_outcomes: i64,
}

impl TableCounts {
    pub async fn load(db: &TradingDb) -> StoreResult<Self> {
        let (predictions, outcomes, enhanced_features, enhanced_outcomes): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT (SELECT COUNT(*) FROM predictions),
                       (SELECT COUNT(*) FROM outcomes),
                       (SELECT COUNT(*) FROM enhanced_features),
                       (SELECT COUNT(*) FROM enhanced_outcomes)
                "#,
            )
            .fetch_one(db.pool())
            .await?;

        Ok(Self {
            predictions,
            outcomes,
            enhanced_features,
            enhanced_outcomes,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountComparison {
    pub local: TableCounts,
    pub other: TableCounts,
}

impl CountComparison {
    pub fn diverged(&self) -> bool {
        self.local != self.other
    }

    /// (table, local, other) for every table whose counts differ.
    pub fn differences(&self) -> Vec<(&'static str, i64, i64)> {
        let (l, o) = (&self.local, &self.other);
        [
            ("predictions", l.predictions, o.predictions),
            ("outcomes", l.outcomes, o.outcomes),
            ("enhanced_features", l.enhanced_features, o.enhanced_features),
            ("enhanced_outcomes", l.enhanced_outcomes, o.enhanced_outcomes),
        ]
        .into_iter()
        .filter(|(_, a, b)| a != b)
        .collect()
    }
}

pub async fn compare_counts(local: &TradingDb, other: &TradingDb) -> StoreResult<CountComparison> {
    let comparison = CountComparison {
        local: TableCounts::load(local).await?,
        other: TableCounts::load(other).await?,
    };
    if comparison.diverged() {
        for (table, a, b) in comparison.differences() {
            tracing::warn!("{} diverged: local {} vs other {}", table, a, b);
        }
    }
    Ok(comparison)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub source: String,
    pub predictions_considered: i64,
    pub predictions_inserted: u64,
    /// Already present by id or by (symbol, timestamp)
    pub predictions_skipped: u64,
    pub outcomes_inserted: u64,
}

/// Copy predictions (and their outcomes) from another database file that
/// are missing here. Running it twice inserts nothing the second time.
pub async fn merge_from(db: &TradingDb, other: &str) -> StoreResult<MergeReport> {
    let other_path = file_path(other);
    if !Path::new(other_path).exists() {
        return Err(StoreError::NotFound(format!("database file {}", other_path)));
    }

    // ATTACH is per connection, so everything runs on this one
    let mut conn = db.pool().acquire().await?;
    sqlx::query("ATTACH DATABASE ? AS other")
        .bind(other_path)
        .execute(&mut *conn)
        .await?;

    let result = copy_missing(&mut conn).await;

    // A connection still holding the attachment must not go back to the pool
    if let Err(e) = sqlx::query("DETACH DATABASE other").execute(&mut *conn).await {
        tracing::warn!("Could not detach {}: {}", other_path, e);
        conn.close_on_drop();
        result?;
        return Err(e.into());
    }

    let mut report = result?;
    report.source = other_path.to_string();
    tracing::info!(
        "Merged {}: {} predictions inserted, {} skipped, {} outcomes inserted",
        report.source,
        report.predictions_inserted,
        report.predictions_skipped,
        report.outcomes_inserted
    );
    Ok(report)
}

/// SQL form of the `AsxSymbol` normalisation: trimmed, upper case, `.AX` suffix.
fn normalised_symbol(column: &str) -> String {
    format!(
        "CASE WHEN upper(trim({column})) LIKE '%.AX' THEN upper(trim({column})) \
         ELSE upper(trim({column})) || '.AX' END"
    )
}

async fn copy_missing(conn: &mut SqliteConnection) -> StoreResult<MergeReport> {
    let mut tx = conn.begin().await?;

    let (considered,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM other.predictions")
        .fetch_one(&mut *tx)
        .await?;

    let (other_symbol, main_symbol) = (normalised_symbol("o.symbol"), normalised_symbol("p.symbol"));
    let inserted = sqlx::query(&format!(
        r#"
        INSERT OR IGNORE INTO main.predictions (
            prediction_id, symbol, prediction_timestamp, predicted_action,
            action_confidence, predicted_direction, predicted_magnitude,
            model_version, entry_price, sentiment_score, technical_score,
            volume_grade, created_at
        )
        SELECT o.prediction_id, {other_symbol}, o.prediction_timestamp, o.predicted_action,
               o.action_confidence, o.predicted_direction, o.predicted_magnitude,
               o.model_version, o.entry_price, o.sentiment_score, o.technical_score,
               o.volume_grade, o.created_at
        FROM other.predictions o
        WHERE NOT EXISTS (
            SELECT 1 FROM main.predictions p
            WHERE p.prediction_id = o.prediction_id
               OR ({main_symbol} = {other_symbol} AND p.prediction_timestamp = o.prediction_timestamp)
        )
        ORDER BY o.prediction_timestamp
        "#
    ))
    .execute(&mut *tx)
    .await?
    .rows_affected();

    // Outcomes whose prediction now exists here and has not been evaluated here
    let outcomes_inserted = sqlx::query(
        r#"
        INSERT INTO main.outcomes (
            prediction_id, actual_return, actual_direction, entry_price,
            exit_price, evaluation_timestamp, prediction_correct
        )
        SELECT o.prediction_id, o.actual_return, o.actual_direction, o.entry_price,
               o.exit_price, o.evaluation_timestamp, o.prediction_correct
        FROM other.outcomes o
        JOIN main.predictions p ON p.prediction_id = o.prediction_id
        WHERE NOT EXISTS (SELECT 1 FROM main.outcomes m WHERE m.prediction_id = o.prediction_id)
        "#,
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    Ok(MergeReport {
        source: String::new(),
        predictions_considered: considered,
        predictions_inserted: inserted,
        predictions_skipped: (considered as u64).saturating_sub(inserted),
        outcomes_inserted,
    })
}
