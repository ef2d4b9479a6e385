//! Repairs rows written before validation existed.
//!
//! Every pass runs inside one transaction; a dry run rolls it back, so the
//! report counts exactly what a real run would change.

use analysis_core::{AnalysisError, TradeAction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;

use crate::models::parse_timestamp;
use crate::validation::{self, is_sentinel, SENTINELS};
use crate::{returns, StoreResult, TradingDb, ValidationError};

/// Values a repaired column may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnRange {
    Any,
    Price,
    NonNegative,
    Unit,
    SignedUnit,
    Percent,
}

impl ColumnRange {
    fn check(self, field: &'static str, value: f64) -> Result<f64, ValidationError> {
        let bounded = |lo: f64, hi: f64| -> Result<f64, ValidationError> {
            let value = validation::finite(field, value)?;
            if (lo..=hi).contains(&value) {
                Ok(value)
            } else {
                Err(ValidationError::OutOfRange { field, value })
            }
        };
        match self {
            ColumnRange::Any => validation::finite(field, value),
            ColumnRange::Price => validation::price(field, value),
            ColumnRange::NonNegative => bounded(0.0, f64::MAX),
            ColumnRange::Unit => validation::unit_interval(field, value),
            ColumnRange::SignedUnit => validation::signed_unit(field, value),
            ColumnRange::Percent => bounded(0.0, 100.0),
        }
    }
}

/// (table, column, nullable, range)
pub(crate) const NUMERIC_COLUMNS: &[(&str, &str, bool, ColumnRange)] = &[
    ("predictions", "action_confidence", false, ColumnRange::Unit),
    ("predictions", "predicted_magnitude", false, ColumnRange::Any),
    ("predictions", "entry_price", false, ColumnRange::Price),
    ("predictions", "sentiment_score", true, ColumnRange::SignedUnit),
    ("predictions", "technical_score", true, ColumnRange::SignedUnit),
    ("outcomes", "actual_return", true, ColumnRange::Any),
    ("outcomes", "entry_price", true, ColumnRange::Price),
    ("outcomes", "exit_price", true, ColumnRange::Price),
    ("enhanced_features", "current_price", false, ColumnRange::Price),
    ("enhanced_features", "rsi", true, ColumnRange::Percent),
    ("enhanced_features", "macd", true, ColumnRange::Any),
    ("enhanced_features", "macd_signal", true, ColumnRange::Any),
    ("enhanced_features", "macd_histogram", true, ColumnRange::Any),
    ("enhanced_features", "sma_20", true, ColumnRange::Price),
    ("enhanced_features", "sma_50", true, ColumnRange::Price),
    ("enhanced_features", "volatility", true, ColumnRange::NonNegative),
    ("enhanced_features", "volume_ratio", true, ColumnRange::NonNegative),
    ("enhanced_features", "sentiment_score", true, ColumnRange::SignedUnit),
    ("enhanced_features", "technical_score", true, ColumnRange::SignedUnit),
    ("enhanced_outcomes", "entry_price", false, ColumnRange::Price),
    ("enhanced_outcomes", "exit_price_1h", true, ColumnRange::Price),
    ("enhanced_outcomes", "exit_price_4h", true, ColumnRange::Price),
    ("enhanced_outcomes", "exit_price_1d", true, ColumnRange::Price),
    ("enhanced_outcomes", "return_pct_1h", true, ColumnRange::Any),
    ("enhanced_outcomes", "return_pct_4h", true, ColumnRange::Any),
    ("enhanced_outcomes", "return_pct_1d", true, ColumnRange::Any),
    ("enhanced_outcomes", "confidence_score", true, ColumnRange::Unit),
];

pub(crate) fn sentinel_list() -> String {
    SENTINELS.iter().map(|s| format!("{:.1}", s)).collect::<Vec<_>>().join(", ")
}

/// Historical close used to backfill missing entry prices.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn close_on(&self, symbol: &str, at: DateTime<Utc>) -> Result<Option<f64>, AnalysisError>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub dry_run: bool,
    /// Text values such as "1,234.5" converted to numbers
    pub numeric_text_fixed: u64,
    /// Unparseable or out-of-range text in nullable columns set to NULL
    pub numeric_text_nulled: u64,
    /// Unparseable or out-of-range text in required columns, left in place
    pub unparseable: Vec<String>,
    pub sentinels_nulled: u64,
    pub entry_prices_backfilled: u64,
    /// Predictions whose entry price could not be recovered
    pub unresolved_entry_prices: Vec<String>,
    /// Feature prices and enhanced outcome entry prices restored
    pub feature_prices_backfilled: u64,
    /// Sentinels left in required columns with no source to restore them from
    pub unresolved_sentinels: Vec<String>,
    pub outcomes_recomputed: u64,
    pub enhanced_outcomes_recomputed: u64,
}

impl RepairReport {
    pub fn total_changes(&self) -> u64 {
        self.numeric_text_fixed
            + self.numeric_text_nulled
            + self.sentinels_nulled
            + self.entry_prices_backfilled
            + self.feature_prices_backfilled
            + self.outcomes_recomputed
            + self.enhanced_outcomes_recomputed
    }
}

/// Parse legacy numeric text: thousands separators, decimal commas, stray
/// `$` and whitespace.
///
/// A single comma followed by one or two digits and no `.` is a decimal
/// comma ("0,72"); any other comma is a thousands separator ("1,234.5").
pub fn parse_legacy_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let decimal_comma = !cleaned.contains('.')
        && cleaned.matches(',').count() == 1
        && cleaned
            .rsplit_once(',')
            .is_some_and(|(_, tail)| (1..=2).contains(&tail.len()) && tail.chars().all(|c| c.is_ascii_digit()));
    let normalised = if decimal_comma {
        cleaned.replace(',', ".")
    } else {
        cleaned.replace(',', "")
    };
    normalised.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub struct Repairer {
    db: TradingDb,
    dry_run: bool,
    hold_band_pct: f64,
    price_lookup: Option<Arc<dyn PriceLookup>>,
}

impl Repairer {
    pub fn new(db: TradingDb, hold_band_pct: f64) -> Self {
        Self {
            db,
            dry_run: false,
            hold_band_pct,
            price_lookup: None,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_price_lookup(mut self, lookup: Arc<dyn PriceLookup>) -> Self {
        self.price_lookup = Some(lookup);
        self
    }

    pub async fn run(&self) -> StoreResult<RepairReport> {
        let mut report = RepairReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        let mut tx = self.db.pool().begin().await?;

        self.fix_numeric_text(&mut tx, &mut report).await?;
        self.null_sentinels(&mut tx, &mut report).await?;
        self.backfill_entry_prices(&mut tx, &mut report).await?;
        self.backfill_feature_prices(&mut tx, &mut report).await?;
        self.report_required_sentinels(&mut tx, &mut report).await?;
        self.recompute_outcomes(&mut tx, &mut report).await?;
        self.recompute_enhanced_outcomes(&mut tx, &mut report).await?;

        if self.dry_run {
            tx.rollback().await?;
            tracing::info!("Repair dry run: {} changes would be made", report.total_changes());
        } else {
            tx.commit().await?;
            tracing::info!("Repair applied {} changes", report.total_changes());
        }

        Ok(report)
    }

    async fn fix_numeric_text(&self, tx: &mut Transaction<'_, Sqlite>, report: &mut RepairReport) -> StoreResult<()> {
        for &(table, column, nullable, range) in NUMERIC_COLUMNS {
            let rows: Vec<(i64, String)> = sqlx::query_as(&format!(
                "SELECT rowid, CAST({column} AS TEXT) FROM {table} WHERE typeof({column}) = 'text'"
            ))
            .fetch_all(&mut **tx)
            .await?;

            for (rowid, raw) in rows {
                let parsed = parse_legacy_number(&raw).map(|v| range.check(column, v));
                if let Some(Err(e)) = &parsed {
                    tracing::warn!("{}.{} row {}: '{}' parses but {}", table, column, rowid, raw, e);
                }
                match parsed.and_then(Result::ok) {
                    Some(value) => {
                        sqlx::query(&format!("UPDATE {table} SET {column} = ? WHERE rowid = ?"))
                            .bind(value)
                            .bind(rowid)
                            .execute(&mut **tx)
                            .await?;
                        report.numeric_text_fixed += 1;
                    }
                    None if nullable => {
                        sqlx::query(&format!("UPDATE {table} SET {column} = NULL WHERE rowid = ?"))
                            .bind(rowid)
                            .execute(&mut **tx)
                            .await?;
                        report.numeric_text_nulled += 1;
                    }
                    None => {
                        tracing::warn!("{}.{} row {} holds unusable '{}'", table, column, rowid, raw);
                        report.unparseable.push(format!("{}.{} row {}: '{}'", table, column, rowid, raw));
                    }
                }
            }
        }
        Ok(())
    }

    async fn null_sentinels(&self, tx: &mut Transaction<'_, Sqlite>, report: &mut RepairReport) -> StoreResult<()> {
        let sentinels = sentinel_list();
        for &(table, column, nullable, _) in NUMERIC_COLUMNS {
            if !nullable {
                continue;
            }
            let result = sqlx::query(&format!(
                "UPDATE {table} SET {column} = NULL WHERE {column} IN ({sentinels})"
            ))
            .execute(&mut **tx)
            .await?;
            report.sentinels_nulled += result.rows_affected();
        }
        Ok(())
    }

    async fn backfill_entry_prices(&self, tx: &mut Transaction<'_, Sqlite>, report: &mut RepairReport) -> StoreResult<()> {
        let rows: Vec<(String, String, String, f64)> = sqlx::query_as(&format!(
            r#"
            SELECT prediction_id, symbol, prediction_timestamp, entry_price
            FROM predictions
            WHERE typeof(entry_price) IN ('real', 'integer')
              AND (entry_price <= 0 OR entry_price IN ({}))
            "#,
            sentinel_list()
        ))
        .fetch_all(&mut **tx)
        .await?;

        for (prediction_id, symbol, timestamp, bad_price) in rows {
            let price = match (&self.price_lookup, parse_timestamp(&timestamp)) {
                (Some(lookup), Some(at)) => match lookup.close_on(&symbol, at).await {
                    Ok(price) => price.filter(|p| p.is_finite() && *p > 0.0 && !is_sentinel(*p)),
                    Err(e) => {
                        tracing::warn!("Price lookup for {} at {} failed: {}", symbol, timestamp, e);
                        None
                    }
                },
                _ => None,
            };

            match price {
                Some(price) => {
                    sqlx::query("UPDATE predictions SET entry_price = ? WHERE prediction_id = ?")
                        .bind(price)
                        .bind(&prediction_id)
                        .execute(&mut **tx)
                        .await?;
                    report.entry_prices_backfilled += 1;
                }
                None => {
                    tracing::warn!("No entry price for {} ({} had {})", prediction_id, symbol, bad_price);
                    report.unresolved_entry_prices.push(prediction_id);
                }
            }
        }
        Ok(())
    }

    async fn backfill_feature_prices(&self, tx: &mut Transaction<'_, Sqlite>, report: &mut RepairReport) -> StoreResult<()> {
        let sentinels = sentinel_list();
        let rows: Vec<(i64, String, String)> = sqlx::query_as(&format!(
            r#"
            SELECT id, symbol, timestamp
            FROM enhanced_features
            WHERE typeof(current_price) IN ('real', 'integer')
              AND (current_price <= 0 OR current_price IN ({sentinels}))
            "#
        ))
        .fetch_all(&mut **tx)
        .await?;

        for (id, symbol, timestamp) in rows {
            let (Some(lookup), Some(at)) = (&self.price_lookup, parse_timestamp(&timestamp)) else {
                continue;
            };
            let price = match lookup.close_on(&symbol, at).await {
                Ok(price) => price.filter(|p| p.is_finite() && *p > 0.0 && !is_sentinel(*p)),
                Err(e) => {
                    tracing::warn!("Price lookup for {} at {} failed: {}", symbol, timestamp, e);
                    None
                }
            };
            if let Some(price) = price {
                sqlx::query("UPDATE enhanced_features SET current_price = ? WHERE id = ?")
                    .bind(price)
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                report.feature_prices_backfilled += 1;
            }
        }

        // An outcome's entry is its feature row's price
        let restored = sqlx::query(&format!(
            r#"
            UPDATE enhanced_outcomes
            SET entry_price = (SELECT f.current_price FROM enhanced_features f WHERE f.id = enhanced_outcomes.feature_id)
            WHERE typeof(entry_price) IN ('real', 'integer')
              AND (entry_price <= 0 OR entry_price IN ({sentinels}))
              AND EXISTS (
                  SELECT 1 FROM enhanced_features f
                  WHERE f.id = enhanced_outcomes.feature_id
                    AND typeof(f.current_price) IN ('real', 'integer')
                    AND f.current_price > 0
                    AND f.current_price NOT IN ({sentinels})
              )
            "#
        ))
        .execute(&mut **tx)
        .await?;
        report.feature_prices_backfilled += restored.rows_affected();
        Ok(())
    }

    /// Sentinels in required columns cannot be nulled; list what is left
    /// after the backfills. Prediction entry prices have their own list.
    async fn report_required_sentinels(&self, tx: &mut Transaction<'_, Sqlite>, report: &mut RepairReport) -> StoreResult<()> {
        let sentinels = sentinel_list();
        for &(table, column, nullable, _) in NUMERIC_COLUMNS {
            if nullable || (table, column) == ("predictions", "entry_price") {
                continue;
            }
            let rows: Vec<(i64, f64)> = sqlx::query_as(&format!(
                "SELECT rowid, {column} FROM {table} \
                 WHERE typeof({column}) IN ('real', 'integer') AND {column} IN ({sentinels})"
            ))
            .fetch_all(&mut **tx)
            .await?;
            for (rowid, value) in rows {
                tracing::warn!("{}.{} row {} still holds sentinel {}", table, column, rowid, value);
                report
                    .unresolved_sentinels
                    .push(format!("{}.{} row {}: {}", table, column, rowid, value));
            }
        }
        Ok(())
    }

    async fn recompute_outcomes(&self, tx: &mut Transaction<'_, Sqlite>, report: &mut RepairReport) -> StoreResult<()> {
        type Row = (i64, String, f64, f64, Option<f64>, Option<f64>, Option<i64>, bool);
        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT o.outcome_id, p.predicted_action, p.entry_price, o.exit_price,
                   o.entry_price, o.actual_return, o.actual_direction, o.prediction_correct
            FROM outcomes o
            JOIN predictions p ON p.prediction_id = o.prediction_id
            WHERE typeof(p.entry_price) IN ('real', 'integer') AND p.entry_price > 0
              AND typeof(o.exit_price) IN ('real', 'integer') AND o.exit_price > 0
            "#,
        )
        .fetch_all(&mut **tx)
        .await?;

        for (outcome_id, action, entry, exit, stored_entry, stored_return, stored_direction, stored_correct) in rows {
            let Ok(expected) = returns::return_pct(entry, exit) else {
                continue;
            };
            let direction = returns::direction(expected, self.hold_band_pct).as_i64();
            // Correctness needs a known action; the return does not
            let correct = match action.parse::<TradeAction>() {
                Ok(action) => returns::is_correct(action, expected, self.hold_band_pct),
                Err(_) => {
                    tracing::warn!("Outcome {} belongs to a prediction with action '{}'", outcome_id, action);
                    stored_correct
                }
            };

            let consistent = stored_entry == Some(entry)
                && stored_return.is_some_and(|r| returns::is_consistent(entry, exit, r))
                && stored_direction == Some(direction)
                && stored_correct == correct;
            if consistent {
                continue;
            }

            sqlx::query(
                r#"
                UPDATE outcomes
                SET entry_price = ?, actual_return = ?, actual_direction = ?, prediction_correct = ?
                WHERE outcome_id = ?
                "#,
            )
            .bind(entry)
            .bind(expected)
            .bind(direction)
            .bind(correct)
            .bind(outcome_id)
            .execute(&mut **tx)
            .await?;
            report.outcomes_recomputed += 1;
        }
        Ok(())
    }

    async fn recompute_enhanced_outcomes(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        report: &mut RepairReport,
    ) -> StoreResult<()> {
        type Row = (
            i64,
            f64,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
        );
        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT id, entry_price, exit_price_1h, exit_price_4h, exit_price_1d,
                   return_pct_1h, return_pct_4h, return_pct_1d
            FROM enhanced_outcomes
            WHERE typeof(entry_price) IN ('real', 'integer') AND entry_price > 0
            "#,
        )
        .fetch_all(&mut **tx)
        .await?;

        for (id, entry, exit_1h, exit_4h, exit_1d, ret_1h, ret_4h, ret_1d) in rows {
            let expected = |exit: Option<f64>| exit.and_then(|x| returns::return_pct(entry, x).ok());
            let (new_1h, new_4h, new_1d) = (expected(exit_1h), expected(exit_4h), expected(exit_1d));

            let same = |stored: Option<f64>, derived: Option<f64>| match (stored, derived) {
                (Some(s), Some(d)) => (s - d).abs() <= 1e-6 * d.abs().max(1.0),
                (None, None) => true,
                _ => false,
            };
            if same(ret_1h, new_1h) && same(ret_4h, new_4h) && same(ret_1d, new_1d) {
                continue;
            }

            let direction = |r: Option<f64>| r.map(|r| returns::direction(r, 0.0).as_i64());
            sqlx::query(
                r#"
                UPDATE enhanced_outcomes
                SET return_pct_1h = ?, return_pct_4h = ?, return_pct_1d = ?,
                    direction_1h = ?, direction_4h = ?, direction_1d = ?,
                    optimal_action = ?
                WHERE id = ?
                "#,
            )
            .bind(new_1h)
            .bind(new_4h)
            .bind(new_1d)
            .bind(direction(new_1h))
            .bind(direction(new_4h))
            .bind(direction(new_1d))
            .bind(new_1d.map(|r| returns::optimal_action(r, crate::features::OPTIMAL_ACTION_BAND_PCT).as_str()))
            .bind(id)
            .execute(&mut **tx)
            .await?;
            report.enhanced_outcomes_recomputed += 1;
        }
        Ok(())
    }
}
