//! Synthetic enhanced outcomes for bootstrapping a training set.
//!
//! Rows are always written with `is_synthetic = 1` so reports can exclude them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Serialize;

use crate::models::{EnhancedFeatures, NewEnhancedOutcome};
use crate::{FeatureRepository, StoreError, StoreResult, TradingDb};

/// ASX session length in hours.
const SESSION_HOURS: f64 = 6.0;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub seed: u64,
    /// Feature rows processed per run
    pub limit: i64,
    /// Daily drift in percent for a combined signal of 1.0
    pub drift_scale_pct: f64,
    /// Annualised volatility used when a feature row has none
    pub default_volatility: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            limit: 1000,
            drift_scale_pct: 1.0,
            default_volatility: 0.25,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyntheticReport {
    pub seed: u64,
    pub generated: u64,
    pub skipped: u64,
}

pub struct SyntheticOutcomeGenerator {
    features: FeatureRepository,
    config: SyntheticConfig,
}

impl SyntheticOutcomeGenerator {
    pub fn new(db: TradingDb, config: SyntheticConfig) -> Self {
        Self {
            features: FeatureRepository::new(db),
            config,
        }
    }

    pub async fn run(&self) -> StoreResult<SyntheticReport> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut report = SyntheticReport {
            seed: self.config.seed,
            ..Default::default()
        };

        for row in self.features.features_without_outcomes(self.config.limit).await? {
            let outcome = self.simulate(&row, &mut rng);
            match self.features.insert_outcome(&outcome).await {
                Ok(_) => report.generated += 1,
                Err(StoreError::Database(e)) => return Err(StoreError::Database(e)),
                Err(e) => {
                    tracing::warn!("Skipping synthetic outcome for {} ({}): {}", row.symbol, row.id, e);
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            "Generated {} synthetic outcomes (seed {}, {} skipped)",
            report.generated,
            report.seed,
            report.skipped
        );
        Ok(report)
    }

    /// Walk one price path through 1h, 4h and 1d so the horizons stay consistent.
    fn simulate(&self, row: &EnhancedFeatures, rng: &mut StdRng) -> NewEnhancedOutcome {
        let signal = 0.6 * row.sentiment_score.unwrap_or(0.0) + 0.4 * row.technical_score.unwrap_or(0.0);
        let drift_pct = self.config.drift_scale_pct * signal;
        let volatility = row.volatility.unwrap_or(self.config.default_volatility).max(0.0);
        let sigma_pct = volatility / TRADING_DAYS_PER_YEAR.sqrt() * 100.0;

        let entry = row.current_price;
        let mut cumulative_pct = 0.0;
        let mut elapsed = 0.0;
        let mut exits = [0.0; 3];
        for (exit, hours) in exits.iter_mut().zip([1.0, 4.0, SESSION_HOURS]) {
            let step = hours / SESSION_HOURS - elapsed;
            let z: f64 = rng.sample(StandardNormal);
            cumulative_pct += drift_pct * step + sigma_pct * step.sqrt() * z;
            elapsed += step;
            *exit = (entry * (1.0 + cumulative_pct / 100.0)).max(entry * 0.01);
        }

        NewEnhancedOutcome {
            feature_id: row.id,
            exit_price_1h: Some(exits[0]),
            exit_price_4h: Some(exits[1]),
            exit_price_1d: Some(exits[2]),
            confidence_score: Some((0.5 + signal.abs() * 0.4).min(0.95)),
            is_synthetic: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use crate::NewFeatures;
    use chrono::{TimeZone, Utc};

    async fn seeded_db(volatility: Option<f64>) -> TradingDb {
        let db = memory_db().await;
        let repo = FeatureRepository::new(db.clone());
        for (i, symbol) in ["CBA", "WBC", "NAB"].iter().enumerate() {
            repo.insert_features(&NewFeatures {
                symbol: symbol.to_string(),
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1 + i as u32, 0, 0, 0).unwrap(),
                current_price: 50.0,
                volatility,
                sentiment_score: Some(0.8),
                technical_score: Some(0.5),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        db
    }

    async fn exits(db: &TradingDb) -> Vec<Option<f64>> {
        let mut rows = FeatureRepository::new(db.clone()).list_outcomes(10, true).await.unwrap();
        rows.sort_by_key(|r| r.feature_id);
        rows.iter().map(|r| r.exit_price_1d).collect()
    }

    #[tokio::test]
    async fn test_same_seed_same_outcomes() {
        let config = SyntheticConfig {
            seed: 7,
            ..Default::default()
        };
        let a = seeded_db(Some(0.3)).await;
        let b = seeded_db(Some(0.3)).await;
        SyntheticOutcomeGenerator::new(a.clone(), config.clone()).run().await.unwrap();
        SyntheticOutcomeGenerator::new(b.clone(), config).run().await.unwrap();
        assert_eq!(exits(&a).await, exits(&b).await);

        let c = seeded_db(Some(0.3)).await;
        SyntheticOutcomeGenerator::new(c.clone(), SyntheticConfig { seed: 8, ..Default::default() })
            .run()
            .await
            .unwrap();
        assert_ne!(exits(&a).await, exits(&c).await);
    }

    #[tokio::test]
    async fn test_positive_signal_without_noise_rises() {
        let db = seeded_db(Some(0.0)).await;
        let report = SyntheticOutcomeGenerator::new(db.clone(), SyntheticConfig::default())
            .run()
            .await
            .unwrap();
        assert_eq!(report.generated, 3);

        let repo = FeatureRepository::new(db);
        let rows = repo.list_outcomes(10, true).await.unwrap();
        for row in &rows {
            assert!(row.is_synthetic);
            let (r1h, r1d) = (row.return_pct_1h.unwrap(), row.return_pct_1d.unwrap());
            assert!(r1h > 0.0 && r1d > r1h);
            assert_eq!(row.direction_1d, Some(1));
        }
        // Real-only listing hides them
        assert!(repo.list_outcomes(10, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_has_nothing_to_do() {
        let db = seeded_db(None).await;
        let generator = SyntheticOutcomeGenerator::new(db, SyntheticConfig::default());
        assert_eq!(generator.run().await.unwrap().generated, 3);
        assert_eq!(generator.run().await.unwrap().generated, 0);
    }
}
