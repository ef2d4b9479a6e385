//! SQLite persistence for predictions, outcomes and the enhanced
//! feature / outcome tables, with write-time validation and the
//! maintenance jobs (repair, audit, consolidation, synthetic outcomes).

pub mod audit;
pub mod consolidate;
pub mod db;
pub mod error;
pub mod features;
pub mod models;
pub mod outcomes;
pub mod predictions;
pub mod repair;
pub mod returns;
pub mod synthetic;
pub mod validation;

pub use audit::{audit, AuditReport};
pub use consolidate::{compare_counts, merge_from, CountComparison, MergeReport, TableCounts};
pub use db::TradingDb;
pub use error::{StoreError, StoreResult, ValidationError};
pub use features::FeatureRepository;
pub use models::*;
pub use outcomes::OutcomeRepository;
pub use predictions::PredictionRepository;
pub use repair::{PriceLookup, RepairReport, Repairer};
pub use synthetic::{SyntheticConfig, SyntheticOutcomeGenerator, SyntheticReport};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{NewPrediction, TradingDb};
    use analysis_core::TradeAction;
    use chrono::{TimeZone, Utc};

    pub async fn memory_db() -> TradingDb {
        TradingDb::connect("sqlite::memory:").await.unwrap()
    }

    pub fn sample_prediction() -> NewPrediction {
        NewPrediction {
            prediction_id: None,
            symbol: "cba".to_string(),
            prediction_timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            predicted_action: TradeAction::Buy,
            action_confidence: 0.7,
            predicted_direction: 1,
            predicted_magnitude: 0.8,
            model_version: "test".to_string(),
            entry_price: 110.0,
            sentiment_score: Some(0.3),
            technical_score: Some(0.2),
            volume_grade: Some("B".to_string()),
        }
    }

    pub fn prediction_at(symbol: &str, day: u32, action: TradeAction) -> NewPrediction {
        NewPrediction {
            symbol: symbol.to_string(),
            prediction_timestamp: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
            predicted_action: action,
            predicted_direction: action.direction().as_i64(),
            ..sample_prediction()
        }
    }
}
