//! Reports over evaluated predictions.

pub mod models;
pub mod performance_tracker;
pub mod report;
pub mod signal_analyzer;

pub use models::*;
pub use performance_tracker::PerformanceTracker;
pub use report::{render_text, ReportBuilder};
pub use signal_analyzer::{SignalAnalyzer, ALL_HOLD_RATIO};

#[cfg(test)]
pub(crate) mod test_support {
    use analysis_core::TradeAction;
    use chrono::{TimeZone, Utc};
    use prediction_store::{NewPrediction, OutcomeRepository, PredictionRepository, TradingDb};

    pub async fn memory_db() -> TradingDb {
        TradingDb::connect("sqlite::memory:").await.unwrap()
    }

    /// Stored prediction without an outcome; entry price 110, grade B.
    pub async fn pending(db: &TradingDb, symbol: &str, day: u32, action: TradeAction) -> String {
        PredictionRepository::new(db.clone())
            .insert(&NewPrediction {
                prediction_id: None,
                symbol: symbol.to_string(),
                prediction_timestamp: Utc.with_ymd_and_hms(2024, 4, day, 0, 0, 0).unwrap(),
                predicted_action: action,
                action_confidence: 0.65,
                predicted_direction: action.direction().as_i64(),
                predicted_magnitude: 0.0,
                model_version: "test".to_string(),
                entry_price: 110.0,
                sentiment_score: None,
                technical_score: None,
                volume_grade: Some("B".to_string()),
            })
            .await
            .unwrap()
    }

    pub async fn evaluated(db: &TradingDb, symbol: &str, day: u32, action: TradeAction, exit: f64) -> String {
        let id = pending(db, symbol, day, action).await;
        OutcomeRepository::new(db.clone())
            .record(&id, exit, Utc::now(), 0.5)
            .await
            .unwrap();
        id
    }
}
