use chrono::{DateTime, Utc};
use confidence_engine::CalibrationMetrics;
use prediction_store::AuditReport;
use serde::{Deserialize, Serialize};

/// Action counts over the most recent predictions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionDistribution {
    /// How many recent predictions were requested
    pub window: i64,
    pub total: i64,
    pub buy: i64,
    pub sell: i64,
    pub hold: i64,
    pub hold_ratio: f64,
    pub all_hold_warning: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccuracyRow {
    /// Symbol or action, depending on the grouping
    pub key: String,
    pub evaluated: i64,
    pub correct: i64,
    pub accuracy: f64,
    pub mean_return: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VolumeGradeRow {
    pub grade: String,
    pub predictions: i64,
    pub evaluated: i64,
    pub correct: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceOverview {
    pub total_predictions: i64,
    pub total_evaluated: i64,
    pub win_rate: f64,
    pub mean_return: f64,
    pub median_return: f64,
    pub best_symbol: Option<AccuracyRow>,
    pub worst_symbol: Option<AccuracyRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullReport {
    pub generated_at: DateTime<Utc>,
    pub overview: PerformanceOverview,
    pub actions: ActionDistribution,
    pub by_symbol: Vec<AccuracyRow>,
    pub by_action: Vec<AccuracyRow>,
    pub calibration: CalibrationMetrics,
    pub volume_grades: Vec<VolumeGradeRow>,
    pub integrity: AuditReport,
}
