//! Confidence Engine
//!
//! The single confidence formula behind every BUY / SELL / HOLD decision,
//! plus volume-quality grading and calibration metrics for evaluated
//! predictions.

pub mod calibration;
pub mod error;
pub mod scorer;
pub mod volume;
pub mod weights;

pub use calibration::{calibrate, BucketStats, CalibrationMetrics};
pub use error::ConfidenceError;
pub use scorer::{ComponentBreakdown, ConfidenceInputs, ConfidenceScorer, Decision};
pub use volume::{assess_volume, VolumeGrade, VolumeQuality};
pub use weights::{ConfidenceWeights, DecisionThresholds, EffectiveWeights};
