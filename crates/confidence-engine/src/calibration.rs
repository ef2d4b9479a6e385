//! Calibration metrics
//!
//! Compares stated confidence with realised correctness over evaluated
//! predictions: ten equal-width buckets, Expected / Maximum Calibration
//! Error and the Brier score.

use serde::{Deserialize, Serialize};

const BUCKETS: usize = 10;
const MIN_RELIABLE_SAMPLE: usize = 30;

/// Statistics for a confidence bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub bucket_start: f64,
    pub bucket_end: f64,
    /// Mean stated confidence of the samples in the bucket
    pub mean_confidence: f64,
    pub actual_accuracy: f64,
    pub sample_count: usize,
    /// Positive when overconfident
    pub calibration_gap: f64,
}

/// Overall calibration metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetrics {
    /// Expected Calibration Error (lower is better, 0 is perfect)
    pub ece: f64,
    /// Maximum Calibration Error
    pub mce: f64,
    /// Brier Score (lower is better)
    pub brier_score: f64,
    /// Share of evaluated predictions that were correct
    pub accuracy: f64,
    pub sample_size: usize,
    /// Non-empty buckets only
    pub bucket_stats: Vec<BucketStats>,
}

/// Build calibration metrics from `(confidence, correct)` pairs.
/// Non-finite confidences are skipped; the rest are clamped to [0, 1].
pub fn calibrate(samples: &[(f64, bool)]) -> CalibrationMetrics {
    let data: Vec<(f64, bool)> = samples
        .iter()
        .filter(|(c, _)| c.is_finite())
        .map(|&(c, o)| (c.clamp(0.0, 1.0), o))
        .collect();

    if data.is_empty() {
        return CalibrationMetrics::default();
    }

    let mut buckets: Vec<Vec<(f64, bool)>> = vec![Vec::new(); BUCKETS];
    for &(conf, outcome) in &data {
        let bucket = ((conf * BUCKETS as f64) as usize).min(BUCKETS - 1);
        buckets[bucket].push((conf, outcome));
    }

    let bucket_stats: Vec<BucketStats> = buckets
        .into_iter()
        .enumerate()
        .filter(|(_, b)| !b.is_empty())
        .map(|(i, bucket)| {
            let n = bucket.len() as f64;
            let mean_confidence = bucket.iter().map(|(c, _)| c).sum::<f64>() / n;
            let actual_accuracy = bucket.iter().filter(|(_, o)| *o).count() as f64 / n;
            BucketStats {
                bucket_start: i as f64 / BUCKETS as f64,
                bucket_end: (i + 1) as f64 / BUCKETS as f64,
                mean_confidence,
                actual_accuracy,
                sample_count: bucket.len(),
                calibration_gap: mean_confidence - actual_accuracy,
            }
        })
        .collect();

    let n = data.len() as f64;

    let ece: f64 = bucket_stats
        .iter()
        .map(|b| b.calibration_gap.abs() * b.sample_count as f64 / n)
        .sum();

    let mce = bucket_stats
        .iter()
        .map(|b| b.calibration_gap.abs())
        .fold(0.0, f64::max);

    let brier_score = data
        .iter()
        .map(|(conf, outcome)| {
            let y = if *outcome { 1.0 } else { 0.0 };
            (conf - y).powi(2)
        })
        .sum::<f64>()
        / n;

    let accuracy = data.iter().filter(|(_, o)| *o).count() as f64 / n;

    CalibrationMetrics {
        ece,
        mce,
        brier_score,
        accuracy,
        sample_size: data.len(),
        bucket_stats,
    }
}

impl CalibrationMetrics {
    /// Get a human-readable assessment
    pub fn assessment(&self) -> String {
        if self.sample_size < MIN_RELIABLE_SAMPLE {
            "Insufficient data for reliable calibration assessment".to_string()
        } else if self.ece < 0.05 {
            "Excellent calibration - confidence matches outcomes closely".to_string()
        } else if self.ece < 0.1 {
            "Good calibration - confidence is reasonably reliable".to_string()
        } else if self.ece < 0.2 {
            "Moderate calibration - confidence needs some adjustment".to_string()
        } else {
            "Poor calibration - confidence does not track outcomes".to_string()
        }
    }

    /// Weighted gap above 0.5 confidence is positive
    pub fn is_overconfident(&self) -> bool {
        self.high_confidence_gap() > 0.0
    }

    pub fn is_underconfident(&self) -> bool {
        self.high_confidence_gap() < 0.0
    }

    fn high_confidence_gap(&self) -> f64 {
        self.bucket_stats
            .iter()
            .filter(|b| b.bucket_start >= 0.5)
            .map(|b| b.calibration_gap * b.sample_count as f64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_samples() {
        let metrics = calibrate(&[]);
        assert_eq!(metrics.sample_size, 0);
        assert!(metrics.bucket_stats.is_empty());
        assert!(metrics.assessment().contains("Insufficient"));
    }

    #[test]
    fn test_perfectly_calibrated_bucket() {
        // 0.75 confidence, 3 of 4 correct
        let samples = [(0.75, true), (0.75, true), (0.75, true), (0.75, false)];
        let metrics = calibrate(&samples);

        assert_eq!(metrics.bucket_stats.len(), 1);
        assert_relative_eq!(metrics.bucket_stats[0].bucket_start, 0.7);
        assert_relative_eq!(metrics.ece, 0.0, epsilon = 1e-12);
        assert_relative_eq!(metrics.accuracy, 0.75);
        // 3 * 0.0625 + 0.5625 over 4
        assert_relative_eq!(metrics.brier_score, 0.1875, epsilon = 1e-12);
    }

    #[test]
    fn test_overconfidence_detected() {
        let mut samples = Vec::new();
        for i in 0..40 {
            samples.push((0.9, i % 2 == 0));
        }
        samples.push((0.15, false));

        let metrics = calibrate(&samples);
        assert_eq!(metrics.sample_size, 41);
        assert_eq!(metrics.bucket_stats.len(), 2);
        assert_relative_eq!(metrics.mce, 0.4, epsilon = 1e-12);
        assert!(metrics.is_overconfident());
        assert!(!metrics.is_underconfident());
        assert!(metrics.assessment().contains("Poor"));
    }

    #[test]
    fn test_confidence_of_one_lands_in_top_bucket() {
        let metrics = calibrate(&[(1.0, true), (f64::NAN, true)]);
        assert_eq!(metrics.sample_size, 1);
        assert_relative_eq!(metrics.bucket_stats[0].bucket_start, 0.9);
        assert_relative_eq!(metrics.brier_score, 0.0);
    }
}
