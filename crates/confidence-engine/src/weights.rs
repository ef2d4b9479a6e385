use serde::{Deserialize, Serialize};

use crate::ConfidenceError;

const SUM_TOLERANCE: f64 = 1e-6;

/// Component weights of the confidence formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub sentiment: f64,
    pub technical: f64,
    pub volume: f64,
    pub risk: f64,
    pub ml: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            sentiment: 0.30,
            technical: 0.30,
            volume: 0.15,
            risk: 0.15,
            ml: 0.10,
        }
    }
}

/// Weights actually applied to one decision, after ML redistribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveWeights {
    pub sentiment: f64,
    pub technical: f64,
    pub volume: f64,
    pub risk: f64,
    pub ml: f64,
}

impl ConfidenceWeights {
    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("sentiment", self.sentiment),
            ("technical", self.technical),
            ("volume", self.volume),
            ("risk", self.risk),
            ("ml", self.ml),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfidenceError> {
        for (name, value) in self.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfidenceError::InvalidWeight { name, value });
            }
        }

        let sum: f64 = self.named().iter().map(|(_, v)| v).sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(ConfidenceError::WeightSum(sum));
        }
        Ok(())
    }

    /// Without an ML input its weight is spread proportionally over the rest.
    pub fn effective(&self, ml_present: bool) -> EffectiveWeights {
        if ml_present {
            return EffectiveWeights {
                sentiment: self.sentiment,
                technical: self.technical,
                volume: self.volume,
                risk: self.risk,
                ml: self.ml,
            };
        }

        let rest = self.sentiment + self.technical + self.volume + self.risk;
        let scale = if rest > 0.0 { 1.0 / rest } else { 0.0 };
        EffectiveWeights {
            sentiment: self.sentiment * scale,
            technical: self.technical * scale,
            volume: self.volume * scale,
            risk: self.risk * scale,
            ml: 0.0,
        }
    }
}

/// Decision cut-offs on the directional score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    /// BUY/SELL below this confidence are downgraded to HOLD
    pub min_action_confidence: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            buy_threshold: 0.15,
            sell_threshold: -0.15,
            min_action_confidence: 0.55,
        }
    }
}

impl DecisionThresholds {
    pub fn validate(&self) -> Result<(), ConfidenceError> {
        let finite = self.buy_threshold.is_finite()
            && self.sell_threshold.is_finite()
            && self.min_action_confidence.is_finite();
        if !finite {
            return Err(ConfidenceError::InvalidThresholds("thresholds must be finite".to_string()));
        }
        if !(self.sell_threshold < 0.0 && 0.0 < self.buy_threshold) {
            return Err(ConfidenceError::InvalidThresholds(format!(
                "need sell < 0 < buy, got sell={} buy={}",
                self.sell_threshold, self.buy_threshold
            )));
        }
        if !(self.min_action_confidence > 0.0 && self.min_action_confidence < 1.0) {
            return Err(ConfidenceError::InvalidThresholds(format!(
                "min_action_confidence must be in (0, 1), got {}",
                self.min_action_confidence
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_weights_valid() {
        assert!(ConfidenceWeights::default().validate().is_ok());
        assert!(DecisionThresholds::default().validate().is_ok());
    }

    #[test]
    fn test_weight_sum_rejected() {
        let weights = ConfidenceWeights {
            sentiment: 0.5,
            ..Default::default()
        };
        match weights.validate() {
            Err(ConfidenceError::WeightSum(sum)) => assert_relative_eq!(sum, 1.2, epsilon = 1e-9),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_negative_or_nan_weight_rejected() {
        let weights = ConfidenceWeights {
            risk: -0.15,
            ml: 0.40,
            ..Default::default()
        };
        assert!(matches!(
            weights.validate(),
            Err(ConfidenceError::InvalidWeight { name: "risk", .. })
        ));

        let weights = ConfidenceWeights {
            ml: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(weights.validate(), Err(ConfidenceError::InvalidWeight { name: "ml", .. })));
    }

    #[test]
    fn test_ml_weight_redistributed() {
        let effective = ConfidenceWeights::default().effective(false);

        assert_eq!(effective.ml, 0.0);
        let total = effective.sentiment + effective.technical + effective.volume + effective.risk + effective.ml;
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert_relative_eq!(effective.sentiment, 0.30 / 0.90, epsilon = 1e-12);
        assert_relative_eq!(effective.volume, 0.15 / 0.90, epsilon = 1e-12);

        let with_ml = ConfidenceWeights::default().effective(true);
        assert_relative_eq!(with_ml.ml, 0.10);
    }

    #[test]
    fn test_threshold_validation() {
        let inverted = DecisionThresholds {
            buy_threshold: -0.1,
            sell_threshold: 0.1,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let bad_min = DecisionThresholds {
            min_action_confidence: 1.0,
            ..Default::default()
        };
        assert!(bad_min.validate().is_err());
    }
}
