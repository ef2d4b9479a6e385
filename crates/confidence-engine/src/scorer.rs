use analysis_core::{adaptive, TradeAction};
use serde::{Deserialize, Serialize};

use crate::{ConfidenceError, ConfidenceWeights, DecisionThresholds, EffectiveWeights, VolumeQuality};

/// Daily volatility assumed when none is known, in percent.
const DEFAULT_DAILY_VOL_PCT: f64 = 1.5;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const RISK_VOL_FLOOR: f64 = 0.10;
const RISK_VOL_RANGE: f64 = 0.40;

/// Everything the formula looks at for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInputs {
    /// [-1, 1]
    pub sentiment_score: f64,
    /// [0, 1]
    pub sentiment_confidence: f64,
    /// [-1, 1]
    pub technical_score: f64,
    pub volume: VolumeQuality,
    /// Annualised volatility as a fraction
    pub volatility: Option<f64>,
    /// Model probability that price goes up, [0, 1]
    pub ml_probability_up: Option<f64>,
}

/// Per-component confidence contributions before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentBreakdown {
    pub sentiment: f64,
    pub technical: f64,
    pub volume: f64,
    pub risk: f64,
    pub ml: Option<f64>,
    pub weights: EffectiveWeights,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: TradeAction,
    pub confidence: f64,
    pub directional_score: f64,
    pub predicted_magnitude_pct: f64,
    pub components: ComponentBreakdown,
    /// A BUY/SELL fell short of the minimum confidence and became HOLD
    pub downgraded: bool,
}

/// How well a directional reading in [-1, 1] supports `action`.
pub fn agreement(action: TradeAction, x: f64) -> f64 {
    let x = adaptive::clamp_signed_unit(x);
    match action {
        TradeAction::Buy => (1.0 + x) / 2.0,
        TradeAction::Sell => (1.0 - x) / 2.0,
        TradeAction::Hold => 1.0 - x.abs(),
    }
}

/// 0 at or below 10 % annualised volatility, 1 at 50 % and above.
pub fn risk_score(volatility: Option<f64>) -> f64 {
    match volatility {
        Some(v) if v.is_finite() => ((v - RISK_VOL_FLOOR) / RISK_VOL_RANGE).clamp(0.0, 1.0),
        _ => 0.5,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
    thresholds: DecisionThresholds,
}

impl ConfidenceScorer {
    pub fn new(weights: ConfidenceWeights, thresholds: DecisionThresholds) -> Result<Self, ConfidenceError> {
        weights.validate()?;
        thresholds.validate()?;
        Ok(Self { weights, thresholds })
    }

    pub fn weights(&self) -> &ConfidenceWeights {
        &self.weights
    }

    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    fn check_inputs(inputs: &ConfidenceInputs) -> Result<(), ConfidenceError> {
        let fields = [
            ("sentiment_score", Some(inputs.sentiment_score)),
            ("sentiment_confidence", Some(inputs.sentiment_confidence)),
            ("technical_score", Some(inputs.technical_score)),
            ("volume_score", Some(inputs.volume.score)),
            ("ml_probability_up", inputs.ml_probability_up),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                if !value.is_finite() {
                    return Err(ConfidenceError::InvalidInput { field, value });
                }
            }
        }
        Ok(())
    }

    /// Weighted mean of the directional inputs, in [-1, 1].
    fn directional_score(&self, inputs: &ConfidenceInputs, weights: &EffectiveWeights) -> f64 {
        let sentiment = adaptive::clamp_signed_unit(inputs.sentiment_score)
            * adaptive::clamp_unit(inputs.sentiment_confidence);
        let technical = adaptive::clamp_signed_unit(inputs.technical_score);

        let mut total = weights.sentiment * sentiment + weights.technical * technical;
        let mut weight = weights.sentiment + weights.technical;
        if let Some(p) = inputs.ml_probability_up {
            total += weights.ml * (2.0 * adaptive::clamp_unit(p) - 1.0);
            weight += weights.ml;
        }

        if weight <= 0.0 {
            return 0.0;
        }
        adaptive::clamp_signed_unit(total / weight)
    }

    fn components_for(&self, action: TradeAction, inputs: &ConfidenceInputs, weights: EffectiveWeights) -> ComponentBreakdown {
        let sentiment = adaptive::clamp_signed_unit(inputs.sentiment_score)
            * adaptive::clamp_unit(inputs.sentiment_confidence);

        ComponentBreakdown {
            sentiment: agreement(action, sentiment),
            technical: agreement(action, inputs.technical_score),
            volume: adaptive::clamp_unit(inputs.volume.score),
            risk: 1.0 - risk_score(inputs.volatility),
            ml: inputs
                .ml_probability_up
                .map(|p| agreement(action, 2.0 * adaptive::clamp_unit(p) - 1.0)),
            weights,
        }
    }

    fn confidence_of(components: &ComponentBreakdown) -> f64 {
        let w = &components.weights;
        let total = w.sentiment * components.sentiment
            + w.technical * components.technical
            + w.volume * components.volume
            + w.risk * components.risk
            + w.ml * components.ml.unwrap_or(0.0);
        adaptive::clamp_unit(total)
    }

    fn tentative_action(&self, d: f64) -> TradeAction {
        if d >= self.thresholds.buy_threshold {
            TradeAction::Buy
        } else if d <= self.thresholds.sell_threshold {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        }
    }

    pub fn score(&self, inputs: &ConfidenceInputs) -> Result<Decision, ConfidenceError> {
        Self::check_inputs(inputs)?;

        let weights = self.weights.effective(inputs.ml_probability_up.is_some());
        let d = self.directional_score(inputs, &weights);

        let mut action = self.tentative_action(d);
        let mut components = self.components_for(action, inputs, weights);
        let mut confidence = Self::confidence_of(&components);
        let mut downgraded = false;

        if action != TradeAction::Hold && confidence < self.thresholds.min_action_confidence {
            tracing::debug!(
                "{} at confidence {:.3} below {:.2}, downgrading to HOLD",
                action,
                confidence,
                self.thresholds.min_action_confidence
            );
            action = TradeAction::Hold;
            components = self.components_for(action, inputs, weights);
            confidence = Self::confidence_of(&components);
            downgraded = true;
        }

        let predicted_magnitude_pct = if action == TradeAction::Hold {
            0.0
        } else {
            let daily_vol_pct = inputs
                .volatility
                .filter(|v| v.is_finite() && *v > 0.0)
                .map(|v| v / TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
                .unwrap_or(DEFAULT_DAILY_VOL_PCT);
            d * daily_vol_pct
        };

        Ok(Decision {
            action,
            confidence,
            directional_score: d,
            predicted_magnitude_pct,
            components,
            downgraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assess_volume, VolumeGrade};
    use approx::assert_relative_eq;

    fn inputs(sentiment: f64, technical: f64) -> ConfidenceInputs {
        ConfidenceInputs {
            sentiment_score: sentiment,
            sentiment_confidence: 1.0,
            technical_score: technical,
            volume: assess_volume(Some(200.0), &[100.0; 10]),
            volatility: Some(0.10),
            ml_probability_up: None,
        }
    }

    #[test]
    fn test_agreement() {
        assert_relative_eq!(agreement(TradeAction::Buy, 1.0), 1.0);
        assert_relative_eq!(agreement(TradeAction::Sell, 1.0), 0.0);
        assert_relative_eq!(agreement(TradeAction::Hold, 0.0), 1.0);
        assert_relative_eq!(agreement(TradeAction::Hold, -0.4), 0.6);
    }

    #[test]
    fn test_risk_score() {
        assert_relative_eq!(risk_score(Some(0.05)), 0.0);
        assert_relative_eq!(risk_score(Some(0.30)), 0.5);
        assert_relative_eq!(risk_score(Some(0.90)), 1.0);
        assert_relative_eq!(risk_score(None), 0.5);
    }

    #[test]
    fn test_strong_agreement_is_buy() {
        let scorer = ConfidenceScorer::default();
        let decision = scorer.score(&inputs(0.8, 0.6)).unwrap();

        assert_eq!(decision.action, TradeAction::Buy);
        assert!(!decision.downgraded);
        assert_relative_eq!(decision.directional_score, 0.7, epsilon = 1e-12);

        // sentiment .9, technical .8, volume 1.0, risk 1.0 over weights / 0.9
        let expected = (0.30 * 0.9 + 0.30 * 0.8 + 0.15 * 1.0 + 0.15 * 1.0) / 0.90;
        assert_relative_eq!(decision.confidence, expected, epsilon = 1e-12);
        assert!(decision.predicted_magnitude_pct > 0.0);
    }

    #[test]
    fn test_bearish_inputs_sell() {
        let decision = ConfidenceScorer::default().score(&inputs(-0.9, -0.7)).unwrap();
        assert_eq!(decision.action, TradeAction::Sell);
        assert!(decision.predicted_magnitude_pct < 0.0);
    }

    #[test]
    fn test_weak_buy_downgraded_to_hold() {
        let mut weak = inputs(0.2, 0.2);
        weak.volume = assess_volume(Some(10.0), &[100.0; 10]);
        weak.volatility = Some(0.60);
        assert_eq!(weak.volume.grade, VolumeGrade::F);

        let decision = ConfidenceScorer::default().score(&weak).unwrap();
        assert_eq!(decision.action, TradeAction::Hold);
        assert!(decision.downgraded);
        assert_eq!(decision.predicted_magnitude_pct, 0.0);

        // Recomputed for HOLD: agreement 0.8 on both directional parts
        let expected = (0.30 * 0.8 + 0.30 * 0.8 + 0.15 * 0.2 + 0.15 * 0.0) / 0.90;
        assert_relative_eq!(decision.confidence, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_neutral_inputs_hold() {
        let decision = ConfidenceScorer::default().score(&inputs(0.0, 0.05)).unwrap();
        assert_eq!(decision.action, TradeAction::Hold);
        assert!(!decision.downgraded);
    }

    #[test]
    fn test_ml_component_used_when_present() {
        let mut with_ml = inputs(0.1, 0.1);
        with_ml.ml_probability_up = Some(0.95);

        let decision = ConfidenceScorer::default().score(&with_ml).unwrap();
        assert_relative_eq!(decision.components.weights.ml, 0.10);
        // (0.3*0.1 + 0.3*0.1 + 0.1*0.9) / 0.7
        assert_relative_eq!(decision.directional_score, 0.15 / 0.7, epsilon = 1e-12);
        assert_eq!(decision.action, TradeAction::Buy);
        assert!(decision.components.ml.is_some());
    }

    #[test]
    fn test_confidence_bounded() {
        let scorer = ConfidenceScorer::default();
        for s in [-1.0, -0.5, 0.0, 0.5, 1.0] {
            for t in [-1.0, 0.0, 1.0] {
                let c = scorer.score(&inputs(s, t)).unwrap().confidence;
                assert!((0.0..=1.0).contains(&c));
            }
        }
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let err = ConfidenceScorer::default().score(&inputs(f64::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, ConfidenceError::InvalidInput { field: "sentiment_score", .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let weights = ConfidenceWeights {
            technical: 0.9,
            ..Default::default()
        };
        assert!(ConfidenceScorer::new(weights, DecisionThresholds::default()).is_err());
    }
}
