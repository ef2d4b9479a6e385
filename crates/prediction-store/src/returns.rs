//! The one place a return is computed.

use analysis_core::{Direction, TradeAction};

use crate::{validation, ValidationError};

/// `(exit - entry) / entry * 100`
pub fn return_pct(entry: f64, exit: f64) -> Result<f64, ValidationError> {
    let entry = validation::price("entry_price", entry)?;
    let exit = validation::price("exit_price", exit)?;
    Ok((exit - entry) / entry * 100.0)
}

/// BUY needs a gain, SELL a loss, HOLD a move inside the band.
pub fn is_correct(action: TradeAction, return_pct: f64, hold_band_pct: f64) -> bool {
    match action {
        TradeAction::Buy => return_pct > 0.0,
        TradeAction::Sell => return_pct < 0.0,
        TradeAction::Hold => return_pct.abs() <= hold_band_pct,
    }
}

pub fn direction(return_pct: f64, hold_band_pct: f64) -> Direction {
    Direction::from_return(return_pct, hold_band_pct)
}

/// Best action in hindsight for a realised return.
pub fn optimal_action(return_pct: f64, hold_band_pct: f64) -> TradeAction {
    match direction(return_pct, hold_band_pct) {
        Direction::Up => TradeAction::Buy,
        Direction::Down => TradeAction::Sell,
        Direction::Flat => TradeAction::Hold,
    }
}

/// Whether a stored return disagrees with the one derived from its prices.
pub fn is_consistent(entry: f64, exit: f64, stored: f64) -> bool {
    match return_pct(entry, exit) {
        Ok(expected) => (expected - stored).abs() <= 1e-6 * expected.abs().max(1.0),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_return_formula() {
        assert_relative_eq!(return_pct(100.0, 105.0).unwrap(), 5.0);
        assert_relative_eq!(return_pct(40.0, 38.0).unwrap(), -5.0);
        assert_relative_eq!(return_pct(27.41, 27.41).unwrap(), 0.0);
    }

    #[test]
    fn test_return_rejects_bad_prices() {
        assert!(return_pct(0.0, 10.0).is_err());
        assert!(return_pct(10.0, -1.0).is_err());
        assert!(return_pct(-9999.0, 10.0).is_err());
    }

    #[test]
    fn test_correctness() {
        assert!(is_correct(TradeAction::Buy, 0.4, 0.5));
        assert!(!is_correct(TradeAction::Buy, -0.1, 0.5));
        assert!(is_correct(TradeAction::Sell, -2.0, 0.5));
        assert!(is_correct(TradeAction::Hold, -0.5, 0.5));
        assert!(!is_correct(TradeAction::Hold, 0.8, 0.5));
    }

    #[test]
    fn test_optimal_action_and_consistency() {
        assert_eq!(optimal_action(1.2, 0.5), TradeAction::Buy);
        assert_eq!(optimal_action(-0.2, 0.5), TradeAction::Hold);
        assert!(is_consistent(100.0, 110.0, 10.0));
        assert!(!is_consistent(100.0, 110.0, 0.1));
    }
}
