//! Write-time checks shared by every repository.

use analysis_core::{AsxSymbol, TradeAction};

use crate::ValidationError;

/// Placeholders legacy writers used instead of NULL.
pub const SENTINELS: [f64; 3] = [-9999.0, -999.0, 9999.0];

pub fn is_sentinel(value: f64) -> bool {
    SENTINELS.contains(&value)
}

pub fn symbol(raw: &str) -> Result<AsxSymbol, ValidationError> {
    AsxSymbol::parse(raw).map_err(|_| ValidationError::InvalidSymbol(raw.to_string()))
}

pub fn finite(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    if is_sentinel(value) {
        return Err(ValidationError::Sentinel { field, value });
    }
    Ok(value)
}

/// Optional indicator: `None` stays `None`, a value must be finite and not a sentinel.
pub fn optional(field: &'static str, value: Option<f64>) -> Result<Option<f64>, ValidationError> {
    value.map(|v| finite(field, v)).transpose()
}

pub fn unit_interval(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    let value = finite(field, value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange { field, value });
    }
    Ok(value)
}

pub fn signed_unit(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    let value = finite(field, value)?;
    if !(-1.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange { field, value });
    }
    Ok(value)
}

pub fn price(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    let value = finite(field, value)?;
    if value <= 0.0 {
        return Err(ValidationError::NonPositivePrice { field, value });
    }
    Ok(value)
}

pub fn non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(())
}

pub fn direction_matches(action: TradeAction, direction: i64) -> Result<(), ValidationError> {
    if action.direction().as_i64() != direction {
        return Err(ValidationError::DirectionMismatch {
            action: action.to_string(),
            direction,
        });
    }
    Ok(())
}
