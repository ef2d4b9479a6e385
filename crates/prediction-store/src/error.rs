use thiserror::Error;

/// A row that would break a table invariant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid symbol '{0}'")]
    InvalidSymbol(String),

    #[error("{field} is not finite")]
    NonFinite { field: &'static str },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("{field} holds sentinel value {value}")]
    Sentinel { field: &'static str, value: f64 },

    #[error("{field} must be positive, got {value}")]
    NonPositivePrice { field: &'static str, value: f64 },

    #[error("direction {direction} does not match action {action}")]
    DirectionMismatch { action: String, direction: i64 },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
