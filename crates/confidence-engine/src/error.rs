use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfidenceError {
    #[error("Invalid weight {name}: {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("Weights must sum to 1.0, got {0}")]
    WeightSum(f64),

    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("Invalid input {field}: {value}")]
    InvalidInput { field: &'static str, value: f64 },
}
