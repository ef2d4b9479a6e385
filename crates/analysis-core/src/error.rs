use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid ASX symbol: {0}")]
    InvalidSymbol(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited by {provider}: {message}")]
    RateLimited { provider: String, message: String },

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("All price providers failed: {0}")]
    ProvidersExhausted(String),
}

impl AnalysisError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalysisError::RateLimited { .. } | AnalysisError::ApiError(_))
    }
}
