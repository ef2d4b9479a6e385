use analysis_core::AnalysisError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Exponential backoff for upstream requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (0-based): base, 2*base, 4*base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// 429 and 5xx are worth retrying; every other status is final.
    pub fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

/// Send a request with rate-limit / server-error retry.
///
/// Transport errors are retried too. Any non-retryable response (success or
/// not) is handed back so the caller can react to its status.
pub(crate) async fn send_with_retry(
    client: &Client,
    builder: RequestBuilder,
    policy: &RetryPolicy,
    provider: &'static str,
) -> Result<Response, AnalysisError> {
    let request = builder.build().map_err(|e| AnalysisError::ApiError(e.to_string()))?;
    let mut last_error = String::new();

    for attempt in 0..policy.max_attempts {
        let req_clone = request
            .try_clone()
            .ok_or_else(|| AnalysisError::ApiError("Cannot clone request".to_string()))?;

        match client.execute(req_clone).await {
            Ok(response) if RetryPolicy::should_retry(response.status()) => {
                last_error = format!("HTTP {}", response.status());
            }
            Ok(response) => return Ok(response),
            Err(e) => {
                last_error = e.to_string();
            }
        }

        if attempt + 1 < policy.max_attempts {
            let wait = policy.delay_for(attempt);
            tracing::warn!(
                "{} request failed ({}), retry {}/{} in {:.1}s",
                provider,
                last_error,
                attempt + 1,
                policy.max_attempts - 1,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }

    if last_error.starts_with("HTTP 429") {
        return Err(AnalysisError::RateLimited {
            provider: provider.to_string(),
            message: format!("still throttled after {} attempts", policy.max_attempts),
        });
    }

    Err(AnalysisError::ApiError(format!(
        "{} failed after {} attempts: {}",
        provider, policy.max_attempts, last_error
    )))
}

/// Turn a non-2xx response into an `ApiError` carrying the body.
pub(crate) async fn ensure_success(response: Response, provider: &'static str) -> Result<Response, AnalysisError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(AnalysisError::ApiError(format!("{} HTTP {}: {}", provider, status, body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(RetryPolicy::should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(RetryPolicy::should_retry(StatusCode::BAD_GATEWAY));
        assert!(!RetryPolicy::should_retry(StatusCode::NOT_FOUND));
        assert!(!RetryPolicy::should_retry(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
