//! Retry helpers for the transport layer.

use std::time::Duration;

/// Check if a status code indicates a retryable failure.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 502 | 503 | 504)
}

/// Exponential backoff delay calculation.
///
/// Returns `base_ms * 2^attempt`, with the exponent capped to keep the delay
/// finite.
pub fn exponential_backoff(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_status() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn test_exponential_backoff() {
        assert_eq!(exponential_backoff(0, 100), Duration::from_millis(100));
        assert_eq!(exponential_backoff(2, 100), Duration::from_millis(400));
        assert!(exponential_backoff(3, 100) > exponential_backoff(2, 100));
    }
}
