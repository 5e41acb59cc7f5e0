//! Client configuration.

/// Configuration options for [`CanopyClient`](crate::CanopyClient).
///
/// # Examples
///
/// ```
/// use canopy_client::ClientConfig;
///
/// let config = ClientConfig {
///     max_retries: 5,
///     retry_delay_ms: 2000,
///     ..Default::default()
/// };
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout applied to unary (buffered) requests, in milliseconds.
    /// Streaming requests never carry a total timeout; their bodies are
    /// long-lived by design.
    pub request_timeout_ms: u64,
    /// TCP connect timeout, in milliseconds. Applies to all requests.
    pub connect_timeout_ms: u64,
    /// Maximum retry attempts for bodiless (GET) requests that fail with a
    /// retryable status. Requests with bodies are never retried.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries, in milliseconds.
    pub retry_delay_ms: u64,
    /// Maximum idle connections kept per host.
    pub max_idle_connections: usize,
    /// Optional proxy URL; empty disables proxying.
    pub proxy_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            request_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            max_idle_connections: 32,
            proxy_url: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = ClientConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.request_timeout_ms, 30_000);
        assert!(config.proxy_url.is_empty());
    }
}
