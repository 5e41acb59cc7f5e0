//! Request issuing.
//!
//! One thin layer over `reqwest`: GET when a command has no body, POST with a
//! JSON body otherwise. Two consumption modes: [`Transport::call`] buffers and
//! decodes a unary reply envelope, [`Transport::open`] hands back the live
//! response for streaming.
//!
//! Unary calls carry the configured per-request timeout; streaming opens do
//! not (the body stays open indefinitely), only the connect timeout applies.
//! Bodiless requests are retried with exponential backoff on retryable
//! failures; requests with bodies are mutations and are never retried.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::sleep;
use url::Url;

use crate::client::config::ClientConfig;
use crate::client::utils::{exponential_backoff, is_retryable_status};
use crate::error::{CanopyError, Result};

#[derive(Clone)]
pub(crate) struct Transport {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl Transport {
    pub fn new(config: ClientConfig) -> Self {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.max_idle_connections);

        if !config.proxy_url.is_empty() {
            if let Ok(proxy) = reqwest::Proxy::all(&config.proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let http = builder.build().unwrap_or_default();

        Transport {
            http,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Buffered call: issue the request, read the whole body and decode it.
    pub async fn call<T: DeserializeOwned>(
        &self,
        url: &Url,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let response = self.send(url, body, Some(timeout)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CanopyError::Http(e.to_string()))?;
        tracing::trace!(url = %url, reply = %String::from_utf8_lossy(&bytes), "returned");
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Streaming open: issue the request and hand back the live response.
    pub async fn open(&self, url: &Url, body: Option<&serde_json::Value>) -> Result<reqwest::Response> {
        self.send(url, body, None).await
    }

    async fn send(
        &self,
        url: &Url,
        body: Option<&serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            match self.send_once(url, body, timeout).await {
                Ok(response) => return Ok(response),
                Err(e)
                    if body.is_none()
                        && attempt < self.config.max_retries
                        && is_retryable(&e) =>
                {
                    let delay = exponential_backoff(attempt, self.config.retry_delay_ms);
                    tracing::warn!(
                        url = %url,
                        error = %e,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "request failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        url: &Url,
        body: Option<&serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        tracing::debug!(url = %url, "calling");
        let mut request = match body {
            None => self.http.get(url.clone()),
            Some(json) => {
                tracing::debug!(body = %json, "post body");
                self.http.post(url.clone()).json(json)
            }
        };
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CanopyError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CanopyError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

fn is_retryable(err: &CanopyError) -> bool {
    match err {
        CanopyError::Status(code) => is_retryable_status(*code),
        CanopyError::Http(_) => true,
        _ => false,
    }
}
