//! HTTP client for the agent API.
//!
//! Wraps reqwest with the agent's authentication headers and retry
//! policy: up to three retries on connection failures, timeouts, and
//! the usual transient status codes (429, 500, 502, 503, 504), with
//! exponential backoff.

use crate::config::ApiConfig;
use crate::error::{AgentError, Result};
use crate::metrics::{MetricsEnvelope, Registration, AGENT_VERSION};
use crate::thresholds::{Alert, RemoteAgentConfig};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for metric, alert, and registration requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the lightweight config poll.
const CONFIG_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries after the initial attempt.
const MAX_RETRIES: u32 = 3;

/// Status codes worth retrying.
const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Response to a successful registration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationReply {
    /// Server acknowledgement message.
    #[serde(default)]
    pub message: String,
}

/// Client for the UptimeSquirrel agent API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Builds a client from API settings.
    ///
    /// # Errors
    ///
    /// Fails if the agent key contains bytes that cannot travel in an
    /// HTTP header, or if the underlying client cannot be constructed.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !config.key.is_empty() {
            let value = HeaderValue::from_str(&config.key)
                .map_err(|_| AgentError::InvalidAgentKey(
                    "key contains characters not allowed in headers".to_string(),
                ))?;
            headers.insert("X-Agent-Key", value);
        }

        let http = reqwest::Client::builder()
            .user_agent(format!("UptimeSquirrel-Agent/{AGENT_VERSION}"))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(1)
            .build()?;

        Ok(Self { http, base_url: config.url.trim_end_matches('/').to_string() })
    }

    /// Registers this host with the API.
    pub async fn register(&self, registration: &Registration) -> Result<RegistrationReply> {
        let request = self
            .http
            .post(self.url("/agent/register"))
            .json(registration);
        let response = self.send_with_retry(request).await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Posts one metrics snapshot.
    pub async fn report_metrics(&self, envelope: &MetricsEnvelope<'_>) -> Result<()> {
        let request = self.http.post(self.url("/agent/metrics")).json(envelope);
        let response = self.send_with_retry(request).await?;
        check_status(response).await?;
        Ok(())
    }

    /// Posts one alert.
    pub async fn send_alert(&self, alert: &Alert) -> Result<()> {
        let request = self.http.post(self.url("/agent/alerts")).json(alert);
        let response = self.send_with_retry(request).await?;
        check_status(response).await?;
        Ok(())
    }

    /// Fetches remote agent configuration.
    ///
    /// Returns `Ok(None)` on 404: the endpoint is optional server-side
    /// and its absence is not an error.
    pub async fn fetch_agent_config(&self) -> Result<Option<RemoteAgentConfig>> {
        let request = self
            .http
            .get(self.url("/agent/config"))
            .timeout(CONFIG_TIMEOUT);
        let response = self.send_with_retry(request).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("remote config endpoint not available");
            return Ok(None);
        }

        let response = check_status(response).await?;
        Ok(Some(response.json().await?))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_with_retry(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            let ready = request.try_clone().ok_or_else(|| AgentError::Api {
                status: 0,
                message: "request cannot be retried (streaming body)".to_string(),
            })?;

            match ready.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !RETRYABLE_STATUS.contains(&status) || attempt >= MAX_RETRIES {
                        return Ok(response);
                    }
                    warn!(status, attempt = attempt + 1, "retrying after transient status");
                }
                Err(e) => {
                    if !(e.is_connect() || e.is_timeout()) || attempt >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    warn!(error = %e, attempt = attempt + 1, "retrying after transport error");
                }
            }

            attempt += 1;
            tokio::time::sleep(backoff_delay(attempt)).await;
        }
    }
}

/// Backoff before retry N (1-indexed): 1s, 2s, 4s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt.saturating_sub(1)).min(4))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(AgentError::Api {
        status: status.as_u16(),
        message: if message.is_empty() {
            status.canonical_reason().unwrap_or("unknown").to_string()
        } else {
            message
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_config(url: &str, key: &str) -> ApiConfig {
        ApiConfig { url: url.to_string(), key: key.to_string() }
    }

    #[test]
    fn test_client_joins_urls_without_double_slash() {
        let client = ApiClient::new(&api_config("https://api.example.com/", "k")).unwrap();
        assert_eq!(client.url("/agent/metrics"), "https://api.example.com/agent/metrics");
    }

    #[test]
    fn test_client_accepts_empty_key() {
        assert!(ApiClient::new(&api_config("https://api.example.com", "")).is_ok());
    }

    #[test]
    fn test_client_rejects_unprintable_key() {
        let err = ApiClient::new(&api_config("https://api.example.com", "bad\nkey")).unwrap_err();
        assert!(matches!(err, AgentError::InvalidAgentKey(_)));
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(40), Duration::from_secs(16));
    }

    #[test]
    fn test_retryable_status_set() {
        for status in [429, 500, 502, 503, 504] {
            assert!(RETRYABLE_STATUS.contains(&status));
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!RETRYABLE_STATUS.contains(&status));
        }
    }

    #[test]
    fn test_registration_reply_parses() {
        let reply: RegistrationReply =
            serde_json::from_str(r#"{"message": "registered"}"#).unwrap();
        assert_eq!(reply.message, "registered");

        let empty: RegistrationReply = serde_json::from_str("{}").unwrap();
        assert!(empty.message.is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_surfaces_as_http_error() {
        // Port 1 on loopback refuses immediately; exercises the retry
        // path end to end (three backoffs, then the error surfaces).
        let client = ApiClient::new(&api_config("http://127.0.0.1:1", "k")).unwrap();
        let err = client.fetch_agent_config().await.unwrap_err();
        assert!(matches!(err, AgentError::Http(_)));
    }
}
