//! Fallback-channel driver.
//!
//! One-shot request/response exchanges over HTTP POST, used when the
//! persistent channel is unavailable (or when the client is pinned to HTTP).
//!
//! # Retry policy
//!
//! Error classes drive retries, not a blanket loop:
//! - transport failures and 5xx responses retry up to the configured number
//!   of attempts, with a constant or exponential delay curve
//! - 4xx responses fail immediately; a malformed or unauthorized request
//!   will not become valid by retrying
//! - a structured `{error: {...}}` body is an application-level error and is
//!   surfaced as-is regardless of HTTP status, never retried
//!
//! # Example
//!
//! ```no_run
//! use wirefall_client::http::HttpChannel;
//! use wirefall_client::config::RetryConfig;
//! use wirefall_common::EnvelopeCodec;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = HttpChannel::new(
//!     "http://127.0.0.1:8080/rpc".to_string(),
//!     None,
//!     Duration::from_secs(30),
//!     RetryConfig::default(),
//! );
//! let codec = EnvelopeCodec::new();
//! let result = channel.call(&codec.encode("compute", vec![json!(100)])).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use wirefall_common::{EnvelopeCodec, RequestEnvelope, ResponseEnvelope, Result, WirefallError};

pub struct HttpChannel {
    url: String,
    credential: Option<String>,
    timeout: Duration,
    retry: RetryConfig,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpChannel {
    pub fn new(
        url: String,
        credential: Option<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            url,
            credential,
            timeout,
            retry,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// Issues the call, retrying transient failures per the configured
    /// policy, and returns the decoded result.
    pub async fn call(&self, envelope: &RequestEnvelope) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            match self.attempt(envelope).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        url = %self.url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fallback request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One exchange: POST the envelope, enforce the deadline, classify the
    /// response.
    async fn attempt(&self, envelope: &RequestEnvelope) -> Result<Value> {
        let body = serde_json::to_vec(envelope)?;

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(&self.url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(credential) = &self.credential {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", credential));
        }
        let request = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| WirefallError::Connectivity(format!("failed to build request: {}", e)))?;

        debug!(url = %self.url, id = envelope.id, method = %envelope.method, "fallback request");

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| WirefallError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| WirefallError::Connectivity(format!("http request failed: {}", e)))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| WirefallError::Connectivity(format!("failed to read response: {}", e)))?
            .to_bytes();

        // A structured error body wins over the HTTP status
        if let Ok(parsed) = serde_json::from_slice::<ResponseEnvelope>(&bytes) {
            if parsed.error.is_some() {
                return EnvelopeCodec::decode(parsed);
            }
            if status.is_success() {
                return EnvelopeCodec::decode(parsed);
            }
        } else if status.is_success() {
            return Err(WirefallError::InvalidResponse(format!(
                "undecodable response body ({} bytes)",
                bytes.len()
            )));
        }

        let message = String::from_utf8_lossy(&bytes).into_owned();
        if status.is_client_error() {
            Err(WirefallError::Client {
                status: status.as_u16(),
                message,
            })
        } else if status.is_server_error() {
            Err(WirefallError::Server {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(WirefallError::Connectivity(format!(
                "unexpected status {}: {}",
                status, message
            )))
        }
    }
}
